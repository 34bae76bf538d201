//! Concurrency-bounded bulk export of stamped documents.
//!
//! A fixed-width worker pool (width `min(3, n)`) pulls document indices
//! from a shared atomic counter. Each worker fetches one document's bytes
//! and placements, stamps it, then appends the result to a single shared
//! archive writer. Stamping runs concurrently; appends are serialized
//! behind a mutex (single-writer discipline). Entries therefore appear in
//! completion order, not submission order.
//!
//! Per-document failures are logged and the document is omitted; one bad
//! document never aborts the batch. A [`CancelToken`] is checked before
//! each document's work starts, so an abandoned download stops consuming
//! the queue; whatever already completed is still finalized.

use std::collections::HashSet;
use std::io::{Seek, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::stamper::{self, SignerStamp, StampPlan};
use crate::store::{DocumentRecord, DocumentStore, IdentityStore, Placement, PlacementStore};

/// Upper bound on concurrently stamped documents.
pub const MAX_WORKERS: usize = 3;

/// Cooperative cancellation signal for an export in flight.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Workers stop pulling new documents.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One document left out of the archive, and why.
#[derive(Debug, Clone)]
pub struct SkippedDocument {
    /// Original filename
    pub file_name: String,
    /// Failure description
    pub reason: String,
}

/// What made it into the archive and what did not.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    /// Entry names written, in completion order
    pub exported: Vec<String>,
    /// Documents omitted after a processing failure
    pub skipped: Vec<SkippedDocument>,
}

/// Orchestrates stamping many documents into one archive stream.
pub struct BulkExporter<'a> {
    documents: &'a DocumentStore,
    identities: &'a IdentityStore,
    placements: &'a PlacementStore,
}

struct ArchiveSink<W: Write + Seek> {
    writer: ZipWriter<W>,
    used_names: HashSet<String>,
}

impl<'a> BulkExporter<'a> {
    /// Wire the exporter to its stores.
    pub fn new(
        documents: &'a DocumentStore,
        identities: &'a IdentityStore,
        placements: &'a PlacementStore,
    ) -> Self {
        Self {
            documents,
            identities,
            placements,
        }
    }

    /// Stamp `document_ids` and stream them into `sink` as a zip archive.
    ///
    /// Ownership of every document is verified before any work starts.
    /// Entries are written uncompressed (store mode): the payloads are
    /// PDFs, already compressed internally.
    pub fn export_zip<W: Write + Seek + Send>(
        &self,
        document_ids: &[Uuid],
        user_id: Uuid,
        sink: W,
        cancel: &CancelToken,
    ) -> Result<ExportSummary> {
        // Preflight: every document must exist and belong to the caller.
        let mut queue = Vec::with_capacity(document_ids.len());
        for &id in document_ids {
            let record = self.documents.get(id)?;
            self.documents.verify_owner(id, user_id)?;
            queue.push((id, record.file_name));
        }

        let sink = Mutex::new(ArchiveSink {
            writer: ZipWriter::new(sink),
            used_names: HashSet::new(),
        });
        let summary = Mutex::new(ExportSummary::default());
        let write_failure: Mutex<Option<Error>> = Mutex::new(None);
        let next = AtomicUsize::new(0);
        let workers = MAX_WORKERS.min(queue.len());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some((document_id, file_name)) = queue.get(index) else {
                            break;
                        };

                        match self.stamp_one(*document_id) {
                            Ok(bytes) => {
                                if let Err(err) = append_entry(&sink, file_name, &bytes, &summary) {
                                    // A broken sink ends the whole export.
                                    lock(&write_failure).get_or_insert(err);
                                    cancel.cancel();
                                    break;
                                }
                            },
                            Err(err) => {
                                warn!("export skipping {file_name}: {err}");
                                lock(&summary).skipped.push(SkippedDocument {
                                    file_name: file_name.clone(),
                                    reason: err.to_string(),
                                });
                            },
                        }
                    }
                });
            }
        });

        if let Some(err) = lock(&write_failure).take() {
            return Err(err);
        }

        let sink = sink.into_inner().unwrap_or_else(|p| p.into_inner());
        sink.writer
            .finish()
            .map_err(|e| Error::Archive(e.to_string()))?;

        let summary = summary.into_inner().unwrap_or_else(|p| p.into_inner());
        debug!(
            "export finished: {} written, {} skipped",
            summary.exported.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    /// Fetch, resolve and stamp one document.
    fn stamp_one(&self, document_id: Uuid) -> Result<Vec<u8>> {
        let record = self.documents.get(document_id)?;
        let bytes = self.documents.bytes(document_id)?;
        let rows = self.placements.for_document(document_id);
        let plans = build_plans(&record, &rows, self.identities)?;
        stamper::stamp_document(&bytes, &plans)
    }
}

/// Resolve placements into stamp plans against a document's geometry.
pub(crate) fn build_plans(
    record: &DocumentRecord,
    rows: &[Placement],
    identities: &IdentityStore,
) -> Result<Vec<StampPlan>> {
    rows.iter()
        .map(|placement| {
            let identity = identities.get(placement.signature_id)?;
            let page = record.page_size(placement.page);
            Ok(StampPlan {
                page: placement.page,
                rect: placement.position.resolve(page),
                signer: SignerStamp::for_identity(&identity, placement.applied_at),
                artwork: identity.artwork.clone(),
            })
        })
        .collect()
}

fn append_entry<W: Write + Seek>(
    sink: &Mutex<ArchiveSink<W>>,
    file_name: &str,
    bytes: &[u8],
    summary: &Mutex<ExportSummary>,
) -> Result<()> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut sink = lock(sink);
    let entry_name = unique_entry_name(&mut sink.used_names, file_name);
    sink.writer
        .start_file(entry_name.clone(), options)
        .map_err(|e| Error::Archive(e.to_string()))?;
    sink.writer
        .write_all(bytes)
        .map_err(|e| Error::Archive(e.to_string()))?;
    lock(summary).exported.push(entry_name);
    Ok(())
}

/// Disambiguate duplicate originals by appending `" (n)"` before the
/// extension.
fn unique_entry_name(used: &mut HashSet<String>, original: &str) -> String {
    if used.insert(original.to_string()) {
        return original.to_string();
    }
    let (stem, ext) = match original.rfind('.') {
        Some(dot) if dot > 0 => original.split_at(dot),
        _ => (original, ""),
    };
    let mut n = 1u32;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
