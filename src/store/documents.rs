//! Document records and upload ingest.
//!
//! The engine sees documents through a narrow seam: stored bytes, a page
//! count, per-page intrinsic sizes and a lifecycle status. Ingest parses
//! the uploaded PDF once to extract page geometry; documents whose bytes
//! cannot be parsed stay visible in the `Error` state with their failure
//! reason.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::debug;
use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geometry::PageSize;

/// Lifecycle status of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Upload accepted, not yet inspected
    Pending,
    /// Geometry extraction in progress
    Processing,
    /// Ready for placement and stamping
    Processed,
    /// The uploaded bytes could not be parsed as a PDF
    Error,
}

/// Metadata for one uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document id
    pub id: Uuid,
    /// Owning user
    pub owner_id: Uuid,
    /// Original upload filename
    pub file_name: String,
    /// Number of pages (0 until processed)
    pub page_count: u32,
    /// Intrinsic page sizes in points, one per page
    pub page_sizes: Vec<PageSize>,
    /// Lifecycle status
    pub status: DocumentStatus,
    /// Failure reason when status is `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Upload instant
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Intrinsic size of a 1-based page, falling back to US Letter when
    /// the page carried no usable MediaBox.
    pub fn page_size(&self, page: u32) -> PageSize {
        self.page_sizes
            .get(page.saturating_sub(1) as usize)
            .copied()
            .unwrap_or_else(PageSize::letter)
    }
}

struct StoredDocument {
    record: DocumentRecord,
    bytes: Vec<u8>,
}

/// In-memory document registry standing in for the upload storage
/// collaborator.
#[derive(Default)]
pub struct DocumentStore {
    inner: Mutex<HashMap<Uuid, StoredDocument>>,
}

impl DocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an upload, extract page geometry, and register the record.
    ///
    /// Parse failures do not discard the upload: the record is kept in the
    /// `Error` state so the owner can see what happened.
    pub fn ingest(
        &self,
        owner_id: Uuid,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> DocumentRecord {
        let file_name = file_name.into();
        let id = Uuid::new_v4();
        let mut record = DocumentRecord {
            id,
            owner_id,
            file_name,
            page_count: 0,
            page_sizes: Vec::new(),
            status: DocumentStatus::Pending,
            error: None,
            created_at: Utc::now(),
        };

        record.status = DocumentStatus::Processing;
        match inspect_pages(&bytes) {
            Ok(sizes) => {
                record.page_count = sizes.len() as u32;
                record.page_sizes = sizes;
                record.status = DocumentStatus::Processed;
                debug!("document {} processed: {} pages", record.id, record.page_count);
            },
            Err(err) => {
                record.status = DocumentStatus::Error;
                record.error = Some(err.to_string());
                debug!("document {} failed inspection: {err}", record.id);
            },
        }

        let stored = StoredDocument {
            record: record.clone(),
            bytes,
        };
        self.lock().insert(id, stored);
        record
    }

    /// Fetch a document record.
    pub fn get(&self, id: Uuid) -> Result<DocumentRecord> {
        self.lock()
            .get(&id)
            .map(|d| d.record.clone())
            .ok_or_else(|| Error::not_found("document", id))
    }

    /// Fetch the stored bytes of a document.
    pub fn bytes(&self, id: Uuid) -> Result<Vec<u8>> {
        self.lock()
            .get(&id)
            .map(|d| d.bytes.clone())
            .ok_or_else(|| Error::not_found("document", id))
    }

    /// Fail unless `user_id` owns the document.
    pub fn verify_owner(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        let rows = self.lock();
        let stored = rows.get(&id).ok_or_else(|| Error::not_found("document", id))?;
        if stored.record.owner_id != user_id {
            return Err(Error::Authorization);
        }
        Ok(())
    }

    /// Delete a document, returning its record.
    pub fn remove(&self, id: Uuid) -> Result<DocumentRecord> {
        self.lock()
            .remove(&id)
            .map(|d| d.record)
            .ok_or_else(|| Error::not_found("document", id))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, StoredDocument>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Parse a PDF and report each page's intrinsic size.
pub fn inspect_pages(bytes: &[u8]) -> Result<Vec<PageSize>> {
    let doc = Document::load_mem(bytes)?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(Error::Processing("document has no pages".to_string()));
    }
    Ok(pages
        .values()
        .map(|&page_id| media_box(&doc, page_id).unwrap_or_else(PageSize::letter))
        .collect())
}

/// Walk a page's dictionary chain for an inherited MediaBox.
fn media_box(doc: &Document, page_id: ObjectId) -> Option<PageSize> {
    let mut current = Some(page_id);
    // Parent chains are shallow; the hop cap guards against cycles in
    // damaged files.
    for _ in 0..32 {
        let id = current?;
        let dict = doc.get_object(id).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(b"MediaBox") {
            if let Some(size) = media_box_from(doc, value) {
                return Some(size);
            }
        }
        current = dict.get(b"Parent").ok().and_then(|o| o.as_reference().ok());
    }
    None
}

fn media_box_from(doc: &Document, value: &Object) -> Option<PageSize> {
    let value = match value {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let arr = value.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let nums: Vec<f64> = arr.iter().filter_map(object_to_f64).collect();
    if nums.len() != 4 {
        return None;
    }
    let width = nums[2] - nums[0];
    let height = nums[3] - nums[1];
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some(PageSize::new(width, height))
}

fn object_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}
