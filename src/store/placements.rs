//! Placement rows and their create/update/dedup rules.
//!
//! A placement records "signature S applied to page P of document D" with
//! a position descriptor. Per (document, signature, page) the store moves
//! through absent → placed (apply) → placed (reposition) → absent
//! (remove). Dedup depends on the caller's [`ApplyIntent`]: an upsert
//! merges into the existing row, an insert always creates a new one.
//!
//! The map is guarded by a single mutex, so apply's check-then-insert is
//! atomic: concurrent upserts for one triple cannot race into duplicate
//! rows.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geometry::{PageSize, Point, Rect};
use crate::mapping::{self, GridAnchor, ViewerDims};

/// Where a stamp goes on a page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum PlacementPosition {
    /// A symbolic anchor from the 9-point compass grid.
    Grid {
        /// The chosen anchor
        anchor: GridAnchor,
    },
    /// Viewer-relative pixel coordinates captured at placement time.
    Custom {
        /// X pixel offset from the viewer's top-left corner
        x: f64,
        /// Y pixel offset from the viewer's top-left corner
        y: f64,
        /// Viewer dimensions at the moment of capture
        #[serde(skip_serializing_if = "Option::is_none")]
        viewer: Option<ViewerDims>,
    },
}

impl PlacementPosition {
    /// Reject unusable coordinates before they reach storage.
    pub fn validate(&self) -> Result<()> {
        if let PlacementPosition::Custom { x, y, .. } = self {
            if !x.is_finite() || *x < 0.0 {
                return Err(Error::validation("x", format!("must be a non-negative number, got {x}")));
            }
            if !y.is_finite() || *y < 0.0 {
                return Err(Error::validation("y", format!("must be a non-negative number, got {y}")));
            }
        }
        Ok(())
    }

    /// Resolve this position into a page-space stamp rectangle.
    ///
    /// Custom positions resolve against their capture-time viewer
    /// dimensions, which reproduces the relative position the signer saw.
    pub fn resolve(&self, page: PageSize) -> Rect {
        match *self {
            PlacementPosition::Grid { anchor } => {
                mapping::resolve_grid(anchor, page.width, page.height)
            },
            PlacementPosition::Custom { x, y, viewer } => {
                mapping::resolve_custom(Point::new(x, y), viewer, viewer, page.width, page.height)
            },
        }
    }
}

/// Dedup semantics for an apply call.
///
/// Single-page applies merge on conflict; bulk multi-page applies insert
/// a fresh row per page. Keeping the two as explicit intents makes each
/// path independently testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyIntent {
    /// Merge into an existing (document, signature, page) row, if any.
    Upsert,
    /// Always insert a new row (bulk multi-page applies).
    InsertNew,
}

/// One recorded instance of a signature stamped on one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    /// Placement id
    pub id: Uuid,
    /// Target document
    pub document_id: Uuid,
    /// Applied signature identity
    pub signature_id: Uuid,
    /// 1-based page number
    pub page: u32,
    /// Position descriptor
    pub position: PlacementPosition,
    /// When the placement was applied or last repositioned
    pub applied_at: DateTime<Utc>,
}

/// In-memory placement registry implementing the dedup contract.
#[derive(Default)]
pub struct PlacementStore {
    inner: Mutex<HashMap<Uuid, Placement>>,
}

impl PlacementStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a signature to one page of a document.
    ///
    /// With [`ApplyIntent::Upsert`], an existing row for the exact
    /// (document, signature, page) triple is repositioned in place and
    /// returned; otherwise a new row is inserted.
    pub fn apply(
        &self,
        document_id: Uuid,
        signature_id: Uuid,
        page: u32,
        position: PlacementPosition,
        intent: ApplyIntent,
    ) -> Result<Placement> {
        position.validate()?;
        if page == 0 {
            return Err(Error::validation("pageNumbers", "page numbers are 1-based"));
        }

        let mut rows = self.lock();
        if intent == ApplyIntent::Upsert {
            let existing = rows.values_mut().find(|p| {
                p.document_id == document_id && p.signature_id == signature_id && p.page == page
            });
            if let Some(row) = existing {
                row.position = position;
                row.applied_at = Utc::now();
                return Ok(row.clone());
            }
        }

        let placement = Placement {
            id: Uuid::new_v4(),
            document_id,
            signature_id,
            page,
            position,
            applied_at: Utc::now(),
        };
        rows.insert(placement.id, placement.clone());
        Ok(placement)
    }

    /// Reposition an existing placement (drag).
    pub fn update_position(&self, placement_id: Uuid, position: PlacementPosition) -> Result<Placement> {
        position.validate()?;
        let mut rows = self.lock();
        let row = rows
            .get_mut(&placement_id)
            .ok_or_else(|| Error::not_found("placement", placement_id))?;
        row.position = position;
        row.applied_at = Utc::now();
        Ok(row.clone())
    }

    /// Fetch one placement.
    pub fn get(&self, placement_id: Uuid) -> Result<Placement> {
        self.lock()
            .get(&placement_id)
            .cloned()
            .ok_or_else(|| Error::not_found("placement", placement_id))
    }

    /// All placements on a document, ordered by page then apply time so
    /// later applies overdraw earlier ones deterministically.
    pub fn for_document(&self, document_id: Uuid) -> Vec<Placement> {
        let mut rows: Vec<Placement> = self
            .lock()
            .values()
            .filter(|p| p.document_id == document_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.page
                .cmp(&b.page)
                .then(a.applied_at.cmp(&b.applied_at))
                .then(a.id.cmp(&b.id))
        });
        rows
    }

    /// Delete one placement.
    pub fn remove(&self, placement_id: Uuid) -> Result<Placement> {
        self.lock()
            .remove(&placement_id)
            .ok_or_else(|| Error::not_found("placement", placement_id))
    }

    /// Delete every placement on one page of a document.
    pub fn remove_all_on_page(&self, document_id: Uuid, page: u32) -> usize {
        self.retain_removing(|p| p.document_id == document_id && p.page == page)
    }

    /// Cascade delete for a removed document.
    pub fn remove_all_for_document(&self, document_id: Uuid) -> usize {
        self.retain_removing(|p| p.document_id == document_id)
    }

    /// Cascade delete for a removed signature identity.
    pub fn remove_all_for_signature(&self, signature_id: Uuid) -> usize {
        self.retain_removing(|p| p.signature_id == signature_id)
    }

    fn retain_removing(&self, doomed: impl Fn(&Placement) -> bool) -> usize {
        let mut rows = self.lock();
        let before = rows.len();
        rows.retain(|_, p| !doomed(p));
        before - rows.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Placement>> {
        // A poisoned mutex means a panic mid-mutation; the map itself is
        // still structurally sound, so keep serving.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(anchor: GridAnchor) -> PlacementPosition {
        PlacementPosition::Grid { anchor }
    }

    #[test]
    fn test_upsert_is_idempotent_per_triple() {
        let store = PlacementStore::new();
        let (doc, sig) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store
            .apply(doc, sig, 1, grid(GridAnchor::TopLeft), ApplyIntent::Upsert)
            .unwrap();
        let second = store
            .apply(doc, sig, 1, grid(GridAnchor::BottomRight), ApplyIntent::Upsert)
            .unwrap();

        assert_eq!(first.id, second.id);
        let rows = store.for_document(doc);
        assert_eq!(rows.len(), 1);
        // The surviving row carries the second call's position.
        assert_eq!(rows[0].position, grid(GridAnchor::BottomRight));
    }

    #[test]
    fn test_insert_new_creates_independent_rows() {
        let store = PlacementStore::new();
        let (doc, sig) = (Uuid::new_v4(), Uuid::new_v4());

        for page in [1, 2, 3] {
            store
                .apply(doc, sig, page, grid(GridAnchor::MiddleCenter), ApplyIntent::InsertNew)
                .unwrap();
        }
        assert_eq!(store.for_document(doc).len(), 3);
    }

    #[test]
    fn test_insert_new_does_not_collapse_same_page() {
        let store = PlacementStore::new();
        let (doc, sig) = (Uuid::new_v4(), Uuid::new_v4());
        store.apply(doc, sig, 1, grid(GridAnchor::TopLeft), ApplyIntent::InsertNew).unwrap();
        store.apply(doc, sig, 1, grid(GridAnchor::TopLeft), ApplyIntent::InsertNew).unwrap();
        assert_eq!(store.for_document(doc).len(), 2);
    }

    #[test]
    fn test_upsert_scoped_to_triple() {
        let store = PlacementStore::new();
        let doc = Uuid::new_v4();
        let (sig_a, sig_b) = (Uuid::new_v4(), Uuid::new_v4());

        store.apply(doc, sig_a, 1, grid(GridAnchor::TopLeft), ApplyIntent::Upsert).unwrap();
        store.apply(doc, sig_b, 1, grid(GridAnchor::TopLeft), ApplyIntent::Upsert).unwrap();
        store.apply(doc, sig_a, 2, grid(GridAnchor::TopLeft), ApplyIntent::Upsert).unwrap();

        assert_eq!(store.for_document(doc).len(), 3);
    }

    #[test]
    fn test_update_position_unknown_id() {
        let store = PlacementStore::new();
        let err = store
            .update_position(Uuid::new_v4(), grid(GridAnchor::TopLeft))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "placement", .. }));
    }

    #[test]
    fn test_negative_custom_coordinates_rejected() {
        let store = PlacementStore::new();
        let position = PlacementPosition::Custom {
            x: -4.0,
            y: 10.0,
            viewer: None,
        };
        let err = store
            .apply(Uuid::new_v4(), Uuid::new_v4(), 1, position, ApplyIntent::Upsert)
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "x", .. }));
    }

    #[test]
    fn test_page_zero_rejected() {
        let store = PlacementStore::new();
        let err = store
            .apply(Uuid::new_v4(), Uuid::new_v4(), 0, grid(GridAnchor::TopLeft), ApplyIntent::Upsert)
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "pageNumbers", .. }));
    }

    #[test]
    fn test_cascade_removals() {
        let store = PlacementStore::new();
        let (doc_a, doc_b) = (Uuid::new_v4(), Uuid::new_v4());
        let (sig_a, sig_b) = (Uuid::new_v4(), Uuid::new_v4());

        store.apply(doc_a, sig_a, 1, grid(GridAnchor::TopLeft), ApplyIntent::InsertNew).unwrap();
        store.apply(doc_a, sig_a, 2, grid(GridAnchor::TopLeft), ApplyIntent::InsertNew).unwrap();
        store.apply(doc_a, sig_b, 2, grid(GridAnchor::TopLeft), ApplyIntent::InsertNew).unwrap();
        store.apply(doc_b, sig_b, 1, grid(GridAnchor::TopLeft), ApplyIntent::InsertNew).unwrap();

        assert_eq!(store.remove_all_on_page(doc_a, 2), 2);
        assert_eq!(store.for_document(doc_a).len(), 1);

        assert_eq!(store.remove_all_for_signature(sig_b), 1);
        assert_eq!(store.remove_all_for_document(doc_a), 1);
        assert!(store.for_document(doc_a).is_empty());
        assert!(store.for_document(doc_b).is_empty());
    }

    #[test]
    fn test_remove_returns_row_or_not_found() {
        let store = PlacementStore::new();
        let row = store
            .apply(Uuid::new_v4(), Uuid::new_v4(), 1, grid(GridAnchor::TopLeft), ApplyIntent::Upsert)
            .unwrap();
        assert_eq!(store.remove(row.id).unwrap().id, row.id);
        assert!(store.remove(row.id).is_err());
    }

    #[test]
    fn test_concurrent_upserts_never_duplicate() {
        use std::sync::Arc;

        let store = Arc::new(PlacementStore::new());
        let (doc, sig) = (Uuid::new_v4(), Uuid::new_v4());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for _ in 0..50 {
                        store
                            .apply(doc, sig, 1, grid(GridAnchor::TopLeft), ApplyIntent::Upsert)
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(store.for_document(doc).len(), 1);
    }

    #[test]
    fn test_position_resolution_matches_mapper() {
        let page = PageSize::letter();
        let rect = grid(GridAnchor::TopLeft).resolve(page);
        assert_eq!(rect.x, 50.0);
        assert_eq!(rect.y, 642.0);

        let custom = PlacementPosition::Custom {
            x: 100.0,
            y: 50.0,
            viewer: Some(ViewerDims::new(800.0, 600.0)),
        };
        let rect = custom.resolve(page);
        assert!((rect.x - (100.0 / 800.0) * 612.0).abs() < 1e-9);
    }
}
