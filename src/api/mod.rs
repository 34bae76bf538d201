//! Wire-facing payloads and the engine facade.
//!
//! Transport (routing, sessions, multipart upload) lives outside this
//! crate; what crosses the seam are the typed request bodies defined
//! here, validated field by field before any store is touched.

use std::io::{Seek, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::certdoc;
use crate::error::{Error, Result};
use crate::export::{BulkExporter, CancelToken, ExportSummary};
use crate::identity::{certificate, CertificateInfo, SignatureIdentity, SignerProfile};
use crate::mapping::{GridAnchor, ViewerDims};
use crate::stamper;
use crate::store::{
    ApplyIntent, DocumentRecord, DocumentStore, IdentityStore, Placement, PlacementPosition,
    PlacementStore,
};

/// Default filename for bulk export downloads.
pub const DEFAULT_ARCHIVE_NAME: &str = "inkseal.zip";

/// Position descriptor as reported by the viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionPayload {
    /// Grid anchor name, or `"custom"` for pixel coordinates
    pub grid_position: String,
    /// X pixel offset for custom placements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Y pixel offset for custom placements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Stamp box width the viewer displayed
    pub width: f64,
    /// Stamp box height the viewer displayed
    pub height: f64,
    /// Viewer width at capture time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_width: Option<f64>,
    /// Viewer height at capture time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_height: Option<f64>,
}

impl PositionPayload {
    /// Field-level validation per the apply contract.
    pub fn validate(&self) -> Result<()> {
        if self.grid_position.trim().is_empty() {
            return Err(Error::validation("gridPosition", "must be a non-empty string"));
        }
        for (field, value) in [("x", self.x), ("y", self.y)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::validation(
                        field,
                        format!("must be a non-negative number, got {v}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Convert the wire form into a storable position descriptor.
    pub fn to_position(&self) -> Result<PlacementPosition> {
        self.validate()?;
        if let Some(anchor) = GridAnchor::parse(&self.grid_position) {
            return Ok(PlacementPosition::Grid { anchor });
        }
        if self.grid_position == "custom" {
            let x = self
                .x
                .ok_or_else(|| Error::validation("x", "required for custom placement"))?;
            let y = self
                .y
                .ok_or_else(|| Error::validation("y", "required for custom placement"))?;
            let viewer = match (self.viewer_width, self.viewer_height) {
                (Some(w), Some(h)) => Some(ViewerDims::new(w, h)),
                _ => None,
            };
            return Ok(PlacementPosition::Custom { x, y, viewer });
        }
        Err(Error::validation(
            "gridPosition",
            format!("unknown anchor '{}'", self.grid_position),
        ))
    }
}

/// Apply-placement request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPlacementRequest {
    /// Signature identity to apply
    pub signature_id: Uuid,
    /// 1-based target pages; more than one means a bulk apply
    pub page_numbers: Vec<u32>,
    /// Requested position
    pub position: PositionPayload,
    /// Access password for protected signatures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ApplyPlacementRequest {
    /// Validate the request against the target document's page count.
    pub fn validate(&self, page_count: u32) -> Result<()> {
        if self.page_numbers.is_empty() {
            return Err(Error::validation("pageNumbers", "must not be empty"));
        }
        for &page in &self.page_numbers {
            if page == 0 || page > page_count {
                return Err(Error::validation(
                    "pageNumbers",
                    format!("page {page} is outside 1..={page_count}"),
                ));
            }
        }
        self.position.validate()
    }
}

/// Create-signature request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdentityRequest {
    /// Name shown in signature pickers
    pub display_name: String,
    /// Signer full legal name (certificate common name)
    pub full_name: String,
    /// Company (certificate organization)
    pub company: String,
    /// Location (certificate locality)
    pub location: String,
    /// Signer timezone as minutes east of UTC
    pub utc_offset_minutes: i32,
    /// Contact email
    pub email: String,
    /// Optional raster artwork, base64-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_base64: Option<String>,
    /// Optional access password enabling the mutation gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl CreateIdentityRequest {
    fn decode_artwork(&self) -> Result<Option<Vec<u8>>> {
        match &self.artwork_base64 {
            None => Ok(None),
            Some(encoded) => BASE64
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(|e| Error::validation("artworkBase64", e.to_string())),
        }
    }
}

/// Bulk-export request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// Documents to stamp and archive
    pub document_ids: Vec<Uuid>,
    /// Requesting user; must own every document
    pub user_id: Uuid,
}

/// The signature engine: stores plus the operations the API layer calls.
#[derive(Default)]
pub struct Engine {
    documents: DocumentStore,
    identities: IdentityStore,
    placements: PlacementStore,
}

impl Engine {
    /// Create an engine with empty stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Document store access for collaborators and tests.
    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Identity store access for collaborators and tests.
    pub fn identities(&self) -> &IdentityStore {
        &self.identities
    }

    /// Placement store access for collaborators and tests.
    pub fn placements(&self) -> &PlacementStore {
        &self.placements
    }

    /// Create a signature identity: issue credentials, register the row.
    pub fn create_identity(
        &self,
        owner_id: Uuid,
        request: &CreateIdentityRequest,
    ) -> Result<SignatureIdentity> {
        if request.full_name.trim().is_empty() {
            return Err(Error::validation("fullName", "must not be empty"));
        }
        let artwork = request.decode_artwork()?;
        let profile = SignerProfile {
            full_name: request.full_name.clone(),
            company: request.company.clone(),
            location: request.location.clone(),
            utc_offset_minutes: request.utc_offset_minutes,
        };
        let identity = SignatureIdentity::create(
            owner_id,
            request.display_name.clone(),
            profile,
            request.email.clone(),
            artwork,
            request.password.as_deref(),
        )?;
        self.identities.insert(identity.clone());
        Ok(identity)
    }

    /// Delete a signature identity, cascading its placements.
    pub fn delete_identity(&self, signature_id: Uuid, password: Option<&str>) -> Result<()> {
        let identity = self.identities.get(signature_id)?;
        identity.authorize(password)?;
        self.identities.remove(signature_id)?;
        self.placements.remove_all_for_signature(signature_id);
        Ok(())
    }

    /// Accept an uploaded document.
    pub fn ingest_document(
        &self,
        owner_id: Uuid,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> DocumentRecord {
        self.documents.ingest(owner_id, file_name, bytes)
    }

    /// Delete a document, cascading its placements.
    pub fn delete_document(&self, document_id: Uuid) -> Result<()> {
        self.documents.remove(document_id)?;
        self.placements.remove_all_for_document(document_id);
        Ok(())
    }

    /// Apply a signature to one or more pages of a document.
    ///
    /// A single-page request upserts (repeat applies reposition the
    /// existing row); a multi-page request inserts independent per-page
    /// rows.
    pub fn apply_placement(
        &self,
        document_id: Uuid,
        request: &ApplyPlacementRequest,
    ) -> Result<Vec<Placement>> {
        let record = self.documents.get(document_id)?;
        request.validate(record.page_count)?;

        let identity = self.identities.get(request.signature_id)?;
        identity.authorize(request.password.as_deref())?;

        let position = request.position.to_position()?;
        let intent = if request.page_numbers.len() > 1 {
            ApplyIntent::InsertNew
        } else {
            ApplyIntent::Upsert
        };

        request
            .page_numbers
            .iter()
            .map(|&page| {
                self.placements
                    .apply(document_id, request.signature_id, page, position, intent)
            })
            .collect()
    }

    /// Reposition an existing placement (drag).
    pub fn reposition_placement(
        &self,
        placement_id: Uuid,
        payload: &PositionPayload,
    ) -> Result<Placement> {
        let position = payload.to_position()?;
        self.placements.update_position(placement_id, position)
    }

    /// Remove one placement, honoring the identity's password gate.
    pub fn remove_placement(&self, placement_id: Uuid, password: Option<&str>) -> Result<Placement> {
        let placement = self.placements.get(placement_id)?;
        match self.identities.get(placement.signature_id) {
            Ok(identity) => identity.authorize(password)?,
            // The identity is already gone; nothing left to guard.
            Err(Error::NotFound { .. }) => {},
            Err(err) => return Err(err),
        }
        self.placements.remove(placement_id)
    }

    /// Remove every placement on one page.
    pub fn remove_page_placements(&self, document_id: Uuid, page: u32) -> usize {
        self.placements.remove_all_on_page(document_id, page)
    }

    /// All placements on a document, in stamping order.
    pub fn placements_for(&self, document_id: Uuid) -> Vec<Placement> {
        self.placements.for_document(document_id)
    }

    /// Stamp every recorded placement and return the resulting PDF bytes
    /// (the preview/view arm; serve with `application/pdf`).
    pub fn stamped_document(&self, document_id: Uuid) -> Result<Vec<u8>> {
        let record = self.documents.get(document_id)?;
        let bytes = self.documents.bytes(document_id)?;
        let rows = self.placements.for_document(document_id);
        let plans = crate::export::build_plans(&record, &rows, &self.identities)?;
        stamper::stamp_document(&bytes, &plans)
    }

    /// Certificate metadata for a signature (the JSON arm).
    pub fn certificate_info(&self, signature_id: Uuid) -> Result<CertificateInfo> {
        let identity = self.identities.get(signature_id)?;
        certificate::describe(&identity.certificate_pem)
    }

    /// Certificate metadata rendered as a PDF (the document arm).
    pub fn certificate_document(&self, signature_id: Uuid) -> Result<Vec<u8>> {
        let identity = self.identities.get(signature_id)?;
        let info = certificate::describe(&identity.certificate_pem)?;
        certdoc::render(&identity.display_name, &info)
    }

    /// Stamp and archive many documents into `sink`.
    pub fn export_zip<W: Write + Seek + Send>(
        &self,
        request: &ExportRequest,
        sink: W,
        cancel: &CancelToken,
    ) -> Result<ExportSummary> {
        BulkExporter::new(&self.documents, &self.identities, &self.placements).export_zip(
            &request.document_ids,
            request.user_id,
            sink,
            cancel,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{contains, minimal_pdf};

    fn grid_payload(anchor: &str) -> PositionPayload {
        PositionPayload {
            grid_position: anchor.to_string(),
            x: None,
            y: None,
            width: 220.0,
            height: 100.0,
            viewer_width: None,
            viewer_height: None,
        }
    }

    fn custom_payload(x: f64, y: f64) -> PositionPayload {
        PositionPayload {
            grid_position: "custom".to_string(),
            x: Some(x),
            y: Some(y),
            width: 220.0,
            height: 100.0,
            viewer_width: Some(800.0),
            viewer_height: Some(600.0),
        }
    }

    fn identity_request(password: Option<&str>) -> CreateIdentityRequest {
        CreateIdentityRequest {
            display_name: "Primary".to_string(),
            full_name: "Noor Haddad".to_string(),
            company: "Signet Labs".to_string(),
            location: "Amman".to_string(),
            utc_offset_minutes: 180,
            email: "noor@signet.example".to_string(),
            artwork_base64: None,
            password: password.map(String::from),
        }
    }

    struct Setup {
        engine: Engine,
        owner: Uuid,
        document: Uuid,
        signature: Uuid,
    }

    fn setup(pages: usize, password: Option<&str>) -> Setup {
        let engine = Engine::new();
        let owner = Uuid::new_v4();
        let document = engine
            .ingest_document(owner, "contract.pdf", minimal_pdf(pages, 612.0, 792.0))
            .id;
        let signature = engine
            .create_identity(owner, &identity_request(password))
            .unwrap()
            .id;
        Setup {
            engine,
            owner,
            document,
            signature,
        }
    }

    fn apply_request(
        signature: Uuid,
        pages: Vec<u32>,
        position: PositionPayload,
        password: Option<&str>,
    ) -> ApplyPlacementRequest {
        ApplyPlacementRequest {
            signature_id: signature,
            page_numbers: pages,
            position,
            password: password.map(String::from),
        }
    }

    #[test]
    fn test_single_page_apply_upserts() {
        let s = setup(3, None);
        let req = apply_request(s.signature, vec![1], grid_payload("top-left"), None);
        s.engine.apply_placement(s.document, &req).unwrap();

        let req = apply_request(s.signature, vec![1], grid_payload("bottom-right"), None);
        s.engine.apply_placement(s.document, &req).unwrap();

        let rows = s.engine.placements_for(s.document);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].position,
            PlacementPosition::Grid {
                anchor: GridAnchor::BottomRight
            }
        );
    }

    #[test]
    fn test_multi_page_apply_inserts_per_page() {
        let s = setup(3, None);
        let req = apply_request(s.signature, vec![1, 2, 3], grid_payload("middle-center"), None);
        let rows = s.engine.apply_placement(s.document, &req).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(s.engine.placements_for(s.document).len(), 3);
    }

    #[test]
    fn test_page_out_of_range_rejected() {
        let s = setup(2, None);
        let req = apply_request(s.signature, vec![1, 9], grid_payload("top-left"), None);
        let err = s.engine.apply_placement(s.document, &req).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "pageNumbers", .. }));
    }

    #[test]
    fn test_empty_grid_position_rejected() {
        let s = setup(1, None);
        let req = apply_request(s.signature, vec![1], grid_payload("  "), None);
        let err = s.engine.apply_placement(s.document, &req).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "gridPosition", .. }));
    }

    #[test]
    fn test_unknown_anchor_rejected() {
        let err = grid_payload("upper-middle").to_position().unwrap_err();
        assert!(matches!(err, Error::Validation { field: "gridPosition", .. }));
    }

    #[test]
    fn test_custom_position_round_trip() {
        let position = custom_payload(100.0, 50.0).to_position().unwrap();
        assert_eq!(
            position,
            PlacementPosition::Custom {
                x: 100.0,
                y: 50.0,
                viewer: Some(ViewerDims::new(800.0, 600.0)),
            }
        );
    }

    #[test]
    fn test_custom_requires_coordinates() {
        let mut payload = custom_payload(1.0, 2.0);
        payload.y = None;
        let err = payload.to_position().unwrap_err();
        assert!(matches!(err, Error::Validation { field: "y", .. }));
    }

    #[test]
    fn test_negative_coordinates_rejected() {
        let payload = custom_payload(-1.0, 2.0);
        let err = payload.validate().unwrap_err();
        assert!(matches!(err, Error::Validation { field: "x", .. }));
    }

    #[test]
    fn test_password_gate_on_apply_and_remove() {
        let s = setup(1, Some("sesame"));

        // No password and wrong password fail with Authorization.
        let req = apply_request(s.signature, vec![1], grid_payload("top-left"), None);
        assert!(matches!(
            s.engine.apply_placement(s.document, &req),
            Err(Error::Authorization)
        ));
        let req = apply_request(s.signature, vec![1], grid_payload("top-left"), Some("wrong"));
        assert!(matches!(
            s.engine.apply_placement(s.document, &req),
            Err(Error::Authorization)
        ));

        // The correct password proceeds.
        let req = apply_request(s.signature, vec![1], grid_payload("top-left"), Some("sesame"));
        let rows = s.engine.apply_placement(s.document, &req).unwrap();

        // Remove honors the same gate.
        assert!(matches!(
            s.engine.remove_placement(rows[0].id, None),
            Err(Error::Authorization)
        ));
        s.engine.remove_placement(rows[0].id, Some("sesame")).unwrap();
        assert!(s.engine.placements_for(s.document).is_empty());
    }

    #[test]
    fn test_unknown_signature_is_not_found() {
        let s = setup(1, None);
        let req = apply_request(Uuid::new_v4(), vec![1], grid_payload("top-left"), None);
        assert!(matches!(
            s.engine.apply_placement(s.document, &req),
            Err(Error::NotFound { kind: "signature", .. })
        ));
    }

    #[test]
    fn test_delete_identity_cascades_placements() {
        let s = setup(2, None);
        let req = apply_request(s.signature, vec![1, 2], grid_payload("top-left"), None);
        s.engine.apply_placement(s.document, &req).unwrap();

        s.engine.delete_identity(s.signature, None).unwrap();
        assert!(s.engine.placements_for(s.document).is_empty());
        assert!(s.engine.certificate_info(s.signature).is_err());
    }

    #[test]
    fn test_delete_document_cascades_placements() {
        let s = setup(1, None);
        let req = apply_request(s.signature, vec![1], grid_payload("top-left"), None);
        let rows = s.engine.apply_placement(s.document, &req).unwrap();

        s.engine.delete_document(s.document).unwrap();
        assert!(matches!(
            s.engine.placements().get(rows[0].id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_stamped_preview_contains_signer() {
        let s = setup(1, None);
        let req = apply_request(s.signature, vec![1], grid_payload("top-left"), None);
        s.engine.apply_placement(s.document, &req).unwrap();

        let pdf = s.engine.stamped_document(s.document).unwrap();
        assert!(contains(&pdf, "Noor Haddad"));
        assert!(contains(&pdf, "Signet Labs"));
    }

    #[test]
    fn test_certificate_arms() {
        let s = setup(1, None);
        let info = s.engine.certificate_info(s.signature).unwrap();
        assert_eq!(info.common_name.as_deref(), Some("Noor Haddad"));
        assert!(info.is_valid);

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("serialNumber").is_some());
        assert!(json.get("validFrom").is_some());
        assert!(json.get("isValid").is_some());

        let pdf = s.engine.certificate_document(s.signature).unwrap();
        assert!(contains(&pdf, "Signature Certificate"));
    }

    #[test]
    fn test_bad_artwork_base64_rejected() {
        let engine = Engine::new();
        let mut req = identity_request(None);
        req.artwork_base64 = Some("!!!not base64!!!".to_string());
        let err = engine.create_identity(Uuid::new_v4(), &req).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "artworkBase64", .. }));
    }

    #[test]
    fn test_request_json_shape() {
        let req = apply_request(
            Uuid::new_v4(),
            vec![1, 2],
            custom_payload(10.0, 20.0),
            Some("pw"),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("signatureId").is_some());
        assert!(json.get("pageNumbers").is_some());
        let position = json.get("position").unwrap();
        assert!(position.get("gridPosition").is_some());
        assert!(position.get("viewerWidth").is_some());
    }
}
