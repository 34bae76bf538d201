//! # Inkseal
//!
//! Signature placement and certificate engine for a document e-signature
//! product.
//!
//! ## What it does
//!
//! - **Identity issuance**: one RSA keypair and self-signed X.509
//!   certificate per signature identity, with the private key encrypted
//!   at rest (AES-256-CBC under a PBKDF2-derived key).
//! - **Coordinate mapping**: pure conversion of symbolic grid anchors and
//!   viewer-relative pixel points into PDF page-space rectangles, with
//!   rescaling across differing viewer dimensions.
//! - **Stamping**: drawing signature artwork or a signer text block onto
//!   PDF pages, with graceful image-to-text fallback.
//! - **Placement rules**: upsert-vs-insert dedup per (document,
//!   signature, page), password-gated mutation, cascade deletion.
//! - **Bulk export**: a bounded worker pool stamping many documents into
//!   one streamed zip archive.
//!
//! The HTTP layer, UI, upload handling and database are external
//! collaborators; [`api::Engine`] is the seam they call through.
//!
//! ## Quick start
//!
//! ```ignore
//! use inkseal::api::{ApplyPlacementRequest, CreateIdentityRequest, Engine, PositionPayload};
//!
//! let engine = Engine::new();
//! let doc = engine.ingest_document(owner, "contract.pdf", pdf_bytes);
//! let sig = engine.create_identity(owner, &create_request)?;
//! engine.apply_placement(doc.id, &apply_request)?;
//! let stamped = engine.stamped_document(doc.id)?;
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Page-space primitives and viewer-space mapping
pub mod geometry;
pub mod mapping;

// Signer identities: certificates, key protection, access gate
pub mod identity;

// Persistence contracts: documents, identities, placements
pub mod store;

// Page stamping
pub mod stamper;

// Bulk archive export
pub mod export;

// Generated certificate summary PDF
pub mod certdoc;

// Wire payloads and the engine facade
pub mod api;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports
pub use api::Engine;
pub use error::{Error, Result};
pub use geometry::{PageSize, Point, Rect};
pub use identity::{CertificateInfo, SignatureIdentity, SignerProfile};
pub use mapping::{GridAnchor, ViewerDims};
pub use store::{ApplyIntent, Placement, PlacementPosition};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
