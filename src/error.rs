//! Error types for the signature engine.
//!
//! One crate-wide taxonomy: validation, lookup, authorization, PDF
//! processing and archive construction failures, plus the identity stack
//! (certificate and key-protection) errors.

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the signature engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed caller input; carries the offending field.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Name of the rejected request field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// A referenced document, signature or placement does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("document", "signature", "placement")
        kind: &'static str,
        /// The id that failed to resolve
        id: String,
    },

    /// Missing or incorrect access password for a protected signature.
    ///
    /// Distinct from [`Error::NotFound`] so callers can prompt for a
    /// password instead of treating the signature as absent.
    #[error("access password missing or incorrect")]
    Authorization,

    /// PDF parse or mutation failure fatal to the current operation.
    #[error("PDF processing failed: {0}")]
    Processing(String),

    /// Artwork decode or embed failure.
    ///
    /// Recovered locally by the stamper (text fallback); surfaced only
    /// when the caller asked for image handling directly.
    #[error("image error: {0}")]
    Image(String),

    /// Certificate generation or parsing failure.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Private-key encryption or decryption failure.
    #[error("key protection error: {0}")]
    KeyProtection(String),

    /// Failure constructing or writing the export archive.
    #[error("archive error: {0}")]
    Archive(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a field-level validation error.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for a missing-entity error.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::Processing(err.to_string())
    }
}
