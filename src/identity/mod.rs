//! Signature identities: signer profile, credentials and access control.
//!
//! A [`SignatureIdentity`] is created once per "create signature" action
//! and never mutated afterwards except by deletion, which cascades to all
//! placements referencing it. The certificate subject mirrors the profile
//! at creation time; there is no later regeneration.

pub mod certificate;
pub mod keyvault;

use chrono::{DateTime, FixedOffset, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{Error, Result};

pub use certificate::{CertificateInfo, IdentityAttrs, IssuedCredentials};
pub use keyvault::EncryptedPrivateKey;

/// Largest representable timezone offset, in minutes (UTC±14:00).
const MAX_TZ_OFFSET_MINUTES: i32 = 14 * 60;

/// Display attributes of the person behind a signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerProfile {
    /// Full legal name
    pub full_name: String,
    /// Company name
    pub company: String,
    /// Location string (city, country)
    pub location: String,
    /// Signer-local timezone as a fixed offset from UTC, in minutes
    pub utc_offset_minutes: i32,
}

impl SignerProfile {
    /// The signer's timezone as a chrono offset.
    ///
    /// Out-of-range offsets are clamped to UTC±14:00.
    pub fn utc_offset(&self) -> FixedOffset {
        let clamped = self
            .utc_offset_minutes
            .clamp(-MAX_TZ_OFFSET_MINUTES, MAX_TZ_OFFSET_MINUTES);
        FixedOffset::east_opt(clamped * 60).expect("clamped offset is in range")
    }

    /// Localize a UTC instant to the signer's timezone.
    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.utc_offset())
    }
}

/// A salted password hash gating mutation of a protected signature.
///
/// Only the PBKDF2-HMAC-SHA256 hash is stored; verification derives the
/// candidate under the stored salt and compares in constant time.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessSecret {
    salt: Vec<u8>,
    hash: Vec<u8>,
    iterations: u32,
}

impl AccessSecret {
    const HASH_LEN: usize = 32;
    const SALT_LEN: usize = 16;

    /// Derive a new secret from a caller-supplied password.
    pub fn derive(password: &str) -> Self {
        let mut salt = vec![0u8; Self::SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let iterations = keyvault::KDF_ITERATIONS;
        let hash = Self::hash_with(password, &salt, iterations);
        Self {
            salt,
            hash,
            iterations,
        }
    }

    fn hash_with(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut hash = vec![0u8; Self::HASH_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut hash);
        hash
    }

    /// Check a candidate password against the stored hash.
    pub fn verify(&self, candidate: &str) -> bool {
        let derived = Self::hash_with(candidate, &self.salt, self.iterations);
        derived.ct_eq(&self.hash).into()
    }
}

impl std::fmt::Debug for AccessSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessSecret").field("hash", &"[REDACTED]").finish()
    }
}

/// A signature identity: who signs, with what credentials, guarded how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureIdentity {
    /// Identity id
    pub id: Uuid,
    /// Owning user
    pub owner_id: Uuid,
    /// Name shown in signature pickers
    pub display_name: String,
    /// Signer display attributes stamped onto pages
    pub profile: SignerProfile,
    /// Self-signed certificate, PEM
    pub certificate_pem: String,
    /// Sealed private key
    pub encrypted_key: EncryptedPrivateKey,
    /// Passphrase the key is sealed under (co-located by design)
    pub key_passphrase: String,
    /// Optional raster artwork drawn instead of the text block
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork: Option<Vec<u8>>,
    /// Optional access password gate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_secret: Option<AccessSecret>,
    /// Creation instant
    pub created_at: DateTime<Utc>,
}

impl SignatureIdentity {
    /// Issue credentials and assemble a new identity.
    pub fn create(
        owner_id: Uuid,
        display_name: impl Into<String>,
        profile: SignerProfile,
        email: impl Into<String>,
        artwork: Option<Vec<u8>>,
        access_password: Option<&str>,
    ) -> Result<Self> {
        let attrs = IdentityAttrs {
            common_name: profile.full_name.clone(),
            organization: profile.company.clone(),
            locality: profile.location.clone(),
            email: email.into(),
        };
        let credentials = certificate::issue(&attrs)?;

        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            display_name: display_name.into(),
            profile,
            certificate_pem: credentials.certificate_pem,
            encrypted_key: credentials.encrypted_key,
            key_passphrase: credentials.passphrase,
            artwork,
            access_secret: access_password.filter(|p| !p.is_empty()).map(AccessSecret::derive),
            created_at: Utc::now(),
        })
    }

    /// Enforce the access password gate for a mutation on this identity.
    ///
    /// Unprotected identities accept any (or no) password. Protected
    /// identities require the matching one.
    pub fn authorize(&self, supplied: Option<&str>) -> Result<()> {
        match &self.access_secret {
            None => Ok(()),
            Some(secret) => match supplied {
                Some(candidate) if secret.verify(candidate) => Ok(()),
                _ => Err(Error::Authorization),
            },
        }
    }
}
