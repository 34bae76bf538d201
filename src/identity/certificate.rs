//! Signer certificate issuance and inspection.
//!
//! Every signature identity gets its own RSA keypair and a self-signed
//! X.509 certificate whose subject and issuer both carry the signer's
//! attributes. There is no external CA and no timestamping authority; the
//! certificate binds a display identity to a keypair, nothing stronger.

use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, SanType,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ::time::{Duration, OffsetDateTime};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

use super::keyvault::{self, EncryptedPrivateKey};
use crate::error::{Error, Result};

/// RSA modulus size for signer keys.
const RSA_BITS: usize = 2048;
/// Certificate validity window.
const VALIDITY_DAYS: i64 = 365;

/// Subject attributes for a new signer certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityAttrs {
    /// Common name (the signer's full name)
    pub common_name: String,
    /// Organization (company)
    pub organization: String,
    /// Locality (city / location string)
    pub locality: String,
    /// Contact email, embedded as an rfc822 subject alternative name
    pub email: String,
}

/// The output of issuing a signer identity.
#[derive(Clone)]
pub struct IssuedCredentials {
    /// PEM-encoded self-signed certificate
    pub certificate_pem: String,
    /// Encrypted PKCS#8 private key
    pub encrypted_key: EncryptedPrivateKey,
    /// Passphrase the key was sealed under
    pub passphrase: String,
}

impl std::fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("certificate_pem", &format!("{} bytes", self.certificate_pem.len()))
            .field("encrypted_key", &self.encrypted_key)
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

/// Certificate metadata extracted for display and the JSON API arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    /// Full subject distinguished name
    pub subject: String,
    /// Full issuer distinguished name (equals subject for self-signed)
    pub issuer: String,
    /// Subject common name, when present
    pub common_name: Option<String>,
    /// Subject organization, when present
    pub organization: Option<String>,
    /// Subject locality, when present
    pub locality: Option<String>,
    /// Serial number as colon-separated hex
    pub serial_number: String,
    /// Start of the validity window
    pub valid_from: DateTime<Utc>,
    /// End of the validity window
    pub valid_to: DateTime<Utc>,
    /// SHA-256 fingerprint of the DER encoding, colon-separated hex
    pub fingerprint: String,
    /// Whether the certificate is currently within its validity window
    pub is_valid: bool,
}

fn cert_err(context: &str, err: impl std::fmt::Display) -> Error {
    Error::Certificate(format!("{context}: {err}"))
}

/// Generate a keypair and self-signed certificate for a signer identity.
///
/// The subject and issuer are both set to `attrs`; the certificate is
/// signed with its own key (SHA-256 with RSA), valid from now for one
/// year, and marked for digital signing plus client/server auth and email
/// protection. The private key comes back sealed, never in cleartext.
pub fn issue(attrs: &IdentityAttrs) -> Result<IssuedCredentials> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, RSA_BITS)
        .map_err(|e| cert_err("keypair generation failed", e))?;
    let key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| cert_err("PKCS#8 export failed", e))?;

    let key_pair = KeyPair::from_pkcs8_pem_and_sign_algo(&key_pem, &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| cert_err("signing key rejected", e))?;

    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| cert_err("certificate params rejected", e))?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, &attrs.common_name);
    dn.push(DnType::OrganizationName, &attrs.organization);
    dn.push(DnType::LocalityName, &attrs.locality);
    params.distinguished_name = dn;

    params.subject_alt_names.push(SanType::Rfc822Name(
        attrs
            .email
            .clone()
            .try_into()
            .map_err(|e| cert_err("invalid email", e))?,
    ));

    let not_before = OffsetDateTime::now_utc();
    params.not_before = not_before;
    params.not_after = not_before + Duration::days(VALIDITY_DAYS);

    let mut serial = [0u8; 16];
    rng.fill_bytes(&mut serial);
    params.serial_number = Some(serial.to_vec().into());

    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::ContentCommitment,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::EmailProtection,
    ];

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| cert_err("self-signing failed", e))?;

    let passphrase = keyvault::generate_passphrase();
    let encrypted_key = keyvault::encrypt(key_pem.as_bytes(), &passphrase)?;

    Ok(IssuedCredentials {
        certificate_pem: cert.pem(),
        encrypted_key,
        passphrase,
    })
}

/// Check that a certificate is currently usable.
///
/// True iff the current time is inside the validity window and the
/// required fields (serial number, parseable public key) are present.
/// Malformed PEM is an error, not `false`.
pub fn validate(certificate_pem: &str) -> Result<bool> {
    let (_, pem) = parse_x509_pem(certificate_pem.as_bytes())
        .map_err(|e| cert_err("malformed PEM", e))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| cert_err("malformed certificate", e))?;

    Ok(cert.validity().is_valid()
        && !cert.raw_serial().is_empty()
        && cert.public_key().parsed().is_ok())
}

/// Extract display metadata from a certificate.
pub fn describe(certificate_pem: &str) -> Result<CertificateInfo> {
    let (_, pem) = parse_x509_pem(certificate_pem.as_bytes())
        .map_err(|e| cert_err("malformed PEM", e))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| cert_err("malformed certificate", e))?;

    let subject = cert.subject();
    let common_name = first_attr(subject.iter_common_name());
    let organization = first_attr(subject.iter_organization());
    let locality = first_attr(subject.iter_locality());

    Ok(CertificateInfo {
        subject: subject.to_string(),
        issuer: cert.issuer().to_string(),
        common_name,
        organization,
        locality,
        serial_number: cert.raw_serial_as_string(),
        valid_from: asn1_to_utc(&cert.validity().not_before)?,
        valid_to: asn1_to_utc(&cert.validity().not_after)?,
        fingerprint: fingerprint_hex(&pem.contents),
        is_valid: cert.validity().is_valid(),
    })
}

fn first_attr<'a>(
    mut iter: impl Iterator<Item = &'a x509_parser::x509::AttributeTypeAndValue<'a>>,
) -> Option<String> {
    iter.next()
        .and_then(|attr| attr.as_str().ok())
        .map(|s| s.to_string())
}

fn asn1_to_utc(t: &ASN1Time) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(t.timestamp(), 0)
        .single()
        .ok_or_else(|| Error::Certificate("validity timestamp out of range".to_string()))
}

fn fingerprint_hex(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}
