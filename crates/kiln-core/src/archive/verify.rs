//! Signature verification. Failures are data, never errors.

use super::reader::Archive;
use super::signature::{key_id, SignatureBlock};
use crate::error::ErrorKind;
use ed25519_dalek::VerifyingKey;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub signed: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Recorded content digest, hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Why the signature is invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Failure class: `MalformedArchive` when the signature region does not
    /// parse, `SignatureMismatch` when it parses but does not verify.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// Whether the signing key matches the expected key; `None` when no key
    /// was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted: Option<bool>,
}

impl VerificationResult {
    fn unsigned() -> Self {
        Self {
            signed: false,
            valid: true,
            algorithm: None,
            key_id: None,
            digest: None,
            reason: None,
            kind: None,
            trusted: None,
        }
    }

    fn invalid(kind: ErrorKind, reason: String) -> Self {
        Self {
            signed: true,
            valid: false,
            reason: Some(reason),
            kind: Some(kind),
            ..Self::unsigned()
        }
    }
}

pub fn verify(archive: &Archive) -> VerificationResult {
    if !archive.has_signature_region() {
        return VerificationResult::unsigned();
    }

    let block = match SignatureBlock::parse(archive.signature_region()) {
        Ok(block) => block,
        Err(reason) => return VerificationResult::invalid(ErrorKind::MalformedArchive, reason),
    };

    let mut result = VerificationResult {
        algorithm: Some(block.algorithm.as_str().to_string()),
        digest: Some(block.digest_hex()),
        ..VerificationResult::invalid(ErrorKind::SignatureMismatch, String::new())
    };
    match block.verify(archive.signed_content()) {
        Ok(key) => {
            result.valid = true;
            result.reason = None;
            result.kind = None;
            result.key_id = key_id(&key).ok();
        }
        Err(reason) => {
            result.key_id = block.public_key().ok().and_then(|k| key_id(&k).ok());
            result.reason = Some(reason);
        }
    }
    tracing::debug!(valid = result.valid, reason = ?result.reason, "signature checked");
    result
}

/// Like [`verify`], additionally checking the signer against `trusted`.
pub fn verify_with_key(archive: &Archive, trusted: &VerifyingKey) -> VerificationResult {
    let mut result = verify(archive);
    if !result.signed {
        result.trusted = Some(false);
        return result;
    }
    let expected = key_id(trusted).ok();
    result.trusted = Some(result.valid && expected.is_some() && result.key_id == expected);
    result
}
