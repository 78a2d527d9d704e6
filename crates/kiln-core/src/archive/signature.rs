//! Signature region (Ed25519 over a DSSE-style PAE of the content digest).
//!
//! ```text
//! [algorithm payload][sha256 digest: 32][algorithm tag: u32 LE][payload length: u32 LE]["KSIG"]
//! ```
//!
//! For Ed25519 (tag 1) the algorithm payload is the 32-byte public key
//! followed by the 64-byte signature. The digest covers every byte of the
//! archive before the region.

use crate::error::ConfigError;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

pub const SIGNATURE_MAGIC: &[u8; 4] = b"KSIG";

/// Payload type bound into the PAE.
pub const PAYLOAD_TYPE: &str = "application/vnd.kiln.archive-digest.v1";

const DIGEST_LEN: usize = 32;
const FOOTER_LEN: usize = DIGEST_LEN + 4 + 4 + SIGNATURE_MAGIC.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Ed25519,
}

impl SignatureAlgorithm {
    pub const ALL: [SignatureAlgorithm; 1] = [Self::Ed25519];

    pub fn tag(&self) -> u32 {
        match self {
            Self::Ed25519 => 1,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Ed25519),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
        }
    }
}

/// Parsed or freshly created signature region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlock {
    pub algorithm: SignatureAlgorithm,
    pub payload: Vec<u8>,
    pub digest: [u8; DIGEST_LEN],
}

impl SignatureBlock {
    /// Sign `content` (all archive bytes before the region).
    pub fn sign(content: &[u8], key: &SigningKey) -> Self {
        let digest: [u8; DIGEST_LEN] = Sha256::digest(content).into();
        let signature = key.sign(&build_pae(PAYLOAD_TYPE, &digest));

        let mut payload = Vec::with_capacity(96);
        payload.extend_from_slice(key.verifying_key().as_bytes());
        payload.extend_from_slice(&signature.to_bytes());

        Self {
            algorithm: SignatureAlgorithm::Ed25519,
            payload,
            digest,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + FOOTER_LEN);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.digest);
        out.extend_from_slice(&self.algorithm.tag().to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(SIGNATURE_MAGIC);
        out
    }

    /// Parse a complete signature region. The error is a human-readable
    /// reason.
    pub fn parse(region: &[u8]) -> Result<Self, String> {
        if region.len() < FOOTER_LEN {
            return Err(format!("signature region too short ({} bytes)", region.len()));
        }
        let (body, magic) = region.split_at(region.len() - SIGNATURE_MAGIC.len());
        if magic != SIGNATURE_MAGIC {
            return Err("signature magic not found".to_string());
        }
        let (body, len_bytes) = body.split_at(body.len() - 4);
        let (body, tag_bytes) = body.split_at(body.len() - 4);
        let (payload, digest) = body.split_at(body.len() - DIGEST_LEN);

        let payload_len = u32::from_le_bytes(le_word(len_bytes)) as usize;
        if payload_len != payload.len() {
            return Err(format!(
                "signature region length mismatch: declared {payload_len}, found {}",
                payload.len()
            ));
        }
        let tag = u32::from_le_bytes(le_word(tag_bytes));
        let algorithm = SignatureAlgorithm::from_tag(tag)
            .ok_or_else(|| format!("unknown signature algorithm tag {tag}"))?;

        let mut fixed = [0u8; DIGEST_LEN];
        fixed.copy_from_slice(digest);
        Ok(Self {
            algorithm,
            payload: payload.to_vec(),
            digest: fixed,
        })
    }

    /// Total region size implied by the footer at the end of `bytes`.
    pub fn region_len(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < FOOTER_LEN || !bytes.ends_with(SIGNATURE_MAGIC) {
            return None;
        }
        let at = bytes.len() - SIGNATURE_MAGIC.len() - 4;
        let payload_len = u32::from_le_bytes(le_word(&bytes[at..at + 4])) as usize;
        payload_len.checked_add(FOOTER_LEN)
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn public_key(&self) -> Result<VerifyingKey, String> {
        match self.algorithm {
            SignatureAlgorithm::Ed25519 => {
                if self.payload.len() != 96 {
                    return Err(format!(
                        "ed25519 payload must be 96 bytes, found {}",
                        self.payload.len()
                    ));
                }
                let mut key = [0u8; 32];
                key.copy_from_slice(&self.payload[..32]);
                VerifyingKey::from_bytes(&key).map_err(|e| format!("invalid public key: {e}"))
            }
        }
    }

    /// Check the digest against `content` and the signature against the
    /// embedded key.
    pub fn verify(&self, content: &[u8]) -> Result<VerifyingKey, String> {
        let computed: [u8; DIGEST_LEN] = Sha256::digest(content).into();
        if computed != self.digest {
            return Err(format!(
                "content digest mismatch: computed {}, recorded {}",
                hex::encode(computed),
                self.digest_hex()
            ));
        }
        let key = self.public_key()?;
        let signature = Signature::from_slice(&self.payload[32..])
            .map_err(|e| format!("invalid signature encoding: {e}"))?;
        key.verify_strict(&build_pae(PAYLOAD_TYPE, &self.digest), &signature)
            .map_err(|_| "signature verification failed".to_string())?;
        Ok(key)
    }
}

fn le_word(bytes: &[u8]) -> [u8; 4] {
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    word
}

/// DSSE pre-authentication encoding:
/// `"DSSEv1" SP LEN(type) SP type SP LEN(payload) SP payload`.
fn build_pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut pae = Vec::with_capacity(payload_type.len() + payload.len() + 16);
    pae.extend_from_slice(b"DSSEv1 ");
    pae.extend_from_slice(payload_type.len().to_string().as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_type.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload.len().to_string().as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload);
    pae
}

/// `sha256:<hex>` of SPKI-encoded public key bytes.
pub fn compute_key_id(spki_bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(spki_bytes)))
}

pub fn key_id(key: &VerifyingKey) -> Result<String, String> {
    use ed25519_dalek::pkcs8::EncodePublicKey;
    let doc = key
        .to_public_key_der()
        .map_err(|e| format!("failed to encode public key as SPKI DER: {e}"))?;
    Ok(compute_key_id(doc.as_bytes()))
}

pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut rand::thread_rng())
}

/// Load a private key from a PKCS#8 PEM file.
pub fn load_signing_key_pem(path: &Path) -> Result<SigningKey, ConfigError> {
    use pkcs8::DecodePrivateKey;

    let pem = fs::read_to_string(path).map_err(|e| key_error(path, format!("cannot read: {e}")))?;
    SigningKey::from_pkcs8_pem(&pem).map_err(|e| key_error(path, format!("not a PKCS#8 ed25519 key: {e}")))
}

/// Load a public key from an SPKI PEM file.
pub fn load_verifying_key_pem(path: &Path) -> Result<VerifyingKey, ConfigError> {
    use pkcs8::DecodePublicKey;

    let pem = fs::read_to_string(path).map_err(|e| key_error(path, format!("cannot read: {e}")))?;
    VerifyingKey::from_public_key_pem(&pem)
        .map_err(|e| key_error(path, format!("not an SPKI ed25519 key: {e}")))
}

fn key_error(path: &Path, message: String) -> ConfigError {
    ConfigError::Key {
        path: path.display().to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    #[test]
    fn sign_then_verify() {
        let content = b"stub and payload";
        let block = SignatureBlock::sign(content, &key());
        let parsed = SignatureBlock::parse(&block.to_bytes()).unwrap();
        assert_eq!(parsed, block);
        let embedded = parsed.verify(content).unwrap();
        assert_eq!(embedded, key().verifying_key());
    }

    #[test]
    fn tampered_content_fails() {
        let block = SignatureBlock::sign(b"original", &key());
        let err = block.verify(b"originaL").unwrap_err();
        assert!(err.contains("digest mismatch"), "{err}");
    }

    #[test]
    fn every_flipped_region_byte_is_detected() {
        let content = b"content";
        let region = SignatureBlock::sign(content, &key()).to_bytes();
        for i in 0..region.len() {
            let mut flipped = region.clone();
            flipped[i] ^= 0x01;
            let outcome = SignatureBlock::parse(&flipped).and_then(|b| b.verify(content).map(|_| ()));
            assert!(outcome.is_err(), "flip at {i} went unnoticed");
        }
    }

    #[test]
    fn region_len_reads_footer() {
        let region = SignatureBlock::sign(b"x", &key()).to_bytes();
        assert_eq!(region.len(), 96 + FOOTER_LEN);
        let mut archive = b"prefix".to_vec();
        archive.extend_from_slice(&region);
        assert_eq!(SignatureBlock::region_len(&archive), Some(region.len()));
        assert_eq!(SignatureBlock::region_len(b"no footer"), None);
    }

    #[test]
    fn unknown_algorithm_tag_is_reported() {
        let mut region = SignatureBlock::sign(b"x", &key()).to_bytes();
        let tag_at = region.len() - 12;
        region[tag_at..tag_at + 4].copy_from_slice(&9u32.to_le_bytes());
        let err = SignatureBlock::parse(&region).unwrap_err();
        assert_eq!(err, "unknown signature algorithm tag 9");
    }

    #[test]
    fn key_id_format() {
        let id = key_id(&key().verifying_key()).unwrap();
        assert!(id.starts_with("sha256:"));
        assert_eq!(id.len(), "sha256:".len() + 64);
    }

    #[test]
    fn pae_layout() {
        assert_eq!(build_pae("t", b"ab"), b"DSSEv1 1 t 2 ab".to_vec());
    }
}
