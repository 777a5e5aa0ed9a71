/// RSA key material for RS256 signing and verification
///
/// A `KeyMaterial` is built once at startup and shared read-only (`Arc<KeyMaterial>`)
/// between the token authority, verifiers and the public-key endpoint.
///
/// ## Key sources
///
/// - Signing processes load a private key (PKCS#8 or PKCS#1 PEM). The public half
///   is derived from it unless provided explicitly.
/// - Verify-only processes load just the public key PEM.
///
/// The private half never leaves this crate: there is no accessor for it and the
/// `Debug` implementation redacts it.
use std::fmt;
use std::path::Path;

use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum KeyError {
    /// Key material is missing or unparseable. Fatal at startup.
    #[error("key material unavailable: {0}")]
    KeyMaterialUnavailable(String),

    /// The key material only holds the public half
    #[error("key material has no private key; cannot sign")]
    SigningKeyMissing,
}

// ============================================================================
// Key Sources
// ============================================================================

/// Where a PEM is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// PEM text held inline (typically from an environment variable)
    Inline(String),
    /// Path to a PEM file on disk
    File(String),
}

impl KeySource {
    /// Resolve a PEM from a pair of environment variables. The inline variable wins
    /// when both are set. Returns `None` when neither is set.
    pub fn from_env(pem_var: &str, path_var: &str) -> Option<Self> {
        if let Ok(pem) = std::env::var(pem_var) {
            if !pem.trim().is_empty() {
                // .env files usually carry PEMs on one line with escaped newlines
                return Some(KeySource::Inline(pem.replace("\\n", "\n")));
            }
        }
        std::env::var(path_var)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(KeySource::File)
    }

    pub fn read(&self) -> Result<String, KeyError> {
        match self {
            KeySource::Inline(pem) => Ok(pem.clone()),
            KeySource::File(path) => std::fs::read_to_string(Path::new(path)).map_err(|e| {
                KeyError::KeyMaterialUnavailable(format!("failed to read {path}: {e}"))
            }),
        }
    }
}

// ============================================================================
// Key Material
// ============================================================================

pub struct KeyMaterial {
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
    public_pem: String,
}

impl KeyMaterial {
    /// Build a signing keypair from explicit private and public PEMs.
    ///
    /// The pair is checked with a test signature so a mismatched public key fails
    /// here rather than on the first verification.
    pub fn from_pem(private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(|e| {
            KeyError::KeyMaterialUnavailable(format!("failed to parse RSA private key: {e}"))
        })?;
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|e| {
            KeyError::KeyMaterialUnavailable(format!("failed to parse RSA public key: {e}"))
        })?;

        check_pair(&encoding, &decoding)?;

        Ok(Self {
            encoding: Some(encoding),
            decoding,
            public_pem: public_pem.trim().to_string() + "\n",
        })
    }

    /// Build a signing keypair from a private PEM alone, deriving the public half.
    pub fn from_private_pem(private_pem: &str) -> Result<Self, KeyError> {
        let private = parse_private_key(private_pem)?;
        let public_pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| {
                KeyError::KeyMaterialUnavailable(format!("failed to encode public key: {e}"))
            })?;
        Self::from_pem(private_pem, &public_pem)
    }

    /// Verify-only key material. Any attempt to sign with it fails with
    /// [`KeyError::SigningKeyMissing`].
    pub fn verify_only(public_pem: &str) -> Result<Self, KeyError> {
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|e| {
            KeyError::KeyMaterialUnavailable(format!("failed to parse RSA public key: {e}"))
        })?;
        Ok(Self {
            encoding: None,
            decoding,
            public_pem: public_pem.trim().to_string() + "\n",
        })
    }

    /// Load from key sources. With a private source the public source is optional.
    pub fn load(private: Option<&KeySource>, public: Option<&KeySource>) -> Result<Self, KeyError> {
        match (private, public) {
            (Some(private), Some(public)) => Self::from_pem(&private.read()?, &public.read()?),
            (Some(private), None) => Self::from_private_pem(&private.read()?),
            (None, Some(public)) => Self::verify_only(&public.read()?),
            (None, None) => Err(KeyError::KeyMaterialUnavailable(
                "no private or public key configured".to_string(),
            )),
        }
    }

    /// Generate a fresh keypair. Used for development when no key is configured.
    pub fn generate(bits: usize) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| KeyError::KeyMaterialUnavailable(format!("key generation failed: {e}")))?;
        let private_pem = private.to_pkcs8_pem(LineEnding::LF).map_err(|e| {
            KeyError::KeyMaterialUnavailable(format!("failed to encode private key: {e}"))
        })?;
        Self::from_private_pem(&private_pem)
    }

    /// Public key in PEM text form, for distribution to verifiers
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    pub fn can_sign(&self) -> bool {
        self.encoding.is_some()
    }

    pub(crate) fn encoding_key(&self) -> Result<&EncodingKey, KeyError> {
        self.encoding.as_ref().ok_or(KeyError::SigningKeyMissing)
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key", &self.encoding.as_ref().map(|_| "[REDACTED]"))
            .field("public_key_pem", &self.public_pem)
            .finish()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, KeyError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| KeyError::KeyMaterialUnavailable(format!("failed to parse RSA private key: {e}")))
}

fn check_pair(encoding: &EncodingKey, decoding: &DecodingKey) -> Result<(), KeyError> {
    const SAMPLE: &[u8] = b"key-material-check";

    let signature = crypto::sign(SAMPLE, encoding, Algorithm::RS256)
        .map_err(|e| KeyError::KeyMaterialUnavailable(format!("test signing failed: {e}")))?;
    let matches = crypto::verify(&signature, SAMPLE, decoding, Algorithm::RS256)
        .map_err(|e| KeyError::KeyMaterialUnavailable(format!("test verification failed: {e}")))?;

    if matches {
        Ok(())
    } else {
        Err(KeyError::KeyMaterialUnavailable(
            "public key does not match private key".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PRIMARY_PRIVATE_PEM, PRIMARY_PUBLIC_PEM, SECONDARY_PUBLIC_PEM};

    #[test]
    fn test_from_pem_accepts_matching_pair() {
        let keys = KeyMaterial::from_pem(PRIMARY_PRIVATE_PEM, PRIMARY_PUBLIC_PEM).unwrap();
        assert!(keys.can_sign());
        assert!(keys.public_key_pem().starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[test]
    fn test_from_pem_rejects_mismatched_pair() {
        let err = KeyMaterial::from_pem(PRIMARY_PRIVATE_PEM, SECONDARY_PUBLIC_PEM).unwrap_err();
        assert!(matches!(err, KeyError::KeyMaterialUnavailable(_)));
    }

    #[test]
    fn test_private_pem_derives_public_half() {
        let keys = KeyMaterial::from_private_pem(PRIMARY_PRIVATE_PEM).unwrap();
        assert_eq!(keys.public_key_pem().trim(), PRIMARY_PUBLIC_PEM.trim());
    }

    #[test]
    fn test_verify_only_cannot_sign() {
        let keys = KeyMaterial::verify_only(PRIMARY_PUBLIC_PEM).unwrap();
        assert!(!keys.can_sign());
        assert!(matches!(keys.encoding_key(), Err(KeyError::SigningKeyMissing)));
    }

    #[test]
    fn test_garbage_pem_is_unavailable() {
        let err = KeyMaterial::verify_only("not a key").unwrap_err();
        assert!(matches!(err, KeyError::KeyMaterialUnavailable(_)));

        let err = KeyMaterial::load(None, None).unwrap_err();
        assert!(matches!(err, KeyError::KeyMaterialUnavailable(_)));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let keys = KeyMaterial::from_private_pem(PRIMARY_PRIVATE_PEM).unwrap();
        let rendered = format!("{keys:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
