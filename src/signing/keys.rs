//! RSA key pair lifecycle.
//!
//! # Responsibilities
//! - Load keys from environment secrets first, then configured files
//! - Check that a supplied public key belongs to the private key
//! - Generate PKCS#8 key pairs, on request only
//!
//! # Design Decisions
//! - A missing key is fatal unless `generate_missing_keys` is set; silently
//!   minting keys would invalidate every stored signature
//! - PEM in PKCS#8 / SPKI is preferred, PKCS#1 is accepted on input

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::SignatureConfig;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to access key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid private key: {0}")]
    PrivateKey(String),

    #[error("invalid public key: {0}")]
    PublicKey(String),

    #[error("public key does not belong to the private key")]
    Mismatch,

    #[error("key file {0} not found and key generation is disabled")]
    NotFound(PathBuf),

    #[error("no signing key configured: set {0} or signature.private_key_path")]
    Missing(String),

    #[error("key generation failed: {0}")]
    Generation(String),
}

/// Where a key pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Files,
    Generated,
}

pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    source: KeySource,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Parse a private key and, if given, a public key that must match it.
    pub fn from_pem(private_pem: &str, public_pem: Option<&str>) -> Result<Self, KeyError> {
        let private_key = parse_private(private_pem)?;
        let derived = RsaPublicKey::from(&private_key);
        if let Some(public_pem) = public_pem {
            if parse_public(public_pem)? != derived {
                return Err(KeyError::Mismatch);
            }
        }
        Ok(Self {
            private_key,
            public_key: derived,
            source: KeySource::Files,
        })
    }

    /// Generate a fresh key pair with a `bits`-bit modulus.
    pub fn generate(bits: usize) -> Result<Self, KeyError> {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        Ok(Self {
            public_key: RsaPublicKey::from(&private_key),
            private_key,
            source: KeySource::Generated,
        })
    }

    /// Resolve the key pair for `config`.
    pub fn load(config: &SignatureConfig) -> Result<Self, KeyError> {
        if let Some(private_pem) = env_value(&config.private_key_env) {
            let public_pem = env_value(&config.public_key_env);
            let mut pair = Self::from_pem(&private_pem, public_pem.as_deref())?;
            pair.source = KeySource::Environment;
            tracing::info!(env = %config.private_key_env, "Signing key loaded from environment");
            return Ok(pair);
        }

        let Some(private_path) = config.private_key_path.as_deref().map(Path::new) else {
            return Err(KeyError::Missing(config.private_key_env.clone()));
        };
        let public_path = config.public_key_path.as_deref().map(Path::new);

        if !private_path.exists() {
            if !config.generate_missing_keys {
                return Err(KeyError::NotFound(private_path.to_path_buf()));
            }
            tracing::warn!(
                path = %private_path.display(),
                bits = config.key_bits,
                "Signing key missing, generating a new key pair"
            );
            let pair = Self::generate(config.key_bits)?;
            pair.write_to(private_path, public_path)?;
            return Ok(pair);
        }

        let private_pem = read(private_path)?;
        let public_pem = match public_path {
            Some(path) if path.exists() => Some(read(path)?),
            _ => None,
        };
        let pair = Self::from_pem(&private_pem, public_pem.as_deref())?;
        tracing::info!(path = %private_path.display(), "Signing key loaded from file");
        Ok(pair)
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn private_key_pem(&self) -> Result<String, KeyError> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.as_str().to_owned())
            .map_err(|e| KeyError::PrivateKey(e.to_string()))
    }

    pub fn public_key_pem(&self) -> Result<String, KeyError> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::PublicKey(e.to_string()))
    }

    /// Persist the pair. The private key file is owner-readable only.
    pub fn write_to(&self, private_path: &Path, public_path: Option<&Path>) -> Result<(), KeyError> {
        write(private_path, &self.private_key_pem()?)?;
        restrict_permissions(private_path)?;
        if let Some(public_path) = public_path {
            write(public_path, &self.public_key_pem()?)?;
        }
        Ok(())
    }
}

/// Generate a key pair of `bits` bits.
pub fn generate_key_pair(bits: usize) -> Result<KeyPair, KeyError> {
    KeyPair::generate(bits)
}

fn env_value(name: &str) -> Option<String> {
    if name.trim().is_empty() {
        return None;
    }
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_private(pem: &str) -> Result<RsaPrivateKey, KeyError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|e| RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| e))
        .map_err(|e| KeyError::PrivateKey(e.to_string()))
}

fn parse_public(pem: &str) -> Result<RsaPublicKey, KeyError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|e| RsaPublicKey::from_pkcs1_pem(pem).map_err(|_| e))
        .map_err(|e| KeyError::PublicKey(e.to_string()))
}

fn read(path: &Path) -> Result<String, KeyError> {
    fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, contents: &str) -> Result<(), KeyError> {
    let io = |source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io)?;
    }
    fs::write(path, contents).map_err(io)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), KeyError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE: &str = include_str!("../../tests/fixtures/signing_private.pem");
    const PUBLIC: &str = include_str!("../../tests/fixtures/signing_public.pem");
    const OTHER_PUBLIC: &str = include_str!("../../tests/fixtures/other_public.pem");

    fn file_config(dir: &Path) -> SignatureConfig {
        SignatureConfig {
            private_key_env: "REQUEST_SHIELD_TEST_UNSET_PRIVATE".to_string(),
            public_key_env: "REQUEST_SHIELD_TEST_UNSET_PUBLIC".to_string(),
            private_key_path: Some(dir.join("private.pem").display().to_string()),
            public_key_path: Some(dir.join("public.pem").display().to_string()),
            ..SignatureConfig::default()
        }
    }

    #[test]
    fn test_from_pem_checks_pairing() {
        assert!(KeyPair::from_pem(PRIVATE, Some(PUBLIC)).is_ok());
        assert!(KeyPair::from_pem(PRIVATE, None).is_ok());
        assert!(matches!(
            KeyPair::from_pem(PRIVATE, Some(OTHER_PUBLIC)),
            Err(KeyError::Mismatch)
        ));
        assert!(matches!(
            KeyPair::from_pem("garbage", None),
            Err(KeyError::PrivateKey(_))
        ));
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("private.pem"), PRIVATE).unwrap();
        fs::write(dir.path().join("public.pem"), PUBLIC).unwrap();

        let pair = KeyPair::load(&file_config(dir.path())).unwrap();
        assert_eq!(pair.source(), KeySource::Files);
        assert_eq!(pair.public_key(), &parse_public(PUBLIC).unwrap());
    }

    #[test]
    fn test_missing_file_without_generation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = KeyPair::load(&file_config(dir.path())).unwrap_err();
        assert!(matches!(err, KeyError::NotFound(_)));
    }

    #[test]
    fn test_no_source_fails() {
        let config = SignatureConfig {
            private_key_env: "REQUEST_SHIELD_TEST_UNSET_PRIVATE".to_string(),
            ..SignatureConfig::default()
        };
        assert!(matches!(KeyPair::load(&config), Err(KeyError::Missing(_))));
    }

    #[test]
    fn test_generation_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = SignatureConfig {
            generate_missing_keys: true,
            key_bits: 1024,
            ..file_config(dir.path())
        };
        let generated = KeyPair::load(&config).unwrap();
        assert_eq!(generated.source(), KeySource::Generated);

        let reloaded = KeyPair::load(&config).unwrap();
        assert_eq!(reloaded.public_key(), generated.public_key());
    }
}
