//! Record signing.
//!
//! # Data Flow
//! ```text
//! row ──► signable_fields(table) ──► canonical JSON ──► SHA-256/512
//!                                                          │
//!                       base64 ◄── RSA PKCS#1 v1.5 sign ◄──┘
//! ```
//!
//! # Design Decisions
//! - The canonical payload follows the configured field order, not the
//!   row's column order, so the same row always hashes the same way
//! - A missing, empty or undecodable signature verifies as `false`

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::Pkcs1v15Sign;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;

use crate::config::{HashAlgorithm, SignatureConfig};
use crate::signing::keys::{KeyError, KeyPair};
use crate::signing::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("table `{0}` is not allowed for signing")]
    TableNotAllowed(String),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("RSA operation failed: {0}")]
    Sign(#[from] rsa::Error),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub struct RecordSigner {
    keys: KeyPair,
    hash: HashAlgorithm,
    primary_key: String,
    signature_column: String,
    allowed_tables: Vec<String>,
    fields: BTreeMap<String, Vec<String>>,
}

impl RecordSigner {
    pub fn new(keys: KeyPair, config: &SignatureConfig) -> Self {
        Self {
            keys,
            hash: config.hash,
            primary_key: config.primary_key.clone(),
            signature_column: config.signature_column.clone(),
            allowed_tables: config.allowed_tables.clone(),
            fields: config.signature_fields.clone(),
        }
    }

    /// Load the key pair described by `config` and build a signer.
    pub fn from_config(config: &SignatureConfig) -> Result<Self, SignatureError> {
        Ok(Self::new(KeyPair::load(config)?, config))
    }

    pub fn is_allowed(&self, table: &str) -> bool {
        self.allowed_tables.iter().any(|t| t == table)
    }

    pub fn signature_column(&self) -> &str {
        &self.signature_column
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Columns covered by a signature, in canonical order.
    pub fn signable_fields(&self, table: &str) -> Vec<&str> {
        let configured = self.fields.get(table).map(Vec::as_slice).unwrap_or_default();
        let mut fields: Vec<&str> = Vec::with_capacity(configured.len() + 1);
        for field in std::iter::once(&self.primary_key).chain(configured) {
            if *field != self.signature_column && !fields.contains(&field.as_str()) {
                fields.push(field);
            }
        }
        fields
    }

    /// Canonical JSON of the signable part of `record`.
    pub fn canonical_payload(&self, table: &str, record: &Map<String, Value>) -> Result<String, SignatureError> {
        let mut out = String::from("{");
        for (i, field) in self.signable_fields(table).into_iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&serde_json::to_string(field)?);
            out.push(':');
            out.push_str(&serde_json::to_string(record.get(field).unwrap_or(&Value::Null))?);
        }
        out.push('}');
        Ok(out)
    }

    /// Base64 signature over the canonical payload.
    pub fn sign(&self, table: &str, record: &Value) -> Result<String, SignatureError> {
        let record = self.record(table, record)?;
        let digest = self.digest(&self.canonical_payload(table, record)?);
        let signature = self.keys.private_key().sign(self.scheme(), &digest)?;
        Ok(STANDARD.encode(signature))
    }

    /// Whether `signature` matches `record`.
    pub fn verify(&self, table: &str, record: &Value, signature: &str) -> Result<bool, SignatureError> {
        let record = self.record(table, record)?;
        let signature = signature.trim();
        if signature.is_empty() {
            return Ok(false);
        }
        let Ok(raw) = STANDARD.decode(signature) else {
            return Ok(false);
        };
        let digest = self.digest(&self.canonical_payload(table, record)?);
        Ok(self.keys.public_key().verify(self.scheme(), &digest, &raw).is_ok())
    }

    /// Verify a row against the signature stored in its own signature column.
    pub fn verify_record(&self, table: &str, record: &Value) -> Result<bool, SignatureError> {
        let signature = record
            .get(&self.signature_column)
            .and_then(Value::as_str)
            .unwrap_or_default();
        self.verify(table, record, signature)
    }

    fn record<'a>(&self, table: &str, record: &'a Value) -> Result<&'a Map<String, Value>, SignatureError> {
        if !self.is_allowed(table) {
            return Err(SignatureError::TableNotAllowed(table.to_string()));
        }
        record.as_object().ok_or(SignatureError::NotAnObject)
    }

    fn digest(&self, payload: &str) -> Vec<u8> {
        match self.hash {
            HashAlgorithm::Sha256 => Sha256::digest(payload.as_bytes()).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(payload.as_bytes()).to_vec(),
        }
    }

    fn scheme(&self) -> Pkcs1v15Sign {
        match self.hash {
            HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
            HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        }
    }
}
