//! Record signing subsystem.
//!
//! # Data Flow
//! ```text
//! keys.rs     PEM from env or files → KeyPair
//! signer.rs   KeyPair + field lists → RecordSigner (sign / verify)
//! store.rs    RowStore trait, MemoryRowStore
//! service.rs  RecordSigner + RowStore → batch and single-row operations
//! ```
//!
//! # Design Decisions
//! - Runs out of band: nothing on the request path signs or verifies
//! - Signing keys never leave `KeyPair`; only the public half is exposed

pub mod keys;
pub mod service;
pub mod signer;
pub mod store;

pub use keys::{generate_key_pair, KeyError, KeyPair, KeySource};
pub use service::{CheckReport, SignatureService, UpdateOptions, UpdateReport};
pub use signer::{RecordSigner, SignatureError};
pub use store::{MemoryRowStore, Row, RowFilter, RowStore, StoreError};
