//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors collected)
//!     → ShieldConfig (validated, immutable)
//!     → shared via Arc to the pipeline builder and the signing service
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new pipeline built and swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - Every field has a default, an empty file is a valid config
//! - A reload that fails validation keeps the running config

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AccountConfig, CheckKind, CompressConfig, CorsConfig, CsrfConfig, DetectorConfig,
    EscapeConfig, HashAlgorithm, HeaderConfig, HeaderOptions, InputSizeLimitConfig,
    InputValidationConfig, IpConfig, ListenerConfig, MethodConfig, ObservabilityConfig,
    OriginConfig, PatternTier, PipelineConfig, RequestLimitConfig, ShieldConfig,
    SignatureConfig, TransformKind, UrlConfig, UserDataConfig,
};
pub use validation::ValidationError;
