//! HTTP host adapter.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, timeout and trace layers)
//!     → middleware.rs (buffer body, run the security pipeline)
//!         → request.rs (request ID, RequestContext, body parsing)
//!     → handler (only when every check passed)
//!     → response.rs (uniform errors, buffered bodies for transforms)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer, Policy};
