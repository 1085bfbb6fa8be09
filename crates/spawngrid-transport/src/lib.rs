//! spawngrid-transport — HTTP plumbing shared by the scheduler and
//! registry clients.
//!
//! # Architecture
//!
//! ```text
//! ApiClient (Clone, one per backend)
//!   ├── hyper-util pooled Client
//!   │   └── hyper-rustls HttpsConnector (http or https)
//!   │       └── rustls ClientConfig built from TlsSettings
//!   ├── token header (X-Nomad-Token / X-Consul-Token)
//!   └── namespace query parameter on every call
//! ```
//!
//! Any non-2xx response or transport failure surfaces as a `RemoteError`.

pub mod client;
pub mod error;
pub mod tls;

#[cfg(any(test, feature = "stub-server"))]
pub mod stub;

pub use client::{ApiClient, ApiResponse};
pub use error::{RemoteError, RemoteResult};
