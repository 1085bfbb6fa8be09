//! spawngrid-state — session store for spawngrid.
//!
//! Backed by [redb](https://docs.rs/redb), keeps one `SessionRecord` per
//! `{tenant}/{session}` so a restarted process can reload the workload
//! identity and keep polling or stop the workload.
//!
//! Records are JSON-serialized into redb's `&[u8]` value column. The
//! `SessionStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::SessionStore;
pub use types::*;
