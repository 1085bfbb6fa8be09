//! Deterministic naming for workload resources.
//!
//! Every name a workload uses is derived from the workload ID, which is
//! itself a truncated SHA-256 of the tenant/session key. Deriving twice
//! from the same key yields the same names, so a repeated `start` after a
//! partial failure addresses the same volume and job.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the session-key digest.
pub const WORKLOAD_ID_LEN: usize = 10;

/// Derive the workload ID for a `tenant:session` key.
pub fn derive_workload_id(session_key: &str) -> String {
    let digest = hex::encode(Sha256::digest(session_key.as_bytes()));
    digest[..WORKLOAD_ID_LEN].to_string()
}

/// CSI volume ID for a workload.
pub fn volume_id_for(workload_id: &str) -> String {
    format!("notebook-{workload_id}")
}

/// Job ID (and name) for a workload.
pub fn job_id_for(workload_id: &str) -> String {
    format!("spawngrid-{workload_id}")
}

/// Service name the job registers its notebook port under.
pub fn service_name_for(job_id: &str) -> String {
    format!("{job_id}-notebook")
}
