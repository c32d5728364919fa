//! Audit logging for destructive and operational gateway events.
//!
//! All events are emitted via `tracing` with a dedicated target so they can be
//! filtered and formatted (e.g. JSON) separately from the service log.

use tracing::{info, warn};

const AUDIT_TARGET: &str = "lens::audit";

/// Log a successful clear of the capture log.
pub fn queries_cleared(count: u64) {
    warn!(
        target: AUDIT_TARGET,
        event = "queries_cleared",
        result = "ok",
        cleared = count,
    );
}

/// Log a clear request that failed.
pub fn clear_failed(reason: &str) {
    warn!(
        target: AUDIT_TARGET,
        event = "queries_clear_failed",
        result = "error",
        reason = %reason,
    );
}

/// Log an HTTP request to an operational endpoint.
pub fn api_request(path: &str, status: u16) {
    info!(
        target: AUDIT_TARGET,
        event = "api_request",
        path = %path,
        status = %status,
    );
}
