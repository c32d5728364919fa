//! Retrying gateway calls with exponential backoff

use crate::client::ClientError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const MAX_DELAY: Duration = Duration::from_secs(30);

/// Connection failures and 5xx responses are worth another attempt; anything
/// the server rejected outright is not.
pub fn is_transient(err: &ClientError) -> bool {
    match err {
        ClientError::Http(e) => e.is_connect() || e.is_timeout(),
        ClientError::Status { status, .. } => *status >= 500,
        ClientError::Decode(_) => false,
    }
}

/// Run `f` up to `max_attempts` times while it fails with a transient error.
///
/// Delays double from `initial_delay`, capped at 30s. Returns the first
/// success or the last error.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    max_attempts: u32,
    initial_delay: Duration,
    mut f: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = initial_delay;
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) if attempt < max_attempts && is_transient(&e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, max_attempts, e
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
