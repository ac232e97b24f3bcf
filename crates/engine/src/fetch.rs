//! Time budget for external calls

use pecoin_core::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Run `fut` with a deadline; expiry becomes `Error::Timeout`
pub(crate) async fn with_timeout<T, F>(operation: &str, budget: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            after_ms: budget.as_millis() as u64,
        }),
    }
}
