use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::AppError;

/// Race an operation against a fixed deadline, first settled wins.
///
/// The operation runs as a detached task, so when the deadline fires first it
/// keeps running to completion and its late result is dropped. Nothing is
/// cancelled and nothing is reconciled afterwards, which means local state can
/// trail the collaborator's truth after an observed timeout.
///
/// `op` names the operation in the `Timeout` error shown to the user.
pub async fn with_deadline<T, F>(op: &'static str, limit: Duration, fut: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, AppError>> + Send + 'static,
{
    let task = tokio::spawn(fut);

    match timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(AppError::RemoteRejected(join_err.to_string())),
        Err(_) => Err(AppError::Timeout(op)),
    }
}
