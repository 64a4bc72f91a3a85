//! Cancellation of suspending calls

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Run `fut` until it completes or `token` is cancelled.
///
/// A token that is already cancelled wins over a ready future, so callers can
/// rely on `Err(Error::Cancelled)` meaning no result was observed.
pub async fn run_until_cancelled<F, T>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = fut => {
            if token.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                result
            }
        }
    }
}
