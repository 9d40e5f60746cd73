//! Metadata synchronization engine.
//!
//! A cycle lists a backend's buckets, collects each bucket's detail in its
//! own task ([`collector`]), enumerates the bucket's objects sequentially
//! inside that task ([`objects`]), and merges the ordered results into one
//! backend aggregate ([`assembler`]).
//!
//! Every provider call races the caller's [`CancellationToken`].

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::errors::SyncError;

pub mod assembler;
pub mod collector;
pub mod objects;

pub use assembler::assemble;
pub use collector::BucketCollector;
pub use objects::ObjectEnumerator;

/// Await `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output, SyncError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancellable_passes_output_through() {
        let cancel = CancellationToken::new();
        let out = cancellable(&cancel, async { 7 }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn test_cancellable_stops_pending_future() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = cancellable(&cancel, std::future::pending::<()>()).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellable_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cancellable(&cancel, async { 1 }).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }
}
