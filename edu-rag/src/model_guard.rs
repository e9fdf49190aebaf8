//! One-shot "ensure the model is available" guard, keyed by model identifier.
//!
//! The first caller for a model runs the acquisition step; concurrent callers
//! for the same model wait on it; later callers return immediately. A failed
//! acquisition leaves the slot empty so the next request tries again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::Result;

/// Memoizes a successful check-then-acquire per model identifier for the
/// lifetime of the guard.
#[derive(Debug, Default)]
pub struct ModelGuard {
    ready: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl ModelGuard {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `acquire` for `model` unless an earlier call already succeeded.
    ///
    /// # Errors
    ///
    /// Returns whatever `acquire` returns on failure.
    pub async fn ensure<F, Fut>(&self, model: &str, acquire: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let cell = self.cell(model);
        if cell.initialized() {
            return Ok(());
        }
        cell.get_or_try_init(|| async move {
            debug!(model, "ensuring embedding model is available");
            acquire().await
        })
        .await
        .map(|_| ())
    }

    /// Whether `model` has been successfully ensured.
    pub fn is_ready(&self, model: &str) -> bool {
        self.slots().get(model).is_some_and(|cell| cell.initialized())
    }

    fn cell(&self, model: &str) -> Arc<OnceCell<()>> {
        self.slots().entry(model.to_string()).or_default().clone()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<OnceCell<()>>>> {
        // A panic while holding the lock cannot leave the map inconsistent.
        self.ready.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::RagError;

    #[tokio::test]
    async fn acquires_once_per_model() {
        let guard = ModelGuard::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            guard
                .ensure("nomic-embed-text", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }
        guard
            .ensure("mxbai-embed-large", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(guard.is_ready("nomic-embed-text"));
        assert!(guard.is_ready("mxbai-embed-large"));
    }

    #[tokio::test]
    async fn failure_is_not_memoized() {
        let guard = ModelGuard::new();
        let calls = AtomicUsize::new(0);

        let first = guard
            .ensure("m", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RagError::ModelUnavailable { model: "m".into(), message: "pull failed".into() })
            })
            .await;
        assert!(matches!(first, Err(RagError::ModelUnavailable { .. })));
        assert!(!guard.is_ready("m"));

        guard
            .ensure("m", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_acquisition() {
        let guard = Arc::new(ModelGuard::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    guard
                        .ensure("m", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            Ok(())
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
