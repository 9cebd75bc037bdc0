// Process-wide token slot

use std::sync::Arc;
use tokio::sync::Mutex;

use super::TokenSource;
use crate::error::AuthError;

/// Holds the bearer token for the lifetime of the process.
///
/// Constructed once at startup and shared by `Arc` with every tool handler.
/// The slot is never re-validated: once populated, `get()` returns the same
/// token until [`invalidate`](Self::invalidate) is called.
pub struct TokenHolder {
    source: Arc<dyn TokenSource>,
    slot: Mutex<Option<String>>,
}

impl TokenHolder {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            slot: Mutex::new(None),
        }
    }

    /// Return the held token, acquiring it on first use.
    ///
    /// The lock is held across acquisition so concurrent first callers wait for
    /// a single sign-in instead of each launching their own.
    pub async fn get(&self) -> Result<String, AuthError> {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref() {
            return Ok(token.clone());
        }

        tracing::debug!("Token slot empty, acquiring");
        let token = self.source.acquire().await?;
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Drop the held token so the next `get()` acquires again
    pub async fn invalidate(&self) {
        if self.slot.lock().await.take().is_some() {
            tracing::info!("Access token invalidated");
        }
    }

    pub async fn is_populated(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicUsize,
        fail_first: bool,
    }

    impl CountingSource {
        fn new(fail_first: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first,
            })
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn acquire(&self) -> Result<String, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && n == 1 {
                return Err(AuthError::Acquisition("user_cancelled".to_string()));
            }
            Ok(format!("token-{}", n))
        }
    }

    #[tokio::test]
    async fn test_second_get_reuses_token() {
        let source = CountingSource::new(false);
        let holder = TokenHolder::new(source.clone());

        assert_eq!(holder.get().await.unwrap(), "token-1");
        assert_eq!(holder.get().await.unwrap(), "token-1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_gets_acquire_once() {
        let source = CountingSource::new(false);
        let holder = Arc::new(TokenHolder::new(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let holder = Arc::clone(&holder);
                tokio::spawn(async move { holder.get().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "token-1");
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_slot_empty() {
        let source = CountingSource::new(true);
        let holder = TokenHolder::new(source.clone());

        assert!(holder.get().await.is_err());
        assert!(!holder.is_populated().await);
        assert_eq!(holder.get().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_reacquisition() {
        let source = CountingSource::new(false);
        let holder = TokenHolder::new(source.clone());

        holder.get().await.unwrap();
        holder.invalidate().await;
        assert!(!holder.is_populated().await);
        assert_eq!(holder.get().await.unwrap(), "token-2");
    }
}
