//! Per-id async locks
//!
//! A decrypt attempt is load → decrypt → persist. Holding the id's lock across
//! all three keeps two attempts on the same message from both spending the
//! same hit point. Entries are dropped once nobody holds or waits on them.
//! Process-local only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub(crate) struct IdLocks {
    inner: Mutex<HashMap<String, Weak<TokioMutex<()>>>>,
}

impl IdLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|_, weak| weak.strong_count() > 0);
            match map.get(id).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(TokioMutex::new(()));
                    map.insert(id.to_string(), Arc::downgrade(&mutex));
                    mutex
                }
            }
        };
        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.values().filter(|weak| weak.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_is_exclusive() {
        let locks = Arc::new(IdLocks::new());
        let guard = locks.lock("A").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("A").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished(), "second lock must wait");

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = IdLocks::new();
        let _a = locks.lock("A").await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.lock("B"))
            .await
            .expect("other ids must not block");
    }

    #[tokio::test]
    async fn test_released_entries_are_dropped() {
        let locks = IdLocks::new();
        {
            let _a = locks.lock("A").await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }
}
