use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table size above which idle key locks are pruned on the next lookup.
const PRUNE_THRESHOLD: usize = 1024;

/// Per-key async locks.
///
/// Operations on the same key serialize on that key's lock. The table itself is
/// only held for the lookup, so unrelated keys never wait on each other.
#[derive(Default)]
pub(crate) struct KeyLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock();
            if table.len() >= PRUNE_THRESHOLD {
                // Only the table holds a reference to idle locks.
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            table
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_serializes() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.lock("a").await;

        let locks_clone = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = locks_clone.lock("a").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = KeyLocks::new();
        for i in 0..PRUNE_THRESHOLD {
            drop(locks.lock(&format!("key-{i}")).await);
        }
        assert_eq!(locks.len(), PRUNE_THRESHOLD);

        let _held = locks.lock("fresh").await;
        assert_eq!(locks.len(), 1);
    }
}
