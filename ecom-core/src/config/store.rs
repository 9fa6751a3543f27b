//! Versioned settings shared between the signal handler and workers.
//!
//! The server replaces the value on reload; workers hold a [`ConfigWatcher`]
//! and pick the new value up at their next iteration.

use std::sync::Arc;
use tokio::sync::{RwLock, watch};

pub struct ConfigStore<T> {
    inner: Arc<Shared<T>>,
}

struct Shared<T> {
    value: RwLock<T>,
    version_tx: watch::Sender<u64>,
}

/// Waits for the next [`ConfigStore::update`].
pub struct ConfigWatcher {
    version_rx: watch::Receiver<u64>,
}

impl<T: Clone> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(Shared {
                value: RwLock::new(initial),
                version_tx,
            }),
        }
    }

    /// Replace the value and wake every watcher.
    pub async fn update(&self, value: T) {
        *self.inner.value.write().await = value;
        self.inner.version_tx.send_modify(|version| *version += 1);
    }

    /// Copy of the current value.
    pub async fn snapshot(&self) -> T {
        self.inner.value.read().await.clone()
    }

    pub fn subscribe(&self) -> ConfigWatcher {
        ConfigWatcher {
            version_rx: self.inner.version_tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConfigWatcher {
    /// Returns `Err` once the store has been dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.version_rx.changed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_notifies_watchers() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();

        store.update(2).await;

        watcher.changed().await.unwrap();
        assert_eq!(store.snapshot().await, 2);
    }

    #[tokio::test]
    async fn test_watcher_errors_after_store_dropped() {
        let store = ConfigStore::new(());
        let mut watcher = store.subscribe();
        drop(store);
        assert!(watcher.changed().await.is_err());
    }
}
