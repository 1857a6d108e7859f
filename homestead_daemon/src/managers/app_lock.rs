use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed lock registry serializing lifecycle transitions per app id.
/// Concurrent triggers for the same app (an install racing an uninstall, an
/// update racing a start) queue on the app's lock; operations on different
/// apps proceed independently.
#[derive(Default)]
pub struct AppLockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for the given app id, creating it on first use.
    /// The guard is owned so it can be held across await points for the
    /// whole transition.
    pub async fn acquire(&self, app_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(app_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::time::Duration;

    #[tokio::test]
    async fn serializes_operations_on_the_same_app() {
        let registry = Arc::new(AppLockRegistry::new());
        let witness = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let registry = registry.clone();
            let witness = witness.clone();
            tokio::spawn(async move {
                let _guard = registry.acquire("myapp").await;
                witness.lock().await.push("first-enter");
                tokio::time::sleep(Duration::from_millis(50)).await;
                witness.lock().await.push("first-exit");
            })
        };

        // Give the first task a head start on the lock.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = {
            let registry = registry.clone();
            let witness = witness.clone();
            tokio::spawn(async move {
                let _guard = registry.acquire("myapp").await;
                witness.lock().await.push("second-enter");
            })
        };

        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(
            *witness.lock().await,
            vec!["first-enter", "first-exit", "second-enter"]
        );
    }

    #[tokio::test]
    async fn different_apps_do_not_block_each_other() {
        let registry = AppLockRegistry::new();
        let _first = registry.acquire("myapp").await;
        // Must not deadlock while the first guard is held.
        let _second = registry.acquire("otherapp").await;
    }

    #[tokio::test]
    async fn locks_are_reusable_after_release() {
        let registry = AppLockRegistry::new();
        drop(registry.acquire("myapp").await);
        let _guard = registry.acquire("myapp").await;
    }
}
