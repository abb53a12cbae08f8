use arc_swap::ArcSwap;
use autopilot_types::AppSnapshot;
use std::sync::Arc;
use tokio::sync::watch;

struct Inner {
    current: ArcSwap<AppSnapshot>,
    generations: watch::Sender<u64>,
}

/// Shared, lock-free handle to the latest application snapshot.
///
/// Cloning is cheap; all clones observe the same publications.
#[derive(Clone)]
pub struct SnapshotHandle {
    inner: Arc<Inner>,
}

impl SnapshotHandle {
    /// A handle holding the empty generation-0 snapshot
    pub fn new() -> Self {
        Self::with_snapshot(AppSnapshot::empty())
    }

    pub fn with_snapshot(snapshot: AppSnapshot) -> Self {
        let (generations, _) = watch::channel(snapshot.generation());
        Self {
            inner: Arc::new(Inner {
                current: ArcSwap::from_pointee(snapshot),
                generations,
            }),
        }
    }

    /// The latest published snapshot; never waits on a refresh in progress
    pub fn current(&self) -> Arc<AppSnapshot> {
        self.inner.current.load_full()
    }

    /// Generation of the latest published snapshot
    pub fn generation(&self) -> u64 {
        *self.inner.generations.borrow()
    }

    /// Receive the generation number of every newly published snapshot
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.generations.subscribe()
    }

    /// Replace the current snapshot wholesale and notify subscribers
    pub fn publish(&self, snapshot: AppSnapshot) {
        let generation = snapshot.generation();
        self.inner.current.store(Arc::new(snapshot));
        self.inner.generations.send_replace(generation);
    }
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SnapshotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current();
        f.debug_struct("SnapshotHandle")
            .field("generation", &current.generation())
            .field("apps", &current.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let handle = SnapshotHandle::new();
        assert_eq!(handle.generation(), 0);
        assert!(handle.current().is_empty());
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let handle = SnapshotHandle::new();
        handle.publish(AppSnapshot::from_packages(1, ["com.android.settings"]));
        let held = handle.current();

        handle.publish(AppSnapshot::from_packages(2, ["tv.danmaku.bili"]));

        assert!(held.contains("com.android.settings"));
        assert!(!held.contains("tv.danmaku.bili"));
        assert!(handle.current().contains("tv.danmaku.bili"));
    }

    #[tokio::test]
    async fn test_subscribers_see_new_generations() {
        let handle = SnapshotHandle::new();
        let mut rx = handle.subscribe();

        let publisher = handle.clone();
        tokio::spawn(async move {
            publisher.publish(AppSnapshot::from_packages(1, ["com.autonavi.minimap"]));
        });

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
        assert!(handle.current().contains("com.autonavi.minimap"));
    }
}
