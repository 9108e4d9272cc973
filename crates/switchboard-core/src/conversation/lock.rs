//! Per-user serialization lock.
//!
//! At most one dispatch holds the lock of a given user id. Waiting suspends
//! the dispatch task only. The lock is released when the returned
//! [`UserLockGuard`] drops, which also happens when the holding future is
//! cancelled or unwinds.
//!
//! [`UserLock::try_lock`] never waits: it returns `None` when the user is busy.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::trace;

/// Mutual exclusion keyed by raw user id.
#[async_trait]
pub trait UserLock: Send + Sync {
    /// Waits until the user is free, then takes the lock.
    async fn lock(&self, user_id: &str) -> UserLockGuard;

    /// Takes the lock only if the user is free right now.
    fn try_lock(&self, user_id: &str) -> Option<UserLockGuard>;
}

/// A shared user lock.
pub type BoxedUserLock = Arc<dyn UserLock>;

/// Proof of holding a user lock; releases it on drop.
pub struct UserLockGuard {
    user_id: String,
    acquired_at: Instant,
    _lease: Box<dyn Any + Send>,
}

impl UserLockGuard {
    /// Wraps an implementation-specific lease.
    pub fn new(user_id: impl Into<String>, lease: impl Any + Send) -> Self {
        Self {
            user_id: user_id.into(),
            acquired_at: Instant::now(),
            _lease: Box::new(lease),
        }
    }

    /// Returns the locked user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        trace!(
            user_id = %self.user_id,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "User lock released"
        );
    }
}

impl std::fmt::Debug for UserLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserLockGuard")
            .field("user_id", &self.user_id)
            .finish()
    }
}

// =============================================================================
// In-Memory Lock
// =============================================================================

struct Slot {
    mutex: Arc<tokio::sync::Mutex<()>>,
    /// Holder plus waiters.
    refs: usize,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// Keeps a slot alive while a dispatch holds or waits for it.
struct Lease {
    slots: Slots,
    user_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&self.user_id) {
            slot.refs -= 1;
            if slot.refs == 0 {
                slots.remove(&self.user_id);
            }
        }
    }
}

/// Process-local user lock.
///
/// Entries exist only while some dispatch holds or waits for them.
#[derive(Default, Clone)]
pub struct InMemoryUserLock {
    slots: Slots,
}

impl InMemoryUserLock {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of users currently held or awaited.
    pub fn holders(&self) -> usize {
        self.slots.lock().len()
    }

    fn join(&self, user_id: &str) -> (Arc<tokio::sync::Mutex<()>>, Lease) {
        let mutex = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(user_id.to_string()).or_insert_with(|| Slot {
                mutex: Arc::new(tokio::sync::Mutex::new(())),
                refs: 0,
            });
            slot.refs += 1;
            Arc::clone(&slot.mutex)
        };
        let lease = Lease {
            slots: Arc::clone(&self.slots),
            user_id: user_id.to_string(),
            guard: None,
        };
        (mutex, lease)
    }
}

#[async_trait]
impl UserLock for InMemoryUserLock {
    async fn lock(&self, user_id: &str) -> UserLockGuard {
        let (mutex, mut lease) = self.join(user_id);
        lease.guard = Some(mutex.lock_owned().await);
        trace!(user_id, "User lock acquired");
        UserLockGuard::new(user_id, lease)
    }

    fn try_lock(&self, user_id: &str) -> Option<UserLockGuard> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(user_id.to_string()).or_insert_with(|| Slot {
            mutex: Arc::new(tokio::sync::Mutex::new(())),
            refs: 0,
        });
        let guard = Arc::clone(&slot.mutex).try_lock_owned().ok()?;
        slot.refs += 1;
        drop(slots);

        trace!(user_id, "User lock acquired without waiting");
        Some(UserLockGuard::new(
            user_id,
            Lease {
                slots: Arc::clone(&self.slots),
                user_id: user_id.to_string(),
                guard: Some(guard),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn try_lock_does_not_wait() {
        let lock = InMemoryUserLock::new();
        let held = lock.try_lock("u1").expect("free user");

        assert!(lock.try_lock("u1").is_none());
        assert!(lock.try_lock("u2").is_some());

        drop(held);
        assert!(lock.try_lock("u1").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_user_is_serialized() {
        let lock = Arc::new(InMemoryUserLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                tokio::spawn(async move {
                    let _guard = lock.lock("same").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(lock.holders(), 0);
    }

    #[tokio::test]
    async fn different_users_do_not_block() {
        let lock = InMemoryUserLock::new();
        let _a = lock.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), lock.lock("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_its_slot() {
        let lock = InMemoryUserLock::new();
        let held = lock.lock("u").await;

        let waited = tokio::time::timeout(Duration::from_millis(20), lock.lock("u")).await;
        assert!(waited.is_err());
        assert_eq!(lock.holders(), 1);

        drop(held);
        assert_eq!(lock.holders(), 0);
    }

    #[tokio::test]
    async fn panic_while_holding_releases() {
        let lock = Arc::new(InMemoryUserLock::new());
        let task_lock = Arc::clone(&lock);
        let result = tokio::spawn(async move {
            let _guard = task_lock.lock("u").await;
            panic!("bot logic exploded");
        })
        .await;
        assert!(result.is_err());

        let again = tokio::time::timeout(Duration::from_millis(100), lock.lock("u")).await;
        assert!(again.is_ok());
    }
}
