use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

/// Per-user mutual exclusion for read-check-write sequences.
///
/// Two operations for the same user never interleave; different users
/// proceed in parallel. Lock entries are created lazily and kept for the
/// lifetime of the planner.
#[derive(Default)]
pub struct UserLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding `user_id`'s lock.
    pub fn with_user<T>(&self, user_id: &str, f: impl FnOnce() -> T) -> T {
        // Clone out of the map so the shard guard is released before blocking.
        let lock = self
            .inner
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone();
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of users that have taken a lock so far.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_user_is_serialised() {
        let locks = Arc::new(UserLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with_user("u1", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn returns_closure_value() {
        let locks = UserLocks::new();
        assert!(locks.is_empty());
        assert_eq!(locks.with_user("u1", || 42), 42);
        assert_eq!(locks.with_user("u2", || "x"), "x");
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn survives_a_panicking_holder() {
        let locks = Arc::new(UserLocks::new());
        let l = Arc::clone(&locks);
        let res = thread::spawn(move || l.with_user("u1", || panic!("boom"))).join();
        assert!(res.is_err());
        assert_eq!(locks.with_user("u1", || 7), 7);
    }
}
