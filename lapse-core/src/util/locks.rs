use std::sync::{Arc, Mutex};

use dashmap::DashMap;

/// One mutex per profile: a container and its index are only touched by the
/// holder of that profile's lock.
#[derive(Default)]
pub struct ProfileLocks {
    map: DashMap<String, Arc<Mutex<()>>>,
}

impl ProfileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `profile_id`. The lock is released
    /// when `f` returns, whatever it returns.
    pub fn with<R>(&self, profile_id: &str, f: impl FnOnce() -> R) -> R {
        let lock = self
            .map
            .entry(profile_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }
}
