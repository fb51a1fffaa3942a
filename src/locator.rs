//! Transient binary locators.
//!
//! A browser hands out `blob:` URLs for in-memory data and leaks the backing
//! memory until each URL is revoked. The same discipline applies here: every
//! decode borrows a locator for the lifetime of the decode, and every
//! [`crate::output::ConvertedFile`] owns the locator that serves as its
//! download reference. An [`ObjectUrl`] revokes itself on drop, so removing a
//! file, clearing the session, or an early return from a failed decode all
//! release the locator with no extra bookkeeping.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Registry {
    next_id: u64,
    live: HashMap<u64, u64>,
}

/// Issues and tracks object URLs. Clones share the same registry.
#[derive(Clone, Default)]
pub struct UrlRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl fmt::Debug for UrlRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

impl UrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panic while holding the lock cannot leave the map inconsistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate a locator for `size` bytes of data.
    pub fn create(&self, size: u64) -> ObjectUrl {
        let mut reg = self.lock();
        reg.next_id += 1;
        let id = reg.next_id;
        reg.live.insert(id, size);
        ObjectUrl {
            id,
            url: format!("blob:imgkit/{id}"),
            registry: self.clone(),
        }
    }

    /// Number of locators not yet revoked.
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Total bytes referenced by live locators.
    pub fn live_bytes(&self) -> u64 {
        self.lock().live.values().sum()
    }

    fn revoke(&self, id: u64) {
        self.lock().live.remove(&id);
    }
}

/// A live object URL. Revoked when dropped.
pub struct ObjectUrl {
    id: u64,
    url: String,
    registry: UrlRegistry,
}

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.registry.revoke(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_unique_and_revoked_on_drop() {
        let registry = UrlRegistry::new();
        let a = registry.create(10);
        let b = registry.create(32);
        assert_ne!(a.as_str(), b.as_str());
        assert!(a.as_str().starts_with("blob:imgkit/"));
        assert_eq!(registry.live_count(), 2);
        assert_eq!(registry.live_bytes(), 42);

        drop(a);
        assert_eq!(registry.live_count(), 1);
        drop(b);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.live_bytes(), 0);
    }

    #[test]
    fn clones_share_state() {
        let registry = UrlRegistry::new();
        let other = registry.clone();
        let _url = other.create(1);
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn revoked_across_threads() {
        let registry = UrlRegistry::new();
        let url = registry.create(5);
        std::thread::spawn(move || drop(url)).join().unwrap();
        assert_eq!(registry.live_count(), 0);
    }
}
