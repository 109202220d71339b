use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Trie;

/// Handle to a value read out of the store. Holds the trie snapshot the
/// value was found in, so the value stays alive and unchanged for the
/// guard's lifetime no matter what writers do afterwards.
pub struct ValueGuard<T> {
    _snapshot: Trie,
    value: Arc<T>,
}

impl<T> ValueGuard<T> {
    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for ValueGuard<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// Concurrent wrapper around a copy-on-write [`Trie`].
///
/// Readers copy the current root under a brief lock and traverse their
/// snapshot without any further locking. Writers serialize on a dedicated
/// write lock, build the new version against the current root, and publish
/// it with a second brief root-lock acquisition. A reader is linearized at
/// the instant it copies the root.
#[derive(Default)]
pub struct TrieStore {
    root: Mutex<Trie>,
    write_lock: Mutex<()>,
}

impl TrieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the key in the current version. The returned guard pins
    /// that version.
    pub fn get<T: Any + Send + Sync>(&self, key: &[u8]) -> Option<ValueGuard<T>> {
        let snapshot = self.root.lock().clone();
        let value = snapshot.get_arc::<T>(key)?;
        Some(ValueGuard {
            _snapshot: snapshot,
            value,
        })
    }

    /// Stores the value under the key, serialized against other writers.
    pub fn put<T: Any + Send + Sync>(&self, key: &[u8], value: T) {
        let _write = self.write_lock.lock();
        let snapshot = self.root.lock().clone();
        let new_root = snapshot.put(key, value);
        *self.root.lock() = new_root;
    }

    /// Removes the key, serialized against other writers.
    pub fn remove(&self, key: &[u8]) {
        let _write = self.write_lock.lock();
        let snapshot = self.root.lock().clone();
        let new_root = snapshot.remove(key);
        *self.root.lock() = new_root;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trie_store_put_get() {
        let store = TrieStore::new();
        store.put(b"k", 42u32);

        let guard = store.get::<u32>(b"k").unwrap();
        assert_eq!(*guard, 42);
        assert_eq!(guard.value(), &42);

        assert!(store.get::<u32>(b"missing").is_none());
    }

    #[test]
    fn test_trie_store_type_mismatch() {
        let store = TrieStore::new();
        store.put(b"k", 42u32);
        assert!(store.get::<String>(b"k").is_none());
    }

    #[test]
    fn test_trie_store_remove() {
        let store = TrieStore::new();
        store.put(b"k", 42u32);
        store.remove(b"k");
        assert!(store.get::<u32>(b"k").is_none());
    }

    #[test]
    fn test_trie_store_guard_outlives_overwrite() {
        let store = TrieStore::new();
        store.put(b"x", 1u32);

        let guard = store.get::<u32>(b"x").unwrap();
        store.put(b"x", 2u32);
        store.remove(b"x");

        // The guard still sees its snapshot's value
        assert_eq!(*guard, 1);
        assert!(store.get::<u32>(b"x").is_none());
    }
}
