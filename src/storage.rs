//! In-memory key-value storage shared by every connection.
//!
//! Provides a thread-safe map from string keys to JSON values with:
//! - Single-lock mutual exclusion around every get, set and delete
//! - Stable listing order (first insertion wins the position)
//! - Simple operation counters for shutdown statistics

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, trace};

/// A single stored entry
#[derive(Debug, Clone)]
struct Entry {
    /// The stored value
    value: Value,
    /// Insertion sequence number used for listing order
    seq: u64,
}

/// Storage failures.
///
/// The map itself cannot fail; the only failure is a lock poisoned by a
/// panic in another thread while it was held.
#[derive(Debug, Error)]
#[error("storage lock poisoned")]
pub struct StorageError;

/// Result of a delete operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    /// Key was present and has been removed
    Deleted,
    /// Key was absent
    NotFound,
}

/// Thread-safe in-memory key-value storage
pub struct Storage {
    /// The actual storage
    data: RwLock<HashMap<String, Entry>>,
    /// Insertion sequence counter
    insert_counter: AtomicU64,
    /// Number of successful stores
    stores: AtomicU64,
    /// Number of successful deletes
    deletes: AtomicU64,
}

impl Storage {
    /// Create a new, empty storage instance
    pub fn new() -> Arc<Self> {
        info!("Initializing storage");
        Arc::new(Self {
            data: RwLock::new(HashMap::new()),
            insert_counter: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }

    /// Get a copy of the value stored under `key`
    pub fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let data = self.data.read().map_err(|_| StorageError)?;
        Ok(data.get(key).map(|entry| entry.value.clone()))
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// A replaced key keeps its original listing position.
    pub fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(|_| StorageError)?;
        match data.get_mut(key) {
            Some(entry) => entry.value = value,
            None => {
                let seq = self.insert_counter.fetch_add(1, Ordering::SeqCst);
                data.insert(key.to_string(), Entry { value, seq });
            }
        }
        self.stores.fetch_add(1, Ordering::Relaxed);
        trace!(key, items = data.len(), "Item stored");
        Ok(())
    }

    /// Delete an item from storage
    pub fn delete(&self, key: &str) -> Result<DeleteResult, StorageError> {
        let mut data = self.data.write().map_err(|_| StorageError)?;
        if data.remove(key).is_some() {
            self.deletes.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Item deleted");
            Ok(DeleteResult::Deleted)
        } else {
            Ok(DeleteResult::NotFound)
        }
    }

    /// All keys in insertion order
    pub fn keys(&self) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().map_err(|_| StorageError)?;
        let mut entries: Vec<(&String, u64)> =
            data.iter().map(|(key, entry)| (key, entry.seq)).collect();
        entries.sort_unstable_by_key(|&(_, seq)| seq);
        Ok(entries.into_iter().map(|(key, _)| key.clone()).collect())
    }

    /// Number of items currently held
    pub fn len(&self) -> Result<usize, StorageError> {
        let data = self.data.read().map_err(|_| StorageError)?;
        Ok(data.len())
    }

    /// Get statistics about the storage
    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            item_count: self.len()?,
            stores: self.stores.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    /// Poison the lock by panicking while it is held
    #[cfg(test)]
    pub fn poison(self: &Arc<Self>) {
        let storage = Arc::clone(self);
        let _ = std::thread::spawn(move || {
            let _guard = storage.data.write().unwrap();
            panic!("poisoning storage lock");
        })
        .join();
    }
}

/// Storage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub item_count: usize,
    pub stores: u64,
    pub deletes: u64,
}
