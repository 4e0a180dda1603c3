//! In-memory counter store for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{CounterStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    supports_cas: AtomicBool,
    /// Values written by a simulated competing request just before the next CAS calls
    interference: Mutex<Vec<String>>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub swaps: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.put(key, value);
        store
    }

    pub fn put(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn fail_reads(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_cas(self) -> Self {
        self.supports_cas.store(true, Ordering::SeqCst);
        self
    }

    /// Before each of the next CAS calls, overwrite the value as a concurrent writer would
    pub fn interfere_with(self, values: &[&str]) -> Self {
        *self.interference.lock().unwrap() = values.iter().rev().map(|v| v.to_string()).collect();
        self
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Malformed("simulated read failure".to_string()));
        }
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Malformed("simulated write failure".to_string()));
        }
        self.put(key, value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError> {
        if !self.supports_cas.load(Ordering::SeqCst) {
            return Err(StoreError::Unsupported("compare_and_swap"));
        }
        self.swaps.fetch_add(1, Ordering::SeqCst);

        if let Some(competing) = self.interference.lock().unwrap().pop() {
            self.put(key, &competing);
        }

        let mut values = self.values.lock().unwrap();
        if values.get(key).map(String::as_str) == expected {
            values.insert(key.to_string(), new.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
