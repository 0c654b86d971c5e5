//! An in-memory storage engine.
//!
//! Used in tests and as the default wiring where no persistent engine is
//! configured; single-key operations are trivially linearizable under the
//! per-store mutex.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use super::{KeyValueStore, StoreError, Unit};

/// A `HashMap`-backed [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemStore {
    units: Mutex<HashMap<Unit, HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> MemStore {
        MemStore::default()
    }

    /// Returns the number of entries in a unit.
    pub fn unit_len(&self, unit: Unit) -> usize {
        self.units
            .lock()
            .expect("lock poisoned")
            .get(&unit)
            .map(HashMap::len)
            .unwrap_or_default()
    }
}

impl KeyValueStore for MemStore {
    fn put(&self, unit: Unit, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        let mut units = self.units.lock().expect("lock poisoned");
        units.entry(unit).or_default().insert(key.to_vec(), value);
        Ok(())
    }

    fn get(&self, unit: Unit, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let units = self.units.lock().expect("lock poisoned");
        Ok(units.get(&unit).and_then(|entries| entries.get(key)).cloned())
    }

    fn has(&self, unit: Unit, key: &[u8]) -> Result<bool, StoreError> {
        let units = self.units.lock().expect("lock poisoned");
        Ok(units
            .get(&unit)
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false))
    }
}
