use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{CResult, Error};
use crate::storage::{Store, TxContext};

/// The in-memory key-value map. A single reader/writer mutex guards the
/// whole map; `keys` returns a sorted snapshot.
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore { data: RwLock::new(BTreeMap::new()) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn get(&self, _ctx: TxContext, key: &str) -> CResult<String> {
        let data = self.data.read()?;
        data.get(key).cloned().ok_or(Error::NotFound)
    }

    fn set(&self, _ctx: TxContext, key: &str, value: &str) -> CResult<()> {
        let mut data = self.data.write()?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, _ctx: TxContext, key: &str) -> CResult<()> {
        let mut data = self.data.write()?;
        data.remove(key);
        Ok(())
    }

    fn keys(&self, _ctx: TxContext) -> CResult<Vec<String>> {
        let data = self.data.read()?;
        Ok(data.keys().cloned().collect())
    }
}
