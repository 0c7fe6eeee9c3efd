use std::collections::HashMap;
use std::sync::Mutex;

use super::{MintIndexAllocator, MintRecord, MintRecordStore};
use crate::{MintError, MintResult};

/// Process-local mint counters.
///
/// Increments happen under a single lock, so concurrent requests never observe
/// the same index. Counters are lost on restart; deployments with more than one
/// process need an allocator backed by an atomic database increment.
#[derive(Debug, Default)]
pub struct InMemoryMintIndex {
    counters: Mutex<HashMap<String, u64>>,
}

#[async_trait::async_trait]
impl MintIndexAllocator for InMemoryMintIndex {
    async fn get_and_increment(&self, address: &str) -> MintResult<u64> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| MintError::OperationFailed("mint index lock poisoned".to_string()))?;
        let counter = counters.entry(address.to_string()).or_insert(0);
        *counter += 1;

        Ok(*counter)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<MintRecord>>,
}

impl InMemoryRecordStore {
    pub fn records(&self) -> Vec<MintRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl MintRecordStore for InMemoryRecordStore {
    async fn save_record(&self, record: &MintRecord) -> MintResult<()> {
        self.records
            .lock()
            .map_err(|_| MintError::OperationFailed("record store lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}
