use crate::error::StoreResult;
use crate::index::LedgerIndex;
use crate::record::StoredEvent;
use crate::traits::LedgerStore;

/// Volatile store for tests, local demos, and embedding.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    index: LedgerIndex,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryStore {
    fn index(&self) -> &LedgerIndex {
        &self.index
    }

    fn append(&mut self, records: Vec<StoredEvent>) -> StoreResult<()> {
        self.index.extend(records)
    }

    fn redact(&mut self, ids: &[u64]) -> StoreResult<u64> {
        self.index.redact(ids)
    }

    fn replace(&mut self, records: Vec<StoredEvent>) -> StoreResult<()> {
        self.index = LedgerIndex::from_records(records)?;
        Ok(())
    }
}
