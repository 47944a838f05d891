use crate::error::StoreResult;
use crate::index::LedgerIndex;
use crate::record::StoredEvent;

/// Storage boundary for the ledger.
///
/// Reads go through the in-memory [`LedgerIndex`]. Mutations take `&mut self`;
/// callers serialize writers, and a failed mutation must leave the store as
/// it was.
pub trait LedgerStore: Send + Sync {
    /// Current contents.
    fn index(&self) -> &LedgerIndex;

    /// Append a batch that continues the id sequence. All or nothing.
    fn append(&mut self, records: Vec<StoredEvent>) -> StoreResult<()>;

    /// Replace the payloads of the given events with the erasure marker.
    /// Returns how many events changed.
    fn redact(&mut self, ids: &[u64]) -> StoreResult<u64>;

    /// Discard everything and load `records` in their place.
    fn replace(&mut self, records: Vec<StoredEvent>) -> StoreResult<()>;

    /// Pick up events written through another handle. Returns how many
    /// events were added.
    fn refresh(&mut self) -> StoreResult<u64> {
        Ok(0)
    }
}
