use async_trait::async_trait;

use crate::error::StoreResult;
use crate::item::{Condition, Item, ItemKey, Page, PartitionQuery, TransactOp};

/// Partitioned item store with conditional and transactional writes.
///
/// All implementations must satisfy these invariants:
/// - Items within a partition are returned in ascending sort-key order.
/// - A failed condition rejects the write without modifying anything.
/// - `transact_write` applies every operation or none of them, and at most
///   one operation may target a given key.
/// - All backend errors are propagated, never silently ignored.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Write a single item if `condition` holds for its current state.
    async fn put_item(&self, item: Item, condition: Condition) -> StoreResult<()>;

    /// Point lookup by full key. Returns `Ok(None)` if absent.
    async fn get_item(&self, key: &ItemKey) -> StoreResult<Option<Item>>;

    /// Read one page of a partition.
    async fn query_partition(&self, query: &PartitionQuery) -> StoreResult<Page>;

    /// Apply all operations atomically.
    async fn transact_write(&self, ops: Vec<TransactOp>) -> StoreResult<()>;

    /// Read an entire partition (optionally filtered by sort-key prefix),
    /// following `next` cursors until the backend reports the end.
    ///
    /// Any page failure fails the whole read; callers never see a truncated
    /// partition presented as complete.
    async fn query_all(&self, partition: &str, sort_prefix: Option<&str>) -> StoreResult<Vec<Item>> {
        let mut query = PartitionQuery::new(partition);
        if let Some(prefix) = sort_prefix {
            query = query.with_prefix(prefix);
        }

        let mut items = Vec::new();
        let mut pages = 0usize;
        loop {
            let page = self.query_partition(&query).await?;
            pages += 1;
            items.extend(page.items);
            match page.next {
                Some(cursor) => query.start_after = Some(cursor),
                None => break,
            }
        }

        tracing::trace!(partition, pages, items = items.len(), "partition scan complete");
        Ok(items)
    }
}
