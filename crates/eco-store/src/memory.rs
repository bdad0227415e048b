use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::item::{Condition, Item, ItemKey, Page, PartitionQuery, TransactOp};
use crate::traits::LedgerStore;

/// Default number of items returned per query page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

type Partitions = BTreeMap<String, BTreeMap<String, Item>>;

/// A scripted failure for tests. Each fault fires once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Fail a `get_item` call after letting `skip` calls through.
    Get { skip: usize },
    /// Fail a `put_item` call after letting `skip` calls through.
    Put { skip: usize },
    /// Fail a `query_partition` page after letting `skip` pages through.
    Query { skip: usize },
    /// Fail the next transaction after staging `after_ops` of its
    /// operations. Staged work is discarded.
    TransactWrite { after_ops: usize },
}

/// Serializable copy of the whole store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub items: Vec<Item>,
}

/// In-memory, `BTreeMap`-based ledger store.
///
/// Intended for tests, the CLI, and embedding. Partitions are kept in
/// sort-key order behind a `RwLock`; a transaction is staged against the
/// current state and published under one write lock, so readers never
/// observe part of it. Every call yields to the runtime once before
/// touching state, the way a networked store would, which lets concurrent
/// requests interleave in tests.
pub struct InMemoryLedgerStore {
    partitions: RwLock<Partitions>,
    page_size: usize,
    faults: Mutex<Vec<Fault>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a store that returns at most `page_size` items per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot, page_size: usize) -> Self {
        let store = Self::with_page_size(page_size);
        {
            let mut partitions = store
                .partitions
                .write()
                .unwrap_or_else(|e| e.into_inner());
            for item in snapshot.items {
                partitions
                    .entry(item.key.partition.clone())
                    .or_default()
                    .insert(item.key.sort.clone(), item);
            }
        }
        store
    }

    /// Copy out every item, ordered by key.
    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let partitions = self.read()?;
        Ok(StoreSnapshot {
            items: partitions
                .values()
                .flat_map(|items| items.values().cloned())
                .collect(),
        })
    }

    /// Queue a failure to be triggered by a later call.
    pub fn inject(&self, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(fault);
    }

    /// Total number of items across all partitions.
    pub fn len(&self) -> usize {
        self.read()
            .map(|p| p.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Partitions>> {
        self.partitions
            .read()
            .map_err(|_| StoreError::Unavailable("store read lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Partitions>> {
        self.partitions
            .write()
            .map_err(|_| StoreError::Unavailable("store write lock poisoned".into()))
    }

    /// Consume the first fault of `kind` once its skip counter runs out.
    fn fault_hit(&self, kind: FaultKind) -> bool {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        for index in 0..faults.len() {
            let skip = match (kind, &mut faults[index]) {
                (FaultKind::Get, Fault::Get { skip })
                | (FaultKind::Put, Fault::Put { skip })
                | (FaultKind::Query, Fault::Query { skip }) => skip,
                _ => continue,
            };
            if *skip > 0 {
                *skip -= 1;
                return false;
            }
            faults.remove(index);
            return true;
        }
        false
    }

    fn transact_fault(&self) -> Option<usize> {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        let position = faults
            .iter()
            .position(|fault| matches!(fault, Fault::TransactWrite { .. }))?;
        match faults.remove(position) {
            Fault::TransactWrite { after_ops } => Some(after_ops),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
enum FaultKind {
    Get,
    Put,
    Query,
}

fn lookup<'a>(partitions: &'a Partitions, key: &ItemKey) -> Option<&'a Item> {
    partitions
        .get(&key.partition)
        .and_then(|items| items.get(&key.sort))
}

fn store(partitions: &mut Partitions, item: Item) {
    partitions
        .entry(item.key.partition.clone())
        .or_default()
        .insert(item.key.sort.clone(), item);
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn put_item(&self, item: Item, condition: Condition) -> StoreResult<()> {
        tokio::task::yield_now().await;
        if self.fault_hit(FaultKind::Put) {
            return Err(StoreError::Unavailable("injected put failure".into()));
        }

        let mut partitions = self.write()?;
        if !condition.holds(lookup(&partitions, &item.key)) {
            return Err(StoreError::ConditionFailed(item.key));
        }
        store(&mut partitions, item);
        Ok(())
    }

    async fn get_item(&self, key: &ItemKey) -> StoreResult<Option<Item>> {
        tokio::task::yield_now().await;
        if self.fault_hit(FaultKind::Get) {
            return Err(StoreError::Unavailable("injected get failure".into()));
        }

        let partitions = self.read()?;
        Ok(lookup(&partitions, key).cloned())
    }

    async fn query_partition(&self, query: &PartitionQuery) -> StoreResult<Page> {
        tokio::task::yield_now().await;
        if self.fault_hit(FaultKind::Query) {
            return Err(StoreError::Unavailable("injected query failure".into()));
        }

        let partitions = self.read()?;
        let Some(items) = partitions.get(&query.partition) else {
            return Ok(Page::default());
        };

        let limit = query.limit.unwrap_or(self.page_size).clamp(1, self.page_size);
        let lower = match &query.start_after {
            Some(after) => Bound::Excluded(after.clone()),
            None => Bound::Unbounded,
        };
        let prefix = query.sort_prefix.as_deref().unwrap_or("");

        let mut matching = items
            .range((lower, Bound::Unbounded))
            .filter(|(sort, _)| sort.starts_with(prefix))
            .map(|(_, item)| item);

        let page_items: Vec<Item> = matching.by_ref().take(limit).cloned().collect();
        let next = if matching.next().is_some() {
            page_items.last().map(|item| item.key.sort.clone())
        } else {
            None
        };

        Ok(Page {
            items: page_items,
            next,
        })
    }

    async fn transact_write(&self, ops: Vec<TransactOp>) -> StoreResult<()> {
        tokio::task::yield_now().await;
        if ops.is_empty() {
            return Err(StoreError::InvalidTransaction("empty transaction".into()));
        }
        let mut seen = HashSet::new();
        for op in &ops {
            if !seen.insert(op.key()) {
                return Err(StoreError::InvalidTransaction(format!(
                    "multiple operations on {}",
                    op.key()
                )));
            }
        }
        let fail_after = self.transact_fault();

        let mut partitions = self.write()?;
        let mut staged: Vec<Item> = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            if fail_after == Some(index) {
                tracing::debug!(index, "injected transaction failure; discarding staged writes");
                return Err(StoreError::Unavailable("injected transaction failure".into()));
            }
            let current = lookup(&partitions, op.key());
            if !op.condition().holds(current) {
                return Err(StoreError::TransactionCanceled {
                    index,
                    key: op.key().clone(),
                });
            }
            if let Some(next) = op.apply(current)? {
                staged.push(next);
            }
        }
        if fail_after.is_some_and(|after| after >= ops.len()) {
            return Err(StoreError::Unavailable("injected transaction failure".into()));
        }

        for item in staged {
            store(&mut partitions, item);
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedgerStore")
            .field("item_count", &self.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}
