//! Partitioned item store for the eco points ledger.
//!
//! The ledger keeps every record in one logical table of items addressed by
//! a composite key (partition key + sort key), the same shape as a
//! DynamoDB single-table design:
//!
//! - `USER#<owner>` partitions hold ledger entries, the profile cache, the
//!   ledger head, and voucher grants of one user
//! - the `VOUCHER` partition holds the voucher catalog
//!
//! # Storage Backends
//!
//! All backends implement the [`LedgerStore`] trait:
//!
//! - [`InMemoryLedgerStore`] -- `BTreeMap`-based store for tests, the CLI,
//!   and embedding; supports paging and fault injection
//!
//! # Guarantees Required From Backends
//!
//! 1. Point lookup by full key and range query by partition key, in sort-key
//!    order, paginated.
//! 2. Conditional single-item puts (`ItemAbsent`, `AttributeEquals`).
//! 3. Multi-item transactions that apply all operations or none.
//! 4. A transaction never leaves a partial write behind, including when the
//!    caller drops the request mid-flight.

pub mod error;
pub mod item;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use item::{AttributeValue, Condition, Item, ItemKey, Page, PartitionQuery, TransactOp};
pub use memory::{Fault, InMemoryLedgerStore, StoreSnapshot};
pub use traits::LedgerStore;
