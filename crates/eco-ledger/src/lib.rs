//! Points ledger engine for the eco loyalty program.
//!
//! Users earn points by donating plastic (pending until approved) or through
//! admin awards, and spend them on vouchers. This crate provides:
//! - `LedgerEntry` and its construction rules (append-only, never edited)
//! - `BalanceResolver`: the authoritative balance, derived from the full log
//! - `AwardService`: donations and admin awards (award + profile cache atomically)
//! - `RedemptionEngine`: voucher redemption guarded by a per-owner
//!   compare-and-set so concurrent redemptions cannot overspend
//! - `VoucherCatalog`: read contract for voucher definitions
//!
//! Every component receives an explicit [`LedgerContext`] (store, config,
//! clock, deadline); nothing is held in global state.

pub mod award;
pub mod balance;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod context;
pub mod entry;
pub mod error;
pub mod records;
pub mod redeem;

pub use award::{AdminAward, AwardService};
pub use balance::{approved_balance, BalanceResolver, BalanceSnapshot};
pub use catalog::{normalize_voucher_id, StaticVoucherCatalog, StoreVoucherCatalog, VoucherCatalog};
pub use config::{AdjustmentPolicy, ConfigError, LedgerConfig};
pub use context::LedgerContext;
pub use error::{ErrorBody, ErrorKind, LedgerError, LedgerResult};
pub use records::{
    EntryKind, EntryStatus, GrantStatus, LedgerEntry, LedgerHead, ProfileAggregate,
    UserVoucherGrant, VoucherDefinition, VoucherStatus,
};
pub use redeem::{RedemptionEngine, RedemptionState};
