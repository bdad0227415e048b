//! Foundation types for the eco points ledger.
//!
//! This crate provides the identity, amount, and ordering types shared by
//! the store and ledger crates. Every other eco crate depends on `eco-types`.
//!
//! # Key Types
//!
//! - [`OwnerId`] -- verified user identifier, the ledger partition key
//! - [`Caller`] -- verified identity plus the pre-normalized admin flag
//! - [`Points`] / [`MassKg`] -- exact decimal quantities
//! - [`TemporalAnchor`] -- hybrid logical clock timestamp
//! - [`SequenceClock`] -- monotonic anchor source for new ledger entries
//! - [`SequenceKey`] -- per-owner sort key of a ledger entry

pub mod amount;
pub mod error;
pub mod identity;
pub mod sequence;
pub mod temporal;

pub use amount::{MassKg, Points, POINTS_PER_KG};
pub use error::TypeError;
pub use identity::{Caller, OwnerId, VoucherId};
pub use sequence::{SequenceClock, SequenceKey, SEQUENCE_PREFIX};
pub use temporal::TemporalAnchor;
