//! Mapping between ledger records and store items.
//!
//! Layout of a user partition (`USER#<owner>`):
//!
//! | Sort key            | Record              |
//! |---------------------|---------------------|
//! | `TXN#<seq>#<TAG>`   | [`LedgerEntry`]     |
//! | `PROFILE`           | [`ProfileAggregate`]|
//! | `HEAD`              | [`LedgerHead`]      |
//! | `GRANT#<uuid>`      | [`UserVoucherGrant`]|
//!
//! Voucher definitions live in the `VOUCHER` partition under `DEF#<id>`.

use chrono::{DateTime, Utc};
use eco_store::{Item, ItemKey, StoreError, StoreResult};
use eco_types::{MassKg, OwnerId, Points, SequenceKey, VoucherId};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entry::anchor_time;
use crate::records::{
    EntryKind, EntryStatus, GrantStatus, LedgerEntry, LedgerHead, ProfileAggregate,
    UserVoucherGrant, VoucherDefinition, VoucherStatus,
};

pub const USER_PARTITION_PREFIX: &str = "USER#";
pub const PROFILE_SORT_KEY: &str = "PROFILE";
pub const HEAD_SORT_KEY: &str = "HEAD";
pub const GRANT_PREFIX: &str = "GRANT#";
pub const VOUCHER_PARTITION: &str = "VOUCHER";
pub const VOUCHER_PREFIX: &str = "DEF#";

pub mod attr {
    pub const TYPE: &str = "Type";
    pub const POINTS_EARNED: &str = "PointsEarned";
    pub const POINTS_SPENT: &str = "PointsSpent";
    pub const AMOUNT_KG: &str = "AmountKg";
    pub const STATUS: &str = "Status";
    pub const NOTE: &str = "Note";
    pub const CREATED_AT: &str = "CreatedAt";
    pub const ADMIN_ID: &str = "AdminID";
    pub const VOUCHER_REF: &str = "VoucherRef";

    pub const TOTAL_POINTS: &str = "TotalPoints";
    pub const TOTAL_KG: &str = "TotalKg";
    pub const UPDATED_AT: &str = "UpdatedAt";

    pub const VERSION: &str = "Version";

    pub const VOUCHER_ID: &str = "VoucherID";
    pub const TITLE: &str = "Title";
    pub const DISCOUNT: &str = "Discount";
    pub const POINTS_REQUIRED: &str = "PointsRequired";
    pub const EXPIRES_AT: &str = "ExpiresAt";
    pub const CODE: &str = "Code";
}

pub fn user_partition(owner: &OwnerId) -> String {
    format!("{USER_PARTITION_PREFIX}{owner}")
}

pub fn entry_key(owner: &OwnerId, sequence_key: &SequenceKey) -> ItemKey {
    ItemKey::new(user_partition(owner), sequence_key.to_string())
}

pub fn profile_key(owner: &OwnerId) -> ItemKey {
    ItemKey::new(user_partition(owner), PROFILE_SORT_KEY)
}

pub fn head_key(owner: &OwnerId) -> ItemKey {
    ItemKey::new(user_partition(owner), HEAD_SORT_KEY)
}

pub fn grant_key(owner: &OwnerId, grant_id: &Uuid) -> ItemKey {
    ItemKey::new(user_partition(owner), format!("{GRANT_PREFIX}{grant_id}"))
}

pub fn voucher_key(id: &VoucherId) -> ItemKey {
    ItemKey::new(VOUCHER_PARTITION, format!("{VOUCHER_PREFIX}{id}"))
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339()
}

fn parse_time(item: &Item, name: &str) -> StoreResult<Option<DateTime<Utc>>> {
    match item.get_s(name) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| StoreError::corrupt(&item.key, format!("bad {name}: {e}"))),
    }
}

fn owner_of(item: &Item) -> StoreResult<OwnerId> {
    let raw = item
        .key
        .partition
        .strip_prefix(USER_PARTITION_PREFIX)
        .ok_or_else(|| StoreError::corrupt(&item.key, "not a user partition"))?;
    OwnerId::new(raw).map_err(|e| StoreError::corrupt(&item.key, e.to_string()))
}

fn number_or_zero(item: &Item, name: &str) -> Decimal {
    item.get_n(name).unwrap_or(Decimal::ZERO)
}

pub fn entry_to_item(entry: &LedgerEntry) -> Item {
    Item::new(entry_key(&entry.owner, &entry.sequence_key))
        .with(attr::TYPE, entry.kind.as_str())
        .with(attr::POINTS_EARNED, entry.points_credit.value())
        .with(attr::POINTS_SPENT, entry.points_debit.value())
        .with(attr::AMOUNT_KG, entry.mass_kg.value())
        .with(attr::STATUS, entry.status.as_str())
        .with(attr::NOTE, entry.note.as_str())
        .with(attr::CREATED_AT, format_time(&entry.created_at))
        .with_opt(attr::ADMIN_ID, entry.actor_id.as_ref().map(|a| a.as_str()))
        .with_opt(attr::VOUCHER_REF, entry.voucher_ref.as_deref())
}

/// Decode a ledger entry. Missing amounts read as zero; a missing or unknown
/// type or status makes the item corrupt.
pub fn entry_from_item(item: &Item) -> StoreResult<LedgerEntry> {
    let owner = owner_of(item)?;
    let sequence_key =
        SequenceKey::parse(&item.key.sort).map_err(|e| StoreError::corrupt(&item.key, e.to_string()))?;

    let raw_kind = item.require_s(attr::TYPE)?;
    let kind = EntryKind::parse(raw_kind)
        .ok_or_else(|| StoreError::corrupt(&item.key, format!("unknown entry type {raw_kind}")))?;
    let raw_status = item.require_s(attr::STATUS)?;
    let status = EntryStatus::parse(raw_status)
        .ok_or_else(|| StoreError::corrupt(&item.key, format!("unknown entry status {raw_status}")))?;

    let created_at = parse_time(item, attr::CREATED_AT)?.unwrap_or_else(|| anchor_time(&sequence_key.anchor()));
    let actor_id = match item.get_s(attr::ADMIN_ID) {
        Some(raw) if !raw.is_empty() => {
            Some(OwnerId::new(raw).map_err(|e| StoreError::corrupt(&item.key, e.to_string()))?)
        }
        _ => None,
    };

    Ok(LedgerEntry {
        owner,
        sequence_key,
        kind,
        points_credit: Points::new(number_or_zero(item, attr::POINTS_EARNED)),
        points_debit: Points::new(number_or_zero(item, attr::POINTS_SPENT)),
        mass_kg: MassKg::new(number_or_zero(item, attr::AMOUNT_KG)),
        status,
        note: item.get_s(attr::NOTE).unwrap_or_default().to_string(),
        created_at,
        actor_id,
        voucher_ref: item.get_s(attr::VOUCHER_REF).map(str::to_string),
    })
}

pub fn profile_from_item(item: &Item) -> StoreResult<ProfileAggregate> {
    Ok(ProfileAggregate {
        owner: owner_of(item)?,
        cached_total_points: Points::new(number_or_zero(item, attr::TOTAL_POINTS)),
        cached_total_mass_kg: MassKg::new(number_or_zero(item, attr::TOTAL_KG)),
        updated_at: parse_time(item, attr::UPDATED_AT)?,
    })
}

pub fn head_from_item(item: &Item) -> StoreResult<LedgerHead> {
    let raw = item.require_n(attr::VERSION)?;
    let version = raw
        .to_u64()
        .filter(|_| raw.fract().is_zero())
        .ok_or_else(|| StoreError::corrupt(&item.key, format!("bad head version {raw}")))?;
    Ok(LedgerHead {
        owner: owner_of(item)?,
        version,
    })
}

pub fn head_to_item(head: &LedgerHead) -> Item {
    Item::new(head_key(&head.owner)).with(attr::VERSION, Decimal::from(head.version))
}

pub fn grant_to_item(grant: &UserVoucherGrant) -> Item {
    Item::new(grant_key(&grant.owner, &grant.grant_id))
        .with(attr::VOUCHER_ID, grant.voucher_id.as_str())
        .with(attr::TITLE, grant.title.as_str())
        .with(attr::DISCOUNT, grant.discount.as_str())
        .with(attr::CODE, grant.code.as_str())
        .with(attr::EXPIRES_AT, grant.expires_at.as_str())
        .with(attr::STATUS, grant.status.as_str())
        .with(attr::CREATED_AT, format_time(&grant.created_at))
}

pub fn grant_from_item(item: &Item) -> StoreResult<UserVoucherGrant> {
    let grant_id = item
        .key
        .sort
        .strip_prefix(GRANT_PREFIX)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| StoreError::corrupt(&item.key, "bad grant id"))?;
    let voucher_id = VoucherId::new(item.require_s(attr::VOUCHER_ID)?)
        .map_err(|e| StoreError::corrupt(&item.key, e.to_string()))?;
    let raw_status = item.require_s(attr::STATUS)?;
    let status = GrantStatus::parse(raw_status)
        .ok_or_else(|| StoreError::corrupt(&item.key, format!("unknown grant status {raw_status}")))?;
    let created_at = parse_time(item, attr::CREATED_AT)?
        .ok_or_else(|| StoreError::corrupt(&item.key, "missing CreatedAt"))?;

    let text = |name: &str| item.get_s(name).unwrap_or_default().to_string();
    Ok(UserVoucherGrant {
        owner: owner_of(item)?,
        grant_id,
        voucher_id,
        title: text(attr::TITLE),
        discount: text(attr::DISCOUNT),
        code: text(attr::CODE),
        expires_at: text(attr::EXPIRES_AT),
        status,
        created_at,
    })
}

pub fn voucher_to_item(definition: &VoucherDefinition) -> Item {
    Item::new(voucher_key(&definition.id))
        .with(attr::TITLE, definition.title.as_str())
        .with(attr::DISCOUNT, definition.discount.as_str())
        .with(attr::POINTS_REQUIRED, definition.points_required.value())
        .with(attr::EXPIRES_AT, definition.expires_at.as_str())
        .with(attr::CODE, definition.code.as_str())
        .with(attr::STATUS, definition.status.as_str())
}

/// Decode a voucher definition. The returned id has no `DEF#` prefix.
pub fn voucher_from_item(item: &Item) -> StoreResult<VoucherDefinition> {
    let raw_id = item.key.sort.strip_prefix(VOUCHER_PREFIX).unwrap_or(&item.key.sort);
    let id = VoucherId::new(raw_id).map_err(|e| StoreError::corrupt(&item.key, e.to_string()))?;
    let text = |name: &str| item.get_s(name).unwrap_or_default().to_string();
    Ok(VoucherDefinition {
        id,
        title: text(attr::TITLE),
        discount: text(attr::DISCOUNT),
        points_required: Points::new(item.require_n(attr::POINTS_REQUIRED)?),
        expires_at: text(attr::EXPIRES_AT),
        code: text(attr::CODE),
        status: VoucherStatus::parse(item.get_s(attr::STATUS).unwrap_or("active")),
    })
}
