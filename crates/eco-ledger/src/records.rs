use std::fmt;

use chrono::{DateTime, Utc};
use eco_types::{MassKg, OwnerId, Points, SequenceKey, VoucherId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of a ledger entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Material handed in by the user. Created pending.
    Donation,
    /// Points granted (or, by policy, deducted) by an admin. Auto-approved.
    AdminAward,
    /// Points spent on a voucher. Auto-approved.
    Redemption,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Donation => "DONATION",
            Self::AdminAward => "ADMIN_AWARD",
            Self::Redemption => "REDEMPTION",
        }
    }

    /// Short tag embedded in the entry's sequence key.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Donation => "DON",
            Self::AdminAward => "AWD",
            Self::Redemption => "RDM",
        }
    }

    /// Parse a persisted type. Accepts the legacy `DONATE` / `REDEEM` names.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "DONATION" | "DONATE" => Some(Self::Donation),
            "ADMIN_AWARD" => Some(Self::AdminAward),
            "REDEMPTION" | "REDEEM" => Some(Self::Redemption),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an entry counts toward the balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Approved,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            _ => None,
        }
    }
}

/// Immutable record of a point-affecting event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub owner: OwnerId,
    pub sequence_key: SequenceKey,
    pub kind: EntryKind,
    pub points_credit: Points,
    pub points_debit: Points,
    pub mass_kg: MassKg,
    pub status: EntryStatus,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub actor_id: Option<OwnerId>,
    pub voucher_ref: Option<String>,
}

impl LedgerEntry {
    pub fn is_approved(&self) -> bool {
        self.status == EntryStatus::Approved
    }

    /// Signed effect on the balance once approved. `None` if the stored
    /// amounts are out of range.
    pub fn net_points(&self) -> Option<Points> {
        self.points_credit.checked_sub(self.points_debit)
    }
}

/// Best-effort display cache of a user's totals.
///
/// Only the admin-award path updates it. It is never used to decide whether
/// a user can spend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAggregate {
    pub owner: OwnerId,
    pub cached_total_points: Points,
    pub cached_total_mass_kg: MassKg,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Per-owner version advanced by every balance-affecting write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHead {
    pub owner: OwnerId,
    pub version: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    #[default]
    Active,
    Inactive,
}

impl VoucherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Anything other than `active` is treated as not redeemable.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("active") {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

/// Catalog definition of a redeemable voucher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherDefinition {
    pub id: VoucherId,
    pub title: String,
    #[serde(default)]
    pub discount: String,
    pub points_required: Points,
    #[serde(default)]
    pub expires_at: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub status: VoucherStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantStatus {
    Active,
    Used,
    Expired,
}

impl GrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "used" => Some(Self::Used),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A voucher owned by a user, created by a successful redemption.
///
/// Display fields are copied from the definition at redemption time, so
/// later catalog edits do not change what the user was granted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserVoucherGrant {
    pub owner: OwnerId,
    pub grant_id: Uuid,
    pub voucher_id: VoucherId,
    pub title: String,
    pub discount: String,
    pub code: String,
    pub expires_at: String,
    pub status: GrantStatus,
    pub created_at: DateTime<Utc>,
}

impl UserVoucherGrant {
    pub fn snapshot_of(
        definition: &VoucherDefinition,
        owner: OwnerId,
        grant_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner,
            grant_id,
            voucher_id: definition.id.clone(),
            title: definition.title.clone(),
            discount: definition.discount.clone(),
            code: definition.code.clone(),
            expires_at: definition.expires_at.clone(),
            status: GrantStatus::Active,
            created_at,
        }
    }
}
