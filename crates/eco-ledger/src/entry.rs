//! Construction rules for ledger entries.
//!
//! Entries are built here and nowhere else. Each constructor validates its
//! amounts, derives the points from the mass where needed, and stamps the
//! entry with a sequence key from the caller-provided anchor. Nothing in this
//! module touches the store.

use chrono::{DateTime, Utc};
use eco_types::{MassKg, OwnerId, Points, SequenceKey, TemporalAnchor};

use crate::config::AdjustmentPolicy;
use crate::error::{LedgerError, LedgerResult};
use crate::records::{EntryKind, EntryStatus, LedgerEntry};

pub const DEFAULT_DONATION_NOTE: &str = "Donation at collection point";

fn award_note(mass_kg: MassKg) -> String {
    format!("Admin awarded points for {:.1} kg plastic", mass_kg.value())
}

fn redemption_note(title: &str) -> String {
    format!("Redeemed voucher: {title}")
}

fn note_or(note: &str, default: impl FnOnce() -> String) -> String {
    let trimmed = note.trim();
    if trimmed.is_empty() {
        default()
    } else {
        trimmed.to_string()
    }
}

/// Wall-clock time of an anchor; falls back to now for out-of-range values.
pub(crate) fn anchor_time(anchor: &TemporalAnchor) -> DateTime<Utc> {
    i64::try_from(anchor.physical_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

fn base_entry(
    owner: OwnerId,
    anchor: TemporalAnchor,
    kind: EntryKind,
    status: EntryStatus,
    note: String,
) -> LedgerResult<LedgerEntry> {
    Ok(LedgerEntry {
        owner,
        sequence_key: SequenceKey::new(anchor, kind.tag())?,
        kind,
        points_credit: Points::ZERO,
        points_debit: Points::ZERO,
        mass_kg: MassKg::ZERO,
        status,
        note,
        created_at: anchor_time(&anchor),
        actor_id: None,
        voucher_ref: None,
    })
}

/// A user-reported donation. Pending until an operator approves it.
pub fn new_donation_entry(
    owner: OwnerId,
    anchor: TemporalAnchor,
    mass_kg: MassKg,
    note: &str,
) -> LedgerResult<LedgerEntry> {
    if !mass_kg.is_positive() {
        return Err(LedgerError::invalid_amount(format!(
            "donated mass must be positive, got {mass_kg} kg"
        )));
    }

    let note = note_or(note, || DEFAULT_DONATION_NOTE.to_string());
    let mut entry = base_entry(owner.clone(), anchor, EntryKind::Donation, EntryStatus::Pending, note)?;
    entry.points_credit = Points::for_mass(mass_kg)?;
    entry.mass_kg = mass_kg;
    entry.actor_id = Some(owner);
    Ok(entry)
}

/// An approved admin award.
///
/// `manual_points` overrides the mass-derived amount and is taken verbatim;
/// the mass is then only recorded. Without an override the mass must not be
/// negative. A negative override is rejected under
/// [`AdjustmentPolicy::CreditOnly`] and recorded as a debit under
/// [`AdjustmentPolicy::AllowDeductions`].
pub fn new_admin_award_entry(
    owner: OwnerId,
    actor: OwnerId,
    anchor: TemporalAnchor,
    mass_kg: MassKg,
    manual_points: Option<Points>,
    note: &str,
    policy: AdjustmentPolicy,
) -> LedgerResult<LedgerEntry> {
    let points = match manual_points {
        Some(points) => points,
        None if mass_kg.is_negative() => {
            return Err(LedgerError::invalid_amount(format!(
                "awarded mass must not be negative, got {mass_kg} kg"
            )))
        }
        None => Points::for_mass(mass_kg)?,
    };
    let (credit, debit) = if points.is_negative() {
        match policy {
            AdjustmentPolicy::CreditOnly => {
                return Err(LedgerError::invalid_amount(format!(
                    "negative manual points ({points}) are not allowed"
                )))
            }
            AdjustmentPolicy::AllowDeductions => (Points::ZERO, points.abs()),
        }
    } else {
        (points, Points::ZERO)
    };

    let note = note_or(note, || award_note(mass_kg));
    let mut entry = base_entry(owner, anchor, EntryKind::AdminAward, EntryStatus::Approved, note)?;
    entry.points_credit = credit;
    entry.points_debit = debit;
    entry.mass_kg = mass_kg;
    entry.actor_id = Some(actor);
    Ok(entry)
}

/// An approved redemption debiting `points_cost`.
pub fn new_redemption_entry(
    owner: OwnerId,
    anchor: TemporalAnchor,
    points_cost: Points,
    voucher_ref: &str,
    voucher_title: &str,
) -> LedgerResult<LedgerEntry> {
    if points_cost.is_negative() {
        return Err(LedgerError::invalid_amount(format!(
            "voucher cost must not be negative, got {points_cost}"
        )));
    }

    let note = redemption_note(voucher_title);
    let mut entry = base_entry(owner, anchor, EntryKind::Redemption, EntryStatus::Approved, note)?;
    entry.points_debit = points_cost;
    entry.voucher_ref = Some(voucher_ref.to_string());
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn owner(id: &str) -> OwnerId {
        OwnerId::new(id).unwrap()
    }

    fn anchor() -> TemporalAnchor {
        TemporalAnchor::new(1_760_000_000_000, 3, 1)
    }

    #[test]
    fn donation_is_pending_and_converts_mass() {
        let entry = new_donation_entry(owner("alice"), anchor(), MassKg::new(dec!(2.5)), "").unwrap();
        assert_eq!(entry.kind, EntryKind::Donation);
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.points_credit, Points::from(25));
        assert_eq!(entry.points_debit, Points::ZERO);
        assert_eq!(entry.mass_kg, MassKg::new(dec!(2.5)));
        assert_eq!(entry.actor_id, Some(owner("alice")));
        assert_eq!(entry.note, DEFAULT_DONATION_NOTE);
        assert_eq!(entry.sequence_key.tag(), "DON");
        assert_eq!(entry.created_at.timestamp_millis(), 1_760_000_000_000);
    }

    #[test]
    fn donation_rejects_non_positive_mass() {
        for mass in [dec!(0), dec!(-1)] {
            let err = new_donation_entry(owner("alice"), anchor(), MassKg::new(mass), "").unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount { .. }));
        }
    }

    #[test]
    fn fractional_points_are_exact() {
        let entry = new_donation_entry(owner("alice"), anchor(), MassKg::new(dec!(0.35)), "bag").unwrap();
        assert_eq!(entry.points_credit, Points::new(dec!(3.5)));
        assert_eq!(entry.note, "bag");
    }

    #[test]
    fn award_uses_manual_points_verbatim() {
        let entry = new_admin_award_entry(
            owner("alice"),
            owner("admin"),
            anchor(),
            MassKg::new(dec!(3)),
            Some(Points::from(7)),
            "",
            AdjustmentPolicy::CreditOnly,
        )
        .unwrap();
        assert_eq!(entry.status, EntryStatus::Approved);
        assert_eq!(entry.points_credit, Points::from(7));
        assert_eq!(entry.actor_id, Some(owner("admin")));
        assert_eq!(entry.note, "Admin awarded points for 3.0 kg plastic");
        assert_eq!(entry.sequence_key.tag(), "AWD");
    }

    #[test]
    fn award_derives_points_from_mass() {
        let entry = new_admin_award_entry(
            owner("alice"),
            owner("admin"),
            anchor(),
            MassKg::new(dec!(5)),
            None,
            "",
            AdjustmentPolicy::CreditOnly,
        )
        .unwrap();
        assert_eq!(entry.points_credit, Points::from(50));
    }

    #[test]
    fn award_rejects_negative_mass_without_manual_points() {
        let err = new_admin_award_entry(
            owner("alice"),
            owner("admin"),
            anchor(),
            MassKg::new(dec!(-1)),
            None,
            "",
            AdjustmentPolicy::AllowDeductions,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
    }

    #[test]
    fn manual_points_skip_the_mass_check() {
        let entry = new_admin_award_entry(
            owner("alice"),
            owner("admin"),
            anchor(),
            MassKg::new(dec!(-1)),
            Some(Points::from(5)),
            "",
            AdjustmentPolicy::CreditOnly,
        )
        .unwrap();
        assert_eq!(entry.points_credit, Points::from(5));
        assert_eq!(entry.mass_kg, MassKg::new(dec!(-1)));
    }

    #[test]
    fn oversized_mass_is_rejected_not_panicking() {
        let err = new_donation_entry(owner("alice"), anchor(), MassKg::new(dec!(9e27)), "").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));

        let err = new_admin_award_entry(
            owner("alice"),
            owner("admin"),
            anchor(),
            MassKg::new(dec!(9e27)),
            None,
            "",
            AdjustmentPolicy::CreditOnly,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
    }

    #[test]
    fn negative_manual_points_follow_policy() {
        let build = |policy| {
            new_admin_award_entry(
                owner("alice"),
                owner("admin"),
                anchor(),
                MassKg::ZERO,
                Some(Points::from(-15)),
                "correction",
                policy,
            )
        };

        assert!(matches!(
            build(AdjustmentPolicy::CreditOnly),
            Err(LedgerError::InvalidAmount { .. })
        ));

        let entry = build(AdjustmentPolicy::AllowDeductions).unwrap();
        assert_eq!(entry.points_credit, Points::ZERO);
        assert_eq!(entry.points_debit, Points::from(15));
        assert_eq!(entry.net_points(), Some(Points::from(-15)));
    }

    #[test]
    fn redemption_debits_cost() {
        let entry = new_redemption_entry(owner("alice"), anchor(), Points::from(20), "coffee", "Free coffee").unwrap();
        assert_eq!(entry.kind, EntryKind::Redemption);
        assert_eq!(entry.status, EntryStatus::Approved);
        assert_eq!(entry.points_debit, Points::from(20));
        assert_eq!(entry.points_credit, Points::ZERO);
        assert_eq!(entry.voucher_ref.as_deref(), Some("coffee"));
        assert_eq!(entry.note, "Redeemed voucher: Free coffee");
        assert_eq!(entry.sequence_key.tag(), "RDM");
    }

    #[test]
    fn redemption_rejects_negative_cost() {
        let err = new_redemption_entry(owner("alice"), anchor(), Points::from(-1), "x", "X").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
    }
}
