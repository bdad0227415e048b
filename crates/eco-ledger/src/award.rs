use eco_store::{AttributeValue, Condition, TransactOp};
use eco_types::{Caller, MassKg, OwnerId, Points};
use rust_decimal::Decimal;

use crate::codec::{attr, entry_to_item, format_time, head_key, profile_key};
use crate::context::LedgerContext;
use crate::entry::{new_admin_award_entry, new_donation_entry};
use crate::error::{LedgerError, LedgerResult};
use crate::records::LedgerEntry;

/// An admin award request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminAward {
    pub target: OwnerId,
    pub mass_kg: MassKg,
    /// Overrides the mass-derived points when present.
    pub manual_points: Option<Points>,
    pub note: String,
}

impl AdminAward {
    pub fn new(target: OwnerId, mass_kg: MassKg) -> Self {
        Self {
            target,
            mass_kg,
            manual_points: None,
            note: String::new(),
        }
    }

    pub fn with_points(mut self, points: Points) -> Self {
        self.manual_points = Some(points);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

/// Records donations and admin awards.
#[derive(Clone, Debug)]
pub struct AwardService {
    ctx: LedgerContext,
}

impl AwardService {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    /// Record a donation by the caller. The entry stays pending, so neither
    /// the balance nor the ledger head changes.
    pub async fn record_donation(&self, caller: &Caller, mass_kg: MassKg, note: &str) -> LedgerResult<LedgerEntry> {
        let entry = new_donation_entry(caller.id.clone(), self.ctx.clock().next(), mass_kg, note)?;

        self.ctx
            .call(
                "record donation",
                self.ctx
                    .store()
                    .put_item(entry_to_item(&entry), Condition::ItemAbsent),
            )
            .await?;

        tracing::info!(
            owner = %entry.owner,
            key = %entry.sequence_key,
            mass_kg = %entry.mass_kg,
            points = %entry.points_credit,
            "recorded pending donation"
        );
        Ok(entry)
    }

    /// Record an approved award for `award.target`.
    ///
    /// The entry, the profile cache increment and the ledger head bump are
    /// written in one transaction.
    pub async fn record_admin_award(&self, caller: &Caller, award: AdminAward) -> LedgerResult<LedgerEntry> {
        if !caller.is_admin {
            tracing::warn!(actor = %caller.id, target = %award.target, "non-admin award rejected");
            return Err(LedgerError::Unauthorized {
                actor: caller.id.to_string(),
                action: "award points",
            });
        }

        let entry = new_admin_award_entry(
            award.target,
            caller.id.clone(),
            self.ctx.clock().next(),
            award.mass_kg,
            award.manual_points,
            &award.note,
            self.ctx.config().adjustment_policy,
        )?;
        let net = entry
            .net_points()
            .ok_or_else(|| LedgerError::invalid_amount("award amount out of range"))?;

        let ops = vec![
            TransactOp::Put {
                item: entry_to_item(&entry),
                condition: Condition::ItemAbsent,
            },
            TransactOp::Add {
                key: profile_key(&entry.owner),
                increments: vec![
                    (attr::TOTAL_POINTS.to_string(), net.value()),
                    (attr::TOTAL_KG.to_string(), entry.mass_kg.value()),
                ],
                set: vec![(
                    attr::UPDATED_AT.to_string(),
                    AttributeValue::S(format_time(&entry.created_at)),
                )],
                condition: Condition::None,
            },
            TransactOp::Add {
                key: head_key(&entry.owner),
                increments: vec![(attr::VERSION.to_string(), Decimal::ONE)],
                set: Vec::new(),
                condition: Condition::None,
            },
        ];

        self.ctx
            .call("record admin award", self.ctx.store().transact_write(ops))
            .await?;

        tracing::info!(
            owner = %entry.owner,
            actor = %caller.id,
            key = %entry.sequence_key,
            credit = %entry.points_credit,
            debit = %entry.points_debit,
            "recorded admin award"
        );
        Ok(entry)
    }
}
