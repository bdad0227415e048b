use std::fmt;
use std::sync::Arc;

use eco_store::{Condition, TransactOp};
use eco_types::{Caller, OwnerId};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::balance::{BalanceResolver, BalanceSnapshot};
use crate::catalog::{normalize_voucher_id, VoucherCatalog};
use crate::codec::{attr, entry_to_item, grant_from_item, grant_to_item, head_to_item, user_partition, GRANT_PREFIX};
use crate::context::LedgerContext;
use crate::entry::new_redemption_entry;
use crate::error::{LedgerError, LedgerResult};
use crate::records::{LedgerHead, UserVoucherGrant, VoucherDefinition, VoucherStatus};

/// Progress of one redemption attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RedemptionState {
    Requested,
    Validated,
    Committed,
    Rejected,
}

impl RedemptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Validated => "validated",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Rejected)
    }
}

impl fmt::Display for RedemptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exchanges points for voucher grants.
///
/// A redemption reads the owner's ledger head, scans the full log, and
/// commits the debit entry, the grant and the next head version in one
/// transaction conditioned on the head it read. A concurrent
/// balance-affecting write moves the head and cancels the commit, and the
/// whole protocol is run again against the new state.
#[derive(Clone)]
pub struct RedemptionEngine {
    ctx: LedgerContext,
    resolver: BalanceResolver,
    catalog: Arc<dyn VoucherCatalog>,
}

impl RedemptionEngine {
    pub fn new(ctx: LedgerContext, catalog: Arc<dyn VoucherCatalog>) -> Self {
        Self {
            resolver: BalanceResolver::new(ctx.clone()),
            ctx,
            catalog,
        }
    }

    /// Redeem `voucher_id` (with or without its `DEF#` prefix) for the
    /// caller.
    pub async fn redeem(&self, caller: &Caller, voucher_id: &str) -> LedgerResult<UserVoucherGrant> {
        let owner = &caller.id;
        trace_state(owner, voucher_id, RedemptionState::Requested, 0);

        let definition = match self.lookup(voucher_id).await {
            Ok(definition) => definition,
            Err(error) => {
                trace_state(owner, voucher_id, RedemptionState::Rejected, 0);
                return Err(error);
            }
        };

        let retries = self.ctx.config().redeem_conflict_retries;
        let mut attempt = 0u32;
        loop {
            match self.attempt(owner, &definition, attempt).await {
                Err(LedgerError::TransactionConflict { .. }) if attempt < retries => {
                    tracing::debug!(owner = %owner, voucher = %definition.id, attempt, "redemption lost commit race, retrying");
                    attempt += 1;
                }
                Err(error @ LedgerError::TransactionConflict { .. }) => {
                    tracing::warn!(owner = %owner, voucher = %definition.id, attempts = attempt + 1, "redemption retries exhausted");
                    return Err(error);
                }
                result => return result,
            }
        }
    }

    /// The owner's voucher wallet, in grant id order.
    pub async fn grants(&self, owner: &OwnerId) -> LedgerResult<Vec<UserVoucherGrant>> {
        const OPERATION: &str = "list grants";
        let partition = user_partition(owner);
        let items = self
            .ctx
            .call(OPERATION, self.ctx.store().query_all(&partition, Some(GRANT_PREFIX)))
            .await?;
        items
            .iter()
            .map(grant_from_item)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LedgerError::from_store(OPERATION, e))
    }

    async fn lookup(&self, raw_id: &str) -> LedgerResult<VoucherDefinition> {
        let not_found = || LedgerError::VoucherNotFound {
            voucher_id: raw_id.trim().to_string(),
        };
        let id = normalize_voucher_id(raw_id).ok_or_else(not_found)?;
        let definition = self.catalog.get_definition(&id).await?.ok_or_else(not_found)?;

        if self.ctx.config().require_active_voucher && definition.status != VoucherStatus::Active {
            tracing::warn!(voucher = %id, status = definition.status.as_str(), "inactive voucher requested");
            return Err(not_found());
        }
        if definition.points_required.is_negative() {
            return Err(LedgerError::invalid_amount(format!(
                "voucher {id} has a negative cost"
            )));
        }
        Ok(definition)
    }

    async fn attempt(&self, owner: &OwnerId, definition: &VoucherDefinition, attempt: u32) -> LedgerResult<UserVoucherGrant> {
        let snapshot = self.resolver.resolve_snapshot(owner).await?;
        let required = definition.points_required;
        if snapshot.balance < required {
            trace_state(owner, definition.id.as_str(), RedemptionState::Rejected, attempt);
            return Err(LedgerError::InsufficientPoints {
                required,
                available: snapshot.balance,
            });
        }
        trace_state(owner, definition.id.as_str(), RedemptionState::Validated, attempt);

        let grant = self.commit(owner, definition, &snapshot).await?;
        trace_state(owner, definition.id.as_str(), RedemptionState::Committed, attempt);
        tracing::info!(
            owner = %owner,
            voucher = %definition.id,
            grant = %grant.grant_id,
            cost = %required,
            balance_before = %snapshot.balance,
            "voucher redeemed"
        );
        Ok(grant)
    }

    /// Write the debit, the grant and the next head version, provided the
    /// head is still where `snapshot` saw it.
    async fn commit(
        &self,
        owner: &OwnerId,
        definition: &VoucherDefinition,
        snapshot: &BalanceSnapshot,
    ) -> LedgerResult<UserVoucherGrant> {
        let entry = new_redemption_entry(
            owner.clone(),
            self.ctx.clock().next(),
            definition.points_required,
            definition.id.as_str(),
            &definition.title,
        )?;
        let grant = UserVoucherGrant::snapshot_of(definition, owner.clone(), Uuid::now_v7(), entry.created_at);

        let (next_version, head_condition) = match snapshot.head_version {
            Some(version) => (
                version.checked_add(1).ok_or_else(|| {
                    tracing::error!(owner = %owner, version, "ledger head cannot advance");
                    LedgerError::StoreUnavailable {
                        operation: "commit redemption",
                    }
                })?,
                Condition::attribute_equals(attr::VERSION, Decimal::from(version)),
            ),
            None => (1, Condition::ItemAbsent),
        };
        let head = LedgerHead {
            owner: owner.clone(),
            version: next_version,
        };

        let ops = vec![
            TransactOp::Put {
                item: entry_to_item(&entry),
                condition: Condition::ItemAbsent,
            },
            TransactOp::Put {
                item: grant_to_item(&grant),
                condition: Condition::ItemAbsent,
            },
            TransactOp::Put {
                item: head_to_item(&head),
                condition: head_condition,
            },
        ];
        self.ctx
            .call("commit redemption", self.ctx.store().transact_write(ops))
            .await?;
        Ok(grant)
    }
}

impl fmt::Debug for RedemptionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedemptionEngine")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

fn trace_state(owner: &OwnerId, voucher: &str, state: RedemptionState, attempt: u32) {
    tracing::trace!(owner = %owner, voucher, state = state.as_str(), attempt, "redemption state");
}
