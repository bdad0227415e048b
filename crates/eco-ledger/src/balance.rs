use eco_types::{OwnerId, Points, SequenceKey, SEQUENCE_PREFIX};

use crate::codec::{entry_from_item, head_from_item, head_key, profile_from_item, profile_key, user_partition};
use crate::context::LedgerContext;
use crate::error::{LedgerError, LedgerResult};
use crate::records::{LedgerEntry, ProfileAggregate};

/// Sum of approved credits minus approved debits. Pending entries are
/// ignored and the result does not depend on the order of `entries`.
///
/// `None` when the total leaves the decimal range.
pub fn approved_balance<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Option<Points> {
    entries
        .into_iter()
        .filter(|entry| entry.is_approved())
        .try_fold(Points::ZERO, |total, entry| total.checked_add(entry.net_points()?))
}

fn checked_balance(owner: &OwnerId, operation: &'static str, entries: &[LedgerEntry]) -> LedgerResult<Points> {
    approved_balance(entries).ok_or_else(|| {
        tracing::error!(owner = %owner, entries = entries.len(), "ledger totals out of range");
        LedgerError::StoreUnavailable { operation }
    })
}

/// Balance plus the state it was computed from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub balance: Points,
    /// Ledger head version read before the scan; `None` if the owner has no
    /// head yet.
    pub head_version: Option<u64>,
    pub last_key: Option<SequenceKey>,
    pub entry_count: usize,
}

/// Computes balances from the full entry log of an owner.
///
/// The cached profile total is never used here.
#[derive(Clone, Debug)]
pub struct BalanceResolver {
    ctx: LedgerContext,
}

impl BalanceResolver {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    pub async fn resolve_balance(&self, owner: &OwnerId) -> LedgerResult<Points> {
        let entries = self.scan_entries(owner, "resolve balance").await?;
        let balance = checked_balance(owner, "resolve balance", &entries)?;
        tracing::debug!(owner = %owner, entries = entries.len(), %balance, "resolved balance");
        Ok(balance)
    }

    /// Resolve the balance together with the head version observed before
    /// the scan.
    ///
    /// Every balance-affecting write advances the head in the same
    /// transaction, so a commit conditioned on `head_version` fails if
    /// anything changed after the head was read.
    pub async fn resolve_snapshot(&self, owner: &OwnerId) -> LedgerResult<BalanceSnapshot> {
        const OPERATION: &str = "resolve balance";

        let head = self
            .ctx
            .call(OPERATION, self.ctx.store().get_item(&head_key(owner)))
            .await?;
        let head_version = match head {
            Some(item) => Some(
                head_from_item(&item)
                    .map_err(|e| LedgerError::from_store(OPERATION, e))?
                    .version,
            ),
            None => None,
        };

        let entries = self.scan_entries(owner, OPERATION).await?;
        let last_key = entries.last().map(|entry| entry.sequence_key.clone());
        if let Some(key) = &last_key {
            self.ctx.clock().observe(&key.anchor());
        }

        let snapshot = BalanceSnapshot {
            balance: checked_balance(owner, OPERATION, &entries)?,
            head_version,
            last_key,
            entry_count: entries.len(),
        };
        tracing::debug!(
            owner = %owner,
            balance = %snapshot.balance,
            head_version = ?snapshot.head_version,
            entries = snapshot.entry_count,
            "resolved balance snapshot"
        );
        Ok(snapshot)
    }

    /// Every entry of the owner, pending included, in sequence order.
    pub async fn history(&self, owner: &OwnerId) -> LedgerResult<Vec<LedgerEntry>> {
        self.scan_entries(owner, "read history").await
    }

    /// The display cache. Not authoritative.
    pub async fn cached_profile(&self, owner: &OwnerId) -> LedgerResult<Option<ProfileAggregate>> {
        const OPERATION: &str = "read profile";
        let item = self
            .ctx
            .call(OPERATION, self.ctx.store().get_item(&profile_key(owner)))
            .await?;
        item.map(|item| profile_from_item(&item))
            .transpose()
            .map_err(|e| LedgerError::from_store(OPERATION, e))
    }

    async fn scan_entries(&self, owner: &OwnerId, operation: &'static str) -> LedgerResult<Vec<LedgerEntry>> {
        let partition = user_partition(owner);
        let items = self
            .ctx
            .call(
                operation,
                self.ctx.store().query_all(&partition, Some(SEQUENCE_PREFIX)),
            )
            .await?;
        items
            .iter()
            .map(entry_from_item)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LedgerError::from_store(operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{attr, entry_to_item, head_to_item};
    use crate::config::LedgerConfig;
    use crate::entry::{new_admin_award_entry, new_donation_entry, new_redemption_entry};
    use crate::config::AdjustmentPolicy;
    use crate::records::{EntryKind, EntryStatus, LedgerHead};
    use eco_store::{Condition, Fault, InMemoryLedgerStore, Item, ItemKey, LedgerStore};
    use eco_types::{MassKg, SequenceClock, TemporalAnchor};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn alice() -> OwnerId {
        OwnerId::new("alice").unwrap()
    }

    fn resolver(store: Arc<InMemoryLedgerStore>) -> BalanceResolver {
        BalanceResolver::new(LedgerContext::new(store, LedgerConfig::default()))
    }

    async fn put(store: &InMemoryLedgerStore, entry: &LedgerEntry) {
        store
            .put_item(entry_to_item(entry), Condition::ItemAbsent)
            .await
            .unwrap();
    }

    fn donation(clock: &SequenceClock, kg: Decimal) -> LedgerEntry {
        new_donation_entry(alice(), clock.next(), MassKg::new(kg), "").unwrap()
    }

    fn award(clock: &SequenceClock, points: i64) -> LedgerEntry {
        new_admin_award_entry(
            alice(),
            OwnerId::new("admin").unwrap(),
            clock.next(),
            MassKg::ZERO,
            Some(Points::from(points)),
            "",
            AdjustmentPolicy::AllowDeductions,
        )
        .unwrap()
    }

    fn redemption(clock: &SequenceClock, cost: i64) -> LedgerEntry {
        new_redemption_entry(alice(), clock.next(), Points::from(cost), "v", "V").unwrap()
    }

    fn approve(mut entry: LedgerEntry) -> LedgerEntry {
        entry.status = EntryStatus::Approved;
        entry
    }

    #[tokio::test]
    async fn empty_partition_is_zero() {
        let resolver = resolver(Arc::new(InMemoryLedgerStore::new()));
        assert_eq!(resolver.resolve_balance(&alice()).await.unwrap(), Points::ZERO);

        let snapshot = resolver.resolve_snapshot(&alice()).await.unwrap();
        assert_eq!(snapshot.head_version, None);
        assert_eq!(snapshot.last_key, None);
        assert_eq!(snapshot.entry_count, 0);
    }

    #[tokio::test]
    async fn pending_donation_does_not_count() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = SequenceClock::new(1);
        put(&store, &donation(&clock, dec!(2.5))).await;

        let resolver = resolver(store);
        assert_eq!(resolver.resolve_balance(&alice()).await.unwrap(), Points::ZERO);
        let history = resolver.history(&alice()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].points_credit, Points::from(25));
    }

    #[tokio::test]
    async fn approved_credits_minus_debits() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = SequenceClock::new(1);
        put(&store, &approve(donation(&clock, dec!(2.5)))).await;
        put(&store, &award(&clock, 50)).await;
        put(&store, &redemption(&clock, 20)).await;

        let balance = resolver(store).resolve_balance(&alice()).await.unwrap();
        assert_eq!(balance, Points::from(55));
    }

    #[tokio::test]
    async fn redemption_can_drive_balance_to_zero() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = SequenceClock::new(1);
        put(&store, &award(&clock, 30)).await;
        put(&store, &redemption(&clock, 30)).await;

        assert_eq!(resolver(store).resolve_balance(&alice()).await.unwrap(), Points::ZERO);
    }

    #[tokio::test]
    async fn pagination_is_exhausted() {
        let store = Arc::new(InMemoryLedgerStore::with_page_size(3));
        let clock = SequenceClock::new(1);
        for _ in 0..10 {
            put(&store, &award(&clock, 5)).await;
        }
        put(&store, &donation(&clock, dec!(100))).await;

        let snapshot = resolver(store).resolve_snapshot(&alice()).await.unwrap();
        assert_eq!(snapshot.balance, Points::from(50));
        assert_eq!(snapshot.entry_count, 11);
        assert_eq!(snapshot.last_key.unwrap().tag(), EntryKind::Donation.tag());
    }

    #[tokio::test]
    async fn failing_page_fails_whole_resolution() {
        let store = Arc::new(InMemoryLedgerStore::with_page_size(2));
        let clock = SequenceClock::new(1);
        for _ in 0..5 {
            put(&store, &award(&clock, 5)).await;
        }
        store.inject(Fault::Query { skip: 1 });

        let err = resolver(store).resolve_balance(&alice()).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::StoreUnavailable {
                operation: "resolve balance"
            }
        );
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = SequenceClock::new(1);
        put(&store, &award(&clock, 40)).await;
        put(&store, &redemption(&clock, 15)).await;

        let resolver = resolver(store);
        let first = resolver.resolve_snapshot(&alice()).await.unwrap();
        let second = resolver.resolve_snapshot(&alice()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.balance, Points::from(25));
    }

    #[tokio::test]
    async fn snapshot_reads_head_and_advances_clock() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let far_future = TemporalAnchor::new(9_000_000_000_000, 5, 7);
        let entry = new_donation_entry(alice(), far_future, MassKg::new(dec!(1)), "").unwrap();
        put(&store, &entry).await;
        store
            .put_item(
                head_to_item(&LedgerHead {
                    owner: alice(),
                    version: 3,
                }),
                Condition::None,
            )
            .await
            .unwrap();

        let resolver = resolver(store);
        let snapshot = resolver.resolve_snapshot(&alice()).await.unwrap();
        assert_eq!(snapshot.head_version, Some(3));
        assert!(resolver.ctx.clock().next() > far_future);
    }

    #[tokio::test]
    async fn corrupt_entry_fails_closed() {
        let store = Arc::new(InMemoryLedgerStore::new());
        store
            .put_item(
                Item::new(ItemKey::new("USER#alice", "TXN#1700000000000.0000000000.0001#AWD"))
                    .with(attr::TYPE, "ADMIN_AWARD")
                    .with(attr::POINTS_EARNED, dec!(100)),
                Condition::None,
            )
            .await
            .unwrap();

        let err = resolver(store).resolve_balance(&alice()).await.unwrap_err();
        assert!(matches!(err, LedgerError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn out_of_range_total_fails_instead_of_panicking() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = SequenceClock::new(1);
        let huge = |clock: &SequenceClock| {
            new_admin_award_entry(
                alice(),
                OwnerId::new("admin").unwrap(),
                clock.next(),
                MassKg::ZERO,
                Some(Points::new(dec!(5e28))),
                "",
                AdjustmentPolicy::CreditOnly,
            )
            .unwrap()
        };
        let first = huge(&clock);
        let second = huge(&clock);
        assert_eq!(approved_balance([&first]), Some(Points::new(dec!(5e28))));
        assert_eq!(approved_balance([&first, &second]), None);

        put(&store, &first).await;
        put(&store, &second).await;
        let resolver = resolver(store);
        assert!(matches!(
            resolver.resolve_balance(&alice()).await,
            Err(LedgerError::StoreUnavailable { .. })
        ));
        assert!(matches!(
            resolver.resolve_snapshot(&alice()).await,
            Err(LedgerError::StoreUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn other_partition_items_are_ignored() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let clock = SequenceClock::new(1);
        put(&store, &award(&clock, 10)).await;
        store
            .put_item(
                Item::new(ItemKey::new("USER#alice", "PROFILE")).with(attr::TOTAL_POINTS, dec!(999)),
                Condition::None,
            )
            .await
            .unwrap();
        store
            .put_item(
                Item::new(ItemKey::new("USER#alicea", "TXN#1700000000000.0000000000.0001#AWD"))
                    .with(attr::TYPE, "ADMIN_AWARD")
                    .with(attr::STATUS, "approved")
                    .with(attr::POINTS_EARNED, dec!(100)),
                Condition::None,
            )
            .await
            .unwrap();

        let resolver = resolver(store);
        assert_eq!(resolver.resolve_balance(&alice()).await.unwrap(), Points::from(10));
        let profile = resolver.cached_profile(&alice()).await.unwrap().unwrap();
        assert_eq!(profile.cached_total_points, Points::from(999));
    }

    #[tokio::test]
    async fn cached_profile_absent() {
        let resolver = resolver(Arc::new(InMemoryLedgerStore::new()));
        assert_eq!(resolver.cached_profile(&alice()).await.unwrap(), None);
    }

    fn arb_entry() -> impl Strategy<Value = (i64, i64, bool)> {
        (0i64..1_000, 0i64..1_000, any::<bool>())
    }

    proptest! {
        #[test]
        fn approved_sum_ignores_order(
            specs in prop::collection::vec(arb_entry(), 0..40),
            seed in any::<u64>(),
        ) {
            let clock = SequenceClock::new(1);
            let entries: Vec<LedgerEntry> = specs
                .iter()
                .map(|&(credit, debit, approved)| {
                    let mut entry = award(&clock, credit);
                    entry.points_debit = Points::from(debit);
                    if !approved {
                        entry.status = EntryStatus::Pending;
                    }
                    entry
                })
                .collect();

            let expected = Points::checked_sum(
                specs
                    .iter()
                    .filter(|(_, _, approved)| *approved)
                    .map(|&(credit, debit, _)| Points::from(credit - debit)),
            );

            let mut shuffled = entries.clone();
            let len = shuffled.len();
            if len > 1 {
                let mut state = seed;
                for i in (1..len).rev() {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let j = (state >> 33) as usize % (i + 1);
                    shuffled.swap(i, j);
                }
            }

            prop_assert!(expected.is_some());
            prop_assert_eq!(approved_balance(&entries), expected);
            prop_assert_eq!(approved_balance(&shuffled), expected);
            prop_assert_eq!(approved_balance(entries.iter().rev()), expected);
        }
    }
}
