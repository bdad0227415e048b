use std::collections::BTreeMap;

use async_trait::async_trait;
use eco_types::VoucherId;

use crate::codec::{voucher_from_item, voucher_key, VOUCHER_PARTITION, VOUCHER_PREFIX};
use crate::context::LedgerContext;
use crate::error::{LedgerError, LedgerResult};
use crate::records::VoucherDefinition;

/// Strip an optional `DEF#` prefix from a voucher id.
///
/// Returns `None` when nothing is left.
pub fn normalize_voucher_id(raw: &str) -> Option<VoucherId> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix(VOUCHER_PREFIX).unwrap_or(trimmed);
    VoucherId::new(bare).ok()
}

/// Read access to voucher definitions.
#[async_trait]
pub trait VoucherCatalog: Send + Sync {
    /// Look up one definition. `Ok(None)` when it does not exist.
    async fn get_definition(&self, id: &VoucherId) -> LedgerResult<Option<VoucherDefinition>>;

    /// Every definition, in id order.
    async fn list_definitions(&self) -> LedgerResult<Vec<VoucherDefinition>>;
}

/// Catalog stored in the `VOUCHER` partition of the ledger store.
#[derive(Clone, Debug)]
pub struct StoreVoucherCatalog {
    ctx: LedgerContext,
}

impl StoreVoucherCatalog {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl VoucherCatalog for StoreVoucherCatalog {
    async fn get_definition(&self, id: &VoucherId) -> LedgerResult<Option<VoucherDefinition>> {
        let key = voucher_key(id);
        let item = self
            .ctx
            .call("read voucher", self.ctx.store().get_item(&key))
            .await?;
        match item {
            None => Ok(None),
            Some(item) => voucher_from_item(&item)
                .map(Some)
                .map_err(|e| LedgerError::from_store("read voucher", e)),
        }
    }

    async fn list_definitions(&self) -> LedgerResult<Vec<VoucherDefinition>> {
        let store = self.ctx.store();
        let items = self
            .ctx
            .call(
                "list vouchers",
                store.query_all(VOUCHER_PARTITION, Some(VOUCHER_PREFIX)),
            )
            .await?;
        items
            .iter()
            .map(voucher_from_item)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LedgerError::from_store("list vouchers", e))
    }
}

/// Fixed in-process catalog, typically seeded from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticVoucherCatalog {
    definitions: BTreeMap<String, VoucherDefinition>,
}

impl StaticVoucherCatalog {
    pub fn new(definitions: impl IntoIterator<Item = VoucherDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.id.as_str().to_string(), d))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[async_trait]
impl VoucherCatalog for StaticVoucherCatalog {
    async fn get_definition(&self, id: &VoucherId) -> LedgerResult<Option<VoucherDefinition>> {
        Ok(self.definitions.get(id.as_str()).cloned())
    }

    async fn list_definitions(&self) -> LedgerResult<Vec<VoucherDefinition>> {
        Ok(self.definitions.values().cloned().collect())
    }
}
