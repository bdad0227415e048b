use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::records::VoucherDefinition;

/// How admin awards with negative manual points are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentPolicy {
    /// Negative manual points are rejected as an invalid amount.
    #[default]
    CreditOnly,
    /// Negative manual points are recorded as an approved debit on the
    /// award entry and subtracted from the profile cache.
    AllowDeductions,
}

/// Runtime configuration for the ledger services.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Node component of generated sequence keys. Processes sharing a store
    /// should use distinct values.
    pub node_id: u16,
    /// Page size used by the in-memory store.
    pub page_size: usize,
    /// Upper bound on every individual store call.
    pub store_timeout_ms: u64,
    /// How many times a redemption re-runs after losing a commit race.
    pub redeem_conflict_retries: u32,
    pub adjustment_policy: AdjustmentPolicy,
    /// Treat inactive voucher definitions as absent when redeeming.
    pub require_active_voucher: bool,
    /// Seed for the static voucher catalog.
    pub vouchers: Vec<VoucherDefinition>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            page_size: 100,
            store_timeout_ms: 5_000,
            redeem_conflict_retries: 2,
            adjustment_policy: AdjustmentPolicy::CreditOnly,
            require_active_voucher: false,
            vouchers: Vec::new(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), vouchers = config.vouchers.len(), "loaded ledger config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".into()));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store_timeout_ms must be at least 1".into()));
        }
        for voucher in &self.vouchers {
            if voucher.points_required.is_negative() {
                return Err(ConfigError::Invalid(format!(
                    "voucher {} has a negative points_required",
                    voucher.id
                )));
            }
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::VoucherStatus;
    use eco_types::Points;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.redeem_conflict_retries, 2);
        assert_eq!(config.adjustment_policy, AdjustmentPolicy::CreditOnly);
        assert!(!config.require_active_voucher);
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let config = LedgerConfig::from_toml_str(
            r#"
            node_id = 7
            adjustment_policy = "allow_deductions"

            [[vouchers]]
            id = "coffee"
            title = "Free coffee"
            points_required = "20"
            status = "inactive"
            "#,
        )
        .unwrap();

        assert_eq!(config.node_id, 7);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.adjustment_policy, AdjustmentPolicy::AllowDeductions);
        assert_eq!(config.vouchers.len(), 1);
        assert_eq!(config.vouchers[0].points_required, Points::from(20));
        assert_eq!(config.vouchers[0].status, VoucherStatus::Inactive);
        assert_eq!(config.vouchers[0].code, "");
    }

    #[test]
    fn rejects_zero_page_size() {
        let err = LedgerConfig::from_toml_str("page_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_voucher_cost() {
        let err = LedgerConfig::from_toml_str(
            r#"
            [[vouchers]]
            id = "bad"
            title = "Bad"
            points_required = "-5"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = LedgerConfig::from_toml_str(r#"adjustment_policy = "anything_goes""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "redeem_conflict_retries = 5").unwrap();
        let config = LedgerConfig::load(file.path()).unwrap();
        assert_eq!(config.redeem_conflict_retries, 5);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LedgerConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
