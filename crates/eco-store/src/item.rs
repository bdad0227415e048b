use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Composite primary key: partition key plus sort key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub partition: String,
    pub sort: String,
}

impl ItemKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

impl fmt::Debug for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemKey({}/{})", self.partition, self.sort)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.sort)
    }
}

/// A stored attribute. Numbers are exact decimals, never floats.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(Decimal),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::S(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::S(value)
    }
}

impl From<Decimal> for AttributeValue {
    fn from(value: Decimal) -> Self {
        Self::N(value)
    }
}

/// A stored item: its key plus a flat attribute map.
///
/// The store never interprets attributes except for `Add` increments and
/// `AttributeEquals` conditions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub key: ItemKey,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Item {
    pub fn new(key: ItemKey) -> Self {
        Self {
            key,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Set an attribute only when a value is present.
    pub fn with_opt(self, name: &str, value: Option<impl Into<AttributeValue>>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn get_s(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(AttributeValue::S(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_n(&self, name: &str) -> Option<Decimal> {
        match self.attributes.get(name) {
            Some(AttributeValue::N(n)) => Some(*n),
            _ => None,
        }
    }

    /// String attribute that must be present.
    pub fn require_s(&self, name: &str) -> StoreResult<&str> {
        self.get_s(name)
            .ok_or_else(|| StoreError::corrupt(&self.key, format!("missing string attribute {name}")))
    }

    /// Numeric attribute that must be present.
    pub fn require_n(&self, name: &str) -> StoreResult<Decimal> {
        self.get_n(name)
            .ok_or_else(|| StoreError::corrupt(&self.key, format!("missing number attribute {name}")))
    }
}

/// Precondition attached to a write.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Condition {
    /// Unconditional.
    #[default]
    None,
    /// The item must not exist yet (create-only).
    ItemAbsent,
    /// The item must exist.
    ItemExists,
    /// The item must exist and carry exactly this attribute value.
    AttributeEquals { name: String, value: AttributeValue },
}

impl Condition {
    pub fn attribute_equals(name: &str, value: impl Into<AttributeValue>) -> Self {
        Self::AttributeEquals {
            name: name.to_string(),
            value: value.into(),
        }
    }

    /// Evaluate against the current stored state of the item.
    pub fn holds(&self, current: Option<&Item>) -> bool {
        match self {
            Self::None => true,
            Self::ItemAbsent => current.is_none(),
            Self::ItemExists => current.is_some(),
            Self::AttributeEquals { name, value } => {
                current.and_then(|item| item.get(name)) == Some(value)
            }
        }
    }
}

/// One operation of a multi-item transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactOp {
    /// Write the whole item.
    Put { item: Item, condition: Condition },
    /// Upsert: add to numeric attributes (missing counts as zero) and set
    /// the listed attributes. Creates the item if it does not exist.
    Add {
        key: ItemKey,
        increments: Vec<(String, Decimal)>,
        set: Vec<(String, AttributeValue)>,
        condition: Condition,
    },
    /// Check a condition without writing.
    ConditionCheck { key: ItemKey, condition: Condition },
}

impl TransactOp {
    pub fn key(&self) -> &ItemKey {
        match self {
            Self::Put { item, .. } => &item.key,
            Self::Add { key, .. } | Self::ConditionCheck { key, .. } => key,
        }
    }

    pub fn condition(&self) -> &Condition {
        match self {
            Self::Put { condition, .. }
            | Self::Add { condition, .. }
            | Self::ConditionCheck { condition, .. } => condition,
        }
    }

    /// Apply to the current state. `None` means the item is left as is.
    pub(crate) fn apply(&self, current: Option<&Item>) -> StoreResult<Option<Item>> {
        match self {
            Self::Put { item, .. } => Ok(Some(item.clone())),
            Self::Add {
                key,
                increments,
                set,
                ..
            } => {
                let mut next = current.cloned().unwrap_or_else(|| Item::new(key.clone()));
                for (name, delta) in increments {
                    let base = match next.get(name) {
                        None => Decimal::ZERO,
                        Some(AttributeValue::N(n)) => *n,
                        Some(AttributeValue::S(_)) => {
                            return Err(StoreError::InvalidTransaction(format!(
                                "cannot add to string attribute {name} of {key}"
                            )))
                        }
                    };
                    let sum = base.checked_add(*delta).ok_or_else(|| {
                        StoreError::InvalidTransaction(format!("adding {delta} to {name} of {key} overflows"))
                    })?;
                    next.attributes.insert(name.clone(), AttributeValue::N(sum));
                }
                for (name, value) in set {
                    next.attributes.insert(name.clone(), value.clone());
                }
                Ok(Some(next))
            }
            Self::ConditionCheck { .. } => Ok(None),
        }
    }
}

/// Range query over a single partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionQuery {
    pub partition: String,
    /// Only return items whose sort key starts with this prefix.
    pub sort_prefix: Option<String>,
    /// Exclusive start: continue after this sort key.
    pub start_after: Option<String>,
    /// Page size hint; backends may return fewer items.
    pub limit: Option<usize>,
}

impl PartitionQuery {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort_prefix: None,
            start_after: None,
            limit: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_prefix = Some(prefix.into());
        self
    }

    pub fn starting_after(mut self, sort: impl Into<String>) -> Self {
        self.start_after = Some(sort.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of a partition query, in ascending sort-key order.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Page {
    pub items: Vec<Item>,
    /// Sort key to resume after; `None` once the partition is exhausted.
    pub next: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn head(version: Decimal) -> Item {
        Item::new(ItemKey::new("USER#a", "HEAD")).with("Version", version)
    }

    #[test]
    fn builder_and_getters() {
        let item = Item::new(ItemKey::new("USER#a", "TXN#1"))
            .with("Status", "approved")
            .with("PointsEarned", dec!(2.5))
            .with_opt("AdminID", None::<String>);
        assert_eq!(item.get_s("Status"), Some("approved"));
        assert_eq!(item.get_n("PointsEarned"), Some(dec!(2.5)));
        assert_eq!(item.get_s("PointsEarned"), None);
        assert!(item.get("AdminID").is_none());
        assert!(matches!(
            item.require_n("PointsSpent"),
            Err(StoreError::CorruptItem { .. })
        ));
    }

    #[test]
    fn conditions_evaluate_against_current_state() {
        let current = head(dec!(3));
        assert!(Condition::None.holds(None));
        assert!(Condition::ItemAbsent.holds(None));
        assert!(!Condition::ItemAbsent.holds(Some(&current)));
        assert!(Condition::ItemExists.holds(Some(&current)));
        assert!(Condition::attribute_equals("Version", dec!(3)).holds(Some(&current)));
        assert!(!Condition::attribute_equals("Version", dec!(4)).holds(Some(&current)));
        assert!(!Condition::attribute_equals("Version", dec!(3)).holds(None));
    }

    #[test]
    fn add_upserts_and_accumulates() {
        let key = ItemKey::new("USER#a", "PROFILE");
        let op = TransactOp::Add {
            key: key.clone(),
            increments: vec![("TotalPoints".into(), dec!(25))],
            set: vec![("UpdatedAt".into(), "t1".into())],
            condition: Condition::None,
        };
        let created = op.apply(None).unwrap().unwrap();
        assert_eq!(created.get_n("TotalPoints"), Some(dec!(25)));

        let again = op.apply(Some(&created)).unwrap().unwrap();
        assert_eq!(again.get_n("TotalPoints"), Some(dec!(50)));
        assert_eq!(again.get_s("UpdatedAt"), Some("t1"));
    }

    #[test]
    fn add_rejects_string_target() {
        let key = ItemKey::new("USER#a", "PROFILE");
        let current = Item::new(key.clone()).with("TotalPoints", "oops");
        let op = TransactOp::Add {
            key,
            increments: vec![("TotalPoints".into(), dec!(1))],
            set: vec![],
            condition: Condition::None,
        };
        assert!(matches!(
            op.apply(Some(&current)),
            Err(StoreError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn add_overflow_is_rejected() {
        let key = ItemKey::new("USER#a", "PROFILE");
        let current = Item::new(key.clone()).with("TotalPoints", Decimal::MAX);
        let op = TransactOp::Add {
            key,
            increments: vec![("TotalPoints".into(), dec!(1))],
            set: vec![],
            condition: Condition::None,
        };
        assert!(matches!(
            op.apply(Some(&current)),
            Err(StoreError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn item_serde_keeps_decimals_exact() {
        let item = head(dec!(0.1));
        let json = serde_json::to_string(&item).unwrap();
        let parsed: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, item);
    }
}
