use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::temporal::{wall_clock_ms, TemporalAnchor};

/// Sort-key prefix shared by every ledger entry in an owner's partition.
pub const SEQUENCE_PREFIX: &str = "TXN#";

/// Sort key of a ledger entry.
///
/// Layout: `TXN#<physical_ms:013>.<logical:010>.<node:04x>#<TAG>`. The
/// zero-padded anchor comes first so that lexicographic order of the keys is
/// the anchor order; the tag records the entry type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SequenceKey {
    anchor: TemporalAnchor,
    tag: String,
}

impl SequenceKey {
    /// Build a key. The tag must be non-empty and must not contain `#`.
    pub fn new(anchor: TemporalAnchor, tag: impl Into<String>) -> Result<Self, TypeError> {
        let tag = tag.into();
        if tag.is_empty() || tag.contains('#') {
            return Err(TypeError::InvalidSequenceKey {
                key: tag,
                reason: "tag must be non-empty and free of '#'".into(),
            });
        }
        Ok(Self { anchor, tag })
    }

    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidSequenceKey {
            key: raw.to_string(),
            reason: reason.to_string(),
        };

        let body = raw
            .strip_prefix(SEQUENCE_PREFIX)
            .ok_or_else(|| invalid("missing TXN# prefix"))?;
        let (stamp, tag) = body.split_once('#').ok_or_else(|| invalid("missing tag"))?;

        let mut parts = stamp.split('.');
        let (Some(physical), Some(logical), Some(node), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected physical.logical.node"));
        };

        let anchor = TemporalAnchor::new(
            physical.parse().map_err(|_| invalid("bad physical component"))?,
            logical.parse().map_err(|_| invalid("bad logical component"))?,
            u16::from_str_radix(node, 16).map_err(|_| invalid("bad node component"))?,
        );
        Self::new(anchor, tag)
    }

    pub fn anchor(&self) -> TemporalAnchor {
        self.anchor
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SEQUENCE_PREFIX}{:013}.{:010}.{:04x}#{}",
            self.anchor.physical_ms, self.anchor.logical, self.anchor.node_id, self.tag
        )
    }
}

impl TryFrom<String> for SequenceKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SequenceKey> for String {
    fn from(key: SequenceKey) -> Self {
        key.to_string()
    }
}

struct ClockState {
    physical_ms: u64,
    logical: u32,
}

/// Monotonic anchor source for new ledger entries.
///
/// A hybrid logical clock: every call to [`SequenceClock::next`] returns an
/// anchor strictly greater than any anchor previously returned or observed,
/// even when many entries are created inside the same millisecond.
pub struct SequenceClock {
    node_id: u16,
    state: Mutex<ClockState>,
}

impl SequenceClock {
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id,
            state: Mutex::new(ClockState {
                physical_ms: 0,
                logical: 0,
            }),
        }
    }

    pub fn node_id(&self) -> u16 {
        self.node_id
    }

    /// Next anchor for a locally created entry.
    pub fn next(&self) -> TemporalAnchor {
        let wall = wall_clock_ms();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let physical = wall.max(state.physical_ms);
        let logical = if physical > state.physical_ms {
            0
        } else {
            state.logical.saturating_add(1)
        };

        state.physical_ms = physical;
        state.logical = logical;
        TemporalAnchor::new(physical, logical, self.node_id)
    }

    /// Fold in an anchor read from the store so later keys sort after it.
    pub fn observe(&self, seen: &TemporalAnchor) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if seen.physical_ms > state.physical_ms
            || (seen.physical_ms == state.physical_ms && seen.logical > state.logical)
        {
            state.physical_ms = seen.physical_ms;
            state.logical = seen.logical;
        }
    }
}

impl fmt::Debug for SequenceClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceClock")
            .field("node_id", &self.node_id)
            .finish()
    }
}
