//! Value shapes held by the coordination store.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

/// One stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Value {
    /// Plain string; integers are stored as their decimal text.
    String(String),
    /// Ordered list with O(1) push/pop at both ends.
    List(VecDeque<String>),
    /// Unordered set of unique members, kept sorted for stable output.
    Set(BTreeSet<String>),
    /// Field to value map.
    Hash(BTreeMap<String, String>),
}

impl Value {
    /// Type name as reported in errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Hash(_) => "hash",
        }
    }

    /// Whether an aggregate has become empty and should be removed.
    #[must_use]
    pub fn is_empty_aggregate(&self) -> bool {
        match self {
            Self::String(_) => false,
            Self::List(l) => l.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::Hash(h) => h.is_empty(),
        }
    }
}

/// A value plus its optional absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Stored value.
    pub value: Value,
    /// Expiry in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl Entry {
    /// Entry without expiry.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self {
            value,
            expires_at_ms: None,
        }
    }

    /// Whether the entry has expired at `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }
}
