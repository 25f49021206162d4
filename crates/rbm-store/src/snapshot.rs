use serde::{Deserialize, Serialize};

use rbm_reconcile::{LiveItem, RuleRef};

/// Grant edge: `parent` grants everything `child` grants.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grant {
    pub parent: String,
    pub child: String,
}

impl Grant {
    pub fn new(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }
}

/// Serializable view of a [`crate::MemoryStore`].
///
/// Every list is sorted by name, so two stores holding the same state
/// produce equal snapshots and byte-identical JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub items: Vec<LiveItem>,
    #[serde(default)]
    pub rules: Vec<RuleRef>,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl StoreSnapshot {
    pub fn item(&self, name: &str) -> Option<&LiveItem> {
        self.items.iter().find(|i| i.name == name)
    }

    pub fn children_of(&self, parent: &str) -> Vec<&str> {
        self.grants
            .iter()
            .filter(|g| g.parent == parent)
            .map(|g| g.child.as_str())
            .collect()
    }
}
