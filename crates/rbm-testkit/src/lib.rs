//! Fixtures shared by the reconcile scenario tests.
//!
//! Every helper runs against a [`MemoryStore`] with the built-in rule
//! registry, so scenarios stay deterministic and need no files.

use anyhow::Result;

use rbm_config::PolicyDocument;
use rbm_reconcile::{
    ApplyReport, AuthStore, FlagDefaults, ItemType, LiveItem, NullSink, RawItem, ReconcileError,
    ReconciliationEngine, RecordingSink, RuleRegistry,
};
use rbm_store::MemoryStore;

pub fn role(name: &str) -> LiveItem {
    LiveItem::new(name, ItemType::Role)
}

pub fn perm(name: &str) -> LiveItem {
    LiveItem::new(name, ItemType::Permission)
}

/// Store pre-populated with `items`, no rules or grants.
pub fn seeded_store(items: &[LiveItem]) -> Result<MemoryStore> {
    let mut store = MemoryStore::new();
    for item in items {
        anyhow::ensure!(
            store.add_item(item)?,
            "seed refused {} '{}'",
            item.item_type,
            item.name
        );
    }
    Ok(store)
}

/// Apply with built-in defaults, events discarded. Not transactional.
pub fn apply(store: &mut MemoryStore, forest: &[RawItem]) -> Result<ApplyReport, ReconcileError> {
    ReconciliationEngine::new(store, RuleRegistry::builtin())
        .with_sink(NullSink)
        .apply(forest)
}

/// Apply and keep every emitted event, whether or not the apply succeeds.
pub fn apply_recorded(
    store: &mut MemoryStore,
    forest: &[RawItem],
) -> (Result<ApplyReport, ReconcileError>, RecordingSink) {
    let mut sink = RecordingSink::new();
    let out = ReconciliationEngine::new(store, RuleRegistry::builtin())
        .with_sink(&mut sink)
        .apply(forest);
    (out, sink)
}

/// Apply inside a store transaction: all or nothing.
pub fn apply_atomic(
    store: &mut MemoryStore,
    defaults: &FlagDefaults,
    forest: &[RawItem],
) -> Result<ApplyReport, ReconcileError> {
    store.transaction(|st| {
        ReconciliationEngine::new(st, RuleRegistry::builtin())
            .with_defaults(defaults.clone())
            .with_sink(NullSink)
            .apply(forest)
    })
}

/// Parse a single YAML policy document.
pub fn policy_from_yaml(yaml: &str) -> Result<PolicyDocument> {
    PolicyDocument::from_yaml_str(yaml)
}

/// Apply a YAML policy atomically, honouring its `defaults`.
pub fn apply_yaml(store: &mut MemoryStore, yaml: &str) -> Result<ApplyReport> {
    let policy = policy_from_yaml(yaml)?;
    Ok(apply_atomic(store, &policy.defaults, &policy.privileges)?)
}
