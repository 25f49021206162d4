//! Deterministic in-memory authorization store.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - Roles and permissions share one name namespace.
//! - BTreeMap/BTreeSet everywhere, so iteration and snapshots are stable.
//! - No randomness. No timestamps.
//! - Grant edges refuse self-links, roles under permissions and cycles.
//! - Rules are held as live instances and persisted as `(name, class)` pairs;
//!   loading rebuilds them through a [`RuleRegistry`].
//!
//! The store has no built-in unit of work. [`MemoryStore::transaction`] gives
//! callers all-or-nothing semantics around a reconcile pass.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::debug;

use rbm_reconcile::{
    AuthStore, ItemType, LiveItem, Rule, RuleRef, RuleRegistry, StoreFault, StoreOp, StoreResult,
};

mod snapshot;

pub use snapshot::{Grant, StoreSnapshot};

#[derive(Clone, Debug, Default)]
struct State {
    items: BTreeMap<String, LiveItem>,
    rules: BTreeMap<String, Arc<dyn Rule>>,
    edges: BTreeSet<(String, String)>, // (parent, child)
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum FaultMode {
    Error(String),
    Refuse,
}

/// Test hook: makes one operation on one name fail until cleared.
#[derive(Clone, Debug)]
struct InjectedFault {
    op: &'static str,
    name: String,
    mode: FaultMode,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: State,
    faults: Vec<InjectedFault>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.state.items.is_empty() && self.state.rules.is_empty()
    }

    pub fn item(&self, name: &str) -> Option<&LiveItem> {
        self.state.items.get(name)
    }

    pub fn rule(&self, name: &str) -> Option<Arc<dyn Rule>> {
        self.state.rules.get(name).cloned()
    }

    /// Direct children of `parent`, sorted by name.
    pub fn children(&self, parent: &str) -> Vec<&str> {
        self.state
            .edges
            .iter()
            .filter(|(p, _)| p == parent)
            .map(|(_, c)| c.as_str())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Unit of work
    // -----------------------------------------------------------------------

    /// Run `f` against the store; restore the prior state if it fails.
    ///
    /// Injected faults are not part of the restored state.
    pub fn transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let saved = self.state.clone();
        let out = f(self);
        if out.is_err() {
            self.state = saved;
            debug!("store transaction rolled back");
        }
        out
    }

    // -----------------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------------

    /// Fail `op` on `name` with a fault carrying `message`.
    ///
    /// For [`StoreOp::AddChild`] the name matched is the child's.
    pub fn inject_fault(&mut self, op: StoreOp, name: impl Into<String>, message: impl Into<String>) {
        self.faults.push(InjectedFault {
            op: op.as_str(),
            name: name.into(),
            mode: FaultMode::Error(message.into()),
        });
    }

    /// Refuse `op` on `name` without giving a reason.
    pub fn inject_refusal(&mut self, op: StoreOp, name: impl Into<String>) {
        self.faults.push(InjectedFault {
            op: op.as_str(),
            name: name.into(),
            mode: FaultMode::Refuse,
        });
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    fn fault_for(&self, op: &StoreOp, name: &str) -> Option<StoreResult<bool>> {
        self.faults
            .iter()
            .find(|f| f.op == op.as_str() && f.name == name)
            .map(|f| match &f.mode {
                FaultMode::Error(msg) => Err(StoreFault::new(msg.clone())),
                FaultMode::Refuse => Ok(false),
            })
    }

    // -----------------------------------------------------------------------
    // Constraints
    // -----------------------------------------------------------------------

    fn check_rule_ref(&self, item: &LiveItem) -> StoreResult<()> {
        match &item.rule_name {
            Some(rule) if !self.state.rules.contains_key(rule) => Err(StoreFault::new(format!(
                "{} '{}' references unknown rule '{rule}'",
                item.item_type, item.name
            ))),
            _ => Ok(()),
        }
    }

    /// `true` when `to` is reachable from `from` along grant edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            stack.extend(
                self.state
                    .edges
                    .iter()
                    .filter(|(p, _)| p == node)
                    .map(|(_, c)| c.as_str()),
            );
        }
        false
    }

    // -----------------------------------------------------------------------
    // Access checks
    // -----------------------------------------------------------------------

    /// Whether `subject`, holding the `assignments` roles, is granted `item`.
    ///
    /// Walks from `item` up through its parents until an assigned item is
    /// reached. Every item on the path must pass its rule, if it has one.
    pub fn check_access(
        &self,
        subject: &str,
        assignments: &[&str],
        item: &str,
        params: &Value,
    ) -> bool {
        let Some(live) = self.state.items.get(item) else {
            return false;
        };
        if let Some(rule_name) = &live.rule_name {
            match self.state.rules.get(rule_name) {
                Some(rule) if rule.execute(subject, live, params) => {}
                _ => return false,
            }
        }
        if assignments.contains(&item) {
            return true;
        }
        self.state
            .edges
            .iter()
            .filter(|(_, c)| c == item)
            .any(|(p, _)| self.check_access(subject, assignments, p, params))
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            items: self.state.items.values().cloned().collect(),
            rules: self
                .state
                .rules
                .values()
                .map(|r| RuleRef::new(r.name(), r.class()))
                .collect(),
            grants: self
                .state
                .edges
                .iter()
                .map(|(p, c)| Grant::new(p.clone(), c.clone()))
                .collect(),
        }
    }

    /// Rebuild a store from a snapshot, re-validating every constraint.
    pub fn from_snapshot(snap: &StoreSnapshot, registry: &RuleRegistry) -> Result<Self> {
        let mut store = Self::new();

        for r in &snap.rules {
            let rule = registry
                .instantiate_verified(&r.class, &r.name)
                .with_context(|| format!("rehydrate rule '{}'", r.name))?;
            store
                .add_rule(rule)
                .with_context(|| format!("load rule '{}'", r.name))?;
        }

        for item in &snap.items {
            store
                .add_item(item)
                .with_context(|| format!("load {} '{}'", item.item_type, item.name))?;
        }

        for g in &snap.grants {
            let (Some(parent), Some(child)) = (
                store.state.items.get(&g.parent).cloned(),
                store.state.items.get(&g.child).cloned(),
            ) else {
                bail!("grant {} -> {} references an unknown item", g.parent, g.child);
            };
            store
                .add_child(&parent, &child)
                .with_context(|| format!("load grant {} -> {}", g.parent, g.child))?;
        }

        Ok(store)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let body = serde_json::to_string_pretty(&self.snapshot()).context("serialize store")?;
        std::fs::write(path, body + "\n")
            .with_context(|| format!("write store: {}", path.display()))?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>, registry: &RuleRegistry) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("read store: {}", path.display()))?;
        let snap: StoreSnapshot = serde_json::from_str(&body)
            .with_context(|| format!("parse store json: {}", path.display()))?;
        Self::from_snapshot(&snap, registry)
    }

    /// Like [`MemoryStore::load_json`], but a missing file yields an empty store.
    pub fn load_or_empty(path: impl AsRef<Path>, registry: &RuleRegistry) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "store file missing; starting empty");
            return Ok(Self::new());
        }
        Self::load_json(path, registry)
    }
}

impl AuthStore for MemoryStore {
    fn get_role(&self, name: &str) -> Option<LiveItem> {
        self.state
            .items
            .get(name)
            .filter(|i| i.item_type == ItemType::Role)
            .cloned()
    }

    fn get_permission(&self, name: &str) -> Option<LiveItem> {
        self.state
            .items
            .get(name)
            .filter(|i| i.item_type == ItemType::Permission)
            .cloned()
    }

    fn get_rule(&self, name: &str) -> Option<RuleRef> {
        self.state
            .rules
            .get(name)
            .map(|r| RuleRef::new(r.name(), r.class()))
    }

    fn create_role(&self, name: &str) -> LiveItem {
        LiveItem::new(name, ItemType::Role)
    }

    fn create_permission(&self, name: &str) -> LiveItem {
        LiveItem::new(name, ItemType::Permission)
    }

    fn add_item(&mut self, item: &LiveItem) -> StoreResult<bool> {
        if let Some(r) = self.fault_for(&StoreOp::Add, &item.name) {
            return r;
        }
        if let Some(existing) = self.state.items.get(&item.name) {
            return Err(StoreFault::new(format!(
                "name '{}' is already used by a {}",
                item.name, existing.item_type
            )));
        }
        self.check_rule_ref(item)?;

        self.state.items.insert(item.name.clone(), item.clone());
        debug!(name = %item.name, item_type = %item.item_type, "store: item added");
        Ok(true)
    }

    fn add_rule(&mut self, rule: Arc<dyn Rule>) -> StoreResult<bool> {
        if let Some(r) = self.fault_for(&StoreOp::AddRule, rule.name()) {
            return r;
        }
        if self.state.rules.contains_key(rule.name()) {
            return Err(StoreFault::new(format!(
                "rule '{}' already exists",
                rule.name()
            )));
        }
        debug!(rule = rule.name(), class = rule.class(), "store: rule added");
        self.state.rules.insert(rule.name().to_string(), rule);
        Ok(true)
    }

    fn update_item(&mut self, name: &str, item: &LiveItem) -> StoreResult<bool> {
        if let Some(r) = self.fault_for(&StoreOp::Update, name) {
            return r;
        }
        let Some(existing) = self.state.items.get(name) else {
            return Err(StoreFault::new(format!("no item named '{name}'")));
        };
        if item.name != name {
            return Err(StoreFault::new(format!(
                "cannot rename '{name}' to '{}'",
                item.name
            )));
        }
        if existing.item_type != item.item_type {
            return Err(StoreFault::new(format!(
                "cannot turn {} '{name}' into a {}",
                existing.item_type, item.item_type
            )));
        }
        self.check_rule_ref(item)?;

        self.state.items.insert(item.name.clone(), item.clone());
        debug!(name = %item.name, item_type = %item.item_type, "store: item updated");
        Ok(true)
    }

    fn update_rule(&mut self, name: &str, rule: Arc<dyn Rule>) -> StoreResult<bool> {
        if let Some(r) = self.fault_for(&StoreOp::UpdateRule, name) {
            return r;
        }
        if !self.state.rules.contains_key(name) {
            return Err(StoreFault::new(format!("no rule named '{name}'")));
        }
        if rule.name() != name {
            return Err(StoreFault::new(format!(
                "rule '{name}' cannot be replaced by '{}'",
                rule.name()
            )));
        }
        debug!(rule = name, class = rule.class(), "store: rule replaced");
        self.state.rules.insert(name.to_string(), rule);
        Ok(true)
    }

    fn remove_item(&mut self, item: &LiveItem) -> StoreResult<bool> {
        if let Some(r) = self.fault_for(&StoreOp::Remove, &item.name) {
            return r;
        }
        if self.state.items.remove(&item.name).is_none() {
            return Ok(false);
        }
        self.state
            .edges
            .retain(|(p, c)| p != &item.name && c != &item.name);
        debug!(name = %item.name, item_type = %item.item_type, "store: item removed");
        Ok(true)
    }

    fn has_child(&self, parent: &LiveItem, child: &LiveItem) -> bool {
        self.state
            .edges
            .contains(&(parent.name.clone(), child.name.clone()))
    }

    fn add_child(&mut self, parent: &LiveItem, child: &LiveItem) -> StoreResult<bool> {
        let op = StoreOp::AddChild {
            parent: parent.name.clone(),
        };
        if let Some(r) = self.fault_for(&op, &child.name) {
            return r;
        }
        for it in [parent, child] {
            if !self.state.items.contains_key(&it.name) {
                return Err(StoreFault::new(format!(
                    "{} '{}' is not in the store",
                    it.item_type, it.name
                )));
            }
        }
        if parent.name == child.name {
            return Err(StoreFault::new(format!(
                "cannot add '{}' as a child of itself",
                parent.name
            )));
        }
        if parent.item_type == ItemType::Permission && child.item_type == ItemType::Role {
            return Err(StoreFault::new(format!(
                "cannot add role '{}' as a child of permission '{}'",
                child.name, parent.name
            )));
        }
        if self.has_child(parent, child) {
            return Err(StoreFault::new(format!(
                "'{}' is already a child of '{}'",
                child.name, parent.name
            )));
        }
        if self.reaches(&child.name, &parent.name) {
            return Err(StoreFault::new(format!(
                "cannot add '{}' as a child of '{}': a loop would be created",
                child.name, parent.name
            )));
        }

        self.state
            .edges
            .insert((parent.name.clone(), child.name.clone()));
        debug!(parent = %parent.name, child = %child.name, "store: child added");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbm_reconcile::OwnerRule;
    use serde_json::json;

    fn role(name: &str) -> LiveItem {
        LiveItem::new(name, ItemType::Role)
    }

    fn perm(name: &str) -> LiveItem {
        LiveItem::new(name, ItemType::Permission)
    }

    fn store_with(items: &[LiveItem]) -> MemoryStore {
        let mut s = MemoryStore::new();
        for i in items {
            s.add_item(i).unwrap();
        }
        s
    }

    #[test]
    fn roles_and_permissions_share_one_namespace() {
        let mut s = store_with(&[role("admin")]);
        let err = s.add_item(&perm("admin")).unwrap_err();
        assert_eq!(err.message, "name 'admin' is already used by a role");
        assert!(s.get_permission("admin").is_none());
        assert!(s.get_role("admin").is_some());
    }

    #[test]
    fn add_child_rejects_self_link_role_under_permission_and_loops() {
        let mut s = store_with(&[role("a"), role("b"), perm("p")]);
        assert!(s.add_child(&role("a"), &role("a")).is_err());
        assert!(s.add_child(&perm("p"), &role("a")).is_err());

        assert_eq!(s.add_child(&role("a"), &role("b")), Ok(true));
        let err = s.add_child(&role("b"), &role("a")).unwrap_err();
        assert!(err.message.contains("loop"));
        assert_eq!(s.children("a"), ["b"]);
        assert!(s.children("b").is_empty());
    }

    #[test]
    fn removing_an_item_drops_its_edges() {
        let mut s = store_with(&[role("a"), role("b"), perm("p")]);
        s.add_child(&role("a"), &role("b")).unwrap();
        s.add_child(&role("b"), &perm("p")).unwrap();

        assert_eq!(s.remove_item(&role("b")), Ok(true));
        assert!(s.children("a").is_empty());
        assert!(s.snapshot().grants.is_empty());
        assert_eq!(s.remove_item(&role("b")), Ok(false));
    }

    #[test]
    fn item_with_unknown_rule_is_refused() {
        let mut s = MemoryStore::new();
        let mut p = perm("updateOwnPost");
        p.rule_name = Some("isAuthor".to_string());
        assert!(s.add_item(&p).is_err());

        s.add_rule(Arc::new(OwnerRule::new("isAuthor"))).unwrap();
        assert_eq!(s.add_item(&p), Ok(true));
    }

    #[test]
    fn update_refuses_rename_and_type_change() {
        let mut s = store_with(&[role("a"), perm("old")]);
        s.add_child(&role("a"), &perm("old")).unwrap();

        let err = s.update_item("old", &perm("new")).unwrap_err();
        assert_eq!(err.message, "cannot rename 'old' to 'new'");
        assert!(s.item("new").is_none());
        assert_eq!(s.children("a"), ["old"]);

        assert!(s.update_item("old", &role("old")).is_err());

        let mut described = perm("old");
        described.description = Some("kept".to_string());
        assert_eq!(s.update_item("old", &described), Ok(true));
        assert_eq!(s.children("a"), ["old"]);
    }

    #[test]
    fn transaction_restores_state_on_error() {
        let mut s = store_with(&[role("keep")]);
        let out: std::result::Result<(), &str> = s.transaction(|st| {
            st.add_item(&role("temp")).unwrap();
            st.remove_item(&role("keep")).unwrap();
            Err("boom")
        });
        assert_eq!(out, Err("boom"));
        assert!(s.item("keep").is_some());
        assert!(s.item("temp").is_none());
    }

    #[test]
    fn transaction_keeps_state_on_success() {
        let mut s = MemoryStore::new();
        let out: std::result::Result<bool, ()> =
            s.transaction(|st| Ok(st.add_item(&role("x")).unwrap()));
        assert_eq!(out, Ok(true));
        assert!(s.item("x").is_some());
    }

    #[test]
    fn injected_faults_fire_until_cleared() {
        let mut s = MemoryStore::new();
        s.inject_fault(StoreOp::Add, "x", "disk full");
        s.inject_refusal(StoreOp::Add, "y");

        assert_eq!(
            s.add_item(&role("x")),
            Err(StoreFault::new("disk full"))
        );
        assert_eq!(s.add_item(&role("y")), Ok(false));
        assert_eq!(s.add_item(&role("z")), Ok(true));

        s.clear_faults();
        assert_eq!(s.add_item(&role("x")), Ok(true));
    }

    #[test]
    fn check_access_walks_up_and_evaluates_rules() {
        let mut s = MemoryStore::new();
        s.add_rule(Arc::new(OwnerRule::new("isAuthor"))).unwrap();
        let mut own = perm("updateOwnPost");
        own.rule_name = Some("isAuthor".to_string());
        for i in [role("author"), own.clone(), perm("updatePost")] {
            s.add_item(&i).unwrap();
        }
        s.add_child(&role("author"), &own).unwrap();
        s.add_child(&own, &perm("updatePost")).unwrap();

        let mine = json!({"owner": "alice"});
        assert!(s.check_access("alice", &["author"], "updatePost", &mine));
        assert!(!s.check_access("bob", &["author"], "updatePost", &mine));
        assert!(!s.check_access("alice", &[], "updatePost", &mine));
        assert!(!s.check_access("alice", &["author"], "missing", &mine));
    }

    #[test]
    fn save_then_load_preserves_snapshot() {
        let mut s = MemoryStore::new();
        s.add_rule(Arc::new(OwnerRule::new("isAuthor"))).unwrap();
        let mut own = perm("updateOwnPost");
        own.rule_name = Some("isAuthor".to_string());
        own.description = Some("Update own post".to_string());
        s.add_item(&role("author")).unwrap();
        s.add_item(&own).unwrap();
        s.add_child(&role("author"), &own).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        s.save_json(&path).unwrap();

        let loaded = MemoryStore::load_json(&path, &RuleRegistry::builtin()).unwrap();
        assert_eq!(loaded.snapshot(), s.snapshot());
        assert_eq!(loaded.rule("isAuthor").unwrap().class(), "owner");
    }

    #[test]
    fn load_fails_for_unregistered_rule_class() {
        let snap = StoreSnapshot {
            rules: vec![RuleRef::new("r", "ghost")],
            ..StoreSnapshot::default()
        };
        let err = MemoryStore::from_snapshot(&snap, &RuleRegistry::builtin()).unwrap_err();
        assert!(format!("{err:#}").contains("ghost"));
    }

    #[test]
    fn load_or_empty_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let s = MemoryStore::load_or_empty(dir.path().join("nope.json"), &RuleRegistry::builtin())
            .unwrap();
        assert!(s.is_empty());
    }
}
