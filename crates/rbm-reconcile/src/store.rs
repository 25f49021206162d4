use std::sync::Arc;

use crate::{LiveItem, Rule, RuleRef, StoreFault};

/// Result of a store mutation.
///
/// - `Ok(true)`: applied
/// - `Ok(false)`: refused without a reason
/// - `Err(fault)`: refused, the store's cause is kept for diagnostics
pub type StoreResult<T> = Result<T, StoreFault>;

/// Authorization store the engine reconciles against.
///
/// Every call is blocking and is assumed to run inside an exclusive unit of
/// work owned by the caller. Implementations own [`LiveItem`] state; the
/// engine never caches what it reads.
pub trait AuthStore {
    fn get_role(&self, name: &str) -> Option<LiveItem>;
    fn get_permission(&self, name: &str) -> Option<LiveItem>;
    fn get_rule(&self, name: &str) -> Option<RuleRef>;

    /// In-memory construction only; nothing is persisted until [`AuthStore::add_item`].
    fn create_role(&self, name: &str) -> LiveItem;
    fn create_permission(&self, name: &str) -> LiveItem;

    fn add_item(&mut self, item: &LiveItem) -> StoreResult<bool>;
    fn add_rule(&mut self, rule: Arc<dyn Rule>) -> StoreResult<bool>;

    /// Persist changes to the item currently stored as `name`.
    fn update_item(&mut self, name: &str, item: &LiveItem) -> StoreResult<bool>;
    fn update_rule(&mut self, name: &str, rule: Arc<dyn Rule>) -> StoreResult<bool>;

    fn remove_item(&mut self, item: &LiveItem) -> StoreResult<bool>;

    fn has_child(&self, parent: &LiveItem, child: &LiveItem) -> bool;
    fn add_child(&mut self, parent: &LiveItem, child: &LiveItem) -> StoreResult<bool>;
}

impl<T: AuthStore + ?Sized> AuthStore for &mut T {
    fn get_role(&self, name: &str) -> Option<LiveItem> {
        (**self).get_role(name)
    }

    fn get_permission(&self, name: &str) -> Option<LiveItem> {
        (**self).get_permission(name)
    }

    fn get_rule(&self, name: &str) -> Option<RuleRef> {
        (**self).get_rule(name)
    }

    fn create_role(&self, name: &str) -> LiveItem {
        (**self).create_role(name)
    }

    fn create_permission(&self, name: &str) -> LiveItem {
        (**self).create_permission(name)
    }

    fn add_item(&mut self, item: &LiveItem) -> StoreResult<bool> {
        (**self).add_item(item)
    }

    fn add_rule(&mut self, rule: Arc<dyn Rule>) -> StoreResult<bool> {
        (**self).add_rule(rule)
    }

    fn update_item(&mut self, name: &str, item: &LiveItem) -> StoreResult<bool> {
        (**self).update_item(name, item)
    }

    fn update_rule(&mut self, name: &str, rule: Arc<dyn Rule>) -> StoreResult<bool> {
        (**self).update_rule(name, rule)
    }

    fn remove_item(&mut self, item: &LiveItem) -> StoreResult<bool> {
        (**self).remove_item(item)
    }

    fn has_child(&self, parent: &LiveItem, child: &LiveItem) -> bool {
        (**self).has_child(parent, child)
    }

    fn add_child(&mut self, parent: &LiveItem, child: &LiveItem) -> StoreResult<bool> {
        (**self).add_child(parent, child)
    }
}

/// Turn a store mutation result into a reconcile error unless it was applied.
pub(crate) fn require_applied(
    result: StoreResult<bool>,
    name: &str,
    item_type: Option<crate::ItemType>,
    op: crate::StoreOp,
) -> Result<(), crate::ReconcileError> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(crate::ReconcileError::store(name, item_type, op, None)),
        Err(fault) => Err(crate::ReconcileError::store(name, item_type, op, Some(fault))),
    }
}
