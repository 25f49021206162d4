//! Existence-policy state machine for a single item.
//!
//! ```text
//!   desired     | in store | action | outcome
//!   ------------+----------+--------+------------------------------
//!   MUST_EXIST  | no       | -      | PolicyViolation
//!   MUST_EXIST  | yes      | -      | existing item
//!   NEW         | yes      | -      | PolicyViolation
//!   NEW         | no       | create | created item
//!   PRESENT     | no       | create | created item
//!   PRESENT     | yes      | -      | existing item   (replace = false)
//!   PRESENT     | yes      | update | updated item    (replace = true)
//!   ABSENT      | no       | -      | none
//!   ABSENT      | yes      | remove | none
//! ```
//!
//! An update whose result equals the stored item is skipped.

use crate::rules::resolve_rule;
use crate::store::require_applied;
use crate::{
    AuthStore, Ensure, EventSink, ItemType, LiveItem, NormalizedItem, PolicyViolation,
    ReconcileError, ReconcileEvent, RuleRegistry, StoreOp,
};

fn find(store: &dyn AuthStore, item_type: ItemType, name: &str) -> Option<LiveItem> {
    match item_type {
        ItemType::Role => store.get_role(name),
        ItemType::Permission => store.get_permission(name),
    }
}

fn construct(store: &dyn AuthStore, item_type: ItemType, name: &str) -> LiveItem {
    match item_type {
        ItemType::Role => store.create_role(name),
        ItemType::Permission => store.create_permission(name),
    }
}

fn violation(item: &NormalizedItem<'_>, violation: PolicyViolation) -> ReconcileError {
    ReconcileError::PolicyViolation {
        name: item.name.to_string(),
        item_type: item.item_type,
        ensure: item.ensure,
        violation,
    }
}

fn refetch(store: &dyn AuthStore, item: &NormalizedItem<'_>) -> Result<LiveItem, ReconcileError> {
    find(store, item.item_type, item.name).ok_or_else(|| {
        ReconcileError::store(item.name, Some(item.item_type), StoreOp::Refetch, None)
    })
}

/// Copy declared description and rule onto `target`, resolving the rule first.
fn apply_declared_fields(
    store: &mut dyn AuthStore,
    rules: &RuleRegistry,
    item: &NormalizedItem<'_>,
    target: &mut LiveItem,
    sink: &mut dyn EventSink,
) -> Result<(), ReconcileError> {
    if let Some(description) = item.description {
        target.description = Some(description.to_string());
    }
    if let Some(rule) = item.rule {
        let rule_ref = resolve_rule(store, rules, rule, sink)?;
        target.rule_name = Some(rule_ref.name);
    }
    Ok(())
}

fn create(
    store: &mut dyn AuthStore,
    rules: &RuleRegistry,
    item: &NormalizedItem<'_>,
    sink: &mut dyn EventSink,
) -> Result<LiveItem, ReconcileError> {
    let mut fresh = construct(store, item.item_type, item.name);
    apply_declared_fields(store, rules, item, &mut fresh, sink)?;

    require_applied(
        store.add_item(&fresh),
        item.name,
        Some(item.item_type),
        StoreOp::Add,
    )?;
    sink.emit(&ReconcileEvent::Created {
        name: item.name.to_string(),
        item_type: item.item_type,
    });

    refetch(store, item)
}

fn update(
    store: &mut dyn AuthStore,
    rules: &RuleRegistry,
    item: &NormalizedItem<'_>,
    existing: LiveItem,
    sink: &mut dyn EventSink,
) -> Result<LiveItem, ReconcileError> {
    let mut next = existing.clone();
    apply_declared_fields(store, rules, item, &mut next, sink)?;

    if next == existing {
        sink.emit(&ReconcileEvent::Unchanged {
            name: item.name.to_string(),
            item_type: item.item_type,
        });
        return Ok(existing);
    }

    require_applied(
        store.update_item(item.name, &next),
        item.name,
        Some(item.item_type),
        StoreOp::Update,
    )?;
    sink.emit(&ReconcileEvent::Updated {
        name: item.name.to_string(),
        item_type: item.item_type,
    });

    refetch(store, item)
}

/// Bring one item in line with its ensure policy.
///
/// Returns the live item after reconciliation, or `None` when the item is
/// (now) absent.
///
/// # Errors
/// - [`ReconcileError::PolicyViolation`] for MUST_EXIST on a missing item and
///   NEW on an existing one.
/// - [`ReconcileError::Store`] when the store refuses a write.
/// - [`ReconcileError::Config`] from rule resolution.
pub fn reconcile_item(
    store: &mut dyn AuthStore,
    rules: &RuleRegistry,
    item: &NormalizedItem<'_>,
    sink: &mut dyn EventSink,
) -> Result<Option<LiveItem>, ReconcileError> {
    sink.emit(&ReconcileEvent::Processing {
        name: item.name.to_string(),
        item_type: item.item_type,
        ensure: item.ensure,
    });

    let current = find(store, item.item_type, item.name);

    match (item.ensure, current) {
        (Ensure::MustExist, None) => Err(violation(item, PolicyViolation::MustExistButAbsent)),
        (Ensure::New, Some(_)) => Err(violation(item, PolicyViolation::NewButExists)),

        (Ensure::New | Ensure::Present, None) => create(store, rules, item, sink).map(Some),

        (Ensure::Present, Some(existing)) if item.replace => {
            update(store, rules, item, existing, sink).map(Some)
        }

        (Ensure::MustExist | Ensure::Present, Some(existing)) => {
            sink.emit(&ReconcileEvent::Unchanged {
                name: item.name.to_string(),
                item_type: item.item_type,
            });
            Ok(Some(existing))
        }

        (Ensure::Absent, None) => {
            sink.emit(&ReconcileEvent::AlreadyAbsent {
                name: item.name.to_string(),
                item_type: item.item_type,
            });
            Ok(None)
        }

        (Ensure::Absent, Some(existing)) => {
            require_applied(
                store.remove_item(&existing),
                item.name,
                Some(item.item_type),
                StoreOp::Remove,
            )?;
            sink.emit(&ReconcileEvent::Removed {
                name: item.name.to_string(),
                item_type: item.item_type,
            });
            Ok(None)
        }
    }
}
