use crate::flags::normalize;
use crate::item::reconcile_item;
use crate::store::require_applied;
use crate::{
    AuthStore, EventSink, FlagDefaults, LiveItem, RawItem, ReconcileError, ReconcileEvent,
    RuleRegistry, StoreOp,
};

/// Ensure the grant edge `parent -> child`, querying before adding.
fn link(
    store: &mut dyn AuthStore,
    parent: &LiveItem,
    child: &LiveItem,
    sink: &mut dyn EventSink,
) -> Result<(), ReconcileError> {
    if store.has_child(parent, child) {
        sink.emit(&ReconcileEvent::ChildAlreadyLinked {
            parent: parent.name.clone(),
            child: child.name.clone(),
            child_type: child.item_type,
        });
        return Ok(());
    }

    require_applied(
        store.add_child(parent, child),
        &child.name,
        Some(child.item_type),
        StoreOp::AddChild {
            parent: parent.name.clone(),
        },
    )?;
    sink.emit(&ReconcileEvent::ChildLinked {
        parent: parent.name.clone(),
        child: child.name.clone(),
        child_type: child.item_type,
    });
    Ok(())
}

/// Depth-first walk over `nodes` in declared order.
///
/// Each node is normalized, reconciled, linked under `parent` when both exist,
/// and then its children are walked with the reconciled item as their parent.
/// Children of an item that ended up absent are still reconciled, just never
/// linked. The first error aborts the walk.
pub fn walk(
    store: &mut dyn AuthStore,
    rules: &RuleRegistry,
    defaults: &FlagDefaults,
    nodes: &[RawItem],
    parent: Option<&LiveItem>,
    sink: &mut dyn EventSink,
) -> Result<(), ReconcileError> {
    for node in nodes {
        let item = normalize(node, defaults, sink)?;
        let current = reconcile_item(store, rules, &item, sink)?;

        if let (Some(parent), Some(child)) = (parent, current.as_ref()) {
            link(store, parent, child, sink)?;
        }

        walk(store, rules, defaults, item.children, current.as_ref(), sink)?;
    }
    Ok(())
}
