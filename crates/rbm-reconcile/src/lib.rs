//! rbm-reconcile
//!
//! Policy tree reconciliation engine.
//!
//! Architectural decisions:
//! - Every item carries an ensure policy: NEW, PRESENT, MUST_EXIST, ABSENT
//! - Live state is re-queried from the store at every step (no caching)
//! - Grant edges are applied one by one while walking, never batched
//! - First error aborts the whole apply; rollback belongs to the caller's unit of work
//! - Rules are resolved through a registry of named factories
//!
//! Deterministic, synchronous logic. The store and the event sink are the only
//! side-effect surfaces.

mod engine;
mod error;
mod events;
mod flags;
mod item;
mod rules;
mod store;
mod types;
mod walker;

pub use engine::{ApplyReport, ReconciliationEngine};
pub use error::{ConfigError, PolicyViolation, ReconcileError, StoreFault, StoreOp};
pub use events::{
    DeprecatedFlag, EventSink, NullSink, ReconcileEvent, RecordingSink, TracingSink,
};
pub use flags::{normalize, FlagDefaults};
pub use item::reconcile_item;
pub use rules::{
    resolve_rule, DenyRule, OwnerRule, Rule, RuleFactory, RuleRegistry, RuleRegistryError,
};
pub use store::{AuthStore, StoreResult};
pub use types::*;
pub use walker::walk;
