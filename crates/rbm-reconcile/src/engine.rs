use serde::Serialize;

use crate::walker::walk;
use crate::{
    AuthStore, EventSink, FlagDefaults, RawItem, ReconcileError, ReconcileEvent, RuleRegistry,
    TracingSink,
};

/// Summary of one successful apply, tallied from the event stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub already_absent: usize,
    pub linked: usize,
    pub already_linked: usize,
    pub rules_created: usize,
    pub rules_replaced: usize,
    pub deprecated_flags: usize,
}

impl ApplyReport {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ReconcileEvent>) -> Self {
        let mut report = Self::default();
        for ev in events {
            report.emit(ev);
        }
        report
    }

    /// Item, grant and rule writes. Rule replacements rewrite an existing rule
    /// in place and are not counted.
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.removed + self.linked + self.rules_created
    }

    /// `true` when the apply did not change items, grants or rule set.
    pub fn is_noop(&self) -> bool {
        self.changes() == 0
    }
}

impl EventSink for ApplyReport {
    fn emit(&mut self, event: &ReconcileEvent) {
        match event {
            ReconcileEvent::Processing { .. } => self.processed += 1,
            ReconcileEvent::Created { .. } => self.created += 1,
            ReconcileEvent::Updated { .. } => self.updated += 1,
            ReconcileEvent::Unchanged { .. } => self.unchanged += 1,
            ReconcileEvent::Removed { .. } => self.removed += 1,
            ReconcileEvent::AlreadyAbsent { .. } => self.already_absent += 1,
            ReconcileEvent::ChildLinked { .. } => self.linked += 1,
            ReconcileEvent::ChildAlreadyLinked { .. } => self.already_linked += 1,
            ReconcileEvent::RuleCreated { .. } => self.rules_created += 1,
            ReconcileEvent::RuleReplaced { .. } => self.rules_replaced += 1,
            ReconcileEvent::RuleUnchanged { .. } => {}
            ReconcileEvent::DeprecatedFlag { .. } => self.deprecated_flags += 1,
        }
    }
}

/// Top-level entry point: owns the store handle, the rule registry, the
/// migration-level default flags and the event sink.
///
/// The engine runs exactly one depth-first pass per [`apply`](Self::apply)
/// call. It does not roll anything back; wrap the call in the store's unit of
/// work if all-or-nothing semantics are needed.
pub struct ReconciliationEngine<S, E = TracingSink> {
    store: S,
    rules: RuleRegistry,
    defaults: FlagDefaults,
    sink: E,
}

impl<S: AuthStore> ReconciliationEngine<S, TracingSink> {
    pub fn new(store: S, rules: RuleRegistry) -> Self {
        Self {
            store,
            rules,
            defaults: FlagDefaults::default(),
            sink: TracingSink,
        }
    }
}

impl<S: AuthStore, E: EventSink> ReconciliationEngine<S, E> {
    /// Migration-level defaults, layered over the built-in ones.
    pub fn with_defaults(mut self, defaults: FlagDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_sink<E2: EventSink>(self, sink: E2) -> ReconciliationEngine<S, E2> {
        ReconciliationEngine {
            store: self.store,
            rules: self.rules,
            defaults: self.defaults,
            sink,
        }
    }

    pub fn defaults(&self) -> &FlagDefaults {
        &self.defaults
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn into_parts(self) -> (S, E) {
        (self.store, self.sink)
    }

    /// Reconcile `forest` against the store.
    ///
    /// # Errors
    /// The first [`ReconcileError`] raised anywhere in the walk, unmodified.
    /// Store writes made before the error stay applied.
    pub fn apply(&mut self, forest: &[RawItem]) -> Result<ApplyReport, ReconcileError> {
        let defaults = FlagDefaults::builtin().merge(&self.defaults);
        let mut report = ApplyReport::default();
        {
            let mut sink = (&mut self.sink, &mut report);
            walk(
                &mut self.store,
                &self.rules,
                &defaults,
                forest,
                None,
                &mut sink,
            )?;
        }
        Ok(report)
    }
}
