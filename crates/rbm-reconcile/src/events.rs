//! Structured progress events.
//!
//! The engine never formats human-readable output itself. Every decision is
//! reported as a [`ReconcileEvent`] to an [`EventSink`]; rendering is the
//! sink's business.

use serde::Serialize;
use tracing::{info, warn};

use crate::{Ensure, ItemType};

/// Legacy flag that was translated into the ensure vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeprecatedFlag {
    /// Item `_exists`.
    Exists,
    /// Item `_force`.
    Force,
    /// Rule `_force`.
    RuleForce,
}

impl DeprecatedFlag {
    pub fn key(&self) -> &'static str {
        match self {
            DeprecatedFlag::Exists => "_exists",
            DeprecatedFlag::Force | DeprecatedFlag::RuleForce => "_force",
        }
    }

    /// The current spelling that should replace the legacy flag.
    pub fn replacement(&self) -> &'static str {
        match self {
            DeprecatedFlag::Exists => "ensure: must_exist",
            DeprecatedFlag::Force => "ensure: present, replace: true",
            DeprecatedFlag::RuleForce => "replace: true",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReconcileEvent {
    Processing {
        name: String,
        item_type: ItemType,
        ensure: Ensure,
    },
    Created {
        name: String,
        item_type: ItemType,
    },
    Updated {
        name: String,
        item_type: ItemType,
    },
    /// Item exists and was left as is.
    Unchanged {
        name: String,
        item_type: ItemType,
    },
    Removed {
        name: String,
        item_type: ItemType,
    },
    /// ABSENT item was already missing.
    AlreadyAbsent {
        name: String,
        item_type: ItemType,
    },
    ChildLinked {
        parent: String,
        child: String,
        child_type: ItemType,
    },
    ChildAlreadyLinked {
        parent: String,
        child: String,
        child_type: ItemType,
    },
    RuleCreated {
        name: String,
        class: String,
    },
    RuleReplaced {
        name: String,
        class: String,
    },
    RuleUnchanged {
        name: String,
    },
    DeprecatedFlag {
        flag: DeprecatedFlag,
        /// Item or rule name, when the declaration carries one.
        name: Option<String>,
        replacement: &'static str,
    },
}

impl ReconcileEvent {
    /// Stable snake_case event kind, identical to the serialized `event` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Processing { .. } => "processing",
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Unchanged { .. } => "unchanged",
            Self::Removed { .. } => "removed",
            Self::AlreadyAbsent { .. } => "already_absent",
            Self::ChildLinked { .. } => "child_linked",
            Self::ChildAlreadyLinked { .. } => "child_already_linked",
            Self::RuleCreated { .. } => "rule_created",
            Self::RuleReplaced { .. } => "rule_replaced",
            Self::RuleUnchanged { .. } => "rule_unchanged",
            Self::DeprecatedFlag { .. } => "deprecated_flag",
        }
    }

    pub(crate) fn deprecated(flag: DeprecatedFlag, name: Option<&str>) -> Self {
        Self::DeprecatedFlag {
            flag,
            name: name.map(str::to_string),
            replacement: flag.replacement(),
        }
    }
}

/// Receiver of reconcile events.
pub trait EventSink {
    fn emit(&mut self, event: &ReconcileEvent);
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn emit(&mut self, event: &ReconcileEvent) {
        (**self).emit(event)
    }
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn emit(&mut self, event: &ReconcileEvent) {
        (**self).emit(event)
    }
}

/// `None` drops every event.
impl<T: EventSink> EventSink for Option<T> {
    fn emit(&mut self, event: &ReconcileEvent) {
        if let Some(sink) = self {
            sink.emit(event);
        }
    }
}

/// Fan-out: every event goes to both sinks, left first.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &ReconcileEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &ReconcileEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    events: Vec<ReconcileEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ReconcileEvent] {
        &self.events
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.iter().map(ReconcileEvent::kind).collect()
    }

    pub fn into_events(self) -> Vec<ReconcileEvent> {
        self.events
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &ReconcileEvent) {
        self.events.push(event.clone());
    }
}

/// Forwards events to `tracing` as structured records.
///
/// Deprecated flags are logged at WARN, processing at DEBUG, everything else
/// at INFO.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: &ReconcileEvent) {
        match event {
            ReconcileEvent::Processing {
                name,
                item_type,
                ensure,
            } => tracing::debug!(%name, %item_type, %ensure, "processing item"),
            ReconcileEvent::Created { name, item_type } => {
                info!(%name, %item_type, "created item")
            }
            ReconcileEvent::Updated { name, item_type } => {
                info!(%name, %item_type, "updated item")
            }
            ReconcileEvent::Unchanged { name, item_type } => {
                info!(%name, %item_type, "existing item left unchanged")
            }
            ReconcileEvent::Removed { name, item_type } => {
                info!(%name, %item_type, "removed item")
            }
            ReconcileEvent::AlreadyAbsent { name, item_type } => {
                info!(%name, %item_type, "item already absent")
            }
            ReconcileEvent::ChildLinked {
                parent,
                child,
                child_type,
            } => info!(%parent, %child, %child_type, "added child"),
            ReconcileEvent::ChildAlreadyLinked {
                parent,
                child,
                child_type,
            } => info!(%parent, %child, %child_type, "existing child found"),
            ReconcileEvent::RuleCreated { name, class } => {
                info!(rule = %name, %class, "created rule")
            }
            ReconcileEvent::RuleReplaced { name, class } => {
                info!(rule = %name, %class, "replaced rule")
            }
            ReconcileEvent::RuleUnchanged { name } => {
                info!(rule = %name, "rule already exists")
            }
            ReconcileEvent::DeprecatedFlag {
                flag,
                name,
                replacement,
            } => warn!(
                flag = flag.key(),
                name = name.as_deref().unwrap_or("<unnamed>"),
                replacement,
                "policy uses deprecated flag"
            ),
        }
    }
}
