//! Rule registry and rule resolution.
//!
//! # Purpose
//! Policy documents attach guarding logic to items by naming a rule and a rule
//! *class*. Classes are never instantiated from arbitrary type names: callers
//! register a factory per class key up front, and resolution looks the key up
//! in a [`RuleRegistry`].
//!
//! # Usage
//! ```ignore
//! let mut reg = RuleRegistry::new();
//! reg.register("owner", "subject must own the resource", |name| {
//!     Arc::new(OwnerRule::new(name))
//! })?;
//!
//! let rule_ref = resolve_rule(&mut store, &reg, &RuleSpec::new("isAuthor", "owner"), &mut sink)?;
//! ```
//!
//! # Determinism
//! Insertion order is preserved in `classes()` output. Factories must build
//! a fresh instance on every call.

use std::sync::Arc;

use serde_json::Value;

use crate::store::require_applied;
use crate::{
    AuthStore, ConfigError, DeprecatedFlag, EventSink, LiveItem, ReconcileError, ReconcileEvent,
    RuleRef, RuleSpec, StoreOp,
};

// ---------------------------------------------------------------------------
// Rule contract
// ---------------------------------------------------------------------------

/// Guarding logic attachable to a role or permission.
///
/// Rules are evaluated by the store at access-check time; the reconciler only
/// cares about `name` and `class`.
pub trait Rule: Send + Sync + std::fmt::Debug {
    /// Unique rule name in the store.
    fn name(&self) -> &str;

    /// Registry key this instance was built from.
    fn class(&self) -> &str;

    /// `true` when `subject` may use `item` given `params`.
    fn execute(&self, subject: &str, item: &LiveItem, params: &Value) -> bool;
}

/// Builds a rule instance carrying the given rule name.
pub type RuleFactory = Box<dyn Fn(&str) -> Arc<dyn Rule> + Send + Sync>;

// ---------------------------------------------------------------------------
// Built-in rules
// ---------------------------------------------------------------------------

/// Passes when `params.owner` equals the subject.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerRule {
    name: String,
}

impl OwnerRule {
    pub const CLASS: &'static str = "owner";

    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Rule for OwnerRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        Self::CLASS
    }

    fn execute(&self, subject: &str, _item: &LiveItem, params: &Value) -> bool {
        params
            .get("owner")
            .and_then(Value::as_str)
            .map(|owner| owner == subject)
            .unwrap_or(false)
    }
}

/// Never passes. Useful to switch an item off without removing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenyRule {
    name: String,
}

impl DenyRule {
    pub const CLASS: &'static str = "deny";

    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Rule for DenyRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        Self::CLASS
    }

    fn execute(&self, _subject: &str, _item: &LiveItem, _params: &Value) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Errors returned by [`RuleRegistry`] operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleRegistryError {
    /// A factory is already registered under this class key.
    DuplicateClass { class: String },
    /// No factory is registered under this class key.
    UnknownClass { class: String },
    /// The class key is empty or whitespace.
    EmptyClass,
    /// The factory built an instance whose name or class differs from the request.
    ContractMismatch {
        class: String,
        requested_name: String,
        got_name: String,
        got_class: String,
    },
}

impl std::fmt::Display for RuleRegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateClass { class } => {
                write!(f, "rule class '{class}' is already registered")
            }
            Self::UnknownClass { class } => {
                write!(f, "no rule class named '{class}' is registered")
            }
            Self::EmptyClass => write!(f, "rule class key must not be empty"),
            Self::ContractMismatch {
                class,
                requested_name,
                got_name,
                got_class,
            } => write!(
                f,
                "rule class '{class}': requested '{requested_name}', factory built '{got_name}' of class '{got_class}'"
            ),
        }
    }
}

impl std::error::Error for RuleRegistryError {}

struct RegistryEntry {
    class: String,
    description: String,
    factory: RuleFactory,
}

/// Catalogue of rule classes and their factories.
///
/// Keys are compared case-sensitively; insertion order is preserved.
pub struct RuleRegistry {
    entries: Vec<RegistryEntry>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registry with the built-in `owner` and `deny` classes.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.entries.push(RegistryEntry {
            class: OwnerRule::CLASS.to_string(),
            description: "subject must match params.owner".to_string(),
            factory: Box::new(|name: &str| -> Arc<dyn Rule> { Arc::new(OwnerRule::new(name)) }),
        });
        reg.entries.push(RegistryEntry {
            class: DenyRule::CLASS.to_string(),
            description: "always denies".to_string(),
            factory: Box::new(|name: &str| -> Arc<dyn Rule> { Arc::new(DenyRule::new(name)) }),
        });
        reg
    }

    /// Register a factory under `class`.
    ///
    /// # Errors
    /// - [`RuleRegistryError::EmptyClass`] if `class` is empty/whitespace.
    /// - [`RuleRegistryError::DuplicateClass`] if `class` is already taken.
    pub fn register<F>(
        &mut self,
        class: impl Into<String>,
        description: impl Into<String>,
        factory: F,
    ) -> Result<(), RuleRegistryError>
    where
        F: Fn(&str) -> Arc<dyn Rule> + Send + Sync + 'static,
    {
        let class = class.into();
        if class.trim().is_empty() {
            return Err(RuleRegistryError::EmptyClass);
        }
        if self.contains(&class) {
            return Err(RuleRegistryError::DuplicateClass { class });
        }
        self.entries.push(RegistryEntry {
            class,
            description: description.into(),
            factory: Box::new(factory),
        });
        Ok(())
    }

    pub fn contains(&self, class: &str) -> bool {
        self.entries.iter().any(|e| e.class == class)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(class, description)` pairs in insertion order.
    pub fn classes(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.class.as_str(), e.description.as_str()))
            .collect()
    }

    /// Build a fresh rule instance named `name` from the factory for `class`.
    ///
    /// # Errors
    /// [`RuleRegistryError::UnknownClass`] if `class` is not registered.
    pub fn instantiate(&self, class: &str, name: &str) -> Result<Arc<dyn Rule>, RuleRegistryError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.class == class)
            .ok_or_else(|| RuleRegistryError::UnknownClass {
                class: class.to_string(),
            })?;
        Ok((entry.factory)(name))
    }

    /// Instantiate and check that the instance answers to the requested name
    /// and class.
    ///
    /// # Errors
    /// - [`RuleRegistryError::UnknownClass`] if `class` is not registered.
    /// - [`RuleRegistryError::ContractMismatch`] if the instance disagrees.
    pub fn instantiate_verified(
        &self,
        class: &str,
        name: &str,
    ) -> Result<Arc<dyn Rule>, RuleRegistryError> {
        let rule = self.instantiate(class, name)?;
        if rule.name() != name || rule.class() != class {
            return Err(RuleRegistryError::ContractMismatch {
                class: class.to_string(),
                requested_name: name.to_string(),
                got_name: rule.name().to_string(),
                got_class: rule.class().to_string(),
            });
        }
        Ok(rule)
    }

    /// Remove a class. Returns `true` if it was registered.
    pub fn deregister(&mut self, class: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.class != class);
        self.entries.len() < before
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.class))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

fn build_rule(registry: &RuleRegistry, name: &str, class: &str) -> Result<Arc<dyn Rule>, ConfigError> {
    registry
        .instantiate_verified(class, name)
        .map_err(|e| match e {
            RuleRegistryError::ContractMismatch {
                got_name,
                got_class,
                ..
            } => ConfigError::RuleContractMismatch {
                rule: name.to_string(),
                class: class.to_string(),
                got_name,
                got_class,
            },
            _ => ConfigError::UnknownRuleClass {
                rule: name.to_string(),
                class: class.to_string(),
            },
        })
}

/// Ensure the declared rule exists in the store and return its canonical reference.
///
/// - missing in store: build from the registry and add it
/// - present and `replace`: rebuild and overwrite
/// - present otherwise: left untouched
///
/// # Errors
/// - [`ConfigError::RuleMissingField`] when `name` or `class` is missing.
/// - [`ConfigError::UnknownRuleClass`] / [`ConfigError::RuleContractMismatch`]
///   when the class cannot produce a valid instance.
/// - [`ReconcileError::Store`] when the store refuses the write.
pub fn resolve_rule(
    store: &mut dyn AuthStore,
    registry: &RuleRegistry,
    spec: &RuleSpec,
    sink: &mut dyn EventSink,
) -> Result<RuleRef, ReconcileError> {
    let name = spec
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .ok_or(ConfigError::RuleMissingField {
            field: "name",
            rule: None,
        })?;
    let class = spec
        .class
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ConfigError::RuleMissingField {
            field: "class",
            rule: Some(name.to_string()),
        })?;

    let mut replace = spec.replace.unwrap_or(false);
    if spec.legacy_force {
        sink.emit(&ReconcileEvent::deprecated(DeprecatedFlag::RuleForce, Some(name)));
        replace = true;
    }

    if store.get_rule(name).is_none() {
        let rule = build_rule(registry, name, class)?;
        require_applied(store.add_rule(rule), name, None, StoreOp::AddRule)?;
        sink.emit(&ReconcileEvent::RuleCreated {
            name: name.to_string(),
            class: class.to_string(),
        });
    } else if replace {
        let rule = build_rule(registry, name, class)?;
        require_applied(store.update_rule(name, rule), name, None, StoreOp::UpdateRule)?;
        sink.emit(&ReconcileEvent::RuleReplaced {
            name: name.to_string(),
            class: class.to_string(),
        });
    } else {
        sink.emit(&ReconcileEvent::RuleUnchanged {
            name: name.to_string(),
        });
    }

    store
        .get_rule(name)
        .ok_or_else(|| ReconcileError::store(name, None, StoreOp::Refetch, None))
}
