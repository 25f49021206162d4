//! Error kinds raised while reconciling a policy forest.
//!
//! Every variant is fatal to the current apply. Nothing here is retried; the
//! enclosing unit of work decides whether to roll back.

use crate::{Ensure, ItemType};

/// Cause reported by a store that refused an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreFault {
    pub message: String,
}

impl StoreFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StoreFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StoreFault {}

/// Store operation that was attempted when a [`ReconcileError::Store`] occurred.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Add,
    Update,
    Remove,
    AddChild { parent: String },
    AddRule,
    UpdateRule,
    /// The item or rule could not be read back after a successful write.
    Refetch,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Add => "add",
            StoreOp::Update => "update",
            StoreOp::Remove => "remove",
            StoreOp::AddChild { .. } => "add_child",
            StoreOp::AddRule => "add_rule",
            StoreOp::UpdateRule => "update_rule",
            StoreOp::Refetch => "refetch",
        }
    }
}

/// Malformed declarative input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required item flag is missing or empty after defaulting.
    MissingRequiredFlag { flag: &'static str },
    /// A rule declaration lacks `name` or `class`.
    RuleMissingField {
        field: &'static str,
        rule: Option<String>,
    },
    /// No rule implementation is registered under `class`.
    UnknownRuleClass { rule: String, class: String },
    /// The registered factory produced an instance that does not answer to
    /// the requested name or class.
    RuleContractMismatch {
        rule: String,
        class: String,
        got_name: String,
        got_class: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequiredFlag { flag } => {
                write!(f, "param '{flag}' has to be set for each privileges item")
            }
            Self::RuleMissingField { field, rule } => match rule {
                Some(r) => write!(f, "rule '{r}': '{field}' must be defined in rule config"),
                None => write!(f, "'{field}' must be defined in rule config"),
            },
            Self::UnknownRuleClass { rule, class } => {
                write!(f, "rule '{rule}': no rule class registered as '{class}'")
            }
            Self::RuleContractMismatch {
                rule,
                class,
                got_name,
                got_class,
            } => write!(
                f,
                "rule '{rule}': factory for '{class}' produced '{got_name}' of class '{got_class}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Live state contradicts the declared ensure policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyViolation {
    MustExistButAbsent,
    NewButExists,
}

impl PolicyViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyViolation::MustExistButAbsent => "MUST_EXIST but absent",
            PolicyViolation::NewButExists => "NEW but already exists",
        }
    }
}

/// Any failure that aborts [`crate::ReconciliationEngine::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    Config(ConfigError),

    PolicyViolation {
        name: String,
        item_type: ItemType,
        ensure: Ensure,
        violation: PolicyViolation,
    },

    Store {
        name: String,
        /// `None` for rule operations.
        item_type: Option<ItemType>,
        op: StoreOp,
        cause: Option<StoreFault>,
    },
}

impl ReconcileError {
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::PolicyViolation { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    pub(crate) fn store(
        name: &str,
        item_type: Option<ItemType>,
        op: StoreOp,
        cause: Option<StoreFault>,
    ) -> Self {
        Self::Store {
            name: name.to_string(),
            item_type,
            op,
            cause,
        }
    }
}

impl From<ConfigError> for ReconcileError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::PolicyViolation {
                name,
                item_type,
                violation,
                ..
            } => write!(f, "{item_type} '{name}': {}", violation.as_str()),
            Self::Store {
                name,
                item_type,
                op,
                cause,
            } => {
                let subject = match item_type {
                    Some(t) => format!("{t} '{name}'"),
                    None => format!("rule '{name}'"),
                };
                match op {
                    StoreOp::AddChild { parent } => {
                        write!(f, "cannot link child {subject} to parent '{parent}'")?
                    }
                    other => write!(f, "store refused {} of {subject}", other.as_str())?,
                }
                if let Some(c) = cause {
                    write!(f, ": {c}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Store { cause: Some(c), .. } => Some(c),
            _ => None,
        }
    }
}
