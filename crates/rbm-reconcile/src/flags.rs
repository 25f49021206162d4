//! Item flag normalization.
//!
//! Turns one [`RawItem`] into a [`NormalizedItem`]:
//! 1. bare names are promoted to structured items,
//! 2. legacy `_exists` / `_force` flags are translated (with a deprecation event),
//! 3. unset flags are filled from built-in defaults, overridden by the
//!    migration-level [`FlagDefaults`], overridden by the item itself,
//! 4. required flags are validated.

use serde::{Deserialize, Serialize};

use crate::{
    ConfigError, DeprecatedFlag, Ensure, EventSink, ItemType, NormalizedItem, RawItem,
    ReconcileError, ReconcileEvent, RuleSpec,
};

/// Defaults applied to every item that does not set the flag itself.
///
/// Unset fields fall through to the built-in defaults:
/// `ensure = new`, `replace = false`, `type = permission`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensure: Option<Ensure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<bool>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,
}

impl FlagDefaults {
    pub const BUILTIN_ENSURE: Ensure = Ensure::New;
    pub const BUILTIN_REPLACE: bool = false;
    pub const BUILTIN_TYPE: ItemType = ItemType::Permission;

    /// Built-in defaults with every field set.
    pub fn builtin() -> Self {
        Self {
            ensure: Some(Self::BUILTIN_ENSURE),
            replace: Some(Self::BUILTIN_REPLACE),
            item_type: Some(Self::BUILTIN_TYPE),
        }
    }

    /// Layer `over` on top of `self`; fields set in `over` win.
    pub fn merge(&self, over: &FlagDefaults) -> FlagDefaults {
        FlagDefaults {
            ensure: over.ensure.or(self.ensure),
            replace: over.replace.or(self.replace),
            item_type: over.item_type.or(self.item_type),
        }
    }

    fn ensure_or_builtin(&self) -> Ensure {
        self.ensure.unwrap_or(Self::BUILTIN_ENSURE)
    }

    fn replace_or_builtin(&self) -> bool {
        self.replace.unwrap_or(Self::BUILTIN_REPLACE)
    }

    fn type_or_builtin(&self) -> ItemType {
        self.item_type.unwrap_or(Self::BUILTIN_TYPE)
    }
}

/// Flags as declared, before any translation or defaulting.
struct Declared<'a> {
    name: Option<&'a str>,
    item_type: Option<ItemType>,
    ensure: Option<Ensure>,
    replace: Option<bool>,
    description: Option<&'a str>,
    rule: Option<&'a RuleSpec>,
    children: &'a [RawItem],
    legacy_exists: bool,
    legacy_force: bool,
}

impl<'a> Declared<'a> {
    fn from_raw(raw: &'a RawItem) -> Self {
        match raw {
            RawItem::Name(name) => Declared {
                name: Some(name.as_str()),
                item_type: None,
                ensure: None,
                replace: None,
                description: None,
                rule: None,
                children: &[],
                legacy_exists: false,
                legacy_force: false,
            },
            RawItem::Spec(spec) => Declared {
                name: spec.name.as_deref(),
                item_type: spec.item_type,
                ensure: spec.ensure,
                replace: spec.replace,
                description: spec.description.as_deref(),
                rule: spec.rule.as_ref(),
                children: &spec.children,
                legacy_exists: spec.legacy_exists,
                legacy_force: spec.legacy_force,
            },
        }
    }

    /// `_exists` then `_force`; when both are set `_force` wins.
    fn translate_legacy(&mut self, sink: &mut dyn EventSink) {
        if self.legacy_exists {
            sink.emit(&ReconcileEvent::deprecated(DeprecatedFlag::Exists, self.name));
            self.ensure = Some(Ensure::MustExist);
        }
        if self.legacy_force {
            sink.emit(&ReconcileEvent::deprecated(DeprecatedFlag::Force, self.name));
            self.ensure = Some(Ensure::Present);
            self.replace = Some(true);
        }
    }
}

/// Normalize one declared item.
///
/// # Errors
/// [`ConfigError::MissingRequiredFlag`] when `name` is missing or blank.
pub fn normalize<'a>(
    raw: &'a RawItem,
    defaults: &FlagDefaults,
    sink: &mut dyn EventSink,
) -> Result<NormalizedItem<'a>, ReconcileError> {
    let mut declared = Declared::from_raw(raw);
    declared.translate_legacy(sink);

    let name = declared
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or(ConfigError::MissingRequiredFlag { flag: "name" })?;

    Ok(NormalizedItem {
        name,
        item_type: declared
            .item_type
            .unwrap_or_else(|| defaults.type_or_builtin()),
        ensure: declared.ensure.unwrap_or_else(|| defaults.ensure_or_builtin()),
        replace: declared
            .replace
            .unwrap_or_else(|| defaults.replace_or_builtin()),
        description: declared.description,
        rule: declared.rule,
        children: declared.children,
    })
}
