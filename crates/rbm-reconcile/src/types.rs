use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Kind of authorization item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Role,
    Permission,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Role => "role",
            ItemType::Permission => "permission",
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared existence expectation for an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ensure {
    /// Item must not exist yet; it is created. Fails loudly on a second run.
    New,
    /// Item is created if missing, optionally overwritten when `replace` is set.
    Present,
    /// Item must already exist; it is never touched.
    MustExist,
    /// Item is removed if it exists.
    Absent,
}

impl Ensure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ensure::New => "new",
            Ensure::Present => "present",
            Ensure::MustExist => "must_exist",
            Ensure::Absent => "absent",
        }
    }
}

impl std::fmt::Display for Ensure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative rule attachment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Registry key of the guarding logic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Overwrite an existing rule with the same name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<bool>,

    /// Legacy spelling of `replace: true`.
    #[serde(default, rename = "_force", skip_serializing_if = "is_false")]
    pub legacy_force: bool,
}

impl RuleSpec {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            class: Some(class.into()),
            replace: None,
            legacy_force: false,
        }
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = Some(replace);
        self
    }
}

/// One declared item as written in a policy document. Every field is optional
/// so that defaulting stays observable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensure: Option<Ensure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RawItem>,

    /// Legacy spelling of `ensure: must_exist`.
    #[serde(default, rename = "_exists", skip_serializing_if = "is_false")]
    pub legacy_exists: bool,

    /// Legacy spelling of `ensure: present, replace: true`.
    #[serde(default, rename = "_force", skip_serializing_if = "is_false")]
    pub legacy_force: bool,
}

impl ItemSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::named(name).item_type(ItemType::Role)
    }

    pub fn permission(name: impl Into<String>) -> Self {
        Self::named(name).item_type(ItemType::Permission)
    }

    pub fn item_type(mut self, item_type: ItemType) -> Self {
        self.item_type = Some(item_type);
        self
    }

    pub fn ensure(mut self, ensure: Ensure) -> Self {
        self.ensure = Some(ensure);
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = Some(replace);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn rule(mut self, rule: RuleSpec) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn child(mut self, child: impl Into<RawItem>) -> Self {
        self.children.push(child.into());
        self
    }
}

/// Input node: either a bare item name or a full specification.
///
/// Deserializes from a string or a map. Errors inside a map come from
/// [`ItemSpec`] itself, so they name the offending field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RawItem {
    Name(String),
    Spec(ItemSpec),
}

impl RawItem {
    /// Declared name, if any (before validation).
    pub fn name(&self) -> Option<&str> {
        match self {
            RawItem::Name(n) => Some(n.as_str()),
            RawItem::Spec(s) => s.name.as_deref(),
        }
    }

    pub fn children(&self) -> &[RawItem] {
        match self {
            RawItem::Name(_) => &[],
            RawItem::Spec(s) => &s.children,
        }
    }
}

impl<'de> Deserialize<'de> for RawItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawItemVisitor;

        impl<'de> Visitor<'de> for RawItemVisitor {
            type Value = RawItem;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an item name or an item map")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RawItem, E> {
                Ok(RawItem::Name(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<RawItem, E> {
                Ok(RawItem::Name(v))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<RawItem, A::Error> {
                ItemSpec::deserialize(de::value::MapAccessDeserializer::new(map)).map(RawItem::Spec)
            }
        }

        deserializer.deserialize_any(RawItemVisitor)
    }
}

impl From<&str> for RawItem {
    fn from(name: &str) -> Self {
        RawItem::Name(name.to_string())
    }
}

impl From<String> for RawItem {
    fn from(name: String) -> Self {
        RawItem::Name(name)
    }
}

impl From<ItemSpec> for RawItem {
    fn from(spec: ItemSpec) -> Self {
        RawItem::Spec(spec)
    }
}

/// A declared item after defaulting and legacy-flag translation.
///
/// Borrows description, rule and children from the raw input; the raw forest
/// outlives every normalized node produced from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedItem<'a> {
    pub name: &'a str,
    pub item_type: ItemType,
    pub ensure: Ensure,
    pub replace: bool,
    pub description: Option<&'a str>,
    pub rule: Option<&'a RuleSpec>,
    pub children: &'a [RawItem],
}

/// Store-side representation of an existing role or permission.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LiveItem {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
}

impl LiveItem {
    pub fn new(name: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            name: name.into(),
            item_type,
            description: None,
            rule_name: None,
        }
    }
}

/// Canonical reference to a rule held by the store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleRef {
    pub name: String,
    pub class: String,
}

impl RuleRef {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}
