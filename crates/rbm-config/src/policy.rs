use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rbm_reconcile::{FlagDefaults, RawItem};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A merged policy document, ready to hand to the reconciliation engine.
///
/// ```yaml
/// migration:
///   name: m240101_blog_rbac
/// defaults:
///   ensure: present
/// privileges:
///   - name: author
///     type: role
///     children: [createPost]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub migration: MigrationMeta,
    #[serde(default)]
    pub defaults: FlagDefaults,
    #[serde(default)]
    pub privileges: Vec<RawItem>,
}

impl PolicyDocument {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        serde_json::from_value(config_json.clone()).context("POLICY_INVALID: cannot parse policy document")
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let loaded = crate::load_layered_yaml_from_strings(&[yaml])?;
        Self::from_config_json(&loaded.config_json)
    }

    /// Migration name, or `"unnamed"` when the document sets none.
    pub fn migration_name(&self) -> &str {
        self.migration.name.as_deref().unwrap_or("unnamed")
    }

    /// Total declared items, children included.
    pub fn item_count(&self) -> usize {
        fn count(nodes: &[RawItem]) -> usize {
            nodes.iter().map(|n| 1 + count(n.children())).sum()
        }
        count(&self.privileges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbm_reconcile::{Ensure, ItemType};

    #[test]
    fn parses_mixed_bare_and_structured_items() {
        let doc = PolicyDocument::from_yaml_str(
            r#"
migration:
  name: blog
defaults:
  ensure: present
privileges:
  - name: author
    type: role
    children:
      - createPost
      - name: updateOwnPost
        rule: { name: isAuthor, class: owner }
  - readPost
"#,
        )
        .unwrap();

        assert_eq!(doc.migration_name(), "blog");
        assert_eq!(doc.defaults.ensure, Some(Ensure::Present));
        assert_eq!(doc.item_count(), 4);
        match &doc.privileges[0] {
            RawItem::Spec(spec) => assert_eq!(spec.item_type, Some(ItemType::Role)),
            other => panic!("expected structured item, got {other:?}"),
        }
        assert_eq!(doc.privileges[1], RawItem::from("readPost"));
    }

    #[test]
    fn legacy_flags_are_read() {
        let doc = PolicyDocument::from_yaml_str(
            r#"
privileges:
  - name: admin
    _force: true
  - name: guest
    _exists: true
"#,
        )
        .unwrap();
        let RawItem::Spec(admin) = &doc.privileges[0] else {
            panic!("admin should be structured");
        };
        assert!(admin.legacy_force);
        let RawItem::Spec(guest) = &doc.privileges[1] else {
            panic!("guest should be structured");
        };
        assert!(guest.legacy_exists);
    }

    #[test]
    fn unknown_ensure_value_is_rejected() {
        let err = PolicyDocument::from_yaml_str("defaults: { ensure: sometimes }").unwrap_err();
        assert!(format!("{err:#}").contains("POLICY_INVALID"));
    }

    #[test]
    fn bad_child_value_is_reported_by_value() {
        let err = PolicyDocument::from_yaml_str(
            r#"
privileges:
  - name: author
    children:
      - name: p
        ensure: sometimes
"#,
        )
        .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("POLICY_INVALID"));
        assert!(msg.contains("unknown variant `sometimes`"), "got: {msg}");
    }

    #[test]
    fn empty_document_has_no_privileges() {
        let doc = PolicyDocument::from_yaml_str("{}").unwrap();
        assert!(doc.privileges.is_empty());
        assert_eq!(doc.migration_name(), "unnamed");
    }
}
