//! Policy hash stability.
//!
//! GREEN when:
//! - the same layers hash identically on every load
//! - key order inside a mapping does not change the hash
//! - item order inside `privileges` DOES change the hash (walk order matters)
//! - migration-level defaults override global ones field by field

use rbm_config::load_layered_yaml_from_strings;
use rbm_reconcile::{Ensure, ItemType};

const GLOBAL_YAML: &str = r#"
defaults:
  ensure: present
  type: permission
"#;

const MIGRATION_YAML: &str = r#"
migration:
  name: blog_rbac
defaults:
  type: role
privileges:
  - name: author
    children: [createPost]
  - admin
"#;

const MIGRATION_YAML_REORDERED_KEYS: &str = r#"
privileges:
  - children: [createPost]
    name: author
  - admin
defaults:
  type: role
migration:
  name: blog_rbac
"#;

const MIGRATION_YAML_REORDERED_ITEMS: &str = r#"
migration:
  name: blog_rbac
defaults:
  type: role
privileges:
  - admin
  - name: author
    children: [createPost]
"#;

#[test]
fn same_layers_produce_identical_hash() {
    let a = load_layered_yaml_from_strings(&[GLOBAL_YAML, MIGRATION_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[GLOBAL_YAML, MIGRATION_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64);
    assert!(a.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn reordered_keys_produce_same_hash() {
    let a = load_layered_yaml_from_strings(&[MIGRATION_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[MIGRATION_YAML_REORDERED_KEYS]).unwrap();
    assert_eq!(
        a.config_hash, b.config_hash,
        "mapping key order must not change the hash"
    );
}

#[test]
fn reordered_items_produce_different_hash() {
    let a = load_layered_yaml_from_strings(&[MIGRATION_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[MIGRATION_YAML_REORDERED_ITEMS]).unwrap();
    assert_ne!(
        a.config_hash, b.config_hash,
        "privileges are walked in order, so their order is part of the identity"
    );
}

#[test]
fn migration_defaults_override_global_defaults() {
    let loaded = load_layered_yaml_from_strings(&[GLOBAL_YAML, MIGRATION_YAML]).unwrap();
    let policy = loaded.policy().unwrap();

    assert_eq!(policy.migration_name(), "blog_rbac");
    assert_eq!(policy.defaults.ensure, Some(Ensure::Present));
    assert_eq!(policy.defaults.item_type, Some(ItemType::Role));
    assert_eq!(policy.item_count(), 3);
}
