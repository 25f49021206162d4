//! Unused-key guard.
//!
//! "Consumed pointers" are JSON Pointer prefixes. A leaf under any consumed
//! prefix is consumed; every other leaf is reported as unused. Callers choose
//! whether unused keys are warnings or errors.
//!
//! Example: consumed prefix `/defaults/ensure` consumes that leaf only.
//!
//! `/privileges` is consumed as a tree, but every structured item in it (and
//! every nested `children` list) is checked against [`ITEM_KEYS`], and every
//! `rule` block against [`RULE_KEYS`]. A misspelled `ensure` would otherwise
//! fall back to the default silently.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Keys read from a structured privileges item.
pub const ITEM_KEYS: &[&str] = &[
    "name",
    "type",
    "ensure",
    "replace",
    "description",
    "rule",
    "children",
    "_exists",
    "_force",
];

/// Keys read from an item's `rule` block.
pub const RULE_KEYS: &[&str] = &["name", "class", "replace", "_force"];

/// Pointers actually read by [`crate::PolicyDocument::from_config_json`].
pub fn consumed_pointers() -> &'static [&'static str] {
    &[
        "/migration/name",
        "/defaults/ensure",
        "/defaults/replace",
        "/defaults/type",
        "/privileges",
    ]
}

/// Produce an unused-key report for a merged policy document.
/// If `policy == Fail`, returns an error when unused keys exist.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = consumed_pointers()
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();
    let consumed_prefixes: Vec<String> = consumed.into_iter().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    if let Some(forest) = config_json.get("privileges") {
        collect_unknown_item_keys(forest, "/privileges", &mut unused);
    }
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "POLICY_UNUSED_KEYS: {} unused policy key(s) detected. \
            Remove them or fix their spelling. First few: {}",
            report.unused_leaf_pointers.len(),
            preview_list(&report.unused_leaf_pointers, 12)
        );
    }

    Ok(report)
}

/// Must begin with "/"; no trailing "/" unless it is just "/".
fn normalize_pointer(p: &str) -> String {
    let mut s = p.trim().to_string();
    if s.is_empty() {
        return "/".to_string();
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    while s.ends_with('/') && s.len() > 1 {
        s.pop();
    }
    s
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but NOT "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" || leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                // The empty root document has nothing to report.
                if v.is_object() {
                    return;
                }
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

/// Leaves under keys that no item or rule reads. Bare names and malformed
/// shapes are skipped here; the policy parser rejects the latter.
fn collect_unknown_item_keys(forest: &Value, prefix: &str, out: &mut Vec<String>) {
    let Value::Array(items) = forest else {
        return;
    };
    for (i, item) in items.iter().enumerate() {
        let Value::Object(map) = item else {
            continue;
        };
        for (k, v) in map {
            let at = format!("{}/{}/{}", prefix, i, escape_pointer_token(k));
            match k.as_str() {
                "children" => collect_unknown_item_keys(v, &at, out),
                "rule" => {
                    if let Value::Object(rule) = v {
                        for (rk, rv) in rule {
                            if !RULE_KEYS.contains(&rk.as_str()) {
                                let next = format!("{}/{}", at, escape_pointer_token(rk));
                                collect_leaf_pointers(rv, &next, out);
                            }
                        }
                    }
                }
                known if ITEM_KEYS.contains(&known) => {}
                _ => collect_leaf_pointers(v, &at, out),
            }
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    let take = items.iter().take(n).cloned().collect::<Vec<_>>();
    format!("{:?}", take)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_requires_segment_boundary() {
        assert!(is_prefix_pointer("/privileges", "/privileges/0/name"));
        assert!(is_prefix_pointer("/defaults/type", "/defaults/type"));
        assert!(!is_prefix_pointer("/defaults/type", "/defaults/types"));
        assert!(is_prefix_pointer("/", "/anything"));
    }

    #[test]
    fn pointer_tokens_are_escaped() {
        let mut out = Vec::new();
        collect_leaf_pointers(&serde_json::json!({"a/b": {"c~d": 1}}), "", &mut out);
        assert_eq!(out, ["/a~1b/c~0d"]);
    }

    #[test]
    fn unknown_keys_inside_nested_items_and_rules_are_reported() {
        let forest = serde_json::json!([
            "bare",
            {
                "name": "a",
                "children": [
                    {"name": "b", "descripton": "typo", "rule": {"name": "r", "clas": "owner"}}
                ]
            }
        ]);
        let mut out = Vec::new();
        collect_unknown_item_keys(&forest, "/privileges", &mut out);
        out.sort();
        assert_eq!(
            out,
            [
                "/privileges/1/children/0/descripton",
                "/privileges/1/children/0/rule/clas"
            ]
        );
    }

    #[test]
    fn empty_document_is_clean() {
        let report = report_unused_keys(&serde_json::json!({}), UnusedKeyPolicy::Fail).unwrap();
        assert!(report.is_clean());
    }
}
