//! Read-only store commands: `rbm show` and `rbm check`.

use anyhow::{bail, Context, Result};
use serde_json::Value;

use rbm_reconcile::RuleRegistry;
use rbm_store::MemoryStore;

fn load(store_path: &str) -> Result<MemoryStore> {
    MemoryStore::load_json(store_path, &RuleRegistry::builtin())
}

pub fn run(store_path: &str) -> Result<()> {
    let snap = load(store_path)?.snapshot();

    for r in &snap.rules {
        println!("rule name={} class={}", r.name, r.class);
    }
    for i in &snap.items {
        println!(
            "item name={} type={} rule={} description={}",
            i.name,
            i.item_type,
            i.rule_name.as_deref().unwrap_or("-"),
            i.description.as_deref().unwrap_or("-")
        );
    }
    for g in &snap.grants {
        println!("grant parent={} child={}", g.parent, g.child);
    }
    println!(
        "items={} rules={} grants={}",
        snap.items.len(),
        snap.rules.len(),
        snap.grants.len()
    );
    Ok(())
}

pub fn check(
    store_path: &str,
    subject: &str,
    roles: &[String],
    item: &str,
    params: &str,
) -> Result<bool> {
    let store = load(store_path)?;
    let params: Value = serde_json::from_str(params).context("--params must be valid JSON")?;
    if !params.is_object() {
        bail!("--params must be a JSON object");
    }
    let assignments: Vec<&str> = roles.iter().map(|s| s.as_str()).collect();
    Ok(store.check_access(subject, &assignments, item, &params))
}
