//! `rbm apply`: load policy layers, reconcile inside a store transaction,
//! save on success.

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use rbm_audit::{AuditSink, AuditWriter, RBAC_TOPIC};
use rbm_config::{report_unused_keys, LoadedConfig, PolicyDocument, UnusedKeyPolicy};
use rbm_reconcile::{ApplyReport, ReconcileError, ReconciliationEngine, RuleRegistry, TracingSink};
use rbm_store::MemoryStore;

pub struct ApplyArgs {
    pub store_path: String,
    pub policy_paths: Vec<String>,
    pub audit_path: Option<String>,
    pub dry_run: bool,
    pub strict_keys: bool,
}

fn load_policy(paths: &[String], strict_keys: bool) -> Result<(LoadedConfig, PolicyDocument)> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = rbm_config::load_layered_yaml(&path_refs)?;

    let key_policy = if strict_keys {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(&loaded.config_json, key_policy)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(%pointer, "policy key is not used");
    }

    let policy = loaded.policy()?;
    Ok((loaded, policy))
}

fn reconcile(
    store: &mut MemoryStore,
    policy: &PolicyDocument,
    audit: &mut Option<AuditSink>,
) -> Result<ApplyReport, ReconcileError> {
    store.transaction(|st| {
        ReconciliationEngine::new(st, RuleRegistry::builtin())
            .with_defaults(policy.defaults.clone())
            .with_sink((TracingSink, audit))
            .apply(&policy.privileges)
    })
}

fn print_report(
    run_id: Uuid,
    loaded: &LoadedConfig,
    policy: &PolicyDocument,
    report: &ApplyReport,
    dry_run: bool,
) {
    println!("run_id={}", run_id);
    println!("migration={}", policy.migration_name());
    println!("config_hash={}", loaded.config_hash);
    println!("dry_run={}", dry_run);
    println!(
        "created={} updated={} removed={} linked={} rules_created={} rules_replaced={}",
        report.created,
        report.updated,
        report.removed,
        report.linked,
        report.rules_created,
        report.rules_replaced
    );
    println!("changes={}", report.changes());
    println!("noop={}", report.is_noop());
}

pub fn run(args: ApplyArgs) -> Result<()> {
    let (loaded, policy) = load_policy(&args.policy_paths, args.strict_keys)?;
    let registry = RuleRegistry::builtin();
    let mut store = MemoryStore::load_or_empty(&args.store_path, &registry)?;
    let run_id = Uuid::new_v4();

    info!(
        %run_id,
        migration = policy.migration_name(),
        config_hash = %loaded.config_hash,
        items = policy.item_count(),
        dry_run = args.dry_run,
        "applying policy"
    );

    if args.dry_run {
        let mut scratch = store.clone();
        let report = reconcile(&mut scratch, &policy, &mut None)
            .context("dry run failed; nothing would be applied")?;
        print_report(run_id, &loaded, &policy, &report, true);
        return Ok(());
    }

    let mut audit = match &args.audit_path {
        Some(p) => Some(AuditSink::new(AuditWriter::resume(p, true)?, run_id)),
        None => None,
    };

    let outcome = reconcile(&mut store, &policy, &mut audit);

    let summary = match &outcome {
        Ok(report) => json!({
            "migration": policy.migration_name(),
            "config_hash": loaded.config_hash,
            "report": report,
        }),
        Err(e) => json!({
            "migration": policy.migration_name(),
            "config_hash": loaded.config_hash,
            "error": e.to_string(),
        }),
    };
    if let Some(sink) = audit {
        let mut writer = sink.finish()?;
        let event_type = if outcome.is_ok() {
            "apply_committed"
        } else {
            "apply_rolled_back"
        };
        writer.append(run_id, RBAC_TOPIC, event_type, summary)?;
    }

    let report = outcome.context("apply failed; store left unchanged")?;
    store.save_json(&args.store_path)?;
    print_report(run_id, &loaded, &policy, &report, false);
    Ok(())
}
