use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rbm")]
#[command(about = "Declarative RBAC policy migrations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the store with one or more layered policy files
    Apply {
        /// Store JSON file (falls back to RBM_STORE_PATH; created if missing)
        #[arg(long)]
        store: Option<String>,

        /// Policy YAML paths in merge order (global defaults -> migration)
        #[arg(long = "policy", required = true)]
        policy_paths: Vec<String>,

        /// Append reconcile events to this hash-chained JSONL audit log
        #[arg(long, conflicts_with = "dry_run")]
        audit: Option<String>,

        /// Reconcile against a scratch copy; nothing is saved
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Fail when the policy contains keys nothing reads
        #[arg(long, default_value_t = false)]
        strict_keys: bool,
    },

    /// Policy migrations are forward-only; this always fails
    Revert {
        #[arg(long)]
        store: Option<String>,

        #[arg(long = "policy")]
        policy_paths: Vec<String>,
    },

    /// Compute layered policy hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Verify the hash chain of an audit log
    AuditVerify {
        path: String,
    },

    /// Print the store contents
    Show {
        #[arg(long)]
        store: Option<String>,
    },

    /// Evaluate an access check against the store
    Check {
        #[arg(long)]
        store: Option<String>,

        /// Subject the rules are evaluated for
        #[arg(long)]
        subject: String,

        /// Assigned role (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Item to check
        #[arg(long)]
        item: String,

        /// Rule parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Apply {
            store,
            policy_paths,
            audit,
            dry_run,
            strict_keys,
        } => commands::apply::run(commands::apply::ApplyArgs {
            store_path: commands::resolve_store_path(store)?,
            policy_paths,
            audit_path: audit,
            dry_run,
            strict_keys,
        })?,

        Commands::Revert { .. } => {
            bail!(
                "REFUSING REVERT: policy migrations cannot be reverted. \
                Write a new policy that declares the desired end state (e.g. ensure: absent)."
            );
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = rbm_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::AuditVerify { path } => match rbm_audit::verify_hash_chain(&path)? {
            rbm_audit::VerifyResult::Valid { lines } => {
                println!("audit_valid=true lines={}", lines);
            }
            rbm_audit::VerifyResult::Broken { line, reason } => {
                bail!("AUDIT_CHAIN_BROKEN line={} reason={}", line, reason);
            }
        },

        Commands::Show { store } => {
            commands::show::run(&commands::resolve_store_path(store)?)?;
        }

        Commands::Check {
            store,
            subject,
            roles,
            item,
            params,
        } => {
            let allowed = commands::show::check(
                &commands::resolve_store_path(store)?,
                &subject,
                &roles,
                &item,
                &params,
            )?;
            println!("allowed={}", allowed);
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries only `key=value` results.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
