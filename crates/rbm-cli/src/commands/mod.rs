//! Command handler modules for the `rbm` binary.
//!
//! Shared utilities used by multiple command paths live here.

pub mod apply;
pub mod show;

use anyhow::{bail, Result};

/// Environment fallback for `--store`.
pub const ENV_STORE_PATH: &str = "RBM_STORE_PATH";

/// `--store` wins; otherwise `RBM_STORE_PATH`; otherwise an error.
pub fn resolve_store_path(arg: Option<String>) -> Result<String> {
    if let Some(p) = arg.filter(|p| !p.trim().is_empty()) {
        return Ok(p);
    }
    match std::env::var(ENV_STORE_PATH) {
        Ok(p) if !p.trim().is_empty() => Ok(p),
        _ => bail!("no store given: pass --store or set {}", ENV_STORE_PATH),
    }
}
