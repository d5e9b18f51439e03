//! Subcommand implementations

pub mod config;
pub mod doctor;
pub mod ingest;
pub mod post;

use anyhow::{Context, Result, bail};
use secrecy::SecretString;

/// Read a required, non-empty value from the named environment variable
pub(crate) fn load_env(env_var: &str, what: &str) -> Result<String> {
    if env_var.trim().is_empty() {
        bail!("No env var configured for {}", what);
    }

    let value = std::env::var(env_var)
        .with_context(|| format!("Missing env var {} for {}", env_var, what))?;

    if value.trim().is_empty() {
        bail!("Env var {} is empty for {}", env_var, what);
    }

    Ok(value)
}

pub(crate) fn load_secret(env_var: &str, what: &str) -> Result<SecretString> {
    Ok(SecretString::new(load_env(env_var, what)?.into()))
}

/// Whether the named variable is set and non-empty, without reading it out
pub(crate) fn env_is_set(env_var: &str) -> bool {
    !env_var.trim().is_empty()
        && std::env::var(env_var)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
}
