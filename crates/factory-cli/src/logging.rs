// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use std::env;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "FACTORY_LOG";

const CRATES: [&str; 5] = [
    "factory",
    "factory_app",
    "factory_api",
    "factory_store",
    "factory_tui",
];

/// Sends `tracing` output to `path`; the terminal belongs to the UI.
pub fn init(path: &Path, level: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| {
            format!(
                "open log file {} -- set [log].path to a writable file",
                path.display()
            )
        })?;

    let filter = build_filter(level, env::var(LOG_FILTER_ENV).ok().as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))
}

/// A non-empty `FACTORY_LOG` replaces the configured level outright.
fn build_filter(level: &str, env_override: Option<&str>) -> Result<EnvFilter> {
    if let Some(directives) = env_override.map(str::trim).filter(|raw| !raw.is_empty()) {
        return EnvFilter::try_new(directives)
            .with_context(|| format!("invalid {LOG_FILTER_ENV} filter {directives:?}"));
    }
    let directives: Vec<String> = std::iter::once("warn".to_owned())
        .chain(CRATES.iter().map(|name| format!("{name}={level}")))
        .collect();
    EnvFilter::try_new(directives.join(","))
        .with_context(|| format!("invalid log level {level:?}"))
}

#[cfg(test)]
mod tests {
    use super::build_filter;
    use anyhow::Result;

    #[test]
    fn configured_level_applies_to_workspace_crates() -> Result<()> {
        let filter = build_filter("debug", None)?.to_string();
        assert!(filter.contains("factory_api=debug"), "got {filter}");
        assert!(filter.contains("factory_tui=debug"), "got {filter}");
        assert!(filter.contains("warn"), "got {filter}");
        Ok(())
    }

    #[test]
    fn env_override_replaces_configured_level() -> Result<()> {
        let filter = build_filter("info", Some("factory_store=trace"))?.to_string();
        assert!(filter.contains("factory_store=trace"), "got {filter}");
        assert!(!filter.contains("factory_api"), "got {filter}");
        Ok(())
    }

    #[test]
    fn blank_env_override_is_ignored() -> Result<()> {
        let filter = build_filter("warn", Some("  "))?.to_string();
        assert!(filter.contains("factory_app=warn"), "got {filter}");
        Ok(())
    }

    #[test]
    fn invalid_env_override_is_reported() {
        let error = build_filter("info", Some("factory_api=loud"))
            .expect_err("bad directive should fail");
        assert!(error.to_string().contains("FACTORY_LOG"));
    }
}
