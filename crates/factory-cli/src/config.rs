// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use factory_app::{DEFAULT_PAGE_SIZE, PAGE_SIZE_OPTIONS};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const CONFIG_VERSION: i64 = 1;
pub const CONFIG_PATH_ENV: &str = "FACTORY_CONFIG_PATH";
const DEFAULT_TIMEOUT: &str = "10s";
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            session: Session::default(),
            ui: Ui::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
    pub fetch_size: Option<i64>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Some(factory_api::DEFAULT_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
            fetch_size: Some(factory_api::DEFAULT_FETCH_SIZE as i64),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Session {
    pub store_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ui {
    pub page_size: Option<i64>,
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            page_size: Some(DEFAULT_PAGE_SIZE as i64),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub path: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            path: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(factory_store::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version. Add `version = 1` and put values under [api], [session], [ui], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(base_url) = &self.api.base_url {
            let trimmed = base_url.trim();
            if trimmed.is_empty() {
                bail!("api.base_url in {} must not be empty", path.display());
            }
            let parsed = Url::parse(trimmed).with_context(|| {
                format!(
                    "api.base_url {trimmed:?} in {} is not a valid URL",
                    path.display()
                )
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                bail!(
                    "api.base_url in {} must use http or https, got {}://",
                    path.display(),
                    parsed.scheme()
                );
            }
        }

        if let Some(timeout) = &self.api.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "api.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(fetch_size) = self.api.fetch_size
            && fetch_size < 1
        {
            bail!(
                "api.fetch_size in {} must be at least 1, got {}",
                path.display(),
                fetch_size
            );
        }

        if let Some(page_size) = self.ui.page_size
            && !PAGE_SIZE_OPTIONS
                .iter()
                .any(|option| *option as i64 == page_size)
        {
            bail!(
                "ui.page_size in {} must be one of {:?}, got {}",
                path.display(),
                PAGE_SIZE_OPTIONS,
                page_size
            );
        }

        if let Some(store_path) = &self.session.store_path {
            factory_store::validate_store_path(store_path)?;
        }

        if let Some(level) = &self.log.level
            && !LOG_LEVELS.contains(&level.trim().to_lowercase().as_str())
        {
            bail!(
                "log.level in {} must be one of {}, got {:?}",
                path.display(),
                LOG_LEVELS.join(", "),
                level
            );
        }

        Ok(())
    }

    pub fn api_base_url(&self) -> &str {
        self.api
            .base_url
            .as_deref()
            .unwrap_or(factory_api::DEFAULT_BASE_URL)
            .trim()
            .trim_end_matches('/')
    }

    pub fn api_timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn fetch_size(&self) -> usize {
        self.api
            .fetch_size
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(factory_api::DEFAULT_FETCH_SIZE)
    }

    pub fn page_size(&self) -> usize {
        self.ui
            .page_size
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.session.store_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => factory_store::default_store_path(),
        }
    }

    pub fn log_level(&self) -> String {
        self.log
            .level
            .as_deref()
            .unwrap_or(DEFAULT_LOG_LEVEL)
            .trim()
            .to_lowercase()
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log.path {
            return Ok(PathBuf::from(path));
        }
        let data_root = dirs::data_local_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [log].path to a writable file")
        })?;
        Ok(data_root
            .join(factory_store::APP_NAME)
            .join(format!("{}.log", factory_store::APP_NAME)))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# factory config\n# Place this file at: {}\n\nversion = 1\n\n[api]\nbase_url = \"{}\"\ntimeout = \"{}\"\nfetch_size = {}\n\n[session]\n# Optional. Default is platform data dir (for example ~/.local/share/factory/session.db)\n# store_path = \"/absolute/path/session.db\"\n\n[ui]\n# One of 10, 20, 50, 100\npage_size = {}\n\n[log]\n# FACTORY_LOG overrides this with a full filter such as \"factory_api=debug\"\nlevel = \"{}\"\n# path = \"/absolute/path/factory.log\"\n",
            path.display(),
            factory_api::DEFAULT_BASE_URL,
            DEFAULT_TIMEOUT,
            factory_api::DEFAULT_FETCH_SIZE,
            DEFAULT_PAGE_SIZE,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 10s)")
}
