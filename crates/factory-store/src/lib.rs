// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Session persistence in two scopes: a private SQLite file that survives
//! restarts ("remember me") and an in-memory database that lives as long as
//! the process.

use anyhow::{Context, Result, anyhow, bail};
use factory_app::{SessionContext, Token};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

pub const APP_NAME: &str = "factory";
pub const STORE_PATH_ENV: &str = "FACTORY_SESSION_PATH";

const TOKEN_KEY: &str = "token";
const EXPIRY_KEY: &str = "expiryDate";
const ROLE_KEY: &str = "currentRole";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS session_entries (
      key TEXT PRIMARY KEY,
      value TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    Persistent,
    Ephemeral,
}

impl StorageScope {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Ephemeral => "ephemeral",
        }
    }
}

/// One key-value scope backed by its own SQLite connection.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_store_path(&printable)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create session directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open session store at {}", path.display()))?;
        configure_connection(&conn)?;
        let store = Self { conn };
        store.bootstrap()?;
        set_private_permissions(path)?;
        Ok(store)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory session store")?;
        configure_connection(&conn)?;
        let store = Self { conn };
        store.bootstrap()?;
        Ok(store)
    }

    pub fn bootstrap(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("create session schema")
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM session_entries WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read session entry {key}"))
    }

    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO session_entries (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                  value = excluded.value,
                  updated_at = excluded.updated_at
                ",
                params![key, value, now],
            )
            .with_context(|| format!("write session entry {key}"))?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM session_entries WHERE key = ?", params![key])
            .with_context(|| format!("remove session entry {key}"))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM session_entries", [])
            .context("clear session entries")?;
        Ok(())
    }
}

/// Token, expiry and signed-in role across both scopes. Reads prefer the
/// persistent scope.
pub struct SessionVault {
    persistent: Store,
    ephemeral: Store,
}

impl SessionVault {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            persistent: Store::open(path)?,
            ephemeral: Store::open_memory()?,
        })
    }

    /// Both scopes in memory; nothing touches disk.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            persistent: Store::open_memory()?,
            ephemeral: Store::open_memory()?,
        })
    }

    fn scope_store(&self, scope: StorageScope) -> &Store {
        match scope {
            StorageScope::Persistent => &self.persistent,
            StorageScope::Ephemeral => &self.ephemeral,
        }
    }

    /// Stores the token in one scope and wipes the other so a stale
    /// remembered session cannot shadow a fresh one.
    pub fn save(&self, token: &Token, remember_me: bool) -> Result<StorageScope> {
        let scope = if remember_me {
            StorageScope::Persistent
        } else {
            StorageScope::Ephemeral
        };
        self.clear()?;
        let store = self.scope_store(scope);
        store.put(TOKEN_KEY, &token.value)?;
        if let Some(expires_at) = token.expires_at {
            let raw = expires_at
                .format(&Rfc3339)
                .context("format token expiry")?;
            store.put(EXPIRY_KEY, &raw)?;
        }
        info!(
            scope = scope.label(),
            token = %token_fingerprint(&token.value),
            "session saved"
        );
        Ok(scope)
    }

    /// Scope currently holding a token, persistent first.
    pub fn active_scope(&self) -> Result<Option<StorageScope>> {
        for scope in [StorageScope::Persistent, StorageScope::Ephemeral] {
            if self.scope_store(scope).get(TOKEN_KEY)?.is_some() {
                return Ok(Some(scope));
            }
        }
        Ok(None)
    }

    pub fn load_token(&self) -> Result<Option<Token>> {
        let Some(scope) = self.active_scope()? else {
            return Ok(None);
        };
        let store = self.scope_store(scope);
        let value = store
            .get(TOKEN_KEY)?
            .ok_or_else(|| anyhow!("session token vanished from {} scope", scope.label()))?;
        let expires_at = store
            .get(EXPIRY_KEY)?
            .map(|raw| {
                OffsetDateTime::parse(&raw, &Rfc3339).with_context(|| {
                    format!("session expiry {raw:?} is not RFC 3339 -- run `factory --logout` and log in again")
                })
            })
            .transpose()?;
        Ok(Some(Token { value, expires_at }))
    }

    /// The role goes next to the token; without a token it goes to the
    /// ephemeral scope.
    pub fn set_current_role(&self, role: &str) -> Result<()> {
        let scope = self.active_scope()?.unwrap_or(StorageScope::Ephemeral);
        self.scope_store(scope).put(ROLE_KEY, role)
    }

    pub fn load_current_role(&self) -> Result<Option<String>> {
        if let Some(role) = self.persistent.get(ROLE_KEY)? {
            return Ok(Some(role));
        }
        self.ephemeral.get(ROLE_KEY)
    }

    pub fn clear(&self) -> Result<()> {
        self.persistent.clear()?;
        self.ephemeral.clear()?;
        debug!("session cleared from both scopes");
        Ok(())
    }
}

impl SessionContext for SessionVault {
    fn token(&self) -> Option<Token> {
        match self.load_token() {
            Ok(token) => token,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "cannot read session token");
                None
            }
        }
    }

    fn current_role(&self) -> Option<String> {
        match self.load_current_role() {
            Ok(role) => role,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "cannot read current role");
                None
            }
        }
    }
}

/// Short digest for logs; raw tokens never reach the log file.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut output = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

pub fn default_store_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os(STORE_PATH_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set {STORE_PATH_ENV} to a writable file path")
    })?;

    Ok(data_root.join(APP_NAME).join("session.db"))
}

pub fn validate_store_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("session store path must not be empty");
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "session store path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("session store path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "session store path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

fn set_private_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("set permissions on {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Store, token_fingerprint};
    use anyhow::Result;

    #[test]
    fn put_overwrites_and_remove_deletes() -> Result<()> {
        let store = Store::open_memory()?;
        store.put("k", "one")?;
        store.put("k", "two")?;
        assert_eq!(store.get("k")?.as_deref(), Some("two"));

        store.remove("k")?;
        assert_eq!(store.get("k")?, None);
        Ok(())
    }

    #[test]
    fn fingerprint_is_short_and_stable() {
        let first = token_fingerprint("secret-token");
        assert_eq!(first.len(), 12);
        assert_eq!(first, token_fingerprint("secret-token"));
        assert_ne!(first, token_fingerprint("other-token"));
        assert!(!first.contains("secret"));
    }
}
