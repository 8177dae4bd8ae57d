// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

pub const ADD_USER_SCOPE: &str = "ADD_USER";
pub const EDIT_USER_SCOPE: &str = "EDIT_USER";
pub const SUPER_ADMIN_ROLE: &str = "SUPER_ADMIN";

#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expires_at: Option<OffsetDateTime>,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_at: Option<OffsetDateTime>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// A token without an expiry never lapses locally; the server still decides.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Where pages get the bearer token and the signed-in role from.
pub trait SessionContext {
    fn token(&self) -> Option<Token>;

    fn current_role(&self) -> Option<String>;

    fn is_expired(&self, token: &Token, now: OffsetDateTime) -> bool {
        token.is_expired(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Active(Token),
    Missing,
    Expired,
}

pub fn session_status<S>(session: &S, now: OffsetDateTime) -> SessionStatus
where
    S: SessionContext + ?Sized,
{
    match session.token() {
        None => SessionStatus::Missing,
        Some(token) if session.is_expired(&token, now) => SessionStatus::Expired,
        Some(token) => SessionStatus::Active(token),
    }
}

/// Session held in plain fields, with no backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSession {
    pub token: Option<Token>,
    pub role: Option<String>,
}

impl SessionContext for StaticSession {
    fn token(&self) -> Option<Token> {
        self.token.clone()
    }

    fn current_role(&self) -> Option<String> {
        self.role.clone()
    }
}

/// Claims read from the unverified JWT payload. Signature checks belong to
/// the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    pub subject: Option<String>,
    pub scopes: Vec<String>,
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl Claims {
    pub fn decode(token: &str) -> Result<Self> {
        let payload = token
            .split('.')
            .nth(1)
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| anyhow!("token has no payload segment"))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .context("decode token payload")?;
        let raw: RawClaims = serde_json::from_slice(&bytes).context("parse token claims")?;
        Ok(Self {
            subject: raw.sub,
            scopes: raw
                .scope
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
        })
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|held| held == scope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Add,
    Edit,
    Delete,
}

impl UserAction {
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }

    pub const fn required_scope(self) -> &'static str {
        match self {
            Self::Add => ADD_USER_SCOPE,
            Self::Edit | Self::Delete => EDIT_USER_SCOPE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("You do not have permission to {} users.", .0.verb())]
    MissingScope(UserAction),
    #[error("You are not allowed to {} this user.", .0.verb())]
    ProtectedTarget(UserAction),
}

/// Checked before any user dialog opens. Edit and delete also refuse super
/// admins and peers holding the caller's own role.
pub fn authorize_user_action(
    action: UserAction,
    claims: &Claims,
    current_role: Option<&str>,
    target_role: Option<&str>,
) -> Result<(), AuthorizationError> {
    if !claims.has_scope(action.required_scope()) {
        return Err(AuthorizationError::MissingScope(action));
    }
    if action == UserAction::Add {
        return Ok(());
    }
    let target = target_role.unwrap_or_default().to_uppercase();
    let protected = target == SUPER_ADMIN_ROLE
        || current_role.is_some_and(|role| role.to_uppercase() == target);
    if protected {
        return Err(AuthorizationError::ProtectedTarget(action));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use time::{Duration, OffsetDateTime};

    use super::{
        AuthorizationError, Claims, SessionStatus, StaticSession, Token, UserAction,
        authorize_user_action, session_status,
    };

    fn jwt(payload: &str) -> String {
        format!(
            "eyJhbGciOiJIUzI1NiJ9.{}.signature",
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    fn claims(scope: &str) -> Claims {
        Claims {
            subject: Some("alice".to_owned()),
            scopes: scope.split_whitespace().map(str::to_owned).collect(),
        }
    }

    #[test]
    fn expiry_is_strictly_after() {
        let now = OffsetDateTime::now_utc();
        let token = Token::new("t", Some(now));
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + Duration::seconds(1)));
        assert!(!Token::new("t", None).is_expired(now));
    }

    #[test]
    fn status_reports_missing_expired_and_active() {
        let now = OffsetDateTime::now_utc();
        let mut session = StaticSession::default();
        assert_eq!(session_status(&session, now), SessionStatus::Missing);

        session.token = Some(Token::new("t", Some(now - Duration::minutes(1))));
        assert_eq!(session_status(&session, now), SessionStatus::Expired);

        let fresh = Token::new("t", Some(now + Duration::hours(1)));
        session.token = Some(fresh.clone());
        assert_eq!(session_status(&session, now), SessionStatus::Active(fresh));
    }

    #[test]
    fn decode_reads_scope_and_subject() -> anyhow::Result<()> {
        let token = jwt(r#"{"sub":"alice","scope":"ROLE_ADMIN ADD_USER EDIT_USER"}"#);
        let decoded = Claims::decode(&token)?;
        assert_eq!(decoded.subject.as_deref(), Some("alice"));
        assert!(decoded.has_scope("ADD_USER"));
        assert!(!decoded.has_scope("ADD"));
        Ok(())
    }

    #[test]
    fn decode_tolerates_padding_and_missing_scope() -> anyhow::Result<()> {
        let padded = format!("h.{}==.s", URL_SAFE_NO_PAD.encode(r#"{"sub":"bo"}"#));
        let decoded = Claims::decode(&padded)?;
        assert!(decoded.scopes.is_empty());
        Ok(())
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Claims::decode("not-a-jwt").is_err());
        assert!(Claims::decode("a.!!!.c").is_err());
    }

    #[test]
    fn add_requires_add_scope() {
        let error = authorize_user_action(UserAction::Add, &claims("EDIT_USER"), None, None)
            .expect_err("add without scope should be refused");
        assert_eq!(error, AuthorizationError::MissingScope(UserAction::Add));
        assert_eq!(error.to_string(), "You do not have permission to add users.");

        assert!(authorize_user_action(UserAction::Add, &claims("ADD_USER"), None, None).is_ok());
    }

    #[test]
    fn delete_requires_edit_scope() {
        let error = authorize_user_action(
            UserAction::Delete,
            &claims("ADD_USER"),
            Some("ADMIN"),
            Some("OPERATOR"),
        )
        .expect_err("delete without scope should be refused");
        assert_eq!(error.to_string(), "You do not have permission to delete users.");
    }

    #[test]
    fn super_admin_and_peer_targets_are_protected() {
        let scopes = claims("EDIT_USER");

        let error = authorize_user_action(
            UserAction::Edit,
            &scopes,
            Some("admin"),
            Some("super_admin"),
        )
        .expect_err("super admin is protected");
        assert_eq!(error.to_string(), "You are not allowed to edit this user.");

        let error = authorize_user_action(UserAction::Delete, &scopes, Some("admin"), Some("ADMIN"))
            .expect_err("peer role is protected");
        assert_eq!(error.to_string(), "You are not allowed to delete this user.");

        assert!(
            authorize_user_action(UserAction::Edit, &scopes, Some("ADMIN"), Some("OPERATOR"))
                .is_ok()
        );
    }
}
