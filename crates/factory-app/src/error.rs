// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";
pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please try again later.";

/// Failure of a call to the remote backend, already classified for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("cannot reach {endpoint}: {detail}")]
    Network { endpoint: String, detail: String },
    #[error("server returned {status}{}", detail_suffix(.message))]
    Server {
        status: u16,
        message: Option<String>,
    },
    #[error("session rejected by server ({status})")]
    Unauthorized {
        status: u16,
        message: Option<String>,
    },
    #[error("malformed response: {0}")]
    Decode(String),
}

fn detail_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|message| format!(": {message}"))
        .unwrap_or_default()
}

impl RemoteError {
    pub fn network(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Network {
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }

    /// Classifies a non-success HTTP status with the body's `message` field, if any.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        let message = message
            .map(|message| message.trim().to_owned())
            .filter(|message| !message.is_empty());
        if status == 401 || status == 403 {
            Self::Unauthorized { status, message }
        } else {
            Self::Server { status, message }
        }
    }

    /// Text for the page banner. Server-provided messages win over generic fallbacks.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network { .. } => NETWORK_ERROR_MESSAGE.to_owned(),
            Self::Server { message, .. } | Self::Unauthorized { message, .. } => message
                .clone()
                .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_owned()),
            Self::Decode(_) => UNKNOWN_ERROR_MESSAGE.to_owned(),
        }
    }

    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{NETWORK_ERROR_MESSAGE, RemoteError, UNKNOWN_ERROR_MESSAGE};

    #[test]
    fn server_message_is_preferred() {
        let error = RemoteError::from_status(500, Some("database offline".to_owned()));
        assert_eq!(error.user_message(), "database offline");
        assert_eq!(error.to_string(), "server returned 500: database offline");
    }

    #[test]
    fn blank_server_message_falls_back_to_generic_text() {
        let error = RemoteError::from_status(502, Some("   ".to_owned()));
        assert_eq!(error.user_message(), UNKNOWN_ERROR_MESSAGE);
        assert_eq!(error.to_string(), "server returned 502");
    }

    #[test]
    fn network_failures_use_network_text() {
        let error = RemoteError::network("http://localhost:8080", "connection refused");
        assert_eq!(error.user_message(), NETWORK_ERROR_MESSAGE);
        assert!(!error.is_unauthorized());
    }

    #[test]
    fn auth_statuses_are_unauthorized() {
        assert!(RemoteError::from_status(401, None).is_unauthorized());
        assert!(RemoteError::from_status(403, None).is_unauthorized());
        assert!(!RemoteError::from_status(404, None).is_unauthorized());
    }
}
