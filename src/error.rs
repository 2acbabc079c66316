//! # Error Handling
//!
//! One error type for every resource operation, plus the [`Diagnostic`]
//! shape a protocol bridge renders to the operator. Upstream bodies are kept
//! verbatim in diagnostics; only log lines are truncated.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::client::ClientError;
use crate::config::ConfigError;
use crate::normalization::CsvError;

const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] ClientError),
    #[error("unable to decode {resource} response: {detail}")]
    Decode {
        resource: &'static str,
        detail: String,
        body: String,
    },
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: &'static str, id: String },
    #[error("invalid {resource}: {detail}")]
    Validation {
        resource: &'static str,
        detail: String,
    },
    #[error("invalid {resource} state: {detail}")]
    InvalidState {
        resource: &'static str,
        detail: String,
    },
}

/// Coarse failure class, used as the diagnostic summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Transport,
    Decode,
    NotFound,
    Validation,
    InvalidState,
}

impl ErrorCategory {
    pub const fn summary(self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "Provider Configuration Error",
            ErrorCategory::Transport => "Keep API Error",
            ErrorCategory::Decode => "Unexpected Keep API Response",
            ErrorCategory::NotFound => "Resource Not Found",
            ErrorCategory::Validation => "Invalid Resource Configuration",
            ErrorCategory::InvalidState => "Invalid Resource State",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.summary())
    }
}

impl ProviderError {
    pub fn decode(resource: &'static str, detail: impl fmt::Display, body: &[u8]) -> Self {
        ProviderError::Decode {
            resource,
            detail: detail.to_string(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    pub fn validation(resource: &'static str, detail: impl fmt::Display) -> Self {
        ProviderError::Validation {
            resource,
            detail: detail.to_string(),
        }
    }

    pub fn invalid_state(resource: &'static str, detail: impl fmt::Display) -> Self {
        ProviderError::InvalidState {
            resource,
            detail: detail.to_string(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        ProviderError::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Wraps a CSV parse failure of a mapping rule.
    pub fn csv(resource: &'static str, err: CsvError) -> Self {
        Self::validation(resource, format!("csv_data: {err}"))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::Configuration(_) => ErrorCategory::Configuration,
            ProviderError::Transport(_) => ErrorCategory::Transport,
            ProviderError::Decode { .. } => ErrorCategory::Decode,
            ProviderError::NotFound { .. } => ErrorCategory::NotFound,
            ProviderError::Validation { .. } => ErrorCategory::Validation,
            ProviderError::InvalidState { .. } => ErrorCategory::InvalidState,
        }
    }

    /// True when the remote object is gone, so the bridge may drop it from state.
    pub fn is_not_found(&self) -> bool {
        match self {
            ProviderError::NotFound { .. } => true,
            ProviderError::Transport(err) => err.is_not_found(),
            _ => false,
        }
    }

    /// Raw body returned by the server, when one was received.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            ProviderError::Decode { body, .. } => Some(body),
            ProviderError::Transport(err) => err.body(),
            _ => None,
        }
    }
}

/// Operator-facing error rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub category: ErrorCategory,
    pub summary: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl From<&ProviderError> for Diagnostic {
    fn from(error: &ProviderError) -> Self {
        let category = error.category();
        let detail = match error {
            ProviderError::Decode { body, .. } if !body.is_empty() => {
                format!("{error}\n\nResponse body:\n{body}")
            }
            _ => error.to_string(),
        };
        let attribute = match error {
            ProviderError::Configuration(err) => err.attribute().map(str::to_string),
            _ => None,
        };
        Diagnostic {
            category,
            summary: category.summary().to_string(),
            detail,
            attribute,
        }
    }
}

/// First characters of an upstream body, for log lines.
pub fn snippet(body: &str) -> String {
    if body.chars().count() > SNIPPET_CHARS {
        let truncated: String = body.chars().take(SNIPPET_CHARS).collect();
        format!("{truncated}...")
    } else {
        body.to_string()
    }
}
