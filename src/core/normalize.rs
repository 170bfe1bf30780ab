//! Maps any failure of the request/stream lifecycle onto a closed set of
//! user-facing error categories.
//!
//! Classification is first-match-wins in this order: aborted, unauthorized,
//! rate limit, server error, network error, invalid request, unknown. The
//! provider's own wording is kept in `raw_message` for diagnostics; only
//! `message` is meant for the end user.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use super::error::{codes, LLMError};

const ABORT_ERROR_NAME: &str = "AbortError";
const ABORT_ERROR_CODE: &str = "ABORT_ERR";

const NETWORK_ERROR_CODES: [&str; 5] = [
    codes::NAME_NOT_FOUND,
    codes::NAME_TEMPORARY_FAILURE,
    codes::CONNECTION_RESET,
    codes::CONNECTION_REFUSED,
    codes::TIMED_OUT,
];

static NETWORK_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)fetch failed|network\s?error").expect("network message pattern is valid")
});

const MSG_ABORTED: &str = "The request was cancelled.";
const MSG_UNAUTHORIZED: &str = "Invalid API key. Check the API key in your settings.";
const MSG_RATE_LIMIT: &str = "Too many requests. Please wait a moment and try again.";
const MSG_SERVER_ERROR: &str = "The provider is having trouble. Please try again later.";
const MSG_NETWORK: &str = "Could not reach the provider. Check your internet connection.";
const MSG_INVALID_REQUEST: &str = "The request was rejected. Check the request parameters.";
const MSG_UNKNOWN: &str = "Something went wrong while talking to the model.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    RateLimit,
    ServerError,
    NetworkError,
    Aborted,
    InvalidRequest,
    Unknown,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::NetworkError => "network_error",
            Self::Aborted => "aborted",
            Self::InvalidRequest => "invalid_request",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure, ready to show to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct NormalizedError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_message: Option<String>,
}

impl NormalizedError {
    pub const fn is_aborted(&self) -> bool {
        matches!(self.code, ErrorCode::Aborted)
    }
}

/// The properties of an error the classifier looks at, whatever its origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFacts {
    pub name: Option<String>,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl ErrorFacts {
    fn is_abort(&self) -> bool {
        self.name.as_deref() == Some(ABORT_ERROR_NAME)
            || self.code.as_deref() == Some(ABORT_ERROR_CODE)
    }

    fn is_network_failure(&self) -> bool {
        let known_code = self
            .code
            .as_deref()
            .is_some_and(|code| NETWORK_ERROR_CODES.contains(&code));
        known_code
            || self
                .message
                .as_deref()
                .is_some_and(|message| NETWORK_MESSAGE.is_match(message))
    }
}

impl From<&LLMError> for ErrorFacts {
    fn from(error: &LLMError) -> Self {
        match error {
            LLMError::Aborted => Self {
                name: Some(ABORT_ERROR_NAME.to_string()),
                ..Self::default()
            },
            LLMError::Api { status, message } => Self {
                status: Some(*status),
                message: message.clone(),
                ..Self::default()
            },
            LLMError::Network { code, message } => Self {
                code: code.clone(),
                message: Some(message.clone()),
                ..Self::default()
            },
            LLMError::Initialization(message)
            | LLMError::Provider(message)
            | LLMError::StreamError(message)
            | LLMError::ResponseFormat(message)
            | LLMError::Validation(message)
            | LLMError::ConfigError(message)
            | LLMError::IOError(message) => Self {
                message: Some(message.clone()),
                ..Self::default()
            },
            LLMError::Serialization(err) => Self {
                message: Some(err.to_string()),
                ..Self::default()
            },
        }
    }
}

impl From<&Value> for ErrorFacts {
    /// Reads `name`, `status`, `code` and the message of a loosely shaped error
    /// object. The nested `error.message` wins over a top-level `message`.
    fn from(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let nested_message = value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            name: text("name"),
            status: value
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|status| u16::try_from(status).ok()),
            code: text("code"),
            message: nested_message.or_else(|| text("message")),
        }
    }
}

/// Classifies one of the crate's own errors.
pub fn normalize(error: &LLMError) -> NormalizedError {
    classify(ErrorFacts::from(error))
}

/// Classifies an error of arbitrary shape, such as a JSON error payload.
pub fn normalize_value(value: &Value) -> NormalizedError {
    classify(ErrorFacts::from(value))
}

pub fn classify(facts: ErrorFacts) -> NormalizedError {
    let fixed = |code, message: &str, status| NormalizedError {
        code,
        message: message.to_string(),
        status,
        raw_message: facts.message.clone(),
    };

    if facts.is_abort() {
        return fixed(ErrorCode::Aborted, MSG_ABORTED, None);
    }

    match facts.status {
        Some(401) => return fixed(ErrorCode::Unauthorized, MSG_UNAUTHORIZED, facts.status),
        Some(429) => return fixed(ErrorCode::RateLimit, MSG_RATE_LIMIT, facts.status),
        Some(status) if status >= 500 => {
            return fixed(ErrorCode::ServerError, MSG_SERVER_ERROR, facts.status)
        }
        _ => {}
    }

    if facts.is_network_failure() {
        return fixed(ErrorCode::NetworkError, MSG_NETWORK, None);
    }

    let (code, fallback) = if facts.status.is_some() {
        (ErrorCode::InvalidRequest, MSG_INVALID_REQUEST)
    } else {
        (ErrorCode::Unknown, MSG_UNKNOWN)
    };

    NormalizedError {
        code,
        message: facts
            .message
            .clone()
            .unwrap_or_else(|| fallback.to_string()),
        status: facts.status,
        raw_message: facts.message,
    }
}
