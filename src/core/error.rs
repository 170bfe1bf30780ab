use std::error::Error as StdError;
use std::io;

/// Low-level connection failure codes, named after their libuv/POSIX spelling.
pub mod codes {
    pub const NAME_NOT_FOUND: &str = "ENOTFOUND";
    pub const NAME_TEMPORARY_FAILURE: &str = "EAI_AGAIN";
    pub const CONNECTION_RESET: &str = "ECONNRESET";
    pub const CONNECTION_REFUSED: &str = "ECONNREFUSED";
    pub const TIMED_OUT: &str = "ETIMEDOUT";
}

#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    /// The provider was used before a successful `initialize`, or without an API key
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The caller cancelled the request
    #[error("Request aborted")]
    Aborted,
    /// The provider answered with a non-success HTTP status
    #[error("API error (status {status}): {}", message.as_deref().unwrap_or("no details"))]
    Api {
        status: u16,
        message: Option<String>,
    },
    /// The provider reported an error mid-stream without an HTTP status
    #[error("Provider error: {0}")]
    Provider(String),
    /// Transport failures before or during the response
    #[error("Network error: {message}")]
    Network {
        code: Option<String>,
        message: String,
    },
    /// Stream-related errors
    #[error("Stream error: {0}")]
    StreamError(String),
    /// Response parsing errors (missing fields, invalid format)
    #[error("Failed to parse response: {0}")]
    ResponseFormat(String),
    /// Request serialization errors
    #[error("Failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Caller input rejected before any request was made
    #[error("Invalid input: {0}")]
    Validation(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// I/O error
    #[error("I/O error: {0}")]
    IOError(String),
}

impl LLMError {
    pub const fn api(status: u16, message: Option<String>) -> Self {
        Self::Api { status, message }
    }

    pub fn network(code: Option<&str>, message: impl Into<String>) -> Self {
        Self::Network {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<io::Error> for LLMError {
    fn from(err: io::Error) -> Self {
        Self::IOError(err.to_string())
    }
}

impl From<config::ConfigError> for LLMError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for LLMError {
    fn from(err: reqwest::Error) -> Self {
        // If the error has a status code, keep it so the normalizer can classify it
        if let Some(status) = err.status() {
            return Self::api(status.as_u16(), Some(err.to_string()));
        }

        let code = if err.is_timeout() {
            Some(codes::TIMED_OUT)
        } else {
            connection_failure_code(&err)
        };
        Self::network(code, describe_chain(&err))
    }
}

/// Walks the source chain of a transport error looking for the root cause.
fn connection_failure_code(err: &(dyn StdError + 'static)) -> Option<&'static str> {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return Some(codes::CONNECTION_REFUSED),
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                    return Some(codes::CONNECTION_RESET)
                }
                io::ErrorKind::TimedOut => return Some(codes::TIMED_OUT),
                _ => {}
            }
        }

        let text = current.to_string().to_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return Some(codes::NAME_NOT_FOUND);
        }
        if text.contains("temporary failure in name resolution") {
            return Some(codes::NAME_TEMPORARY_FAILURE);
        }

        source = current.source();
    }
    None
}

/// reqwest's top-level message is terse ("error sending request"), so append the causes.
fn describe_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("client error (Connect)")]
    struct Wrapper(#[source] io::Error);

    #[test]
    fn test_refused_connection_maps_to_code() {
        let err = Wrapper(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(
            connection_failure_code(&err),
            Some(codes::CONNECTION_REFUSED)
        );
    }

    #[test]
    fn test_dns_failure_maps_to_not_found() {
        let err = Wrapper(io::Error::other("dns error: failed to lookup address information"));
        assert_eq!(connection_failure_code(&err), Some(codes::NAME_NOT_FOUND));
    }

    #[test]
    fn test_unrelated_failure_has_no_code() {
        let err = Wrapper(io::Error::other("certificate verify failed"));
        assert_eq!(connection_failure_code(&err), None);
    }

    #[test]
    fn test_chain_description_includes_causes() {
        let err = Wrapper(io::Error::other("boom"));
        assert_eq!(describe_chain(&err), "client error (Connect): boom");
    }

    #[test]
    fn test_api_display_without_message() {
        let err = LLMError::api(503, None);
        assert_eq!(err.to_string(), "API error (status 503): no details");
    }
}
