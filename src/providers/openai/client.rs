use std::sync::Arc;

use async_stream::try_stream;
use eventsource_stream::Eventsource;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};

use super::stream::{assemble, completion_chunks};
use super::types::{ApiErrorBody, ChatCompletionRequest, ModelInfo, ModelList};
use crate::core::{ConnectionOptions, LLMError};
use crate::providers::llm::{ChatRequest, ChunkStream, LLMProvider};

/// Used when the options carry no base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// An HTTP client bound to one set of credentials and one endpoint.
#[derive(Debug)]
pub(crate) struct Connection {
    http: Client,
    base_url: String,
    options: ConnectionOptions,
}

impl Connection {
    fn new(options: &ConnectionOptions) -> Result<Self, LLMError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {key}", key = options.api_key))
            .map_err(|_| {
                LLMError::Initialization("API key contains invalid characters".to_string())
            })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        for (name, value) in &options.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                LLMError::Initialization(format!("Invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                LLMError::Initialization(format!("Invalid value for header '{name}': {e}"))
            })?;
            headers.insert(name, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| LLMError::Initialization(format!("Failed to build HTTP client: {e}")))?;

        let base_url = options
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            base_url,
            options: options.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{base}/{path}", base = self.base_url)
    }

    /// Sends a serialized chat completion request and checks the status.
    async fn create_chat_completion(&self, body: Vec<u8>) -> Result<Response, LLMError> {
        let response = self
            .http
            .post(self.endpoint("chat/completions"))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .body(body)
            .send()
            .await?;

        ensure_success(response).await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LLMError> {
        let response = self.http.get(self.endpoint("models")).send().await?;
        let models: ModelList = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| LLMError::ResponseFormat(format!("Invalid model list: {e}")))?;
        Ok(models.data)
    }
}

async fn ensure_success(response: Response) -> Result<Response, LLMError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(LLMError::api(status.as_u16(), ApiErrorBody::message_from(&body)))
}

/// Streams chat completions from OpenAI or any server speaking the same
/// protocol (OpenRouter, local gateways).
#[derive(Debug, Default)]
pub struct OpenAIProvider {
    connection: Option<Arc<Connection>>,
}

impl OpenAIProvider {
    pub const fn new() -> Self {
        Self { connection: None }
    }

    pub const fn is_initialized(&self) -> bool {
        self.connection.is_some()
    }

    fn connection(&self) -> Result<Arc<Connection>, LLMError> {
        self.connection.clone().ok_or_else(|| {
            LLMError::Initialization("OpenAI client has not been initialized".to_string())
        })
    }

    /// Models the endpoint offers to this key.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, LLMError> {
        self.connection()?.list_models().await
    }

    /// Like [`LLMProvider::check_connection`], but keeps the failure.
    pub async fn verify_connection(&self) -> Result<(), LLMError> {
        self.list_models().await.map(|models| {
            debug!("[OpenAI] connection ok, {} model(s) available", models.len());
        })
    }
}

#[async_trait::async_trait]
impl LLMProvider for OpenAIProvider {
    fn initialize(&mut self, options: &ConnectionOptions) -> Result<(), LLMError> {
        if options.api_key.is_empty() {
            return Err(LLMError::Initialization(
                "No API key configured. Add one in the settings.".to_string(),
            ));
        }

        let reusable = self
            .connection
            .as_ref()
            .is_some_and(|connection| connection.options == *options);
        if !reusable {
            debug!(
                "[OpenAI] building client for {}",
                options.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
            );
            self.connection = Some(Arc::new(Connection::new(options)?));
        }

        Ok(())
    }

    async fn check_connection(&self) -> bool {
        if !self.is_initialized() {
            return false;
        }

        match self.verify_connection().await {
            Ok(()) => true,
            Err(e) => {
                warn!("[OpenAI] connection check failed: {e}");
                false
            }
        }
    }

    fn stream_response(&self, request: ChatRequest) -> Result<ChunkStream, LLMError> {
        let connection = self.connection()?;
        let body = serde_json::to_vec(&ChatCompletionRequest::from(&request))?;
        let message_count = request.messages.len();
        let cancel = request.cancel.unwrap_or_default();
        let model = request.model;

        let stream = try_stream! {
            debug!("[OpenAI] streaming {model} ({message_count} message(s))");
            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                response = connection.create_chat_completion(body) => Some(response),
            };
            let response = response.ok_or(LLMError::Aborted)??;

            let chunks = completion_chunks(response.bytes_stream().eventsource());
            for await chunk in assemble(chunks, cancel) {
                yield chunk?;
            }
            debug!("[OpenAI] stream for {model} finished");
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ConnectionOptions {
        ConnectionOptions::new("sk-test")
            .with_base_url("http://localhost:9/v1/")
            .with_header("X-Title", "PixelAgent")
    }

    fn connection_of(provider: &OpenAIProvider) -> Arc<Connection> {
        provider.connection().expect("provider is initialized")
    }

    #[test]
    fn test_initialize_requires_api_key() {
        let mut provider = OpenAIProvider::new();
        let result = provider.initialize(&ConnectionOptions::default());
        assert!(matches!(result, Err(LLMError::Initialization(_))));
        assert!(!provider.is_initialized());
    }

    #[test]
    fn test_identical_options_reuse_connection() {
        let mut provider = OpenAIProvider::new();
        provider.initialize(&options()).unwrap();
        let first = connection_of(&provider);

        provider.initialize(&options()).unwrap();
        assert!(Arc::ptr_eq(&first, &connection_of(&provider)));
        assert_eq!(first.base_url, "http://localhost:9/v1");
    }

    #[test]
    fn test_any_changed_field_rebuilds_connection() {
        let changes = [
            ConnectionOptions {
                api_key: "sk-other".to_string(),
                ..options()
            },
            ConnectionOptions {
                base_url: Some("http://localhost:10/v1".to_string()),
                ..options()
            },
            options().with_header("HTTP-Referer", "http://localhost"),
        ];

        for changed in changes {
            let mut provider = OpenAIProvider::new();
            provider.initialize(&options()).unwrap();
            let first = connection_of(&provider);

            provider.initialize(&changed).unwrap();
            assert!(
                !Arc::ptr_eq(&first, &connection_of(&provider)),
                "expected a rebuild for {changed:?}"
            );
        }
    }

    #[test]
    fn test_stream_before_initialize_fails() {
        let provider = OpenAIProvider::new();
        let request = ChatRequest::new("gpt-4.1-mini", Vec::new());
        assert!(matches!(
            provider.stream_response(request),
            Err(LLMError::Initialization(_))
        ));
    }

    #[tokio::test]
    async fn test_check_connection_before_initialize_is_false() {
        assert!(!OpenAIProvider::new().check_connection().await);
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let mut provider = OpenAIProvider::new();
        let result = provider.initialize(&options().with_header("bad header", "x"));
        assert!(matches!(result, Err(LLMError::Initialization(_))));
    }
}
