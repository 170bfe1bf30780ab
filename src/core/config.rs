use crate::core::LLMError;
use clap::ValueEnum;
use config::{Environment, File, FileFormat};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

include!(concat!(env!("OUT_DIR"), "/config_embedded.rs"));

const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "PIXEL_AGENT";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OPENROUTER_APP_TITLE: &str = "PixelAgent";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub default_model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    pub provider: Provider,
    pub system_prompt: Option<String>,
    pub openai: ProviderConfig,
    pub openrouter: ProviderConfig,
}

#[derive(Clone, Copy, Debug, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[value(name = "openai")]
    OpenAI,
    #[value(name = "openrouter")]
    OpenRouter,
}

impl Provider {
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAI => OPENAI_BASE_URL,
            Self::OpenRouter => OPENROUTER_BASE_URL,
        }
    }

    /// Environment variable consulted when the config carries no key.
    pub const fn api_key_var(self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    fn default_headers(self) -> BTreeMap<String, String> {
        match self {
            Self::OpenAI => BTreeMap::new(),
            Self::OpenRouter => {
                BTreeMap::from([("X-Title".to_string(), OPENROUTER_APP_TITLE.to_string())])
            }
        }
    }
}

/// Credentials and endpoint used to (re)initialize a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub api_key: String,
    pub base_url: Option<String>,
    pub default_headers: BTreeMap<String, String>,
}

impl ConnectionOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builder(None)
            .build()
            .and_then(config::Config::try_deserialize)
            .expect("Invalid default config")
    }
}

impl Config {
    /// Loads the embedded defaults, then `config.toml` from the working
    /// directory, then `PIXEL_AGENT__*` environment variables.
    pub fn load() -> Result<Self, LLMError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, LLMError> {
        debug!("[Config] loading overrides from {}", path.display());
        let config = Self::builder(Some(path))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    fn builder(path: Option<&Path>) -> config::ConfigBuilder<config::builder::DefaultState> {
        let builder =
            config::Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
        match path {
            Some(path) => builder.add_source(File::from(path).format(FileFormat::Toml).required(false)),
            None => builder,
        }
    }

    pub fn update_provider(&mut self, new_provider: Provider) {
        self.provider = new_provider;
    }

    pub const fn provider_config(&self) -> &ProviderConfig {
        match self.provider {
            Provider::OpenAI => &self.openai,
            Provider::OpenRouter => &self.openrouter,
        }
    }

    pub fn get_model(&self) -> &str {
        &self.provider_config().default_model
    }

    /// The system prompt, if it has any content after trimming.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
    }

    /// Key from the provider section, else from `.env` or the process environment.
    /// An empty string means no key is configured.
    pub fn api_key(&self) -> String {
        self.provider_config()
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| dotenv::var(self.provider.api_key_var()).ok())
            .unwrap_or_default()
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        let base_url = self
            .provider_config()
            .base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string());

        ConnectionOptions {
            api_key: self.api_key(),
            base_url: Some(base_url),
            default_headers: self.provider.default_headers(),
        }
    }
}
