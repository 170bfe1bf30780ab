use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

use crate::core::Provider;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Message to send to the agent
    #[arg(required_unless_present_any = ["check", "list_models"])]
    pub query: Option<String>,

    /// LLM provider to use (openai or openrouter)
    #[arg(short, long, value_enum)]
    pub provider: Option<Provider>,

    /// Model to use instead of the provider's default
    #[arg(short, long)]
    pub model: Option<String>,

    /// JSON file with tool definitions to offer the model
    #[arg(long)]
    pub tools: Option<PathBuf>,

    /// Config file to load instead of ./config.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only check that the provider is reachable with the configured key
    #[arg(long, conflicts_with = "list_models")]
    pub check: bool,

    /// List the models available to the configured key
    #[arg(long)]
    pub list_models: bool,

    /// Enable debug output
    #[arg(short, long, default_value = "false")]
    pub debug: bool,
}

impl Args {
    /// Default log level; `RUST_LOG` still overrides it.
    pub const fn log_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}
