pub mod client;
mod stream;
pub mod types;

pub use client::OpenAIProvider;
pub use types::ModelInfo;
