mod config;
pub mod dispatch;
pub mod error;
pub mod normalize;

pub use config::Config;
pub use config::ConnectionOptions;
pub use config::Provider;
pub use config::ProviderConfig;
pub use dispatch::{AgentState, DispatchEvent, Dispatcher, SendMessage};
pub use error::LLMError;
pub use normalize::{normalize, normalize_value, ErrorCode, NormalizedError};
