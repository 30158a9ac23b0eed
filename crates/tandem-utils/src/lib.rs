pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod types;

pub use error::{ConfigError, EngineError, ProviderError};
pub use exit_codes::ExitCode;
pub use types::{ChatRole, ChatTurn};
