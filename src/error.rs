//! Bridge Error Types
//!
//! Error handling for everything that crosses, or refuses to cross, the
//! host boundary.

use thiserror::Error;

/// Errors raised by the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host replied with `success: false`
    #[error("{message}")]
    Command {
        operation: &'static str,
        message: String,
    },

    /// The boundary call itself could not complete (host gone, channel missing, timeout)
    #[error("{0}")]
    Transport(String),

    /// A local precondition kept the call from being issued
    #[error("{0}")]
    Validation(String),

    /// A reply or event did not have the expected shape
    #[error("Malformed host payload: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Build a command failure from an optional host message
    pub fn command(operation: &'static str, message: Option<String>, fallback: &str) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string());
        BridgeError::Command { operation, message }
    }

    /// True for failures that originate on the far side of the boundary
    /// (either a failed reply or a failed round trip).
    pub fn is_remote(&self) -> bool {
        matches!(self, BridgeError::Command { .. } | BridgeError::Transport(_))
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Decode(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
