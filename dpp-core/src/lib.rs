//! Core library for the DPP certification control agent.
//! This crate defines the daemon client interface (traits), the control
//! socket backends selected by feature flags, the agent configuration,
//! and the DPP orchestration engine that sequences a device through
//! bootstrapping, authentication, configuration and connection.

pub mod backends;
pub mod config;
pub mod dpp;
pub mod factory;
pub mod traits;

// Define a shared Error and Result type for the entire crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required request parameter was absent.
    #[error("Missing {0}")]
    Missing(&'static str),

    /// A request parameter carried a value this agent does not handle.
    #[error("Unsupported {0}")]
    Unsupported(&'static str),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    /// The daemon answered, but not in a way the flow can continue from.
    #[error("{0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid hex payload: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Renders the error the way the test station expects it after
    /// `status,ERROR,`.
    pub fn to_response(&self) -> String {
        format!("errorCode,{}", self)
    }
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_errors_render_capi_error_codes() {
        assert_eq!(
            Error::Missing("DPPAuthRole").to_response(),
            "errorCode,Missing DPPAuthRole"
        );
        assert_eq!(
            Error::Unsupported("DPPConfIndex").to_response(),
            "errorCode,Unsupported DPPConfIndex"
        );
        assert_eq!(
            Error::Protocol("Peer did not use mutual authentication".into()).to_response(),
            "errorCode,Peer did not use mutual authentication"
        );
    }
}
