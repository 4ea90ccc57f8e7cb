//! Error types for Capsule

use thiserror::Error;

/// Capsule error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),

    /// Requested capabilities contradict each other
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// An in-namespace setup or teardown action failed
    #[error("Setup error in {step}: {message}")]
    Setup {
        /// Name of the failing step
        step: &'static str,
        /// Error message
        message: String,
    },

    /// The namespaced child process could not be created
    #[error("Launch error: {message}")]
    Launch {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Build a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build a setup error for the named step
    pub fn setup(step: &'static str, message: impl Into<String>) -> Self {
        Self::Setup {
            step,
            message: message.into(),
        }
    }

    /// Build a launch error
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    /// Returns true for errors caught before any mutation happened
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Result type alias for Capsule operations
pub type Result<T> = std::result::Result<T, Error>;
