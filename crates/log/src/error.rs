//! Error types for logger setup

/// Result alias for logger operations
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while configuring or installing the subscriber
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The level filter could not be parsed
    #[error("invalid filter '{filter}': {reason}")]
    Filter {
        /// The filter string as given
        filter: String,
        /// Parser message
        reason: String,
    },

    /// Unknown output format name
    #[error("unknown log format '{0}', expected pretty, compact or json")]
    Format(String),

    /// A global subscriber is already installed
    #[error("failed to install subscriber: {0}")]
    Init(String),
}
