//! Error types for the intake bot.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}

/// Configuration-related errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Messaging gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to download file {file_id} on channel {name}: {reason}")]
    DownloadFailed {
        name: String,
        file_id: String,
        reason: String,
    },
}

/// Rejected submitter input. Recovered by re-prompting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Unsupported file extension in {file_name:?}")]
    UnsupportedExtension { file_name: String },

    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },
}

/// Uploads directory errors. Recovered with a retry prompt.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid stored file name: {0:?}")]
    InvalidName(String),

    #[error("Failed to fetch document: {0}")]
    Fetch(#[from] ChannelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reviewer notification errors. Logged, never surfaced to the submitter.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Forwarding to reviewer {reviewer} failed: {source}")]
    ForwardFailed {
        reviewer: String,
        #[source]
        source: ChannelError,
    },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
