//! Error types for the lead relay.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mail(#[from] MailError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Gave up reconnecting to the mailbox after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Connection-level mailbox errors.
///
/// Any of these tears the whole session down and sends the watcher into
/// backoff — per-message problems never surface as `MailError`.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("IMAP login failed for {user}")]
    AuthFailed { user: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Mailbox connection closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lead store errors. A `Query` failure is a retryable per-message
/// condition, not a reason to stop the watch loop.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open lead store: {0}")]
    Open(String),

    #[error("Lead lookup failed: {0}")]
    Query(String),
}

/// Dispatch pipeline errors. All of these mark the message as consumed —
/// the mailbox item was already flagged seen, so there is no retry.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Automation webhook rejected message: status {status}: {body}")]
    WebhookRejected { status: u16, body: String },

    #[error("CRM authentication rejected: status {status}: {body}")]
    AuthRejected { status: u16, body: String },

    #[error("Attachment upload rejected: status {status}: {body}")]
    UploadRejected { status: u16, body: String },

    #[error("Unexpected response body: {0}")]
    InvalidResponse(String),

    #[error("Upload attempted before the webhook returned a correlation token")]
    MissingCorrelationToken,

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
