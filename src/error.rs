//! Error types for ESL operations

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type EslResult<T> = Result<T, EslError>;

/// Errors surfaced by connections, the request façade, and the codec.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EslError {
    /// Underlying transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request or handshake did not complete within the configured window.
    /// The connection is closed afterwards; see
    /// [`EslConnection::request`](crate::EslConnection::request).
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The window that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// The connection is closed. Every outstanding response waiter observes
    /// this when the transport goes away, and every call attempted after
    /// close fails with it.
    #[error("connection closed")]
    ConnectionClosed,

    /// The server replied `-ERR` to `auth`.
    #[error("authentication failed: {message}")]
    AuthFailed {
        /// Reply text from the server.
        message: String,
    },

    /// The server sent `text/rude-rejection` — the client address is not
    /// allowed by the server's ACL and no auth handshake will occur.
    #[error("connection rejected by server access control")]
    AuthRejected,

    /// An envelope or payload violated the wire protocol.
    #[error("protocol error: {message}")]
    ProtocolError {
        /// What was wrong.
        message: String,
    },

    /// A header line could not be parsed.
    #[error("invalid header line: {header}")]
    InvalidHeader {
        /// The offending line.
        header: String,
    },

    /// A command reply carried `-ERR`.
    #[error("command failed: {reply_text}")]
    CommandFailed {
        /// Raw `Reply-Text` value.
        reply_text: String,
    },

    /// The caller passed an argument the façade rejects (e.g. a reserved
    /// verb through [`EslConnection::command`](crate::EslConnection::command)).
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Why the argument was rejected.
        message: String,
    },

    /// A `text/event-json` body failed to parse.
    #[error("JSON event parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A `text/event-xml` body failed to parse.
    #[error("XML event parse error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl EslError {
    pub(crate) fn protocol_error(message: impl Into<String>) -> Self {
        EslError::ProtocolError {
            message: message.into(),
        }
    }

    pub(crate) fn auth_failed(message: impl Into<String>) -> Self {
        EslError::AuthFailed {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        EslError::InvalidArgument {
            message: message.into(),
        }
    }
}
