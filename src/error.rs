use thiserror::Error;

/// Errors surfaced by RPC calls and single-transaction assembly.
///
/// Best-effort entry points (history, clustering, live watch) only ever
/// return `UnsupportedChain`; every other variant is logged and absorbed there.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChainError {
    /// Network failure, deadline expiry, or a non-2xx HTTP response.
    #[error("transport error (status {status:?}): {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The provider answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("unsupported chain '{0}'")]
    UnsupportedChain(String),

    /// The response did not match the expected shape for the method.
    #[error("malformed response from {method}: {message}")]
    MalformedResponse { method: String, message: String },
}

impl ChainError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
