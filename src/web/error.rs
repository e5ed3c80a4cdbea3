use hyper::StatusCode;
use thiserror::Error;

/// User-facing diagnostic written when the inference daemon cannot be reached.
pub const UNREACHABLE_MESSAGE: &str =
    "Unable to reach Ollama. Check URL and CORS settings (OLLAMA_ORIGINS).";

/// Errors produced by the Ollama client and the engines built on top of it.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// Connection-level failure (daemon down, wrong host, refused).
    #[error("Unable to reach Ollama. Check URL and CORS settings (OLLAMA_ORIGINS).")]
    Unreachable,

    /// Non-2xx HTTP response from the daemon.
    #[error("Ollama returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// An `{"error": …}` frame emitted inside an otherwise-OK stream.
    #[error("{0}")]
    Server(String),

    /// The turn was aborted by the user. Filtered out of error handling.
    #[error("request cancelled")]
    Cancelled,

    /// Model name rejected before any network call.
    #[error("Invalid model name: {0}")]
    InvalidModelName(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("transport error: {0}")]
    Transport(hyper::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<hyper::Error> for OllamaError {
    fn from(e: hyper::Error) -> Self {
        // Connection refused / DNS failures get the fixed user-facing message
        if e.is_connect() {
            OllamaError::Unreachable
        } else {
            OllamaError::Transport(e)
        }
    }
}

impl OllamaError {
    /// True when this error is the cancellation sentinel rather than a
    /// genuine failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OllamaError::Cancelled)
    }

    /// Message suitable for annotating a progress record or operation log.
    pub fn user_message(&self) -> String {
        match self {
            OllamaError::Unreachable => UNREACHABLE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}
