use {thiserror::Error, tokio_tungstenite::tungstenite};

#[derive(Debug, Error)]
pub enum Error {
    #[error("sidecar websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("sidecar is not connected")]
    NotConnected,

    #[error("sidecar request {request_id} timed out")]
    Timeout { request_id: String },

    #[error("sidecar rejected request: {message}")]
    Sidecar { message: String },
}

impl Error {
    #[must_use]
    pub fn sidecar(message: impl Into<String>) -> Self {
        Self::Sidecar {
            message: message.into(),
        }
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
