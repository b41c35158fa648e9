use thiserror::Error;

/// Failure to establish the progress stream, before any frame was read.
#[derive(Debug, Error)]
pub enum StreamOpenError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("{url} returned no body")]
    MissingBody { url: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("stream read failed: {0}")]
    Read(#[source] reqwest::Error),

    #[cfg(test)]
    #[error("stream read failed: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("malformed `{event}` payload: {source}")]
pub struct FrameDecodeError {
    pub event: &'static str,
    #[source]
    pub source: serde_json::Error,
}

impl FrameDecodeError {
    pub fn new(event: &'static str, source: serde_json::Error) -> Self {
        Self { event, source }
    }
}
