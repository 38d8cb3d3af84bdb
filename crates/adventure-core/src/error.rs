use thiserror::Error;

use crate::provider::Provider;

/// Reasons a game action was refused. None of them touch the transcript.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("{provider} is not available: {reason}")]
    ExtensionMissing { provider: Provider, reason: String },
    #[error("still checking for a model provider")]
    StillChecking,
    #[error("the game has already started")]
    AlreadyStarted,
    #[error("start the game first")]
    NotStarted,
    #[error("wait for the narrator to finish")]
    Busy,
    #[error("nothing to send")]
    EmptyInput,
}

/// Failures talking to a model provider
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: Provider,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed stream data: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Provider(String),
    #[error("no API key configured for {0}")]
    MissingApiKey(Provider),
}
