// src/error.rs
use thiserror::Error;

/// Failures of the authenticated Petfinder client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Credentials or base URL rejected before any request was made.
    #[error("invalid client configuration: {0}")]
    AuthConfiguration(String),

    /// The token endpoint refused or failed to issue an access token.
    #[error("token request failed ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("remote request failed with status {status}: {body}")]
    RemoteRequest { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    /// Connection or timeout failure before a status line was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The search task panicked before producing a result.
    #[error("search task aborted: {0}")]
    Internal(String),
}

impl ClientError {
    /// True for errors that stem from authentication (bad config or token refusal).
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthConfiguration(_) | Self::Auth { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// An incoming criteria value that does not fit its facet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriteriaMergeError {
    #[error("facet `{facet}` contains a blank token")]
    BlankToken { facet: &'static str },

    #[error("unknown good_with tag `{0}` (expected children, cats or dogs)")]
    UnknownGoodWith(String),

    #[error("location must not be blank")]
    BlankLocation,

    #[error("distance {0} is out of range (1..=500)")]
    DistanceOutOfRange(u32),
}

#[derive(Error, Debug)]
pub enum FetcherError {
    #[error("polling interval must be greater than zero")]
    ZeroInterval,

    #[error("fetcher was already started")]
    AlreadyStarted,

    #[error("invalid initial criteria: {0}")]
    InvalidCriteria(#[from] CriteriaMergeError),

    #[error(transparent)]
    Client(#[from] ClientError),
}
