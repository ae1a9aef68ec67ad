//! Error taxonomy shared by the controllers and the effect runner.
//!
//! Every variant is terminal for the action that triggered it. Nothing is
//! retried automatically; the surface shows the message next to the control
//! that caused it.

/// Errors surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Selected file is not an image (rejected before any state change)
    InvalidInput(String),
    /// Network failure, unreadable response, or non-success HTTP status
    Transport(String),
    /// The service answered with an explicit `error` field
    Remote(String),
    /// Audio payload was not valid base64 or could not be materialized
    Decode(String),
}

impl ClientError {
    /// Short machine-readable label, used in UI payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::InvalidInput(_) => "invalid_input",
            ClientError::Transport(_) => "transport",
            ClientError::Remote(_) => "remote",
            ClientError::Decode(_) => "decode",
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Request and service failures are shown verbatim
            ClientError::InvalidInput(e) | ClientError::Transport(e) | ClientError::Remote(e) => {
                write!(f, "{}", e)
            }
            ClientError::Decode(e) => write!(f, "Could not decode audio: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}
