//! Error types for the Graph client.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use std::time::Duration;
use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Session store error: {0}")]
    Session(#[from] SessionError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Token acquisition errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Interactive sign-in required")]
    InteractionRequired,

    #[error("Sign-in was declined")]
    SignInDeclined,

    #[error("Sign-in code expired before it was used")]
    SignInExpired,

    #[error("Token provider failed: {0}")]
    Provider(String),
}

/// Persisted session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Errors returned by Graph requests.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Graph API returned HTTP {status}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),
}

impl GraphError {
    /// HTTP status of a non-2xx response, if that is what this error is.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns true if the saved session is unusable and should be dropped.
    /// A Graph 401 alone does not qualify.
    pub fn requires_sign_out(&self) -> bool {
        matches!(self, Self::Auth(AuthError::InteractionRequired))
    }
}

impl From<reqwest::Error> for GraphError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}

impl AppError {
    /// Returns a user-friendly message for display.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Auth(AuthError::InteractionRequired) => {
                "Sign-in required. Run with --sign-in and try again."
            }
            Self::Auth(AuthError::SignInDeclined) => "Sign-in was declined.",
            Self::Auth(AuthError::SignInExpired) => {
                "Sign-in code expired. Run with --sign-in again."
            }
            Self::Graph(GraphError::Auth(_)) => "Sign-in required. Run with --sign-in and try again.",
            Self::Graph(GraphError::Status { status: 401, .. }) => {
                "Authentication expired. Sign in again."
            }
            Self::Graph(GraphError::Status { status: 403, .. }) => {
                "Insufficient permissions for this operation."
            }
            Self::Graph(GraphError::Status { status: 429, .. }) => {
                "Too many requests. Please wait a moment."
            }
            Self::Graph(GraphError::Transport(_)) | Self::Graph(GraphError::Timeout(_)) => {
                "Network error. Check your connection."
            }
            Self::Session(_) => "Failed to access saved session.",
            Self::Config(_) => "Configuration error. Please check settings.",
            _ => "An error occurred. Please try again.",
        }
    }
}
