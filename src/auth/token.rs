//! Bearer tokens and the outcome of acquiring one.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use zeroize::Zeroizing;

use crate::error::AuthError;

/// Opaque bearer token with an optional expiry.
///
/// The secret is cleared from memory when dropped and never shown by `Debug`.
#[derive(Clone)]
pub struct Token {
    secret: Zeroizing<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            expires_at: None,
        }
    }

    pub fn with_expiry(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            expires_at: Some(expires_at),
        }
    }

    /// The bearer string, forwarded verbatim in the `Authorization` header.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// A token without an expiry is treated as valid.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    /// Time left before expiry. `None` when already expired or when no expiry is known.
    pub fn remaining(&self) -> Option<Duration> {
        let left = self.expires_at? - Utc::now();
        (left > Duration::zero()).then_some(left)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of asking a provider for a token.
///
/// Lets the caller decide whether an interactive sign-in is possible in its context.
#[derive(Debug)]
pub enum TokenOutcome {
    Acquired(Token),
    NeedsInteractive,
    Failed(String),
}

impl TokenOutcome {
    pub fn into_result(self) -> Result<Token, AuthError> {
        match self {
            Self::Acquired(token) => Ok(token),
            Self::NeedsInteractive => Err(AuthError::InteractionRequired),
            Self::Failed(reason) => Err(AuthError::Provider(reason)),
        }
    }
}
