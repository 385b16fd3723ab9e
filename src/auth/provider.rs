//! The token-acquisition seam used by the Graph client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use super::token::{Token, TokenOutcome};
use crate::error::AuthError;

/// Supplies bearer tokens on demand.
///
/// Implementations wrap whatever broker actually signs the user in. The Graph
/// client asks for a token before every request and never inspects it.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Acquire a token without prompting the user.
    async fn acquire_token(&self) -> TokenOutcome;

    /// Forget any cached session state.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Identifier of the signed-in account, if any.
    async fn current_account_id(&self) -> Option<String>;
}

/// Provider holding a token obtained elsewhere (e.g. `GRAPH_ACCESS_TOKEN`).
pub struct StaticTokenProvider {
    token: RwLock<Option<Token>>,
    account_id: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(Token::new(secret))),
            account_id: None,
        }
    }

    pub fn with_expiry(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: RwLock::new(Some(Token::with_expiry(secret, expires_at))),
            account_id: None,
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn acquire_token(&self) -> TokenOutcome {
        match self.token.read().await.as_ref() {
            Some(token) if !token.is_expired() => TokenOutcome::Acquired(token.clone()),
            _ => TokenOutcome::NeedsInteractive,
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.token.write().await = None;
        info!("Static token discarded");
        Ok(())
    }

    async fn current_account_id(&self) -> Option<String> {
        if self.token.read().await.is_some() {
            self.account_id.clone()
        } else {
            None
        }
    }
}
