//! Bearer-token acquisition for the Graph client.
//!
//! `TokenProvider` is the seam; `RefreshTokenProvider` redeems a saved
//! session silently and `StaticTokenProvider` wraps a token obtained elsewhere.

pub mod oauth;
pub mod provider;
pub mod secret;
pub mod session;
pub mod token;

pub use oauth::{DeviceAuthorization, RefreshTokenProvider};
pub use provider::{StaticTokenProvider, TokenProvider};
pub use secret::{KeyringSecret, SecretStore};
pub use session::{SessionRecord, SessionStore};
pub use token::{Token, TokenOutcome};
