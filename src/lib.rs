//! Typed Microsoft Graph REST client.
//!
//! Requests go through `GraphHttpClient`, which asks a `TokenProvider` for a
//! bearer token on every call. Resource wrappers map one REST call to one
//! typed result, and `BatchComposer` bundles sub-requests into `$batch`.

#![deny(clippy::all)]

pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod resources;
pub mod stories;

pub use auth::{RefreshTokenProvider, StaticTokenProvider, TokenProvider};
pub use config::Config;
pub use error::{AppError, AuthError, GraphError};
pub use graph::{BatchComposer, GraphClient, GraphHttpClient, GraphRequest, GraphResponse};
