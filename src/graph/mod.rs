//! Microsoft Graph client core: transport, batching and the client facade.

pub mod batch;
pub mod http;

use std::sync::Arc;

pub use batch::{BatchComposer, BatchResults, GraphRequest, GraphResponse, MAX_BATCH_REQUESTS};
pub use http::{ClientSettings, GraphHttpClient, Method, RequestBody};

use crate::auth::TokenProvider;
use crate::config::Config;
use crate::error::GraphError;
use crate::resources::{Events, Extensions, Files, Groups, Messages, Organization, Users};

/// Explicit client configuration, built once and shared by all operations.
///
/// Holds one transport for the `v1.0` root and one for `beta`, which the
/// extension, contact and batch endpoints use.
#[derive(Clone)]
pub struct GraphClient {
    v1: GraphHttpClient,
    beta: GraphHttpClient,
    tenant_domain: String,
}

impl GraphClient {
    /// Build a client from configuration.
    pub fn new(config: &Config, tokens: Arc<dyn TokenProvider>) -> Result<Self, GraphError> {
        let v1 = GraphHttpClient::new(ClientSettings::from_config(config), tokens)?;
        let beta = v1.with_base_url(&config.api.beta_base_url);

        Ok(Self {
            v1,
            beta,
            tenant_domain: config.oauth.tenant.clone(),
        })
    }

    /// Build a client from already-configured transports.
    pub fn from_parts(v1: GraphHttpClient, beta: GraphHttpClient, tenant_domain: impl Into<String>) -> Self {
        Self {
            v1,
            beta,
            tenant_domain: tenant_domain.into(),
        }
    }

    pub fn http(&self) -> &GraphHttpClient {
        &self.v1
    }

    pub fn beta(&self) -> &GraphHttpClient {
        &self.beta
    }

    /// Domain used for user principal names of created users.
    pub fn tenant_domain(&self) -> &str {
        &self.tenant_domain
    }

    pub fn users(&self) -> Users<'_> {
        Users::new(&self.v1, &self.tenant_domain)
    }

    pub fn groups(&self) -> Groups<'_> {
        Groups::new(&self.v1)
    }

    pub fn events(&self) -> Events<'_> {
        Events::new(&self.v1)
    }

    pub fn messages(&self) -> Messages<'_> {
        Messages::new(&self.v1)
    }

    pub fn files(&self) -> Files<'_> {
        Files::new(&self.v1)
    }

    pub fn organization(&self) -> Organization<'_> {
        Organization::new(&self.v1, &self.beta)
    }

    pub fn extensions(&self) -> Extensions<'_> {
        Extensions::new(&self.beta)
    }

    /// Submit a batch against the `beta` root.
    pub async fn batch(&self, batch: &BatchComposer) -> Result<BatchResults, GraphError> {
        batch.submit(&self.beta).await
    }
}
