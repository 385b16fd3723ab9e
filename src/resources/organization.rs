use super::collect_field;
use crate::error::GraphError;
use crate::graph::GraphHttpClient;

/// Organization-wide listings. Contacts are only exposed on `beta`.
pub struct Organization<'a> {
    v1: &'a GraphHttpClient,
    beta: &'a GraphHttpClient,
}

impl<'a> Organization<'a> {
    pub(crate) fn new(v1: &'a GraphHttpClient, beta: &'a GraphHttpClient) -> Self {
        Self { v1, beta }
    }

    /// Display names of organizational contacts.
    pub async fn list_contacts(&self) -> Result<Option<Vec<String>>, GraphError> {
        let body = self.beta.get("myOrganization/contacts").await?;
        Ok(collect_field(body.as_ref(), "displayName"))
    }

    /// Ids of drives in the organization.
    pub async fn list_drives(&self) -> Result<Option<Vec<String>>, GraphError> {
        let body = self.v1.get("myOrganization/drives").await?;
        Ok(collect_field(body.as_ref(), "id"))
    }
}
