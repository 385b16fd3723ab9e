//! Tenant groups.

use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{collect_field, segment, string_field, to_json};
use crate::error::GraphError;
use crate::graph::GraphHttpClient;

pub struct Groups<'a> {
    client: &'a GraphHttpClient,
}

/// A security group to create. Mail-enabled groups are not supported.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub display_name: String,
    pub mail_nickname: String,
}

impl NewGroup {
    pub fn new(mail_nickname: impl Into<String>) -> Self {
        Self {
            display_name: "Group name".to_string(),
            mail_nickname: mail_nickname.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupBody<'a> {
    display_name: &'a str,
    mail_enabled: bool,
    mail_nickname: &'a str,
    security_enabled: bool,
}

impl<'a> Groups<'a> {
    pub(crate) fn new(client: &'a GraphHttpClient) -> Self {
        Self { client }
    }

    /// Ids of the first page of tenant groups.
    pub async fn list_groups(&self) -> Result<Option<Vec<String>>, GraphError> {
        let body = self.client.get("myOrganization/groups").await?;
        Ok(collect_field(body.as_ref(), "id"))
    }

    /// Display name of a group.
    pub async fn get_group(&self, group_id: &str) -> Result<Option<String>, GraphError> {
        let body = self
            .client
            .get(&format!("myOrganization/groups/{}", segment(group_id)))
            .await?;
        Ok(body.and_then(|v| string_field(&v, "displayName")))
    }

    /// Display names of a group's members.
    pub async fn get_group_members(&self, group_id: &str) -> Result<Option<Vec<String>>, GraphError> {
        let body = self
            .client
            .get(&format!("myOrganization/groups/{}/members", segment(group_id)))
            .await?;
        Ok(collect_field(body.as_ref(), "displayName"))
    }

    /// Display names of a group's owners.
    pub async fn get_group_owners(&self, group_id: &str) -> Result<Option<Vec<String>>, GraphError> {
        let body = self
            .client
            .get(&format!("myOrganization/groups/{}/owners", segment(group_id)))
            .await?;
        Ok(collect_field(body.as_ref(), "displayName"))
    }

    /// Create a security group; returns its id.
    pub async fn create_group(&self, group: &NewGroup) -> Result<Option<String>, GraphError> {
        let payload = CreateGroupBody {
            display_name: &group.display_name,
            mail_enabled: false,
            mail_nickname: &group.mail_nickname,
            security_enabled: true,
        };

        let body = self
            .client
            .post("myOrganization/groups", to_json(&payload)?)
            .await?;
        let id = body.and_then(|v| string_field(&v, "id"));
        if let Some(id) = &id {
            info!("Created group {}", id);
        }
        Ok(id)
    }

    pub async fn update_group(&self, group_id: &str, description: &str) -> Result<(), GraphError> {
        self.client
            .patch(
                &format!("myOrganization/groups/{}", segment(group_id)),
                json!({ "description": description }),
            )
            .await?;
        info!("Updated group {}", group_id);
        Ok(())
    }

    pub async fn delete_group(&self, group_id: &str) -> Result<(), GraphError> {
        self.client
            .delete(&format!("myOrganization/groups/{}", segment(group_id)))
            .await?;
        info!("Deleted group {}", group_id);
        Ok(())
    }
}
