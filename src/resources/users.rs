//! Users: the signed-in user, their relations, and tenant users.

use serde::Serialize;
use tracing::info;

use super::{collect_any_field, collect_field, segment, string_field, to_json};
use crate::error::GraphError;
use crate::graph::{GraphHttpClient, Method};

/// Operations on `/me` and `/myOrganization/users`.
pub struct Users<'a> {
    client: &'a GraphHttpClient,
    tenant_domain: &'a str,
}

/// A user to create in the tenant. Requires an admin account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub mail_nickname: String,
    pub display_name: String,
    pub password: String,
    pub force_change_password: bool,
}

impl NewUser {
    pub fn new(mail_nickname: impl Into<String>, password: impl Into<String>) -> Self {
        let mail_nickname = mail_nickname.into();
        Self {
            display_name: format!("User {}", mail_nickname),
            mail_nickname,
            password: password.into(),
            force_change_password: true,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserBody<'a> {
    account_enabled: bool,
    display_name: &'a str,
    mail_nickname: &'a str,
    password_profile: PasswordProfile<'a>,
    user_principal_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordProfile<'a> {
    password: &'a str,
    force_change_password_next_sign_in: bool,
}

impl<'a> Users<'a> {
    pub(crate) fn new(client: &'a GraphHttpClient, tenant_domain: &'a str) -> Self {
        Self {
            client,
            tenant_domain,
        }
    }

    /// Display name of the signed-in user.
    pub async fn get_me(&self) -> Result<Option<String>, GraphError> {
        let body = self.client.get("me").await?;
        Ok(body.and_then(|v| string_field(&v, "displayName")))
    }

    /// Display names of the first page of tenant users.
    pub async fn list_users(&self) -> Result<Option<Vec<String>>, GraphError> {
        let body = self.client.get("myOrganization/users").await?;
        Ok(collect_field(body.as_ref(), "displayName"))
    }

    /// Create a user; returns the display name Graph reports back.
    pub async fn create_user(&self, user: &NewUser) -> Result<Option<String>, GraphError> {
        let payload = CreateUserBody {
            account_enabled: true,
            display_name: &user.display_name,
            mail_nickname: &user.mail_nickname,
            password_profile: PasswordProfile {
                password: &user.password,
                force_change_password_next_sign_in: user.force_change_password,
            },
            user_principal_name: format!("{}@{}", user.mail_nickname, self.tenant_domain),
        };

        let body = self
            .client
            .post("myOrganization/users", to_json(&payload)?)
            .await?;
        let created = body.and_then(|v| string_field(&v, "displayName"));
        if let Some(name) = &created {
            info!("Created user {}", name);
        }
        Ok(created)
    }

    /// Id of the signed-in user's drive.
    pub async fn get_current_user_drive(&self) -> Result<Option<String>, GraphError> {
        let body = self.client.get("me/drive").await?;
        Ok(body.and_then(|v| string_field(&v, "id")))
    }

    /// Display name of the signed-in user's manager.
    pub async fn get_manager(&self) -> Result<Option<String>, GraphError> {
        let body = self.client.get("me/manager").await?;
        Ok(body.and_then(|v| string_field(&v, "displayName")))
    }

    /// Display names of the signed-in user's direct reports.
    pub async fn get_direct_reports(&self) -> Result<Option<Vec<String>>, GraphError> {
        let body = self.client.get("me/directReports").await?;
        Ok(collect_field(body.as_ref(), "displayName"))
    }

    /// Id from the profile photo *metadata*, not the image itself.
    ///
    /// Use `get_current_user_photo_content` for the bytes.
    pub async fn get_current_user_photo(&self) -> Result<Option<String>, GraphError> {
        let body = self.client.get("me/photo").await?;
        Ok(body.and_then(|v| string_field(&v, "id")))
    }

    /// Raw bytes of the signed-in user's profile photo.
    pub async fn get_current_user_photo_content(&self) -> Result<Vec<u8>, GraphError> {
        self.client.send_raw(Method::Get, "me/photo/$value", None).await
    }

    /// Ids of the groups and directory roles the signed-in user belongs to.
    pub async fn get_member_of(&self) -> Result<Option<Vec<String>>, GraphError> {
        let body = self.client.get("me/memberOf").await?;
        Ok(collect_any_field(body.as_ref(), &["id", "objectId"]))
    }

    /// Display name of any user by id or user principal name.
    pub async fn get_user(&self, id_or_upn: &str) -> Result<Option<String>, GraphError> {
        let body = self
            .client
            .get(&format!("users/{}", segment(id_or_upn)))
            .await?;
        Ok(body.and_then(|v| string_field(&v, "displayName")))
    }
}
