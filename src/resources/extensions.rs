//! Open and schema extensions. These endpoints live on the `beta` root.

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{segment, string_field, to_json};
use crate::error::GraphError;
use crate::graph::GraphHttpClient;

pub struct Extensions<'a> {
    client: &'a GraphHttpClient,
}

/// Definition of a schema extension to register.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaExtension {
    pub id: String,
    pub description: String,
    pub target_types: Vec<String>,
    pub properties: Vec<SchemaProperty>,
}

impl SchemaExtension {
    /// A `User` extension with a single string property.
    pub fn for_users(id: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: "Extension description".to_string(),
            target_types: vec!["User".to_string()],
            properties: vec![SchemaProperty {
                name: property.into(),
                property_type: "String".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: String,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    status: &'static str,
    #[serde(flatten)]
    extension: &'a SchemaExtension,
}

impl<'a> Extensions<'a> {
    pub(crate) fn new(client: &'a GraphHttpClient) -> Self {
        Self { client }
    }

    /// The named open extension on the signed-in user, as returned.
    pub async fn get_open_extension(&self, name: &str) -> Result<Option<Value>, GraphError> {
        self.client
            .get(&format!("me/extensions/{}", segment(name)))
            .await
    }

    /// Update an open extension, creating it when it does not exist yet.
    pub async fn set_open_extension(
        &self,
        name: &str,
        properties: &Map<String, Value>,
    ) -> Result<(), GraphError> {
        let mut setting = Map::new();
        setting.insert("id".to_string(), Value::String(name.to_string()));
        setting.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));

        let updated = self
            .client
            .patch(
                &format!("me/extensions/{}", segment(name)),
                Value::Object(setting.clone()),
            )
            .await;

        match updated {
            Ok(_) => {
                info!("Updated open extension {}", name);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("Open extension {} missing, creating it", name);
                setting.insert(
                    "@odata.type".to_string(),
                    json!("microsoft.graph.openTypeExtension"),
                );
                setting.insert("extensionName".to_string(), json!(name));
                self.client
                    .post("me/extensions", Value::Object(setting))
                    .await?;
                info!("Created open extension {}", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Register a schema extension in `InDevelopment` state; returns its id.
    pub async fn register_schema_extension(
        &self,
        extension: &SchemaExtension,
    ) -> Result<Option<String>, GraphError> {
        let payload = RegisterBody {
            status: "InDevelopment",
            extension,
        };
        let body = self
            .client
            .post("schemaExtensions", to_json(&payload)?)
            .await?;
        let id = body.and_then(|v| string_field(&v, "id"));
        if let Some(id) = &id {
            info!("Registered schema extension {}", id);
        }
        Ok(id)
    }

    /// Status of a registered schema extension.
    pub async fn get_schema_extension(&self, id: &str) -> Result<Option<String>, GraphError> {
        let body = self
            .client
            .get(&format!("schemaExtensions/{}", segment(id)))
            .await?;
        Ok(body.and_then(|v| string_field(&v, "status")))
    }

    pub async fn delete_schema_extension(&self, id: &str) -> Result<(), GraphError> {
        self.client
            .delete(&format!("schemaExtensions/{}", segment(id)))
            .await?;
        info!("Deleted schema extension {}", id);
        Ok(())
    }

    /// Write schema extension values onto the signed-in user.
    pub async fn set_schema_extension_value(
        &self,
        id: &str,
        values: &Map<String, Value>,
    ) -> Result<(), GraphError> {
        let mut payload = Map::new();
        payload.insert(id.to_string(), Value::Object(values.clone()));
        self.client.patch("me", Value::Object(payload)).await?;
        Ok(())
    }

    /// Schema extension values on the signed-in user, if set.
    pub async fn get_schema_extension_value(&self, id: &str) -> Result<Option<Value>, GraphError> {
        let body = self
            .client
            .get(&format!("me?$select={}", urlencoding::encode(id)))
            .await?;
        Ok(body.and_then(|mut v| v.get_mut(id).map(Value::take)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::graph_client_for;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn props() -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("prop1".into(), json!("value1"));
        props
    }

    #[tokio::test]
    async fn test_set_open_extension_patches_existing() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/beta/me/extensions/sampleSettings"))
            .and(body_json(json!({"id": "sampleSettings", "prop1": "value1"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let client = graph_client_for(&server);
        client
            .extensions()
            .set_open_extension("sampleSettings", &props())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_open_extension_creates_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/beta/me/extensions/sampleSettings"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/beta/me/extensions"))
            .and(body_json(json!({
                "id": "sampleSettings",
                "prop1": "value1",
                "@odata.type": "microsoft.graph.openTypeExtension",
                "extensionName": "sampleSettings"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "sampleSettings"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = graph_client_for(&server);
        client
            .extensions()
            .set_open_extension("sampleSettings", &props())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_open_extension_other_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let client = graph_client_for(&server);
        let err = client
            .extensions()
            .set_open_extension("sampleSettings", &props())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_register_schema_extension_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/beta/schemaExtensions"))
            .and(body_json(json!({
                "status": "InDevelopment",
                "id": "contoso_hrprofile",
                "description": "Extension description",
                "targetTypes": ["User"],
                "properties": [{"name": "p1", "type": "String"}]
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "extabc_hrprofile"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = graph_client_for(&server);
        let id = client
            .extensions()
            .register_schema_extension(&SchemaExtension::for_users("contoso_hrprofile", "p1"))
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("extabc_hrprofile"));
    }

    #[tokio::test]
    async fn test_schema_extension_values() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/beta/me"))
            .and(body_json(json!({"contoso_hrprofile": {"p1": "value"}})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/beta/me"))
            .and(query_param("$select", "contoso_hrprofile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "contoso_hrprofile": {"p1": "value"}
            })))
            .mount(&server)
            .await;

        let mut values = Map::new();
        values.insert("p1".into(), json!("value"));

        let client = graph_client_for(&server);
        let ext = client.extensions();
        ext.set_schema_extension_value("contoso_hrprofile", &values)
            .await
            .unwrap();
        assert_eq!(
            ext.get_schema_extension_value("contoso_hrprofile").await.unwrap(),
            Some(json!({"p1": "value"}))
        );
    }
}
