//! Files in the signed-in user's OneDrive root.

use serde_json::json;
use tracing::info;

use super::{collect_field, segment, string_field};
use crate::error::GraphError;
use crate::graph::{GraphHttpClient, Method, RequestBody};

pub struct Files<'a> {
    client: &'a GraphHttpClient,
}

impl<'a> Files<'a> {
    pub(crate) fn new(client: &'a GraphHttpClient) -> Self {
        Self { client }
    }

    /// Names of the items in the drive root.
    pub async fn list_files(&self) -> Result<Option<Vec<String>>, GraphError> {
        let body = self.client.get("me/drive/root/children").await?;
        Ok(collect_field(body.as_ref(), "name"))
    }

    /// Upload a small text file to the drive root; returns its id.
    pub async fn create_file(&self, file_name: &str, content: &str) -> Result<Option<String>, GraphError> {
        let body = self
            .client
            .send(
                Method::Put,
                &format!("me/drive/root/children/{}/content", segment(file_name)),
                Some(RequestBody::plain_text(content)),
                &[],
            )
            .await?;
        let id = body.and_then(|v| string_field(&v, "id"));
        if let Some(id) = &id {
            info!("Created file {}", id);
        }
        Ok(id)
    }

    /// Download a file's content as text.
    pub async fn get_file_content(&self, file_id: &str) -> Result<String, GraphError> {
        let bytes = self
            .client
            .send_raw(
                Method::Get,
                &format!("me/drive/items/{}/content", segment(file_id)),
                None,
            )
            .await?;
        String::from_utf8(bytes).map_err(|e| GraphError::Decode(e.to_string()))
    }

    /// Replace a file's content.
    pub async fn update_file_content(&self, file_id: &str, content: &str) -> Result<(), GraphError> {
        self.client
            .send(
                Method::Put,
                &format!("me/drive/items/{}/content", segment(file_id)),
                Some(RequestBody::plain_text(content)),
                &[],
            )
            .await?;
        info!("Updated file {}", file_id);
        Ok(())
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), GraphError> {
        self.client
            .delete(&format!("me/drive/items/{}", segment(file_id)))
            .await?;
        info!("Deleted file {}", file_id);
        Ok(())
    }

    /// Start an asynchronous copy into the drive root under a new name.
    pub async fn copy_file(&self, file_id: &str, copy_name: &str) -> Result<(), GraphError> {
        self.client
            .post(
                &format!("me/drive/items/{}/copy", segment(file_id)),
                json!({
                    "parentReference": { "path": "/drive/root:" },
                    "name": copy_name,
                }),
            )
            .await?;
        info!("Copy of file {} requested", file_id);
        Ok(())
    }

    pub async fn rename_file(&self, file_id: &str, new_name: &str) -> Result<(), GraphError> {
        self.client
            .patch(
                &format!("me/drive/items/{}", segment(file_id)),
                json!({ "name": new_name }),
            )
            .await?;
        info!("Renamed file {}", file_id);
        Ok(())
    }

    /// Create a folder in the drive root, renaming on conflict; returns its id.
    pub async fn create_folder(&self, folder_name: &str) -> Result<Option<String>, GraphError> {
        let body = self
            .client
            .post(
                "me/drive/root/children",
                json!({
                    "name": folder_name,
                    "folder": {},
                    "@microsoft.graph.conflictBehavior": "rename",
                }),
            )
            .await?;
        Ok(body.and_then(|v| string_field(&v, "id")))
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::test_support::graph_client_for;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_and_read_file() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/me/drive/root/children/notes%201.txt/content"))
            .and(header("content-type", "text/plain"))
            .and(body_string("hello"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "f1", "name": "notes 1.txt"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me/drive/items/f1/content"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let client = graph_client_for(&server);
        let files = client.files();
        assert_eq!(
            files.create_file("notes 1.txt", "hello").await.unwrap().as_deref(),
            Some("f1")
        );
        assert_eq!(files.get_file_content("f1").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_copy_rename_folder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/drive/items/f1/copy"))
            .and(body_json(json!({
                "parentReference": {"path": "/drive/root:"},
                "name": "copy.txt"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/me/drive/items/f1"))
            .and(body_json(json!({"name": "renamed.txt"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "f1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/me/drive/root/children"))
            .and(body_json(json!({
                "name": "Reports",
                "folder": {},
                "@microsoft.graph.conflictBehavior": "rename"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "d1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = graph_client_for(&server);
        let files = client.files();
        files.copy_file("f1", "copy.txt").await.unwrap();
        files.rename_file("f1", "renamed.txt").await.unwrap();
        assert_eq!(files.create_folder("Reports").await.unwrap().as_deref(), Some("d1"));
    }
}
