//! Authenticated HTTP transport for the Graph API.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::config::Config;
use crate::error::GraphError;

/// HTTP verbs used against Graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
    Put,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Put => reqwest::Method::PUT,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Put => "PUT",
        };
        f.write_str(name)
    }
}

/// Request payload.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Text { content: String, content_type: String },
}

impl RequestBody {
    pub fn plain_text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            content_type: "text/plain".to_string(),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Transport settings for a client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Header identifying this client to the service, e.g. `SampleID`.
    pub client_header: Option<(String, String)>,
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.api.graph_base_url.clone(),
            timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
            client_header: Some((
                config.app.client_header_name.clone(),
                config.app.client_header_value.clone(),
            )),
        }
    }
}

/// Issues one authenticated request per call against a Graph endpoint.
///
/// A token is requested from the provider before every call. Nothing is
/// retried; non-2xx responses come back as `GraphError::Status`.
#[derive(Clone)]
pub struct GraphHttpClient {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    client_header: Option<(String, String)>,
    tokens: Arc<dyn TokenProvider>,
}

impl GraphHttpClient {
    pub fn new(settings: ClientSettings, tokens: Arc<dyn TokenProvider>) -> Result<Self, GraphError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(GraphError::Transport)?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout: settings.timeout,
            client_header: settings.client_header,
            tokens,
        })
    }

    /// Same transport and token provider against another API root (e.g. `beta`).
    pub fn with_base_url(&self, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    /// Absolute URL for a path relative to the API root. Absolute URLs
    /// (such as `@odata.nextLink`) pass through unchanged.
    pub fn resolve_url(&self, relative_url: &str) -> String {
        if relative_url.starts_with("https://") || relative_url.starts_with("http://") {
            relative_url.to_string()
        } else {
            format!("{}/{}", self.base_url, relative_url.trim_start_matches('/'))
        }
    }

    /// Send a request and parse the JSON response, if any.
    ///
    /// Returns `Ok(None)` for successful responses without a body (e.g. 204).
    pub async fn send(
        &self,
        method: Method,
        relative_url: &str,
        body: Option<RequestBody>,
        headers: &[(&str, &str)],
    ) -> Result<Option<Value>, GraphError> {
        let response = self.execute(method, relative_url, body, headers).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| GraphError::Decode(e.to_string()))
    }

    /// `send` that gives up with `GraphError::Cancelled` once `cancel` fires.
    ///
    /// A request already on the wire may still take effect server-side.
    pub async fn send_with_cancel(
        &self,
        method: Method,
        relative_url: &str,
        body: Option<RequestBody>,
        headers: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<Option<Value>, GraphError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{} {} cancelled", method, relative_url);
                Err(GraphError::Cancelled)
            }
            result = self.send(method, relative_url, body, headers) => result,
        }
    }

    /// Send a request and return the raw response body.
    pub async fn send_raw(
        &self,
        method: Method,
        relative_url: &str,
        body: Option<RequestBody>,
    ) -> Result<Vec<u8>, GraphError> {
        let response = self.execute(method, relative_url, body, &[]).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(bytes.to_vec())
    }

    pub async fn get(&self, relative_url: &str) -> Result<Option<Value>, GraphError> {
        self.send(Method::Get, relative_url, None, &[]).await
    }

    pub async fn post(&self, relative_url: &str, body: Value) -> Result<Option<Value>, GraphError> {
        self.send(Method::Post, relative_url, Some(body.into()), &[])
            .await
    }

    pub async fn patch(&self, relative_url: &str, body: Value) -> Result<Option<Value>, GraphError> {
        self.send(Method::Patch, relative_url, Some(body.into()), &[])
            .await
    }

    pub async fn delete(&self, relative_url: &str) -> Result<(), GraphError> {
        self.send(Method::Delete, relative_url, None, &[]).await?;
        Ok(())
    }

    /// Collect the `value` arrays of every page, following `@odata.nextLink`.
    pub async fn get_all_pages(&self, relative_url: &str) -> Result<Vec<Value>, GraphError> {
        let mut items = Vec::new();
        let mut next = Some(relative_url.to_string());

        while let Some(url) = next.take() {
            let Some(mut page) = self.get(&url).await? else {
                break;
            };

            if let Some(Value::Array(values)) = page.get_mut("value").map(Value::take) {
                items.extend(values);
            }

            next = page
                .get("@odata.nextLink")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        Ok(items)
    }

    async fn execute(
        &self,
        method: Method,
        relative_url: &str,
        body: Option<RequestBody>,
        headers: &[(&str, &str)],
    ) -> Result<reqwest::Response, GraphError> {
        let token = self.tokens.acquire_token().await.into_result()?;
        let url = self.resolve_url(relative_url);

        debug!("{} {}", method, url);

        let mut request = self
            .http_client
            .request(method.into(), &url)
            .bearer_auth(token.secret())
            .header(ACCEPT, "application/json");

        if let Some((name, value)) = &self.client_header {
            request = request.header(name.as_str(), value.as_str());
        }

        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        request = match body {
            Some(RequestBody::Json(value)) => request.json(&value),
            Some(RequestBody::Text {
                content,
                content_type,
            }) => request.header(CONTENT_TYPE, content_type).body(content),
            None => request,
        };

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) if e.is_timeout() => return Err(GraphError::Timeout(self.timeout)),
                Err(_) => String::new(),
            };
            warn!("{} {} failed: HTTP {}", method, url, status);
            return Err(GraphError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// The client timeout covers sending and reading the body alike.
    fn transport_error(&self, err: reqwest::Error) -> GraphError {
        if err.is_timeout() {
            GraphError::Timeout(self.timeout)
        } else {
            err.into()
        }
    }
}
