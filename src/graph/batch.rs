//! JSON batching: many Graph requests in one `POST $batch`.
//!
//! Responses come back in any order and are matched to requests by `id`.
//! A failed sub-request does not fail the batch; inspect each `status`.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::http::{GraphHttpClient, Method};
use crate::error::GraphError;

/// Graph accepts at most this many requests per batch.
pub const MAX_BATCH_REQUESTS: usize = 20;

/// One sub-request of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRequest {
    pub id: String,
    pub method: Method,
    #[serde(rename = "url")]
    pub relative_url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl GraphRequest {
    pub fn new(id: impl Into<String>, method: Method, relative_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method,
            relative_url: relative_url.into(),
            headers: BTreeMap::new(),
            body: None,
            depends_on: Vec::new(),
        }
    }

    pub fn get(id: impl Into<String>, relative_url: impl Into<String>) -> Self {
        Self::new(id, Method::Get, relative_url)
    }

    /// Attach a JSON body. Graph requires a content type on batched bodies.
    pub fn with_body(mut self, body: Value) -> Self {
        self.headers
            .entry("Content-Type".to_string())
            .or_insert_with(|| "application/json".to_string());
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }
}

/// One sub-response of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphResponse {
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl GraphResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    requests: &'a [GraphRequest],
}

#[derive(Deserialize)]
struct BatchPayloadOwned {
    requests: Vec<GraphRequest>,
}

#[derive(Deserialize)]
struct BatchResponseEnvelope {
    responses: Vec<GraphResponse>,
}

/// Ordered set of sub-requests making up one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchComposer {
    requests: Vec<GraphRequest>,
}

impl BatchComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the server may run in any order.
    pub fn parallel(requests: impl IntoIterator<Item = GraphRequest>) -> Result<Self, GraphError> {
        let mut batch = Self::new();
        for request in requests {
            if !request.depends_on.is_empty() {
                return Err(GraphError::InvalidBatch(format!(
                    "request {} has dependsOn in a parallel batch",
                    request.id
                )));
            }
            batch.push(request)?;
        }
        Ok(batch)
    }

    /// Requests chained so each depends on the one before it.
    ///
    /// Ordering is enforced by the server; the composer only writes the chain.
    pub fn sequential(requests: impl IntoIterator<Item = GraphRequest>) -> Result<Self, GraphError> {
        let mut batch = Self::new();
        let mut previous: Option<String> = None;
        for mut request in requests {
            request.depends_on = previous.into_iter().collect();
            previous = Some(request.id.clone());
            batch.push(request)?;
        }
        Ok(batch)
    }

    /// Rebuild a batch from a `{"requests": [...]}` payload, validating it.
    pub fn from_payload(payload: &Value) -> Result<Self, GraphError> {
        let parsed: BatchPayloadOwned = serde_json::from_value(payload.clone())
            .map_err(|e| GraphError::InvalidBatch(e.to_string()))?;
        let mut batch = Self::new();
        for request in parsed.requests {
            batch.push(request)?;
        }
        Ok(batch)
    }

    /// Append a request.
    ///
    /// Ids must be unique and `dependsOn` may only name earlier requests.
    pub fn push(&mut self, request: GraphRequest) -> Result<&mut Self, GraphError> {
        if request.id.is_empty() {
            return Err(GraphError::InvalidBatch("request id is empty".to_string()));
        }

        if self.requests.len() >= MAX_BATCH_REQUESTS {
            return Err(GraphError::InvalidBatch(format!(
                "a batch holds at most {} requests",
                MAX_BATCH_REQUESTS
            )));
        }

        if self.requests.iter().any(|r| r.id == request.id) {
            return Err(GraphError::InvalidBatch(format!(
                "duplicate request id {}",
                request.id
            )));
        }

        for dependency in &request.depends_on {
            if !self.requests.iter().any(|r| &r.id == dependency) {
                return Err(GraphError::InvalidBatch(format!(
                    "request {} depends on {}, which is not an earlier request",
                    request.id, dependency
                )));
            }
        }

        self.requests.push(request);
        Ok(self)
    }

    pub fn requests(&self) -> &[GraphRequest] {
        &self.requests
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// The `{"requests": [...]}` body sent to `$batch`.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(BatchPayload {
            requests: &self.requests,
        })
        .unwrap_or(Value::Null)
    }

    /// Submit the batch in one `POST $batch` against the client's API root.
    pub async fn submit(&self, client: &GraphHttpClient) -> Result<BatchResults, GraphError> {
        if self.requests.is_empty() {
            return Err(GraphError::InvalidBatch("batch has no requests".to_string()));
        }

        debug!("Submitting batch of {} requests", self.requests.len());

        let body = client
            .send(Method::Post, "$batch", Some(self.to_payload().into()), &[])
            .await?
            .ok_or_else(|| GraphError::Decode("empty batch response".to_string()))?;

        let envelope: BatchResponseEnvelope =
            serde_json::from_value(body).map_err(|e| GraphError::Decode(e.to_string()))?;

        let results = self.correlate(envelope.responses)?;
        info!(
            "Batch completed: {} of {} sub-requests succeeded",
            results.iter().filter(|r| r.is_success()).count(),
            results.len()
        );
        Ok(results)
    }

    /// Match responses to requests by id, whatever order they arrived in.
    pub fn correlate(&self, responses: Vec<GraphResponse>) -> Result<BatchResults, GraphError> {
        let known: HashSet<&str> = self.requests.iter().map(|r| r.id.as_str()).collect();
        let mut by_id = HashMap::with_capacity(responses.len());

        for response in responses {
            if !known.contains(response.id.as_str()) {
                return Err(GraphError::Decode(format!(
                    "batch response for unknown request id {}",
                    response.id
                )));
            }
            let id = response.id.clone();
            if by_id.insert(id.clone(), response).is_some() {
                return Err(GraphError::Decode(format!(
                    "duplicate batch response for request id {}",
                    id
                )));
            }
        }

        if let Some(missing) = self.requests.iter().find(|r| !by_id.contains_key(&r.id)) {
            return Err(GraphError::Decode(format!(
                "batch response missing request id {}",
                missing.id
            )));
        }

        Ok(BatchResults {
            order: self.requests.iter().map(|r| r.id.clone()).collect(),
            by_id,
        })
    }
}

/// Per-request outcomes of a batch.
#[derive(Debug, Clone)]
pub struct BatchResults {
    order: Vec<String>,
    by_id: HashMap<String, GraphResponse>,
}

impl BatchResults {
    pub fn get(&self, id: &str) -> Option<&GraphResponse> {
        self.by_id.get(id)
    }

    /// Responses in the order the requests were composed.
    pub fn iter(&self) -> impl Iterator<Item = &GraphResponse> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids of sub-requests that did not return 2xx.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.iter()
            .filter(|r| !r.is_success())
            .map(|r| r.id.as_str())
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.iter().all(GraphResponse::is_success)
    }

    /// The whole result set as one JSON document, in request order.
    pub fn to_json(&self) -> Value {
        let responses: Vec<&GraphResponse> = self.iter().collect();
        serde_json::json!({ "responses": responses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn response(id: &str, status: u16) -> GraphResponse {
        GraphResponse {
            id: id.into(),
            status,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    #[test]
    fn test_depends_on_serialized_verbatim() {
        let mut batch = BatchComposer::new();
        batch.push(GraphRequest::get("1", "/me")).unwrap();
        batch
            .push(GraphRequest::get("2", "/me/manager").depends_on("1"))
            .unwrap();

        let payload = batch.to_payload();
        assert_eq!(payload["requests"][1]["dependsOn"], json!(["1"]));
        assert_eq!(payload["requests"][1]["url"], "/me/manager");
        assert_eq!(payload["requests"][1]["method"], "GET");
        assert!(payload["requests"][0].get("dependsOn").is_none());

        let parsed = BatchComposer::from_payload(&payload).unwrap();
        let ids: Vec<_> = parsed.requests().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(parsed.requests()[1].depends_on, vec!["1".to_string()]);
    }

    #[test]
    fn test_empty_depends_on_accepted() {
        let payload = json!({"requests": [
            {"id": "1", "method": "GET", "url": "/me", "dependsOn": []},
            {"id": "2", "method": "GET", "url": "/me/drive", "dependsOn": ["1"]}
        ]});
        let batch = BatchComposer::from_payload(&payload).unwrap();
        assert!(batch.requests()[0].depends_on.is_empty());
        assert_eq!(batch.requests()[1].depends_on, vec!["1".to_string()]);
    }

    #[test]
    fn test_sequential_chains_requests() {
        let batch = BatchComposer::sequential([
            GraphRequest::get("1", "/me/events?$top=2"),
            GraphRequest::new("2", Method::Post, "/me/drive/root/children")
                .with_body(json!({"name": "BatchingTestFolder", "folder": {}})),
            GraphRequest::new("3", Method::Delete, "/me/drive/root/children/BatchingTestFolder"),
        ])
        .unwrap();

        let deps: Vec<_> = batch.requests().iter().map(|r| r.depends_on.clone()).collect();
        assert_eq!(
            deps,
            vec![vec![], vec!["1".to_string()], vec!["2".to_string()]]
        );
        assert_eq!(
            batch.requests()[1].headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn test_invalid_batches_rejected() {
        let mut batch = BatchComposer::new();
        batch.push(GraphRequest::get("1", "/me")).unwrap();
        assert!(batch.push(GraphRequest::get("1", "/me/drive")).is_err());
        assert!(batch
            .push(GraphRequest::get("2", "/me/drive").depends_on("3"))
            .is_err());
        assert!(batch.push(GraphRequest::get("", "/me")).is_err());

        assert!(BatchComposer::parallel([GraphRequest::get("1", "/me").depends_on("0")]).is_err());

        let too_many = (0..=MAX_BATCH_REQUESTS).map(|i| GraphRequest::get(i.to_string(), "/me"));
        assert!(BatchComposer::parallel(too_many).is_err());
    }

    #[test]
    fn test_correlates_out_of_order_responses() {
        let batch = BatchComposer::parallel([
            GraphRequest::get("1", "/me"),
            GraphRequest::get("2", "/me/manager"),
        ])
        .unwrap();

        let results = batch
            .correlate(vec![response("2", 404), response("1", 200)])
            .unwrap();

        assert_eq!(results.get("1").unwrap().status, 200);
        assert_eq!(results.get("2").unwrap().status, 404);
        let order: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["1", "2"]);
        assert_eq!(results.failed_ids(), vec!["2"]);
        assert!(!results.all_succeeded());
    }

    #[test]
    fn test_correlation_is_a_bijection() {
        let batch = BatchComposer::parallel([
            GraphRequest::get("1", "/me"),
            GraphRequest::get("2", "/me/manager"),
        ])
        .unwrap();

        assert!(batch.correlate(vec![response("1", 200)]).is_err());
        assert!(batch
            .correlate(vec![response("1", 200), response("2", 200), response("9", 200)])
            .is_err());
        assert!(batch
            .correlate(vec![response("1", 200), response("1", 200)])
            .is_err());
    }

    #[tokio::test]
    async fn test_submit_reports_sub_request_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/$batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responses": [
                    {"id": "3", "status": 200, "body": {"value": []}},
                    {"id": "1", "status": 200, "body": {"displayName": "Alice"}},
                    {"id": "2", "status": 404, "body": {"error": {"code": "Request_ResourceNotFound"}}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let batch = BatchComposer::parallel([
            GraphRequest::get("1", "/me"),
            GraphRequest::get("2", "/me/manager"),
            GraphRequest::get("3", "me/messages?$top=5"),
        ])
        .unwrap();

        let results = batch.submit(&client_for(&server)).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            results.get("1").unwrap().body.as_ref().unwrap()["displayName"],
            "Alice"
        );
        assert_eq!(results.failed_ids(), vec!["2"]);
        assert_eq!(results.to_json()["responses"][0]["id"], "1");
    }

    #[tokio::test]
    async fn test_empty_batch_not_sent() {
        let server = MockServer::start().await;
        let err = BatchComposer::new()
            .submit(&client_for(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidBatch(_)));
    }
}
