//! Calendar events of the signed-in user.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{collect_field, segment, string_field, to_json};
use crate::error::GraphError;
use crate::graph::GraphHttpClient;

pub struct Events<'a> {
    client: &'a GraphHttpClient,
}

/// An event to create on the signed-in user's calendar.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub subject: String,
    pub location: Option<String>,
    pub required_attendees: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub body_text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventBody<'a> {
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<Location<'a>>,
    attendees: Vec<Attendee<'a>>,
    start: DateTimeZone,
    end: DateTimeZone,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<ItemBody<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Location<'a> {
    display_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Attendee<'a> {
    #[serde(rename = "type")]
    attendee_type: &'static str,
    email_address: EmailAddress<'a>,
}

#[derive(Serialize)]
pub(crate) struct EmailAddress<'a> {
    pub(crate) address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DateTimeZone {
    date_time: String,
    time_zone: &'static str,
}

impl From<DateTime<Utc>> for DateTimeZone {
    fn from(at: DateTime<Utc>) -> Self {
        Self {
            date_time: at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            time_zone: "UTC",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemBody<'a> {
    pub(crate) content_type: &'static str,
    pub(crate) content: &'a str,
}

impl<'a> Events<'a> {
    pub(crate) fn new(client: &'a GraphHttpClient) -> Self {
        Self { client }
    }

    /// Ids of the first page of the signed-in user's events.
    pub async fn list_events(&self) -> Result<Option<Vec<String>>, GraphError> {
        let body = self.client.get("me/events?$select=id").await?;
        Ok(collect_field(body.as_ref(), "id"))
    }

    /// Create an event; returns its id.
    pub async fn create_event(&self, event: &NewEvent) -> Result<Option<String>, GraphError> {
        let payload = CreateEventBody {
            subject: &event.subject,
            location: event.location.as_deref().map(|display_name| Location { display_name }),
            attendees: event
                .required_attendees
                .iter()
                .map(|address| Attendee {
                    attendee_type: "required",
                    email_address: EmailAddress { address },
                })
                .collect(),
            start: event.start.into(),
            end: event.end.into(),
            body: event.body_text.as_deref().map(|content| ItemBody {
                content_type: "text",
                content,
            }),
        };

        let body = self.client.post("me/events", to_json(&payload)?).await?;
        let id = body.and_then(|v| string_field(&v, "id"));
        if let Some(id) = &id {
            info!("Created event {}", id);
        }
        Ok(id)
    }

    /// Change the subject of an existing event.
    pub async fn update_event(&self, event_id: &str, subject: &str) -> Result<(), GraphError> {
        self.client
            .patch(
                &format!("me/events/{}", segment(event_id)),
                json!({ "subject": subject }),
            )
            .await?;
        info!("Updated event {}", event_id);
        Ok(())
    }

    pub async fn delete_event(&self, event_id: &str) -> Result<(), GraphError> {
        self.client
            .delete(&format!("me/events/{}", segment(event_id)))
            .await?;
        info!("Deleted event {}", event_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::graph_client_for;
    use chrono::TimeZone;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_event_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/events"))
            .and(body_json(json!({
                "subject": "Weekly Sync",
                "location": {"displayName": "Water Cooler"},
                "attendees": [
                    {"type": "required", "emailAddress": {"address": "mara@fabrikam.com"}}
                ],
                "start": {"dateTime": "2014-12-01T09:30:00", "timeZone": "UTC"},
                "end": {"dateTime": "2014-12-01T10:00:00", "timeZone": "UTC"},
                "body": {"contentType": "text", "content": "Status updates"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "AAMkAD"})))
            .expect(1)
            .mount(&server)
            .await;

        let event = NewEvent {
            subject: "Weekly Sync".into(),
            location: Some("Water Cooler".into()),
            required_attendees: vec!["mara@fabrikam.com".into()],
            start: Utc.with_ymd_and_hms(2014, 12, 1, 9, 30, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2014, 12, 1, 10, 0, 0).unwrap(),
            body_text: Some("Status updates".into()),
        };

        let client = graph_client_for(&server);
        let id = client.events().create_event(&event).await.unwrap();
        assert_eq!(id.as_deref(), Some("AAMkAD"));
    }

    #[tokio::test]
    async fn test_list_update_delete() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/events"))
            .and(query_param("$select", "id"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"value": [{"id": "e1"}, {"Id": "e2"}]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/me/events/e1"))
            .and(body_json(json!({"subject": "Sync of the Week"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "e1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/me/events/e1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = graph_client_for(&server);
        let events = client.events();
        assert_eq!(
            events.list_events().await.unwrap(),
            Some(vec!["e1".to_string(), "e2".to_string()])
        );
        events.update_event("e1", "Sync of the Week").await.unwrap();
        events.delete_event("e1").await.unwrap();
    }
}
