//! Mail of the signed-in user.

use serde::Serialize;
use tracing::info;

use super::events::{EmailAddress, ItemBody};
use super::{collect_field, to_json};
use crate::error::GraphError;
use crate::graph::GraphHttpClient;

pub struct Messages<'a> {
    client: &'a GraphHttpClient,
}

/// An HTML message to send from the signed-in user's mailbox.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub subject: String,
    pub body_html: String,
    pub to: Vec<String>,
    pub save_to_sent_items: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailBody<'a> {
    message: MessageBody<'a>,
    save_to_sent_items: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody<'a> {
    subject: &'a str,
    body: ItemBody<'a>,
    to_recipients: Vec<Recipient<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Recipient<'a> {
    email_address: EmailAddress<'a>,
}

impl<'a> Messages<'a> {
    pub(crate) fn new(client: &'a GraphHttpClient) -> Self {
        Self { client }
    }

    /// Subjects of the first page of messages in the mailbox.
    pub async fn list_messages(&self) -> Result<Option<Vec<String>>, GraphError> {
        let body = self.client.get("me/messages").await?;
        Ok(collect_field(body.as_ref(), "subject"))
    }

    pub async fn send_message(&self, message: &OutgoingMessage) -> Result<(), GraphError> {
        let payload = SendMailBody {
            message: MessageBody {
                subject: &message.subject,
                body: ItemBody {
                    content_type: "HTML",
                    content: &message.body_html,
                },
                to_recipients: message
                    .to
                    .iter()
                    .map(|address| Recipient {
                        email_address: EmailAddress { address },
                    })
                    .collect(),
            },
            save_to_sent_items: message.save_to_sent_items,
        };

        self.client.post("me/sendMail", to_json(&payload)?).await?;
        info!("Sent message to {} recipient(s)", message.to.len());
        Ok(())
    }
}
