//! Named end-to-end scenarios run by the binary.
//!
//! A story passes when the call chain completes and yields a value. Stories
//! that update or delete something create it first, using a fresh uuid so
//! repeated runs don't collide.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::GraphError;
use crate::graph::{BatchComposer, GraphClient, GraphRequest, Method};
use crate::resources::{NewEvent, NewGroup, NewUser, OutgoingMessage, SchemaExtension};

const OPEN_EXTENSION_NAME: &str = "sampleSettings";
const SCHEMA_EXTENSION_ID: &str = "graphsnippets_hrprofile";
const SCHEMA_PROPERTY: &str = "p1";
const MESSAGE_BODY: &str = "This message was sent from the graph-snippets sample";
const BATCH_FOLDER: &str = "BatchingTestFolder";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Story {
    GetMe,
    ReadUsers,
    CreateUser,
    GetDrive,
    GetEvents,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    GetMessages,
    SendMessage,
    GetManager,
    GetDirects,
    GetPhoto,
    GetUserGroups,
    GetUserFiles,
    CreateTextFile,
    DownloadFile,
    UpdateFile,
    RenameFile,
    CopyFile,
    DeleteFile,
    CreateFolder,
    GetAllGroups,
    GetGroup,
    GetMembers,
    GetOwners,
    CreateGroup,
    UpdateGroup,
    DeleteGroup,
    GetOrgContacts,
    GetOrgDrives,
    GetOpenExtension,
    SetOpenExtension,
    RegisterSchemaExtension,
    GetSchemaExtension,
    SetSchemaExtensionValue,
    GetSchemaExtensionValue,
    DeleteSchemaExtension,
    ParallelBatch,
    SequentialBatch,
}

impl Story {
    pub const ALL: &'static [Story] = &[
        Story::GetMe,
        Story::ReadUsers,
        Story::CreateUser,
        Story::GetDrive,
        Story::GetEvents,
        Story::CreateEvent,
        Story::UpdateEvent,
        Story::DeleteEvent,
        Story::GetMessages,
        Story::SendMessage,
        Story::GetManager,
        Story::GetDirects,
        Story::GetPhoto,
        Story::GetUserGroups,
        Story::GetUserFiles,
        Story::CreateTextFile,
        Story::DownloadFile,
        Story::UpdateFile,
        Story::RenameFile,
        Story::CopyFile,
        Story::DeleteFile,
        Story::CreateFolder,
        Story::GetAllGroups,
        Story::GetGroup,
        Story::GetMembers,
        Story::GetOwners,
        Story::CreateGroup,
        Story::UpdateGroup,
        Story::DeleteGroup,
        Story::GetOrgContacts,
        Story::GetOrgDrives,
        Story::GetOpenExtension,
        Story::SetOpenExtension,
        Story::RegisterSchemaExtension,
        Story::GetSchemaExtension,
        Story::SetSchemaExtensionValue,
        Story::GetSchemaExtensionValue,
        Story::DeleteSchemaExtension,
        Story::ParallelBatch,
        Story::SequentialBatch,
    ];

    /// Command-line name, e.g. `update-event`.
    pub fn name(self) -> &'static str {
        match self {
            Story::GetMe => "get-me",
            Story::ReadUsers => "read-users",
            Story::CreateUser => "create-user",
            Story::GetDrive => "get-drive",
            Story::GetEvents => "get-events",
            Story::CreateEvent => "create-event",
            Story::UpdateEvent => "update-event",
            Story::DeleteEvent => "delete-event",
            Story::GetMessages => "get-messages",
            Story::SendMessage => "send-message",
            Story::GetManager => "get-manager",
            Story::GetDirects => "get-directs",
            Story::GetPhoto => "get-photo",
            Story::GetUserGroups => "get-user-groups",
            Story::GetUserFiles => "get-user-files",
            Story::CreateTextFile => "create-text-file",
            Story::DownloadFile => "download-file",
            Story::UpdateFile => "update-file",
            Story::RenameFile => "rename-file",
            Story::CopyFile => "copy-file",
            Story::DeleteFile => "delete-file",
            Story::CreateFolder => "create-folder",
            Story::GetAllGroups => "get-all-groups",
            Story::GetGroup => "get-group",
            Story::GetMembers => "get-members",
            Story::GetOwners => "get-owners",
            Story::CreateGroup => "create-group",
            Story::UpdateGroup => "update-group",
            Story::DeleteGroup => "delete-group",
            Story::GetOrgContacts => "get-org-contacts",
            Story::GetOrgDrives => "get-org-drives",
            Story::GetOpenExtension => "get-open-extension",
            Story::SetOpenExtension => "set-open-extension",
            Story::RegisterSchemaExtension => "register-schema-extension",
            Story::GetSchemaExtension => "get-schema-extension",
            Story::SetSchemaExtensionValue => "set-schema-extension-value",
            Story::GetSchemaExtensionValue => "get-schema-extension-value",
            Story::DeleteSchemaExtension => "delete-schema-extension",
            Story::ParallelBatch => "parallel-batch",
            Story::SequentialBatch => "sequential-batch",
        }
    }

    pub fn group(self) -> &'static str {
        use Story::*;
        match self {
            GetAllGroups | GetGroup | GetMembers | GetOwners | CreateGroup | UpdateGroup
            | DeleteGroup => "Groups",
            GetOrgContacts | GetOrgDrives => "Organization",
            GetOpenExtension
            | SetOpenExtension
            | RegisterSchemaExtension
            | GetSchemaExtension
            | SetSchemaExtensionValue
            | GetSchemaExtensionValue
            | DeleteSchemaExtension => "Extensions",
            ParallelBatch | SequentialBatch => "Batching",
            _ => "Users",
        }
    }

    pub async fn run(self, client: &GraphClient) -> Result<bool, GraphError> {
        let tag = Uuid::new_v4().to_string();

        match self {
            Story::GetMe => Ok(client.users().get_me().await?.is_some()),
            Story::ReadUsers => Ok(client.users().list_users().await?.is_some()),
            Story::CreateUser => {
                let nickname = tag.replace('-', "");
                let user = NewUser::new(nickname, format!("P@ss{}", &tag[..8]));
                Ok(client.users().create_user(&user).await?.is_some())
            }
            Story::GetDrive => Ok(client.users().get_current_user_drive().await?.is_some()),
            Story::GetEvents => Ok(client.events().list_events().await?.is_some()),
            Story::CreateEvent => Ok(create_event(client, &tag).await?.is_some()),
            Story::UpdateEvent => match create_event(client, &tag).await? {
                Some(id) => {
                    client.events().update_event(&id, "Sync of the Week").await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Story::DeleteEvent => match create_event(client, &tag).await? {
                Some(id) => {
                    client.events().delete_event(&id).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Story::GetMessages => Ok(client.messages().list_messages().await?.is_some()),
            Story::SendMessage => {
                let Some(address) = own_address(client).await? else {
                    return Ok(false);
                };
                let message = OutgoingMessage {
                    subject: tag,
                    body_html: MESSAGE_BODY.to_string(),
                    to: vec![address],
                    save_to_sent_items: true,
                };
                client.messages().send_message(&message).await?;
                Ok(true)
            }
            Story::GetManager => Ok(client.users().get_manager().await?.is_some()),
            Story::GetDirects => Ok(client.users().get_direct_reports().await?.is_some()),
            Story::GetPhoto => Ok(client.users().get_current_user_photo().await?.is_some()),
            Story::GetUserGroups => Ok(client.users().get_member_of().await?.is_some()),
            Story::GetUserFiles => Ok(client.files().list_files().await?.is_some()),
            Story::CreateTextFile => Ok(create_file(client, &tag).await?.is_some()),
            Story::DownloadFile => match create_file(client, &tag).await? {
                Some(id) => {
                    client.files().get_file_content(&id).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Story::UpdateFile => match create_file(client, &tag).await? {
                Some(id) => {
                    client.files().update_file_content(&id, &tag).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Story::RenameFile => match create_file(client, &tag).await? {
                Some(id) => {
                    let new_name = format!("{}.txt", Uuid::new_v4());
                    client.files().rename_file(&id, &new_name).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Story::CopyFile => match create_file(client, &tag).await? {
                Some(id) => {
                    let copy_name = format!("{}.txt", Uuid::new_v4());
                    client.files().copy_file(&id, &copy_name).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Story::DeleteFile => match create_file(client, &tag).await? {
                Some(id) => {
                    client.files().delete_file(&id).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Story::CreateFolder => Ok(client.files().create_folder(&tag).await?.is_some()),
            Story::GetAllGroups => Ok(client.groups().list_groups().await?.is_some()),
            Story::GetGroup => match first_group(client).await? {
                Some(id) => Ok(client.groups().get_group(&id).await?.is_some()),
                None => Ok(false),
            },
            Story::GetMembers => match first_group(client).await? {
                Some(id) => Ok(client.groups().get_group_members(&id).await?.is_some()),
                None => Ok(false),
            },
            Story::GetOwners => match first_group(client).await? {
                Some(id) => Ok(client.groups().get_group_owners(&id).await?.is_some()),
                None => Ok(false),
            },
            Story::CreateGroup => Ok(create_group(client, &tag).await?.is_some()),
            Story::UpdateGroup => match create_group(client, &tag).await? {
                Some(id) => {
                    client.groups().update_group(&id, "Updated group").await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Story::DeleteGroup => match create_group(client, &tag).await? {
                Some(id) => {
                    client.groups().delete_group(&id).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Story::GetOrgContacts => Ok(client.organization().list_contacts().await?.is_some()),
            Story::GetOrgDrives => Ok(client.organization().list_drives().await?.is_some()),
            Story::GetOpenExtension => Ok(client
                .extensions()
                .get_open_extension(OPEN_EXTENSION_NAME)
                .await?
                .is_some()),
            Story::SetOpenExtension => {
                let mut properties = Map::new();
                properties.insert("prop1".to_string(), json!("value1"));
                client
                    .extensions()
                    .set_open_extension(OPEN_EXTENSION_NAME, &properties)
                    .await?;
                Ok(true)
            }
            Story::RegisterSchemaExtension => {
                let extension = SchemaExtension::for_users(SCHEMA_EXTENSION_ID, SCHEMA_PROPERTY);
                Ok(client
                    .extensions()
                    .register_schema_extension(&extension)
                    .await?
                    .is_some())
            }
            Story::GetSchemaExtension => Ok(client
                .extensions()
                .get_schema_extension(SCHEMA_EXTENSION_ID)
                .await?
                .is_some()),
            Story::SetSchemaExtensionValue => {
                let mut values = Map::new();
                values.insert(SCHEMA_PROPERTY.to_string(), json!("value"));
                client
                    .extensions()
                    .set_schema_extension_value(SCHEMA_EXTENSION_ID, &values)
                    .await?;
                Ok(true)
            }
            Story::GetSchemaExtensionValue => Ok(client
                .extensions()
                .get_schema_extension_value(SCHEMA_EXTENSION_ID)
                .await?
                .is_some()),
            Story::DeleteSchemaExtension => {
                client
                    .extensions()
                    .delete_schema_extension(SCHEMA_EXTENSION_ID)
                    .await?;
                Ok(true)
            }
            Story::ParallelBatch => run_batch(client, parallel_batch()?).await,
            Story::SequentialBatch => run_batch(client, sequential_batch()?).await,
        }
    }
}

impl fmt::Display for Story {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group(), self.name())
    }
}

impl FromStr for Story {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Story::ALL
            .iter()
            .copied()
            .find(|story| story.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown story: {}", s))
    }
}

/// Result of running one story.
#[derive(Debug)]
pub struct StoryOutcome {
    pub story: Story,
    pub passed: bool,
    pub duration: Duration,
    pub error: Option<GraphError>,
}

/// Run stories one after another, logging each result.
///
/// Stops early only when an error means the session is gone, since every
/// later story would fail the same way.
pub async fn run_stories(client: &GraphClient, stories: &[Story]) -> Vec<StoryOutcome> {
    let mut outcomes = Vec::with_capacity(stories.len());

    for &story in stories {
        let started = Instant::now();
        let result = story.run(client).await;
        let duration = started.elapsed();

        let outcome = match result {
            Ok(passed) => {
                info!(
                    "{} {} ({} ms)",
                    story,
                    if passed { "passed" } else { "failed" },
                    duration.as_millis()
                );
                StoryOutcome {
                    story,
                    passed,
                    duration,
                    error: None,
                }
            }
            Err(e) => {
                warn!("{} failed: {}", story, e);
                StoryOutcome {
                    story,
                    passed: false,
                    duration,
                    error: Some(e),
                }
            }
        };

        let stop = outcome
            .error
            .as_ref()
            .is_some_and(GraphError::requires_sign_out);
        outcomes.push(outcome);
        if stop {
            warn!("Session is no longer valid, skipping remaining stories");
            break;
        }
    }

    outcomes
}

async fn create_event(client: &GraphClient, tag: &str) -> Result<Option<String>, GraphError> {
    let start = Utc::now() + chrono::Duration::days(1);
    let event = NewEvent {
        subject: format!("Weekly Sync {}", tag),
        location: Some("Water Cooler".to_string()),
        required_attendees: Vec::new(),
        start,
        end: start + chrono::Duration::minutes(30),
        body_text: Some("Status updates, blocking issues, and next steps".to_string()),
    };
    client.events().create_event(&event).await
}

async fn create_file(client: &GraphClient, tag: &str) -> Result<Option<String>, GraphError> {
    let name = format!("{}.txt", Uuid::new_v4());
    client.files().create_file(&name, tag).await
}

async fn create_group(client: &GraphClient, tag: &str) -> Result<Option<String>, GraphError> {
    let nickname = tag.replace('-', "");
    client.groups().create_group(&NewGroup::new(nickname)).await
}

async fn first_group(client: &GraphClient) -> Result<Option<String>, GraphError> {
    Ok(client
        .groups()
        .list_groups()
        .await?
        .and_then(|ids| ids.into_iter().next()))
}

/// Mail address of the signed-in user, falling back to the UPN.
async fn own_address(client: &GraphClient) -> Result<Option<String>, GraphError> {
    let me = client.http().get("me?$select=mail,userPrincipalName").await?;
    Ok(me.and_then(|v| {
        ["mail", "userPrincipalName"]
            .iter()
            .find_map(|field| v.get(*field).and_then(Value::as_str).map(str::to_string))
    }))
}

fn parallel_batch() -> Result<BatchComposer, GraphError> {
    BatchComposer::parallel([
        GraphRequest::get("1", "/me"),
        GraphRequest::get("2", "/me/manager"),
        GraphRequest::get("3", "/me/messages?$top=5"),
        GraphRequest::get("4", "/me/photo/$value"),
    ])
}

fn sequential_batch() -> Result<BatchComposer, GraphError> {
    let folder = format!("/me/drive/root/children/{}", BATCH_FOLDER);
    BatchComposer::sequential([
        GraphRequest::get("1", "/me/events?$top=2"),
        GraphRequest::new("2", Method::Post, "/me/drive/root/children")
            .with_body(json!({ "name": BATCH_FOLDER, "folder": {} })),
        GraphRequest::get("3", folder.clone()),
        GraphRequest::new("4", Method::Delete, folder),
    ])
}

async fn run_batch(client: &GraphClient, batch: BatchComposer) -> Result<bool, GraphError> {
    let results = client.batch(&batch).await?;
    let failed = results.failed_ids();
    if !failed.is_empty() {
        warn!("Batch sub-requests failed: {}", failed.join(", "));
    }
    Ok(true)
}
