//! Per-resource wrappers: one REST call in, one typed projection out.
//!
//! Reads are tolerant: a missing field yields `Ok(None)` rather than an error.
//! Listings read only the first page; see `GraphHttpClient::get_all_pages`.

mod events;
mod extensions;
mod files;
mod groups;
mod messages;
mod organization;
mod users;

use std::borrow::Cow;

use serde::Serialize;
use serde_json::Value;

use crate::error::GraphError;

pub use events::{Events, NewEvent};
pub use extensions::{Extensions, SchemaExtension, SchemaProperty};
pub use files::Files;
pub use groups::{Groups, NewGroup};
pub use messages::{Messages, OutgoingMessage};
pub use organization::Organization;
pub use users::{NewUser, Users};

/// Read a string field, falling back to a case-insensitive match.
///
/// Older payloads spell some properties in PascalCase (`Id`, `Subject`).
pub(crate) fn string_field(value: &Value, name: &str) -> Option<String> {
    let object = value.as_object()?;
    let field = object.get(name).or_else(|| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })?;
    field.as_str().map(str::to_string)
}

/// Project one field out of every entry of a collection's `value` array.
///
/// `None` when the body has no `value` array; entries lacking the field are skipped.
pub(crate) fn collect_field(page: Option<&Value>, name: &str) -> Option<Vec<String>> {
    let entries = page?.get("value")?.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|entry| string_field(entry, name))
            .collect(),
    )
}

/// Like `collect_field` but tries each name in turn per entry.
pub(crate) fn collect_any_field(page: Option<&Value>, names: &[&str]) -> Option<Vec<String>> {
    let entries = page?.get("value")?.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(|entry| names.iter().find_map(|name| string_field(entry, name)))
            .collect(),
    )
}

/// Serialize a typed request body.
pub(crate) fn to_json<T: Serialize>(payload: &T) -> Result<Value, GraphError> {
    serde_json::to_value(payload).map_err(|e| GraphError::Decode(e.to_string()))
}

/// Percent-encode a caller-supplied id or name for use as one path segment.
pub(crate) fn segment(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}
