//! Raw response shapes of the activity-source API.
//!
//! Fields the digest does not need are ignored; optional ones default so a
//! sparse record still deserializes.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// The account's own identity (`GET /me`). Unknown fields are kept in
/// `extra`; the expiration monitor probes them.
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamProjects {
    #[serde(default)]
    pub projects: Vec<ProjectRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRef {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFiles {
    #[serde(default)]
    pub files: Vec<FileRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileVersions {
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub created_at: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub user: Option<ProviderUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileComments {
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub created_at: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user: Option<ProviderUser>,
    #[serde(default)]
    pub client_meta: Option<Value>,
}

impl CommentRecord {
    /// Node the comment is pinned to, if any.
    pub fn node_id(&self) -> Option<String> {
        self.client_meta
            .as_ref()
            .and_then(|m| m.get("node_id"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileMetaResponse {
    pub file: FileMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileMeta {
    #[serde(default)]
    pub last_touched_at: Option<String>,
}

/// Provider ids come back as strings or bare numbers depending on endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(v: StringOrNumber) -> Self {
        match v {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(deserializer).map(String::from)
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?
        .map(String::from)
        .filter(|s| !s.is_empty()))
}
