use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical action of an activity record.
///
/// Known provider names map onto the named variants; anything else is kept
/// verbatim in `Other` so new provider event kinds flow through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Edit,
    Comment,
    Publish,
    Delete,
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Edit => "edit",
            Action::Comment => "comment",
            Action::Publish => "publish",
            Action::Delete => "delete",
            Action::Other(raw) => raw,
        }
    }

    /// Parse a canonical name; non-canonical input becomes `Other`.
    pub fn from_canonical(name: &str) -> Self {
        match name {
            "edit" => Action::Edit,
            "comment" => Action::Comment,
            "publish" => Action::Publish,
            "delete" => Action::Delete,
            other => Action::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Action::from_canonical(&raw))
    }
}

/// One provider-side activity record (a version or a comment) in canonical
/// form. Built by the normalizer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Provider timestamp with its original offset preserved.
    pub ts: DateTime<FixedOffset>,
    pub account: String,
    pub project_id: String,
    pub project_name: String,
    pub file_key: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub action: Action,
    pub url: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ActivityEvent {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Metadata keys written by the normalizer.
pub mod meta {
    pub const VERSION_ID: &str = "versionId";
    pub const LABEL: &str = "label";
    pub const DESCRIPTION: &str = "description";
    pub const COMMENT_ID: &str = "commentId";
    pub const PARENT_ID: &str = "parentId";
    pub const MESSAGE: &str = "message";
    pub const NODE_ID: &str = "nodeId";
}
