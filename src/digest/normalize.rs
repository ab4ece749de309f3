//! Raw provider records → canonical [`ActivityEvent`]s.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use thiserror::Error;

use crate::models::event::meta;
use crate::models::{Action, ActivityEvent};
use crate::provider::types::{CommentRecord, ProviderUser, VersionRecord};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unparsable timestamp {raw:?} on record {record_id}")]
    Timestamp { record_id: String, raw: String },
}

/// Provider event kind behind each record type.
const VERSION_EVENT: &str = "FILE_VERSION_UPDATE";
const COMMENT_EVENT: &str = "FILE_COMMENT";

/// Where a record was found during the hierarchy walk.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub account: String,
    pub project_id: String,
    pub project_name: String,
    pub file_key: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct DeepLinkOptions<'a> {
    pub version_id: Option<&'a str>,
    pub comment_id: Option<&'a str>,
    pub node_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct EventNormalizer {
    link_base: String,
}

impl EventNormalizer {
    pub fn new(link_base: &str) -> Self {
        Self {
            link_base: link_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn normalize_version(
        &self,
        version: &VersionRecord,
        ctx: &FileContext,
    ) -> Result<ActivityEvent, NormalizeError> {
        let ts = parse_record_ts(&version.id, &version.created_at)?;

        let mut metadata = BTreeMap::new();
        metadata.insert(meta::VERSION_ID.to_string(), version.id.clone());
        if let Some(label) = &version.label {
            metadata.insert(meta::LABEL.to_string(), label.clone());
        }
        if let Some(description) = &version.description {
            metadata.insert(meta::DESCRIPTION.to_string(), description.clone());
        }

        let url = self.generate_deep_link(
            &ctx.file_key,
            &DeepLinkOptions {
                version_id: Some(&version.id),
                ..Default::default()
            },
        );

        Ok(build_event(
            ts,
            ctx,
            version.user.as_ref(),
            classify_action(VERSION_EVENT),
            url,
            metadata,
        ))
    }

    pub fn normalize_comment(
        &self,
        comment: &CommentRecord,
        ctx: &FileContext,
    ) -> Result<ActivityEvent, NormalizeError> {
        let ts = parse_record_ts(&comment.id, &comment.created_at)?;
        let node_id = comment.node_id();

        let mut metadata = BTreeMap::new();
        metadata.insert(meta::COMMENT_ID.to_string(), comment.id.clone());
        if let Some(parent) = &comment.parent_id {
            metadata.insert(meta::PARENT_ID.to_string(), parent.clone());
        }
        if let Some(message) = &comment.message {
            metadata.insert(meta::MESSAGE.to_string(), message.clone());
        }
        if let Some(node) = &node_id {
            metadata.insert(meta::NODE_ID.to_string(), node.clone());
        }

        let url = self.generate_deep_link(
            &ctx.file_key,
            &DeepLinkOptions {
                comment_id: Some(&comment.id),
                node_id: node_id.as_deref(),
                ..Default::default()
            },
        );

        Ok(build_event(
            ts,
            ctx,
            comment.user.as_ref(),
            classify_action(COMMENT_EVENT),
            url,
            metadata,
        ))
    }

    /// `{base}/file/{key}` plus `version-id`, `comment-id`, `node-id` query
    /// parameters in that order, each only when present. Empty key → `""`.
    pub fn generate_deep_link(&self, file_key: &str, opts: &DeepLinkOptions<'_>) -> String {
        if file_key.is_empty() {
            return String::new();
        }

        let params: Vec<String> = [
            ("version-id", opts.version_id),
            ("comment-id", opts.comment_id),
            ("node-id", opts.node_id),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}={}", key, urlencoding::encode(v)))
        })
        .collect();

        let mut url = format!("{}/file/{}", self.link_base, file_key);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }
}

/// Provider event names → canonical action names. Unknown names come back
/// unchanged.
pub fn classify_action_type(raw: &str) -> String {
    let canonical = match raw {
        "FILE_UPDATE" | "FILE_VERSION_UPDATE" => "edit",
        "FILE_COMMENT" => "comment",
        "LIBRARY_PUBLISH" => "publish",
        "FILE_DELETE" => "delete",
        other => other,
    };
    canonical.to_string()
}

/// Typed form of [`classify_action_type`].
pub fn classify_action(raw: &str) -> Action {
    Action::from_canonical(&classify_action_type(raw))
}

/// Strictly after: an event stamped exactly at `since` was already seen.
pub fn is_after(ts: &DateTime<FixedOffset>, since: DateTime<Utc>) -> bool {
    ts.with_timezone(&Utc) > since
}

/// Parse a provider timestamp, keeping its offset.
pub fn parse_provider_ts(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw.trim()).ok()
}

fn parse_record_ts(record_id: &str, raw: &str) -> Result<DateTime<FixedOffset>, NormalizeError> {
    parse_provider_ts(raw).ok_or_else(|| NormalizeError::Timestamp {
        record_id: record_id.to_string(),
        raw: raw.to_string(),
    })
}

fn build_event(
    ts: DateTime<FixedOffset>,
    ctx: &FileContext,
    user: Option<&ProviderUser>,
    action: Action,
    url: String,
    metadata: BTreeMap<String, String>,
) -> ActivityEvent {
    ActivityEvent {
        ts,
        account: ctx.account.clone(),
        project_id: ctx.project_id.clone(),
        project_name: ctx.project_name.clone(),
        file_key: ctx.file_key.clone(),
        file_name: ctx.file_name.clone(),
        user_id: user.and_then(|u| u.id.clone()),
        user_name: user.and_then(|u| u.handle.clone()),
        user_email: user.and_then(|u| u.email.clone()),
        action,
        url,
        metadata,
    }
}
