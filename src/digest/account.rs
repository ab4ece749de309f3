//! One account's digest pass: decrypt, identify, walk the team → project →
//! file hierarchy, normalize, filter, advance the cursor.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::normalize::{is_after, parse_provider_ts, EventNormalizer, FileContext};
use super::relevance::filter_relevant;
use crate::errors::{ApiError, DigestError};
use crate::models::{ActivityEvent, Credential};
use crate::provider::types::{FileRef, ProjectRef};
use crate::provider::{with_retry, ActivityClient, ProviderConfig, RetryPolicy};
use crate::redact::redact_text;
use crate::vault::CredentialVault;

/// Hierarchy level at which a fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Scope {
    Team { team_id: String },
    Project { team_id: String, project_id: String },
    File { project_id: String, file_key: String },
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Team { team_id } => write!(f, "team {}", team_id),
            Scope::Project { project_id, .. } => write!(f, "project {}", project_id),
            Scope::File { file_key, .. } => write!(f, "file {}", file_key),
        }
    }
}

/// A failure isolated to one scope; siblings kept going.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeError {
    pub scope: Scope,
    pub error: String,
}

/// Result of a completed account pass.
#[derive(Debug, Clone)]
pub struct AccountDigest {
    pub user_id: String,
    pub account_name: String,
    pub identity_id: String,
    pub since: DateTime<Utc>,
    /// Events fetched before relevance filtering.
    pub fetched: usize,
    /// Relevant events, in walk order.
    pub events: Vec<ActivityEvent>,
    pub scope_errors: Vec<ScopeError>,
    pub cursor: DateTime<Utc>,
}

pub struct AccountProcessor {
    vault: Arc<CredentialVault>,
    provider: ProviderConfig,
    http: reqwest::Client,
    normalizer: EventNormalizer,
    retry: RetryPolicy,
    lookback: Duration,
}

impl AccountProcessor {
    pub fn new(
        vault: Arc<CredentialVault>,
        provider: ProviderConfig,
        http: reqwest::Client,
        retry: RetryPolicy,
        lookback: Duration,
    ) -> Self {
        let normalizer = EventNormalizer::new(&provider.link_base);
        Self {
            vault,
            provider,
            http,
            normalizer,
            retry,
            lookback,
        }
    }

    pub async fn process(&self, cred: &Credential) -> Result<AccountDigest, DigestError> {
        let secret = self.vault.decrypt(&cred.encrypted_secret)?;
        let client = ActivityClient::new(self.http.clone(), &self.provider, secret);

        let identity = with_retry(&self.retry, "identity", || client.get_identity()).await?;
        let since = match self
            .vault
            .get_cursor(&cred.user_id, &cred.account_name)
            .await?
        {
            Some(cursor) => cursor,
            None => Utc::now() - self.lookback,
        };

        debug!(
            user_id = %cred.user_id,
            account = %cred.account_name,
            since = %since,
            teams = cred.scope_ids.len(),
            "processing account"
        );

        let mut walk = Walk {
            processor: self,
            client: &client,
            account: &cred.account_name,
            since,
            events: Vec::new(),
            scope_errors: Vec::new(),
        };
        for team_id in &cred.scope_ids {
            walk.team(team_id).await;
        }
        let Walk {
            events,
            scope_errors,
            ..
        } = walk;

        let fetched = events.len();
        let events = filter_relevant(events, &identity.id);

        let cursor = Utc::now();
        self.vault
            .set_cursor(&cred.user_id, &cred.account_name, cursor)
            .await?;

        info!(
            user_id = %cred.user_id,
            account = %cred.account_name,
            fetched,
            relevant = events.len(),
            scope_errors = scope_errors.len(),
            "account pass complete"
        );

        Ok(AccountDigest {
            user_id: cred.user_id.clone(),
            account_name: cred.account_name.clone(),
            identity_id: identity.id,
            since,
            fetched,
            events,
            scope_errors,
            cursor,
        })
    }
}

/// Sequential hierarchy traversal for one account.
struct Walk<'a> {
    processor: &'a AccountProcessor,
    client: &'a ActivityClient,
    account: &'a str,
    since: DateTime<Utc>,
    events: Vec<ActivityEvent>,
    scope_errors: Vec<ScopeError>,
}

impl Walk<'_> {
    async fn team(&mut self, team_id: &str) {
        let client = self.client;
        let listing = with_retry(&self.processor.retry, "team projects", || {
            client.list_team_projects(team_id)
        })
        .await;

        match listing {
            Ok(listing) => {
                for project in &listing.projects {
                    self.project(team_id, project).await;
                }
            }
            Err(e) => self.record(
                Scope::Team {
                    team_id: team_id.to_string(),
                },
                &e,
            ),
        }
    }

    async fn project(&mut self, team_id: &str, project: &ProjectRef) {
        let client = self.client;
        let listing = with_retry(&self.processor.retry, "project files", || {
            client.list_project_files(&project.id)
        })
        .await;

        match listing {
            Ok(listing) => {
                for file in &listing.files {
                    let ctx = FileContext {
                        account: self.account.to_string(),
                        project_id: project.id.clone(),
                        project_name: project.name.clone(),
                        file_key: file.key.clone(),
                        file_name: file.name.clone(),
                    };
                    if let Err(e) = self.file(file, &ctx).await {
                        self.record(
                            Scope::File {
                                project_id: project.id.clone(),
                                file_key: file.key.clone(),
                            },
                            &e,
                        );
                    }
                }
            }
            Err(e) => self.record(
                Scope::Project {
                    team_id: team_id.to_string(),
                    project_id: project.id.clone(),
                },
                &e,
            ),
        }
    }

    async fn file(&mut self, file: &FileRef, ctx: &FileContext) -> Result<(), ApiError> {
        let client = self.client;
        let retry = &self.processor.retry;
        let since = self.since;

        let last_modified = match file.last_modified.as_deref().and_then(parse_provider_ts) {
            Some(ts) => Some(ts),
            None => with_retry(retry, "file meta", || client.get_file_meta(&file.key))
                .await?
                .last_touched_at
                .as_deref()
                .and_then(parse_provider_ts),
        };
        if let Some(ts) = last_modified {
            if !is_after(&ts, since) {
                debug!(file_key = %file.key, last_modified = %ts, "file untouched since cursor, skipping");
                return Ok(());
            }
        }

        let versions = with_retry(retry, "file versions", || {
            client.list_file_versions(&file.key, Some(since))
        })
        .await?;
        for version in &versions.versions {
            match self.processor.normalizer.normalize_version(version, ctx) {
                Ok(event) if is_after(&event.ts, since) => self.events.push(event),
                Ok(_) => {}
                Err(e) => warn!(file_key = %file.key, error = %e, "skipping version record"),
            }
        }

        let comments =
            with_retry(retry, "file comments", || client.list_file_comments(&file.key)).await?;
        for comment in &comments.comments {
            match self.processor.normalizer.normalize_comment(comment, ctx) {
                Ok(event) if is_after(&event.ts, since) => self.events.push(event),
                Ok(_) => {}
                Err(e) => warn!(file_key = %file.key, error = %e, "skipping comment record"),
            }
        }

        Ok(())
    }

    fn record(&mut self, scope: Scope, err: &ApiError) {
        let error = redact_text(&err.to_string());
        warn!(account = %self.account, scope = %scope, error = %error, "scope failed, continuing");
        self.scope_errors.push(ScopeError { scope, error });
    }
}
