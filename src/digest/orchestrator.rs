use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use super::account::{AccountDigest, AccountProcessor};
use super::summary::SummaryGenerator;
use crate::config::{Config, DigestMode};
use crate::errors::{AppError, ConfigError, VaultError};
use crate::jobs::expiration::ExpirationMonitor;
use crate::models::ActivityEvent;
use crate::notification::{NotificationSink, SinkTiming};
use crate::provider::{ActivityClient, ProviderConfig, RetryPolicy};
use crate::redact::redact_text;
use crate::store::KvStore;
use crate::vault::CredentialVault;

#[derive(Debug, Clone)]
pub struct DigestSettings {
    /// Accounts processed together per batch.
    pub concurrency: usize,
    /// Window used when an account has no cursor yet.
    pub lookback: Duration,
    pub mode: DigestMode,
    pub retry: RetryPolicy,
    pub warning_days: i64,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            lookback: Duration::hours(24),
            mode: DigestMode::Events,
            retry: RetryPolicy::default(),
            warning_days: 3,
        }
    }
}

/// What the trigger endpoint returns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestReport {
    pub success: bool,
    pub events_processed: usize,
    pub accounts_processed: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl DigestReport {
    /// Report for a run that never started.
    pub fn aborted(error: &str, started: Instant) -> Self {
        Self {
            success: false,
            events_processed: 0,
            accounts_processed: 0,
            errors: vec![redact_text(error)],
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFailure {
    pub user_id: String,
    pub account_name: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Completed passes, in credential order.
    pub results: Vec<AccountDigest>,
    pub failures: Vec<AccountFailure>,
}

pub struct DigestOrchestrator {
    vault: Arc<CredentialVault>,
    processor: AccountProcessor,
    summaries: SummaryGenerator,
    sink: NotificationSink,
    monitor: ExpirationMonitor,
    settings: DigestSettings,
}

impl DigestOrchestrator {
    pub fn new(
        vault: Arc<CredentialVault>,
        provider: ProviderConfig,
        http: reqwest::Client,
        sink: NotificationSink,
        source_label: &str,
        settings: DigestSettings,
    ) -> Self {
        let processor = AccountProcessor::new(
            vault.clone(),
            provider.clone(),
            http.clone(),
            settings.retry.clone(),
            settings.lookback,
        );
        let monitor = ExpirationMonitor::new(
            vault.clone(),
            provider,
            http,
            sink.clone(),
            settings.retry.clone(),
            settings.warning_days,
        );
        Self {
            vault,
            processor,
            summaries: SummaryGenerator::new(source_label),
            sink,
            monitor,
            settings,
        }
    }

    /// Wire everything from configuration. Fails before any account work
    /// when the encryption key or sink URL is missing or invalid.
    pub fn from_config(config: &Config, store: Arc<dyn KvStore>) -> Result<Self, AppError> {
        let key = config
            .encryption_key
            .as_deref()
            .ok_or(ConfigError::Missing("DIGEST_ENCRYPTION_KEY"))?;
        let sink_url = config
            .sink_url
            .as_deref()
            .ok_or(ConfigError::Missing("DIGEST_SINK_URL"))?;

        let vault = Arc::new(CredentialVault::new(key, store)?);
        let http = ActivityClient::http_client()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("http client: {}", e)))?;
        let sink = NotificationSink::new(http.clone(), sink_url, SinkTiming::default());

        Ok(Self::new(
            vault,
            config.provider.clone(),
            http,
            sink,
            &config.source_label,
            config.digest_settings(),
        ))
    }

    pub fn monitor(&self) -> &ExpirationMonitor {
        &self.monitor
    }

    /// Full run. Never fails: every problem ends up in `errors`.
    pub async fn run(&self) -> DigestReport {
        let started = Instant::now();
        let mut errors = Vec::new();

        let outcome = match self.process_accounts().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "could not list credentials");
                errors.push(redact_text(&format!("credential listing failed: {}", e)));
                BatchOutcome::default()
            }
        };

        errors.extend(outcome.failures.iter().map(|f| {
            redact_text(&format!("{}/{}: {}", f.user_id, f.account_name, f.error))
        }));

        let events: Vec<ActivityEvent> = outcome
            .results
            .iter()
            .flat_map(|r| r.events.iter().cloned())
            .collect();

        let messages = self.render(&events);
        if !messages.is_empty() {
            if let Err(e) = self.sink.post_messages(&messages).await {
                error!(error = %e, "digest delivery failed");
                errors.push(redact_text(&format!("delivery: {}", e)));
            }
        }

        match self.monitor.check_all_credentials().await {
            Ok(statuses) => {
                if let Err(e) = self.monitor.post_consolidated_warnings(&statuses).await {
                    warn!(error = %e, "expiration warning delivery failed");
                    errors.push(redact_text(&format!("expiration warnings: {}", e)));
                }
            }
            Err(e) => {
                warn!(error = %e, "expiration check failed");
                errors.push(redact_text(&format!("expiration check: {}", e)));
            }
        }

        let report = DigestReport {
            success: errors.is_empty(),
            events_processed: events.len(),
            accounts_processed: outcome.results.len(),
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            success = report.success,
            events = report.events_processed,
            accounts = report.accounts_processed,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "digest run finished"
        );
        report
    }

    /// List credentials and process them in barrier-synchronised batches.
    /// A failed account never affects its siblings.
    pub async fn process_accounts(&self) -> Result<BatchOutcome, VaultError> {
        let credentials = self.vault.list_all_credentials().await?;
        let batch_size = self.settings.concurrency.max(1);
        let mut outcome = BatchOutcome::default();

        for (n, batch) in credentials.chunks(batch_size).enumerate() {
            info!(batch = n + 1, size = batch.len(), "processing account batch");
            let results = join_all(batch.iter().map(|cred| self.processor.process(cred))).await;

            for (cred, result) in batch.iter().zip(results) {
                match result {
                    Ok(digest) => outcome.results.push(digest),
                    Err(e) => {
                        let error = redact_text(&e.to_string());
                        error!(user_id = %cred.user_id, account = %cred.account_name, error = %error, "account pass failed");
                        outcome.failures.push(AccountFailure {
                            user_id: cred.user_id.clone(),
                            account_name: cred.account_name.clone(),
                            error,
                        });
                    }
                }
            }
        }

        Ok(outcome)
    }

    fn render(&self, events: &[ActivityEvent]) -> Vec<String> {
        if events.is_empty() {
            return Vec::new();
        }
        match self.settings.mode {
            DigestMode::Events => self.summaries.generate_per_event_summaries(events),
            DigestMode::Recap => {
                let date_label = Utc::now().format("%Y-%m-%d").to_string();
                vec![self.summaries.generate_daily_recap(events, &date_label)]
            }
        }
    }
}
