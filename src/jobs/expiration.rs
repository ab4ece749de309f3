//! Credential expiration monitoring.
//!
//! Each pass re-validates every stored credential against the provider's
//! identity endpoint, works out when it expires, and posts one consolidated
//! warning for everything that is expired or about to be.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::{SinkError, VaultError};
use crate::models::{Credential, ExpirationStatus};
use crate::notification::NotificationSink;
use crate::provider::{with_retry, ActivityClient, ProviderConfig, RetryPolicy};
use crate::vault::CredentialVault;

/// Identity fields that may carry an expiry, in lookup order.
pub const EXPIRY_FIELDS: [&str; 5] = [
    "expires_at",
    "expiresAt",
    "token_expires_at",
    "expiration",
    "expiry",
];

/// Epoch values above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    Found(T),
    NotFound,
}

impl<T> Probe<T> {
    pub fn or_else(self, fallback: impl FnOnce() -> Option<T>) -> Option<T> {
        match self {
            Probe::Found(v) => Some(v),
            Probe::NotFound => fallback(),
        }
    }
}

/// First candidate field holding a parseable expiry wins.
pub fn probe_expiry(fields: &Map<String, Value>) -> Probe<DateTime<Utc>> {
    EXPIRY_FIELDS
        .iter()
        .filter_map(|name| fields.get(*name))
        .find_map(parse_expiry_value)
        .map_or(Probe::NotFound, Probe::Found)
}

fn parse_expiry_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| s.parse::<i64>().ok().and_then(from_epoch))
        }
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).and_then(from_epoch),
        _ => None,
    }
}

fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    if raw > EPOCH_MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

pub struct ExpirationMonitor {
    vault: Arc<CredentialVault>,
    provider: ProviderConfig,
    http: reqwest::Client,
    sink: NotificationSink,
    retry: RetryPolicy,
    warning_days: i64,
}

impl ExpirationMonitor {
    pub fn new(
        vault: Arc<CredentialVault>,
        provider: ProviderConfig,
        http: reqwest::Client,
        sink: NotificationSink,
        retry: RetryPolicy,
        warning_days: i64,
    ) -> Self {
        Self {
            vault,
            provider,
            http,
            sink,
            retry,
            warning_days,
        }
    }

    /// Validate one credential. Any failure to decrypt or reach the
    /// identity endpoint counts as expired.
    pub async fn check_credential(&self, cred: &Credential, now: DateTime<Utc>) -> ExpirationStatus {
        let secret = match self.vault.decrypt(&cred.encrypted_secret) {
            Ok(secret) => secret,
            Err(e) => {
                warn!(user_id = %cred.user_id, account = %cred.account_name, error = %e, "expiry check: cannot decrypt credential");
                return ExpirationStatus::validation_failed(&cred.user_id, &cred.account_name);
            }
        };

        let client = ActivityClient::new(self.http.clone(), &self.provider, secret);
        let identity = match with_retry(&self.retry, "identity", || client.get_identity()).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(user_id = %cred.user_id, account = %cred.account_name, error = %e, "expiry check: identity validation failed");
                return ExpirationStatus::validation_failed(&cred.user_id, &cred.account_name);
            }
        };

        match probe_expiry(&identity.extra).or_else(|| cred.expires_at) {
            Some(expires_at) => ExpirationStatus::from_expiry(
                &cred.user_id,
                &cred.account_name,
                expires_at,
                now,
                self.warning_days,
            ),
            None => {
                debug!(user_id = %cred.user_id, account = %cred.account_name, "no expiry exposed for credential");
                ExpirationStatus::unknown(&cred.user_id, &cred.account_name)
            }
        }
    }

    /// Statuses that need a warning, in credential order.
    pub async fn check_all_credentials(&self) -> Result<Vec<ExpirationStatus>, VaultError> {
        let credentials = self.vault.list_all_credentials().await?;
        let now = Utc::now();

        let mut flagged = Vec::new();
        for cred in &credentials {
            let status = self.check_credential(cred, now).await;
            if status.needs_warning {
                flagged.push(status);
            }
        }

        info!(
            checked = credentials.len(),
            flagged = flagged.len(),
            "expiration check complete"
        );
        Ok(flagged)
    }

    /// Post one message covering every status. Nothing is sent for an empty
    /// list; returns whether a message went out.
    pub async fn post_consolidated_warnings(
        &self,
        statuses: &[ExpirationStatus],
    ) -> Result<bool, SinkError> {
        match build_warning_message(statuses) {
            Some(message) => {
                self.sink.post_message(&message).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub fn build_warning_message(statuses: &[ExpirationStatus]) -> Option<String> {
    if statuses.is_empty() {
        return None;
    }

    let (expired, expiring): (Vec<_>, Vec<_>) = statuses.iter().partition(|s| s.is_expired);
    let mut sections = vec!["⚠️ Credential expiration warning".to_string()];

    if !expired.is_empty() {
        let mut section = String::from("Expired:");
        for s in expired {
            let when = match s.expires_at {
                Some(at) => format!("expired {}", at.format("%Y-%m-%d")),
                None => "could not be validated".to_string(),
            };
            section.push_str(&format!("\n• {}/{}: {}", s.user_id, s.account_name, when));
        }
        sections.push(section);
    }

    if !expiring.is_empty() {
        let mut section = String::from("Expiring soon:");
        for s in expiring {
            let date = s
                .expires_at
                .map(|at| at.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let days = s.days_until_expiry.unwrap_or_default();
            section.push_str(&format!(
                "\n• {}/{}: expires {} ({} day{} left)",
                s.user_id,
                s.account_name,
                date,
                days,
                if days == 1 { "" } else { "s" }
            ));
        }
        sections.push(section);
    }

    Some(sections.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_probe_candidate_order() {
        let f = fields(json!({
            "expiry": "2031-01-01T00:00:00Z",
            "expiresAt": "2030-06-01T00:00:00Z"
        }));
        assert_eq!(
            probe_expiry(&f),
            Probe::Found(Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_probe_epoch_seconds_and_millis() {
        let secs = fields(json!({"expires_at": 1_900_000_000}));
        let millis = fields(json!({"token_expires_at": 1_900_000_000_000i64}));
        let expected = Utc.timestamp_opt(1_900_000_000, 0).unwrap();
        assert_eq!(probe_expiry(&secs), Probe::Found(expected));
        assert_eq!(probe_expiry(&millis), Probe::Found(expected));
    }

    #[test]
    fn test_probe_skips_unparseable_and_reports_not_found() {
        let f = fields(json!({"expires_at": "soon", "expiration": "1900000000"}));
        assert_eq!(
            probe_expiry(&f),
            Probe::Found(Utc.timestamp_opt(1_900_000_000, 0).unwrap())
        );
        assert_eq!(probe_expiry(&fields(json!({"handle": "x"}))), Probe::NotFound);
        assert_eq!(probe_expiry(&fields(json!({"expiry": null}))), Probe::NotFound);
    }

    #[test]
    fn test_probe_fallback() {
        let stored = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(Probe::NotFound.or_else(|| Some(stored)), Some(stored));
        assert_eq!(Probe::Found(stored).or_else(|| None), Some(stored));
    }

    #[test]
    fn test_warning_message_sections() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let statuses = vec![
            ExpirationStatus::validation_failed("u1", "work"),
            ExpirationStatus::from_expiry("u2", "side", now + chrono::Duration::days(2), now, 3),
        ];
        let msg = build_warning_message(&statuses).unwrap();
        assert!(msg.contains("Expired:\n• u1/work: could not be validated"));
        assert!(msg.contains("Expiring soon:\n• u2/side: expires 2024-05-03 (2 days left)"));

        let only_soon = build_warning_message(&statuses[1..]).unwrap();
        assert!(!only_soon.contains("Expired:"));

        assert!(build_warning_message(&[]).is_none());
    }
}
