use chrono::{DateTime, Utc};
use serde::Serialize;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Freshly computed expiry state for one account. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationStatus {
    pub user_id: String,
    pub account_name: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
    pub is_expired: bool,
    pub needs_warning: bool,
}

impl ExpirationStatus {
    /// Status for a known expiry instant.
    pub fn from_expiry(
        user_id: &str,
        account_name: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
        warning_days: i64,
    ) -> Self {
        let days = days_until(expires_at, now);
        Self {
            user_id: user_id.to_string(),
            account_name: account_name.to_string(),
            expires_at: Some(expires_at),
            days_until_expiry: Some(days),
            is_expired: days <= 0,
            needs_warning: days <= warning_days,
        }
    }

    /// Validation succeeded but the provider exposes no expiry.
    pub fn unknown(user_id: &str, account_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            account_name: account_name.to_string(),
            expires_at: None,
            days_until_expiry: None,
            is_expired: false,
            needs_warning: false,
        }
    }

    /// Validation itself failed: assume the worst so someone gets told.
    pub fn validation_failed(user_id: &str, account_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            account_name: account_name.to_string(),
            expires_at: None,
            days_until_expiry: None,
            is_expired: true,
            needs_warning: true,
        }
    }
}

/// `ceil((expires_at - now) / 1 day)`, in whole days.
pub fn days_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (expires_at - now).num_milliseconds() as f64;
    (ms / MS_PER_DAY).ceil() as i64
}
