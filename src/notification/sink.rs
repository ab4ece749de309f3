//! Incoming-webhook delivery with bounded retry and message pacing.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::SinkError;
use crate::redact::redact_text;

/// Delivery timings. Tests shrink these to zero.
#[derive(Debug, Clone)]
pub struct SinkTiming {
    /// Total attempts per message, first one included.
    pub max_attempts: u32,
    /// Wait before attempt 2; doubles for each later attempt.
    pub base_backoff: Duration,
    /// Pause between consecutive messages of one batch.
    pub message_interval: Duration,
}

impl Default for SinkTiming {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1000),
            message_interval: Duration::from_millis(1000),
        }
    }
}

impl SinkTiming {
    pub fn immediate() -> Self {
        Self {
            base_backoff: Duration::ZERO,
            message_interval: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
struct SinkMessage<'a> {
    text: &'a str,
}

#[derive(Clone)]
pub struct NotificationSink {
    client: reqwest::Client,
    url: String,
    timing: SinkTiming,
}

impl NotificationSink {
    pub fn new(client: reqwest::Client, url: &str, timing: SinkTiming) -> Self {
        Self {
            client,
            url: url.to_string(),
            timing,
        }
    }

    /// POST `{"text": msg}`. 5xx and transport failures are retried with
    /// exponential backoff; any other non-2xx fails at once.
    pub async fn post_message(&self, msg: &str) -> Result<(), SinkError> {
        let max_attempts = self.timing.max_attempts.max(1);
        let mut last_status = None;
        let mut last_body = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.timing.base_backoff * 2u32.pow(attempt - 2);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying sink delivery");
                tokio::time::sleep(delay).await;
            }

            let result = self
                .client
                .post(&self.url)
                .json(&SinkMessage { text: msg })
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    info!(attempt, status = %resp.status(), "sink message delivered");
                    return Ok(());
                }
                Ok(resp) if resp.status().is_server_error() => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(attempt, status, body = %body, "sink returned server error, will retry");
                    last_status = Some(status);
                    last_body = body;
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    warn!(attempt, status, body = %body, "sink rejected message");
                    return Err(SinkError::Rejected { status, body });
                }
                Err(e) => {
                    // reqwest errors carry the URL; strip it
                    let message = redact_text(&e.without_url().to_string());
                    warn!(attempt, error = %message, "sink request error, will retry");
                    last_status = None;
                    last_body = message;
                }
            }
        }

        warn!(attempts = max_attempts, "sink delivery failed after all retries");
        Err(SinkError::Exhausted {
            attempts: max_attempts,
            status: last_status,
            body: last_body,
        })
    }

    /// Deliver one after another, pausing between messages. Stops at the
    /// first failure.
    pub async fn post_messages(&self, messages: &[String]) -> Result<(), SinkError> {
        for (i, msg) in messages.iter().enumerate() {
            if i > 0 && !self.timing.message_interval.is_zero() {
                tokio::time::sleep(self.timing.message_interval).await;
            }
            self.post_message(msg).await?;
        }
        Ok(())
    }
}
