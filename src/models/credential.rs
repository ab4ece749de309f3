use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One tracked account: the encrypted provider secret plus metadata.
///
/// Unique per `(user_id, account_name)`. The secret stays encrypted here;
/// callers decrypt it through the vault only for the duration of a call.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub user_id: String,
    pub account_name: String,
    #[serde(skip_serializing)]
    pub encrypted_secret: String,
    /// Provider-side team ids this account is allowed to walk.
    pub scope_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// `user/account` label used in logs and error entries.
    pub fn label(&self) -> String {
        format!("{}/{}", self.user_id, self.account_name)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("account_name", &self.account_name)
            .field("encrypted_secret", &"[REDACTED]")
            .field("scope_ids", &self.scope_ids)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Input for adding or re-saving an account.
pub struct NewCredential<'a> {
    pub user_id: &'a str,
    pub account_name: &'a str,
    pub secret: &'a str,
    pub scope_ids: &'a [String],
    pub expires_at: Option<DateTime<Utc>>,
}
