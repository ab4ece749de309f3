//! Credential and cursor storage over a [`KvStore`].
//!
//! Every field of an account lives under its own deterministic key (see
//! [`keys`]); the vault is the only component that reads or writes them.

pub mod crypto;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::errors::VaultError;
use crate::models::{Credential, NewCredential};
use crate::store::KvStore;

pub use crypto::SecretCipher;

/// Key templates.
pub mod keys {
    pub const USERS: &str = "digest:users";

    pub fn user_accounts(user_id: &str) -> String {
        format!("digest:user:{}:accounts", user_id)
    }

    pub fn secret(user_id: &str, account: &str) -> String {
        format!("digest:cred:{}:{}:secret", user_id, account)
    }

    pub fn scopes(user_id: &str, account: &str) -> String {
        format!("digest:cred:{}:{}:scopes", user_id, account)
    }

    pub fn created_at(user_id: &str, account: &str) -> String {
        format!("digest:cred:{}:{}:created_at", user_id, account)
    }

    pub fn updated_at(user_id: &str, account: &str) -> String {
        format!("digest:cred:{}:{}:updated_at", user_id, account)
    }

    pub fn expires_at(user_id: &str, account: &str) -> String {
        format!("digest:cred:{}:{}:expires_at", user_id, account)
    }

    pub fn cursor(user_id: &str, account: &str) -> String {
        format!("digest:cursor:{}:{}", user_id, account)
    }

    /// Every per-account key, cursor included.
    pub fn account_fields(user_id: &str, account: &str) -> [String; 6] {
        [
            secret(user_id, account),
            scopes(user_id, account),
            created_at(user_id, account),
            updated_at(user_id, account),
            expires_at(user_id, account),
            cursor(user_id, account),
        ]
    }
}

pub struct CredentialVault {
    store: Arc<dyn KvStore>,
    cipher: SecretCipher,
}

impl CredentialVault {
    /// Fails with [`VaultError::Config`] unless `key_hex` is 64 hex chars.
    pub fn new(key_hex: &str, store: Arc<dyn KvStore>) -> Result<Self, VaultError> {
        let cipher = SecretCipher::new(key_hex)?;
        Ok(Self { store, cipher })
    }

    pub fn encrypt(&self, secret: &str) -> Result<String, VaultError> {
        self.cipher.encrypt(secret)
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<Zeroizing<String>, VaultError> {
        self.cipher.decrypt(ciphertext)
    }

    /// Create or overwrite an account. `created_at` survives re-saves.
    pub async fn save_credential(&self, new: NewCredential<'_>) -> Result<Credential, VaultError> {
        let NewCredential {
            user_id,
            account_name,
            secret,
            scope_ids,
            expires_at,
        } = new;
        let now = Utc::now();
        let encrypted = self.cipher.encrypt(secret)?;

        let created_key = keys::created_at(user_id, account_name);
        let created_at = match self.store.get(&created_key).await? {
            Some(raw) => parse_timestamp(&raw).unwrap_or(now),
            None => {
                self.store.set(&created_key, &now.to_rfc3339()).await?;
                now
            }
        };

        let scopes_json = serde_json::to_string(scope_ids)
            .map_err(|e| VaultError::Format(format!("scope list: {}", e)))?;

        self.store
            .set(&keys::secret(user_id, account_name), &encrypted)
            .await?;
        self.store
            .set(&keys::scopes(user_id, account_name), &scopes_json)
            .await?;
        self.store
            .set(&keys::updated_at(user_id, account_name), &now.to_rfc3339())
            .await?;
        match expires_at {
            Some(at) => {
                self.store
                    .set(&keys::expires_at(user_id, account_name), &at.to_rfc3339())
                    .await?
            }
            None => {
                self.store
                    .delete(&keys::expires_at(user_id, account_name))
                    .await?
            }
        }

        self.store
            .set_add(&keys::user_accounts(user_id), account_name)
            .await?;
        self.store.set_add(keys::USERS, user_id).await?;

        info!(user_id, account = account_name, "credential saved");

        Ok(Credential {
            user_id: user_id.to_string(),
            account_name: account_name.to_string(),
            encrypted_secret: encrypted,
            scope_ids: scope_ids.to_vec(),
            created_at,
            updated_at: now,
            expires_at,
        })
    }

    /// Replace the secret of an existing account (token refresh/rotation).
    pub async fn rotate_secret(
        &self,
        user_id: &str,
        account_name: &str,
        secret: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Credential, VaultError> {
        let existing = self
            .get_credential(user_id, account_name)
            .await?
            .ok_or_else(|| VaultError::NotFound {
                user_id: user_id.to_string(),
                account_name: account_name.to_string(),
            })?;

        self.save_credential(NewCredential {
            user_id,
            account_name,
            secret,
            scope_ids: &existing.scope_ids,
            expires_at,
        })
        .await
    }

    /// Read one account. `Ok(None)` when the secret field is absent.
    ///
    /// The ciphertext is returned as stored; a malformed one surfaces as
    /// [`VaultError::Format`] when it is decrypted.
    pub async fn get_credential(
        &self,
        user_id: &str,
        account_name: &str,
    ) -> Result<Option<Credential>, VaultError> {
        let encrypted = match self.store.get(&keys::secret(user_id, account_name)).await? {
            Some(s) => s,
            None => return Ok(None),
        };

        let scope_ids = self
            .store
            .get(&keys::scopes(user_id, account_name))
            .await?
            .map(|raw| parse_scope_ids(&raw))
            .unwrap_or_default();
        let created_at = self
            .read_timestamp(&keys::created_at(user_id, account_name))
            .await?;
        let updated_at = self
            .read_timestamp(&keys::updated_at(user_id, account_name))
            .await?;
        let expires_at = self
            .read_timestamp(&keys::expires_at(user_id, account_name))
            .await?;

        let fallback = Utc::now();
        Ok(Some(Credential {
            user_id: user_id.to_string(),
            account_name: account_name.to_string(),
            encrypted_secret: encrypted,
            scope_ids,
            created_at: created_at.unwrap_or(fallback),
            updated_at: updated_at.or(created_at).unwrap_or(fallback),
            expires_at,
        }))
    }

    /// All accounts of one user, sorted by account name.
    ///
    /// Accounts indexed without a secret are logged and left out. Ciphertexts
    /// are not checked here, so a corrupt one still reaches the digest run and
    /// the expiry monitor, where it fails that account alone.
    pub async fn list_credentials_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Credential>, VaultError> {
        let mut accounts = self.store.set_members(&keys::user_accounts(user_id)).await?;
        accounts.sort();

        let mut credentials = Vec::with_capacity(accounts.len());
        for account in &accounts {
            match self.get_credential(user_id, account).await {
                Ok(Some(cred)) => credentials.push(cred),
                Ok(None) => {
                    warn!(user_id, account = %account, "account indexed but secret missing, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(credentials)
    }

    /// Every account across all users, users sorted by id.
    pub async fn list_all_credentials(&self) -> Result<Vec<Credential>, VaultError> {
        let mut users = self.store.set_members(keys::USERS).await?;
        users.sort();

        let mut all = Vec::new();
        for user_id in &users {
            all.extend(self.list_credentials_for_user(user_id).await?);
        }
        debug!(users = users.len(), credentials = all.len(), "listed credentials");
        Ok(all)
    }

    /// Remove an account and everything hanging off it. The user leaves the
    /// global index only when the re-read account set comes back empty.
    pub async fn delete_credential(&self, user_id: &str, account_name: &str) -> Result<(), VaultError> {
        for key in keys::account_fields(user_id, account_name) {
            self.store.delete(&key).await?;
        }
        self.store
            .set_remove(&keys::user_accounts(user_id), account_name)
            .await?;

        let remaining = self.store.set_members(&keys::user_accounts(user_id)).await?;
        if remaining.is_empty() {
            self.store.set_remove(keys::USERS, user_id).await?;
            info!(user_id, "last account removed, user dropped from index");
        }

        info!(user_id, account = account_name, "credential deleted");
        Ok(())
    }

    pub async fn get_cursor(
        &self,
        user_id: &str,
        account_name: &str,
    ) -> Result<Option<DateTime<Utc>>, VaultError> {
        self.read_timestamp(&keys::cursor(user_id, account_name)).await
    }

    pub async fn set_cursor(
        &self,
        user_id: &str,
        account_name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        self.store
            .set(&keys::cursor(user_id, account_name), &at.to_rfc3339())
            .await?;
        Ok(())
    }

    async fn read_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, VaultError> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|raw| {
                let parsed = parse_timestamp(&raw);
                if parsed.is_none() {
                    warn!(key, "unparsable timestamp in store, ignoring");
                }
                parsed
            }))
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The stored scope list is a JSON array; older records hold a
/// comma-separated string. Anything else yields no scopes.
pub fn parse_scope_ids(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if raw.starts_with('[') {
        return serde_json::from_str::<Vec<serde_json::Value>>(raw)
            .map(|items| {
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
