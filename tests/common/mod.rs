#![allow(dead_code)]

use std::sync::Arc;

use activity_digest::models::{Credential, NewCredential};
use activity_digest::provider::ProviderConfig;
use activity_digest::store::{KvStore, MemoryStore};
use activity_digest::vault::{keys, CredentialVault};
use chrono::{DateTime, Utc};

pub const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub fn memory_vault() -> (MemoryStore, Arc<CredentialVault>) {
    let store = MemoryStore::new();
    let shared: Arc<dyn KvStore> = Arc::new(store.clone());
    let vault = CredentialVault::new(TEST_KEY, shared).expect("valid test key");
    (store, Arc::new(vault))
}

pub fn provider_for(uri: &str) -> ProviderConfig {
    ProviderConfig {
        api_base: format!("{}/v1", uri),
        ..ProviderConfig::default()
    }
}

pub async fn add_account(
    vault: &CredentialVault,
    user: &str,
    account: &str,
    teams: &[&str],
    expires_at: Option<DateTime<Utc>>,
) -> Credential {
    let teams: Vec<String> = teams.iter().map(|t| t.to_string()).collect();
    vault
        .save_credential(NewCredential {
            user_id: user,
            account_name: account,
            secret: &format!("figd_{}_{}_secret_value", user, account),
            scope_ids: &teams,
            expires_at,
        })
        .await
        .expect("save credential")
}

/// Flip the last hex digit of the stored ciphertext so the tag check fails
/// while the layout stays valid.
pub async fn tamper_secret(store: &MemoryStore, user: &str, account: &str) {
    let key = keys::secret(user, account);
    let mut ciphertext = store.get(&key).await.unwrap().expect("secret stored");
    let last = ciphertext.pop().unwrap();
    ciphertext.push(if last == '0' { '1' } else { '0' });
    store.set(&key, &ciphertext).await.unwrap();
}

pub fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Overwrite the stored ciphertext with an arbitrary value.
pub async fn overwrite_secret(store: &MemoryStore, user: &str, account: &str, raw: &str) {
    store.set(&keys::secret(user, account), raw).await.unwrap();
}
