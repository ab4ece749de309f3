pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::errors::StoreError;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// The key-value surface every durable piece of state is expressed in.
///
/// Implementations: [`RedisStore`] (production) and [`MemoryStore`]
/// (tests, dry runs). Components receive an `Arc<dyn KvStore>` at
/// construction; there is no process-wide client.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, StoreError>;
}
