//! Token storage trait for persisting the cached token record.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Record;
use crate::error::Error;

/// Trait for storing and retrieving the single cached token record.
///
/// Implementations must make `store` all-or-nothing: a reader sees either the
/// previous record or the new one, never a mix. A record that cannot be read
/// back intact is reported as absent.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Retrieve the cached record, `None` when nothing (readable) is stored.
    async fn get(&self) -> Result<Option<Record>, Error>;

    /// Replace the cached record.
    async fn store(&self, record: Record) -> Result<(), Error>;

    /// Remove the cached record.
    async fn clear(&self) -> Result<(), Error>;
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for Box<T> {
    async fn get(&self) -> Result<Option<Record>, Error> {
        (**self).get().await
    }

    async fn store(&self, record: Record) -> Result<(), Error> {
        (**self).store(record).await
    }

    async fn clear(&self) -> Result<(), Error> {
        (**self).clear().await
    }
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn get(&self) -> Result<Option<Record>, Error> {
        (**self).get().await
    }

    async fn store(&self, record: Record) -> Result<(), Error> {
        (**self).store(record).await
    }

    async fn clear(&self) -> Result<(), Error> {
        (**self).clear().await
    }
}

/// In-process storage slot. Lost on restart.
#[derive(Default)]
pub struct MemoryStorage {
    record: RwLock<Option<Record>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self) -> Result<Option<Record>, Error> {
        Ok(self.record.read().await.clone())
    }

    async fn store(&self, record: Record) -> Result<(), Error> {
        *self.record.write().await = Some(record);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        *self.record.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::token::record::BEARER;
    use chrono::Utc;
    use secrecy::{ExposeSecret, SecretString};

    fn record(access: &str) -> Record {
        Record {
            access_token: SecretString::from(access.to_string()),
            refresh_token: Some(SecretString::from("refresh".to_string())),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            token_type: BEARER.to_string(),
            scope: None,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn test_store_get_and_clear() {
        let storage = MemoryStorage::new();
        assert!(storage.get().await.unwrap().is_none());

        storage.store(record("first")).await.unwrap();
        storage.store(record("second")).await.unwrap();
        let stored = storage.get().await.unwrap().unwrap();
        assert_eq!(stored.access_token.expose_secret(), "second");

        storage.clear().await.unwrap();
        assert!(storage.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_boxed_storage_delegates() {
        let storage: Box<dyn Storage> = Box::new(MemoryStorage::new());
        storage.store(record("boxed")).await.unwrap();

        let stored = storage.get().await.unwrap().unwrap();
        assert_eq!(stored.access_token.expose_secret(), "boxed");
    }
}
