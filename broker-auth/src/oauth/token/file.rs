//! JSON file storage for the cached token record.
//!
//! The file holds one object:
//! `{access_token, refresh_token, expires_at, scope, user_id, token_type}`
//! with `expires_at` in epoch milliseconds. Writes go to a sibling temporary
//! file that is then renamed over the target, so readers never observe a
//! half-written record.

use std::ffi::OsString;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::record::BEARER;
use super::{Record, Storage};
use crate::error::{storage_error, Error};

/// On-disk shape of a [`Record`].
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expires_at: DateTime<Utc>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    BEARER.to_string()
}

impl From<&Record> for StoredRecord {
    fn from(record: &Record) -> Self {
        Self {
            access_token: record.access_token.expose_secret().to_string(),
            refresh_token: record
                .refresh_token
                .as_ref()
                .map(|token| token.expose_secret().to_string()),
            expires_at: record.expires_at,
            scope: record.scope.clone(),
            user_id: record.user_id,
            token_type: record.token_type.clone(),
        }
    }
}

impl From<StoredRecord> for Record {
    fn from(stored: StoredRecord) -> Self {
        Self {
            access_token: SecretString::from(stored.access_token),
            refresh_token: stored.refresh_token.map(SecretString::from),
            expires_at: stored.expires_at,
            token_type: stored.token_type,
            scope: stored.scope,
            user_id: stored.user_id,
        }
    }
}

/// Token storage backed by a single JSON file.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("token.json"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self) -> Result<Option<Record>, Error> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!("No token file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(storage_error(e)),
        };

        match serde_json::from_slice::<StoredRecord>(&bytes) {
            Ok(stored) => Ok(Some(stored.into())),
            Err(e) => {
                warn!(
                    "Ignoring unreadable token file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    async fn store(&self, record: Record) -> Result<(), Error> {
        let json =
            serde_json::to_vec_pretty(&StoredRecord::from(&record)).map_err(storage_error)?;
        let temp_path = self.temp_path();

        tokio::fs::write(&temp_path, json)
            .await
            .map_err(storage_error)?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(storage_error)?;

        debug!("Token record written to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(e)),
        }
    }
}
