//! Record store: the sealed halves of a message plus its database key
//!
//! One JSON object per message at `records/{id}.json`. The three secret
//! fields are wrapped by the at-rest cipher; timestamps are plaintext.

use opendal::{ErrorKind, Operator};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::at_rest::AtRestCipher;
use crate::error::StorageResult;
use crate::validate_id;

const PREFIX: &str = "records/";

/// A record as the vault sees it: everything but the storage key.
pub struct StoredRecord {
    pub encrypted_meta: String,
    pub encrypted_content: String,
    pub database_key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for StoredRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredRecord")
            .field("encrypted_meta_len", &self.encrypted_meta.len())
            .field("encrypted_content_len", &self.encrypted_content.len())
            .field("database_key", &"[REDACTED]")
            .finish()
    }
}

/// On-disk layout
#[derive(Debug, Serialize, Deserialize)]
struct RecordFile {
    meta: String,
    content: String,
    key: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    op: Operator,
    cipher: AtRestCipher,
}

fn record_path(id: &str) -> String {
    format!("{PREFIX}{id}.json")
}

impl RecordStore {
    pub fn new(op: Operator, cipher: AtRestCipher) -> Self {
        Self { op, cipher }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub async fn put(&self, id: &str, record: &StoredRecord) -> StorageResult<()> {
        validate_id(id)?;
        let now = sdmsg_crypto::unix_now();
        let file = RecordFile {
            meta: self.cipher.wrap(record.encrypted_meta.as_bytes())?,
            content: self.cipher.wrap(record.encrypted_content.as_bytes())?,
            key: self.cipher.wrap(&record.database_key)?,
            created_at: now,
            updated_at: now,
        };
        self.write(id, &file).await?;
        debug!(id, "record stored");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> StorageResult<Option<StoredRecord>> {
        validate_id(id)?;
        let Some(file) = self.read(id).await? else {
            return Ok(None);
        };

        let path = record_path(id);
        Ok(Some(StoredRecord {
            encrypted_meta: self.cipher.unwrap_string(&file.meta, &path)?,
            encrypted_content: self.cipher.unwrap_string(&file.content, &path)?,
            database_key: self.cipher.unwrap(&file.key, &path)?,
        }))
    }

    /// Replace the sealed metadata, keeping content and key.
    /// Returns `false` if the record does not exist.
    pub async fn update_meta(&self, id: &str, encrypted_meta: &str) -> StorageResult<bool> {
        validate_id(id)?;
        let Some(mut file) = self.read(id).await? else {
            return Ok(false);
        };

        file.meta = self.cipher.wrap(encrypted_meta.as_bytes())?;
        file.updated_at = sdmsg_crypto::unix_now();
        self.write(id, &file).await?;
        debug!(id, "record metadata updated");
        Ok(true)
    }

    /// Delete a record. Deleting a missing record is not an error.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        validate_id(id)?;
        self.op.delete(&record_path(id)).await?;
        Ok(())
    }

    pub async fn exists(&self, id: &str) -> StorageResult<bool> {
        validate_id(id)?;
        Ok(self.op.exists(&record_path(id)).await?)
    }

    /// Ids of every stored record, sorted.
    pub async fn list_ids(&self) -> StorageResult<Vec<String>> {
        let entries = match self.op.list(PREFIX).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids: Vec<String> = entries
            .iter()
            .filter_map(|entry| entry.name().strip_suffix(".json"))
            .filter(|id| validate_id(id).is_ok())
            .map(str::to_string)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn read(&self, id: &str) -> StorageResult<Option<RecordFile>> {
        match self.op.read(&record_path(id)).await {
            Ok(buffer) => Ok(Some(serde_json::from_slice(&buffer.to_vec())?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, id: &str, file: &RecordFile) -> StorageResult<()> {
        let json = serde_json::to_vec(file)?;
        self.op.write(&record_path(id), json).await?;
        Ok(())
    }
}
