//! Fragment store: the storage key fragment, on its own medium

use opendal::{ErrorKind, Operator};
use tracing::debug;
use zeroize::Zeroizing;

use crate::at_rest::AtRestCipher;
use crate::error::{StorageError, StorageResult};
use crate::validate_id;

fn fragment_path(id: &str) -> String {
    format!("fragments/{id}")
}

#[derive(Debug, Clone)]
pub struct FragmentStore {
    op: Operator,
    cipher: AtRestCipher,
}

impl FragmentStore {
    pub fn new(op: Operator, cipher: AtRestCipher) -> Self {
        Self { op, cipher }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub async fn put(&self, id: &str, storage_key: &[u8]) -> StorageResult<()> {
        validate_id(id)?;
        let wrapped = self.cipher.wrap(storage_key)?;
        self.op.write(&fragment_path(id), wrapped.into_bytes()).await?;
        debug!(id, "storage key fragment stored");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> StorageResult<Option<Zeroizing<Vec<u8>>>> {
        validate_id(id)?;
        let path = fragment_path(id);
        let buffer = match self.op.read(&path).await {
            Ok(buffer) => buffer,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let wrapped =
            String::from_utf8(buffer.to_vec()).map_err(|_| StorageError::Unwrap(path.clone()))?;
        self.cipher.unwrap(&wrapped, &path).map(Some)
    }

    pub async fn exists(&self, id: &str) -> StorageResult<bool> {
        validate_id(id)?;
        Ok(self.op.exists(&fragment_path(id)).await?)
    }

    /// Delete a fragment. Deleting a missing fragment is not an error.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        validate_id(id)?;
        self.op.delete(&fragment_path(id)).await?;
        Ok(())
    }
}
