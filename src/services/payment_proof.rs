use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;

/// An uploaded payment proof as received from the client
#[derive(Debug, Clone)]
pub struct ProofUpload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ProofUpload {
    pub fn new(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes,
        }
    }

    /// File extension for an accepted content type
    pub fn extension(&self) -> Option<&'static str> {
        match self.content_type.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some("jpg"),
            "image/png" => Some("png"),
            "application/pdf" => Some("pdf"),
            _ => None,
        }
    }
}

/// Where payment proofs are kept
#[async_trait]
pub trait ProofStorage: Send + Sync {
    /// Checks the upload without storing it
    fn check(&self, upload: &ProofUpload) -> Result<(), ServiceError>;

    /// Stores the proof for the order and returns its location
    async fn store(&self, order_id: Uuid, upload: &ProofUpload) -> Result<String, ServiceError>;

    /// Drops a stored proof whose order update did not commit
    async fn remove(&self, location: &str) -> Result<(), ServiceError>;
}

pub struct LocalProofStorage {
    dir: PathBuf,
    max_bytes: usize,
}

impl LocalProofStorage {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }
}

#[async_trait]
impl ProofStorage for LocalProofStorage {
    fn check(&self, upload: &ProofUpload) -> Result<(), ServiceError> {
        if upload.bytes.is_empty() {
            return Err(ServiceError::ValidationError(
                "payment proof file is empty".to_string(),
            ));
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(ServiceError::PayloadTooLarge(format!(
                "payment proof exceeds {} bytes",
                self.max_bytes
            )));
        }
        if upload.extension().is_none() {
            return Err(ServiceError::ValidationError(format!(
                "unsupported payment proof type '{}'",
                upload.content_type
            )));
        }
        Ok(())
    }

    async fn store(&self, order_id: Uuid, upload: &ProofUpload) -> Result<String, ServiceError> {
        self.check(upload)?;
        let ext = upload.extension().unwrap_or("bin");

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ServiceError::StorageError(format!("create {:?}: {}", self.dir, e)))?;

        let path = self.dir.join(format!("{}.{}", order_id, ext));
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| ServiceError::StorageError(format!("write {:?}: {}", path, e)))?;

        debug!(?path, bytes = upload.bytes.len(), "Stored payment proof");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn remove(&self, location: &str) -> Result<(), ServiceError> {
        match tokio::fs::remove_file(location).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServiceError::StorageError(format!(
                "remove {}: {}",
                location, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn writes_proof_named_after_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalProofStorage::new(dir.path(), 1024);
        let order_id = Uuid::new_v4();

        let location = storage
            .store(order_id, &ProofUpload::new("image/png", vec![1, 2, 3]))
            .await
            .unwrap();

        assert!(location.ends_with(&format!("{}.png", order_id)));
        assert_eq!(tokio::fs::read(&location).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn remove_deletes_the_file_and_tolerates_a_missing_one() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalProofStorage::new(dir.path(), 1024);
        let location = storage
            .store(Uuid::new_v4(), &ProofUpload::new("application/pdf", vec![7]))
            .await
            .unwrap();

        storage.remove(&location).await.unwrap();
        assert!(tokio::fs::metadata(&location).await.is_err());
        storage.remove(&location).await.unwrap();
    }

    #[test]
    fn rejects_oversized_and_unknown_types() {
        let storage = LocalProofStorage::new("unused", 4);

        assert_matches!(
            storage.check(&ProofUpload::new("image/jpeg", vec![0; 5])),
            Err(ServiceError::PayloadTooLarge(_))
        );
        assert_matches!(
            storage.check(&ProofUpload::new("text/plain", vec![0; 2])),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            storage.check(&ProofUpload::new("application/pdf", vec![])),
            Err(ServiceError::ValidationError(_))
        );
        assert!(storage
            .check(&ProofUpload::new("application/pdf", vec![0; 4]))
            .is_ok());
    }
}
