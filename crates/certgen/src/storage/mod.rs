pub mod filesystem;
pub mod retry;

use crate::error::StoreError;

pub use filesystem::FileBlobStore;
pub use retry::RetryingBlobStore;

/// Durable storage for finished artifacts.
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `name`, replacing any previous object atomically,
    /// and returns the public locator.
    fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<String, StoreError>;

    /// Removes `name`. Removing a missing object succeeds.
    fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Blob name of a certificate's PDF.
pub fn certificate_blob_name(certificate_id: &str) -> String {
    format!("{}.pdf", certificate_id)
}
