use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::storage::BlobStore;

/// Retries transient store failures with linear backoff.
pub struct RetryingBlobStore {
    inner: Arc<dyn BlobStore>,
    attempts: u32,
    backoff: Duration,
}

impl RetryingBlobStore {
    pub fn new(inner: Arc<dyn BlobStore>, attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            backoff,
        }
    }

    fn retry<T>(
        &self,
        op: &str,
        name: &str,
        mut call: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    log::warn!(
                        "{} of {} failed (attempt {}/{}): {}",
                        op,
                        name,
                        attempt,
                        self.attempts,
                        e
                    );
                    std::thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl BlobStore for RetryingBlobStore {
    fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<String, StoreError> {
        self.retry("put", name, || self.inner.put(name, bytes, content_type))
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.retry("delete", name, || self.inner.delete(name))
    }
}
