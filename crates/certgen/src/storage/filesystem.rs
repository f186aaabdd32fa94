use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::storage::BlobStore;

/// Stores blobs as files under `<root>/certificates/`.
pub struct FileBlobStore {
    directory: PathBuf,
    public_base_url: String,
    quota_bytes: Option<u64>,
    /// Serializes quota accounting with the write it guards.
    write_lock: Mutex<()>,
    temp_counter: AtomicU64,
}

impl FileBlobStore {
    pub fn new<P: AsRef<Path>>(root: P, public_base_url: &str, quota_bytes: Option<u64>) -> Self {
        Self {
            directory: root.as_ref().join("certificates"),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            quota_bytes,
            write_lock: Mutex::new(()),
            temp_counter: AtomicU64::new(0),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.directory.join(name))
    }

    pub fn locator(&self, name: &str) -> String {
        format!("{}/storage/certificates/{}", self.public_base_url, name)
    }

    fn ensure_directory(&self, name: &str) -> Result<(), StoreError> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|e| unavailable(name, e))?;
        }
        Ok(())
    }

    /// Bytes currently stored, excluding `replacing` which is about to be overwritten.
    fn usage_excluding(&self, replacing: &str) -> Result<u64, StoreError> {
        let entries = std::fs::read_dir(&self.directory).map_err(|e| unavailable(replacing, e))?;
        let mut total = 0;
        for entry in entries {
            let entry = entry.map_err(|e| unavailable(replacing, e))?;
            if entry.file_name().to_string_lossy() == replacing {
                continue;
            }
            let metadata = entry.metadata().map_err(|e| unavailable(replacing, e))?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<String, StoreError> {
        let path = self.path_for(name)?;
        self.ensure_directory(name)?;

        let _guard = self.write_lock.lock().map_err(|_| StoreError::Unavailable {
            name: name.to_string(),
            reason: "write lock poisoned".to_string(),
        })?;

        if let Some(quota) = self.quota_bytes {
            let size = bytes.len() as u64;
            if self.usage_excluding(name)? + size > quota {
                return Err(StoreError::QuotaExceeded {
                    name: name.to_string(),
                    size,
                    quota,
                });
            }
        }

        let temp_path = self.directory.join(format!(
            ".{}.{}-{}.tmp",
            name,
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        let written = std::fs::File::create(&temp_path).and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| std::fs::rename(&temp_path, &path)) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(unavailable(name, e));
        }

        log::debug!(
            "Stored {} ({} bytes, {}) at {}",
            name,
            bytes.len(),
            content_type,
            path.display()
        );
        Ok(self.locator(name))
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(name, e)),
        }
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

fn unavailable(name: &str, err: std::io::Error) -> StoreError {
    StoreError::Unavailable {
        name: name.to_string(),
        reason: err.to_string(),
    }
}
