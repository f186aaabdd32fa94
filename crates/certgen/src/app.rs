//! Wires the database, renderer, blob store and services from a [`Config`].

use std::sync::Arc;
use std::time::Duration;

use crate::batch::{BatchWorkerPool, Orchestrator};
use crate::broadcast::BatchEventBroadcaster;
use crate::certificate::{CertificateIssuer, CertificateLinks, CertificateService};
use crate::config::Config;
use crate::db::Database;
use crate::error::{Result, WorkerError};
use crate::ids::IdIssuer;
use crate::renderer::{ArtifactRenderer, PdfRenderer};
use crate::retention::RetentionSweeper;
use crate::storage::{BlobStore, FileBlobStore, RetryingBlobStore};

pub struct CertgenApp {
    config: Config,
    db: Database,
    orchestrator: Arc<Orchestrator>,
    certificates: CertificateService,
    events: BatchEventBroadcaster,
}

impl CertgenApp {
    /// Opens the configured database and builds every service on top of it.
    pub fn from_config(config: Config) -> Result<Self> {
        let db = Database::open(&config.database_path)?;
        Self::with_database(config, db)
    }

    /// Builds the PDF renderer with the configured fonts and a retrying file store.
    pub fn with_database(config: Config, db: Database) -> Result<Self> {
        let renderer: Arc<dyn ArtifactRenderer> = Arc::new(
            PdfRenderer::new(
                config.verification_base_url(),
                &config.rendering.default_language,
            )
            .with_fonts(&config.rendering.fonts)?,
        );
        let files: Arc<dyn BlobStore> = Arc::new(FileBlobStore::new(
            &config.storage_directory,
            &config.public_base_url,
            config.storage.quota_bytes,
        ));
        let store: Arc<dyn BlobStore> = Arc::new(RetryingBlobStore::new(
            files,
            config.storage.retry_attempts,
            Duration::from_millis(config.storage.retry_backoff_ms),
        ));
        Ok(Self::with_components(config, db, renderer, store))
    }

    /// Builds the services around caller-supplied renderer and store.
    pub fn with_components(
        config: Config,
        db: Database,
        renderer: Arc<dyn ArtifactRenderer>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        let ids = IdIssuer::new();
        let issuer = Arc::new(CertificateIssuer::new(
            db.clone(),
            renderer,
            store,
            ids,
            CertificateLinks::new(&config.public_base_url),
            &config.rendering.template_version,
        ));
        let events = BatchEventBroadcaster::default();
        let orchestrator = Arc::new(Orchestrator::new(
            db.clone(),
            Arc::clone(&issuer),
            ids,
            config.batch_settings(),
            Some(events.clone()),
        ));
        let certificates = CertificateService::new(db.clone(), issuer, &config.platform_name);

        Self {
            config,
            db,
            orchestrator,
            certificates,
            events,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn certificates(&self) -> &CertificateService {
        &self.certificates
    }

    pub fn events(&self) -> &BatchEventBroadcaster {
        &self.events
    }

    /// Starts `worker_count` batch workers.
    pub fn start_workers(&self) -> std::result::Result<BatchWorkerPool, WorkerError> {
        BatchWorkerPool::new(Arc::clone(&self.orchestrator), self.config.worker_count)
    }

    pub fn retention_sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(self.db.clone(), self.config.retention.job_retention_days)
    }
}
