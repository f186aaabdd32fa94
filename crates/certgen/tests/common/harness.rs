//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct provides a complete isolated environment:
//! - A temporary storage directory behind a real `FileBlobStore`
//! - An in-memory database with all migrations applied
//! - A `ScriptedRenderer` that wraps the PDF renderer and can be told to fail
//!   or stall for particular students

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use certgen::batch::{BatchAcceptance, BatchOutcome, BatchRequest, Orchestrator};
use certgen::certificate::CertificateService;
use certgen::db::{certificate_repo, Database};
use certgen::error::RenderError;
use certgen::model::BatchJob;
use certgen::renderer::{ArtifactRenderer, PdfRenderer, RenderRequest, RenderedArtifact};
use certgen::storage::{BlobStore, FileBlobStore};
use certgen::CertgenApp;

use super::builders::{student_name, ConfigBuilder};

/// Renderer wrapper with per-student failure and delay injection.
pub struct ScriptedRenderer {
    inner: PdfRenderer,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
    total_calls: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new(inner: PdfRenderer) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            total_calls: AtomicUsize::new(0),
        }
    }

    /// Makes every render for the student fail.
    pub fn fail_for(&self, student_id: &str) {
        self.failing.lock().unwrap().insert(student_name(student_id));
    }

    /// Makes every render for the student sleep first.
    pub fn delay_for(&self, student_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(student_name(student_id), delay);
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, student_id: &str) -> usize {
        let name = student_name(student_id);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|n| **n == name)
            .count()
    }
}

impl ArtifactRenderer for ScriptedRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RenderedArtifact, RenderError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(request.student_name.clone());

        let delay = self.delays.lock().unwrap().get(&request.student_name).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if self.failing.lock().unwrap().contains(&request.student_name) {
            return Err(RenderError::Pdf(format!(
                "injected failure for {}",
                request.student_name
            )));
        }

        self.inner.render(request)
    }
}

/// Test harness providing an isolated execution environment for integration tests.
pub struct TestHarness {
    /// Temporary directory holding the blob store.
    temp_dir: TempDir,
    /// Root of the blob store within temp_dir.
    pub storage_dir: PathBuf,
    pub app: CertgenApp,
    pub renderer: Arc<ScriptedRenderer>,
}

impl TestHarness {
    /// Create a new test harness with default test settings.
    pub fn new() -> Self {
        Self::with_config(ConfigBuilder::new())
    }

    pub fn with_config(builder: ConfigBuilder) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage_dir = temp_dir.path().join("storage");

        let mut config = builder.build();
        config.storage_directory = storage_dir.clone();
        config.database_path = temp_dir.path().join("unused.db");

        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        let pdf = PdfRenderer::new(config.verification_base_url(), &config.rendering.default_language)
            .with_fonts(&config.rendering.fonts)
            .expect("Failed to load configured fonts");
        let renderer = Arc::new(ScriptedRenderer::new(pdf));
        let store: Arc<dyn BlobStore> = Arc::new(FileBlobStore::new(
            &storage_dir,
            &config.public_base_url,
            config.storage.quota_bytes,
        ));
        let app = CertgenApp::with_components(
            config,
            db,
            Arc::clone(&renderer) as Arc<dyn ArtifactRenderer>,
            store,
        );

        Self {
            temp_dir,
            storage_dir,
            app,
            renderer,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db(&self) -> &Database {
        self.app.database()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        self.app.orchestrator()
    }

    pub fn certificates(&self) -> &CertificateService {
        self.app.certificates()
    }

    /// Admits a request and panics if admission fails.
    pub fn admit(&self, request: BatchRequest) -> BatchAcceptance {
        self.orchestrator()
            .admit(request)
            .expect("Batch admission failed")
            .0
    }

    /// Admits and processes a request on the calling thread.
    pub fn run_batch(&self, request: BatchRequest) -> (BatchOutcome, BatchJob) {
        let acceptance = self.admit(request);
        let outcome = self.orchestrator().run_job(&acceptance.job_id);
        let job = self
            .orchestrator()
            .status(&acceptance.job_id)
            .expect("Job should exist after processing");
        (outcome, job)
    }

    pub fn certificate_count(&self) -> u64 {
        certificate_repo::counts(self.db())
            .expect("Failed to count certificates")
            .total
    }

    pub fn blob_path(&self, certificate_id: &str) -> PathBuf {
        self.storage_dir
            .join("certificates")
            .join(format!("{}.pdf", certificate_id))
    }

    /// Number of stored PDF artifacts.
    pub fn blob_count(&self) -> usize {
        match std::fs::read_dir(self.storage_dir.join("certificates")) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "pdf"))
                .count(),
            Err(_) => 0,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
