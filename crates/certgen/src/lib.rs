pub mod app;
pub mod batch;
pub mod broadcast;
pub mod certificate;
pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod logging;
pub mod model;
pub mod renderer;
pub mod retention;
pub mod storage;

pub use app::CertgenApp;
pub use batch::{BatchAcceptance, BatchOutcome, BatchRequest, BatchWorkerPool, Orchestrator};
pub use broadcast::{BatchEvent, BatchEventBroadcaster, BatchEventKind};
pub use certificate::{CertificateService, IssueOutcome, IssueRequest, SharePlatform};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{
    AdmissionError, BatchError, CertgenError, CertificateError, ConfigError, RenderError, Result,
    StoreError, WorkerError,
};
pub use logging::{init_logging, LogFormat};
pub use retention::RetentionSweeper;
