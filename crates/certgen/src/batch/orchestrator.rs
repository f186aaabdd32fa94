//! Admission, per-job processing and status queries for batch certificate jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, RecvTimeoutError};
use serde::Serialize;

use crate::batch::admission::{BatchAcceptance, BatchRequest};
use crate::batch::queue::WorkUnit;
use crate::broadcast::{BatchEvent, BatchEventBroadcaster, BatchEventKind};
use crate::certificate::{CertificateIssuer, IssueRequest};
use crate::db::batch_repo::{self, BatchFilter, ItemResolution};
use crate::db::Database;
use crate::error::{BatchError, CertificateError, OrchestratorError};
use crate::ids::IdIssuer;
use crate::model::{BatchJob, BatchPage, Certificate, JobStatus, Pagination, Priority, RosterEntry};

pub const DEFAULT_LIST_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub max_batch_size: usize,
    pub item_concurrency: usize,
    pub item_timeout: Duration,
    pub estimate_per_student_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            item_concurrency: 5,
            item_timeout: Duration::from_secs(300),
            estimate_per_student_ms: 3000,
        }
    }
}

/// Result of one `run_job` call, delivered through the pool's result channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl BatchOutcome {
    fn from_job(job: &BatchJob, started: Instant) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.progress.status,
            total: job.progress.total,
            completed: job.progress.completed,
            failed: job.progress.failed,
            error: job.error.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// How one item ended when it did not produce a certificate.
enum ItemFailure {
    /// Recorded on the roster entry; the job carries on.
    Item(String),
    /// Aborts the whole job.
    Fatal(OrchestratorError),
}

pub struct Orchestrator {
    db: Database,
    issuer: Arc<CertificateIssuer>,
    ids: IdIssuer,
    settings: BatchSettings,
    events: Option<BatchEventBroadcaster>,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        issuer: Arc<CertificateIssuer>,
        ids: IdIssuer,
        settings: BatchSettings,
        events: Option<BatchEventBroadcaster>,
    ) -> Self {
        Self {
            db,
            issuer,
            ids,
            settings,
            events,
        }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Validates and persists a new `queued` job. Nothing is written when
    /// validation fails.
    pub fn admit(&self, request: BatchRequest) -> Result<(BatchAcceptance, Priority), BatchError> {
        request.validate(self.settings.max_batch_size)?;

        let job_id = self.ids.new_batch_job_id()?;
        let priority = request.options.priority;
        let job = request.into_job(job_id, Utc::now(), self.settings.estimate_per_student_ms);
        batch_repo::insert(&self.db, &job)?;

        log::info!(
            "Admitted batch job {} ({} students, priority {})",
            job.job_id,
            job.progress.total,
            priority.as_str()
        );
        self.emit(BatchEvent::new(
            &job.job_id,
            BatchEventKind::Queued,
            job.progress.total,
        ));

        Ok((
            BatchAcceptance {
                job_id: job.job_id,
                total_students: job.progress.total,
                status: JobStatus::Queued,
                estimated_time_ms: job.progress.estimated_time_ms,
            },
            priority,
        ))
    }

    /// Processes every pending roster entry of a job and finalizes it.
    ///
    /// Orchestrator-fatal errors flip the job to `failed` when the record is
    /// still writable. Item errors never fail the job.
    pub fn run_job(&self, job_id: &str) -> BatchOutcome {
        let started = Instant::now();
        let _span = tracing::info_span!("batch.job", job_id = %job_id).entered();

        match self.process(job_id, started) {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = e.to_string();
                log::error!("Batch job {} failed: {}", job_id, reason);

                if let Err(db_err) = batch_repo::mark_failed(&self.db, job_id, &reason, &Utc::now())
                {
                    log::error!("Could not mark batch job {} failed: {}", job_id, db_err);
                }

                let snapshot = batch_repo::find_by_id(&self.db, job_id).ok().flatten();
                let (total, completed, failed) = snapshot
                    .as_ref()
                    .map(|j| (j.progress.total, j.progress.completed, j.progress.failed))
                    .unwrap_or_default();
                self.emit(
                    BatchEvent::new(job_id, BatchEventKind::Failed, total)
                        .with_counts(completed, failed, crate::model::percentage(completed, failed, total))
                        .with_error(&reason),
                );

                BatchOutcome {
                    job_id: job_id.to_string(),
                    status: JobStatus::Failed,
                    total,
                    completed,
                    failed,
                    error: Some(reason),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }

    fn process(&self, job_id: &str, started: Instant) -> Result<BatchOutcome, OrchestratorError> {
        if !batch_repo::mark_processing(&self.db, job_id, &Utc::now())? {
            return match batch_repo::find_by_id(&self.db, job_id)? {
                Some(job) => {
                    log::debug!(
                        "Batch job {} is already {}, skipping",
                        job_id,
                        job.progress.status
                    );
                    Ok(BatchOutcome::from_job(&job, started))
                }
                None => Err(OrchestratorError::JobMissing(job_id.to_string())),
            };
        }

        let job = batch_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| OrchestratorError::JobMissing(job_id.to_string()))?;
        let pending: Vec<RosterEntry> = job.pending_entries().cloned().collect();

        log::info!(
            "Processing batch job {}: {} of {} entries pending",
            job_id,
            pending.len(),
            job.progress.total
        );
        self.emit(
            BatchEvent::new(job_id, BatchEventKind::Started, job.progress.total).with_counts(
                job.progress.completed,
                job.progress.failed,
                job.progress.percentage,
            ),
        );

        self.fan_out(&job, pending)?;

        let finalized = batch_repo::finalize(&self.db, job_id, &Utc::now())?;
        let snapshot = batch_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| OrchestratorError::JobMissing(job_id.to_string()))?;

        if finalized {
            log::info!(
                "Batch job {} completed: {} succeeded, {} failed in {}ms",
                job_id,
                snapshot.progress.completed,
                snapshot.progress.failed,
                started.elapsed().as_millis()
            );
            self.emit(
                BatchEvent::new(job_id, BatchEventKind::Finished, snapshot.progress.total)
                    .with_counts(
                        snapshot.progress.completed,
                        snapshot.progress.failed,
                        snapshot.progress.percentage,
                    ),
            );
        } else {
            log::warn!(
                "Batch job {} left with status {} after processing",
                job_id,
                snapshot.progress.status
            );
        }

        Ok(BatchOutcome::from_job(&snapshot, started))
    }

    /// Runs the pending entries on up to `item_concurrency` scoped threads.
    /// The first fatal error stops the remaining items from starting.
    fn fan_out(&self, job: &BatchJob, pending: Vec<RosterEntry>) -> Result<(), OrchestratorError> {
        if pending.is_empty() {
            return Ok(());
        }

        let lanes = self.settings.item_concurrency.clamp(1, pending.len());
        let (entry_tx, entry_rx) = unbounded::<RosterEntry>();
        for entry in pending {
            // Receiver is alive until the scope below ends.
            let _ = entry_tx.send(entry);
        }
        drop(entry_tx);

        let abort = AtomicBool::new(false);
        let fatal: Mutex<Option<OrchestratorError>> = Mutex::new(None);

        thread::scope(|scope| {
            for _ in 0..lanes {
                let entry_rx = entry_rx.clone();
                let (abort, fatal) = (&abort, &fatal);
                scope.spawn(move || {
                    while let Ok(entry) = entry_rx.recv() {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = self.process_item(job, &entry) {
                            abort.store(true, Ordering::Relaxed);
                            if let Ok(mut slot) = fatal.lock() {
                                slot.get_or_insert(e);
                            }
                            break;
                        }
                    }
                });
            }
        });

        match fatal.into_inner() {
            Ok(Some(e)) => Err(e),
            Ok(None) => Ok(()),
            Err(poisoned) => match poisoned.into_inner() {
                Some(e) => Err(e),
                None => Ok(()),
            },
        }
    }

    fn process_item(&self, job: &BatchJob, entry: &RosterEntry) -> Result<(), OrchestratorError> {
        let _span = tracing::info_span!(
            "batch.item",
            job_id = %job.job_id,
            student_id = %entry.student_id
        )
        .entered();

        let resolution = match self.certificate_for(job, entry) {
            Ok(certificate) => ItemResolution::Completed {
                certificate_id: certificate.certificate_id,
                certificate_url: certificate.certificate_details.view_url,
            },
            Err(ItemFailure::Item(error)) => {
                log::warn!(
                    "Certificate for student {} in batch job {} failed: {}",
                    entry.student_id,
                    job.job_id,
                    error
                );
                ItemResolution::Failed { error }
            }
            Err(ItemFailure::Fatal(e)) => return Err(e),
        };

        let record =
            batch_repo::record_item(&self.db, &job.job_id, entry.position, &resolution, &Utc::now())?;
        if !record.applied {
            log::debug!(
                "Roster entry {} of batch job {} was already resolved",
                entry.position,
                job.job_id
            );
            return Ok(());
        }

        let event = match &resolution {
            ItemResolution::Completed { certificate_id, .. } => {
                BatchEvent::new(&job.job_id, BatchEventKind::ItemCompleted, record.total)
                    .with_certificate(certificate_id)
            }
            ItemResolution::Failed { error } => {
                BatchEvent::new(&job.job_id, BatchEventKind::ItemFailed, record.total)
                    .with_error(error)
            }
        };
        self.emit(
            event
                .for_student(&entry.student_id)
                .with_counts(record.completed, record.failed, record.percentage),
        );
        Ok(())
    }

    /// Reuses the student's existing certificate for the course, or issues
    /// one on a helper thread bounded by `item_timeout`.
    fn certificate_for(&self, job: &BatchJob, entry: &RosterEntry) -> Result<Certificate, ItemFailure> {
        let course_id = &job.batch_details.course_id;
        match self.issuer.find_existing(&entry.student_id, course_id) {
            Ok(Some(existing)) => {
                log::debug!(
                    "Reusing certificate {} for student {}",
                    existing.certificate_id,
                    entry.student_id
                );
                return Ok(existing);
            }
            Ok(None) => {}
            Err(CertificateError::Database(e)) => return Err(ItemFailure::Fatal(e.into())),
            Err(e) => return Err(ItemFailure::Item(e.to_string())),
        }

        let request = IssueRequest {
            student_id: entry.student_id.clone(),
            student_name: entry.student_name.clone(),
            student_email: entry.student_email.clone(),
            course_id: course_id.clone(),
            course_title: job.batch_details.course_title.clone(),
            course_description: job.batch_details.course_description.clone(),
            completion_date: job.batch_details.completion_date,
            language: job.batch_details.language.clone(),
            generated_by: format!("batch:{}", job.job_id),
        };

        let (result_tx, result_rx) = bounded(1);
        let issuer = Arc::clone(&self.issuer);
        thread::Builder::new()
            .name(format!("certgen-item-{}", entry.position))
            .spawn(move || {
                // The worker may have stopped waiting.
                let _ = result_tx.send(issuer.issue(&request));
            })
            .map_err(|e| ItemFailure::Item(format!("Failed to start certificate generation: {}", e)))?;

        match result_rx.recv_timeout(self.settings.item_timeout) {
            Ok(Ok(outcome)) => Ok(outcome.certificate),
            Ok(Err(CertificateError::Entropy(e))) => Err(ItemFailure::Fatal(e.into())),
            Ok(Err(e)) => Err(ItemFailure::Item(e.to_string())),
            Err(RecvTimeoutError::Timeout) => Err(ItemFailure::Item(format!(
                "Certificate generation timed out after {}s",
                self.settings.item_timeout.as_secs_f64()
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(ItemFailure::Item(
                "Certificate generation stopped unexpectedly".to_string(),
            )),
        }
    }

    /// Committed snapshot of a job and its roster.
    pub fn status(&self, job_id: &str) -> Result<BatchJob, BatchError> {
        batch_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| BatchError::NotFound(job_id.to_string()))
    }

    /// Lists job summaries newest first. `page` is 1-based.
    pub fn list(
        &self,
        status: Option<JobStatus>,
        limit: Option<u32>,
        page: Option<u32>,
    ) -> Result<BatchPage, BatchError> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT);
        let page = page.unwrap_or(1).max(1);
        let filter = BatchFilter {
            status,
            limit: Some(u64::from(limit)),
            offset: Some(u64::from(page - 1) * u64::from(limit)),
        };
        let (jobs, total) = batch_repo::list(&self.db, &filter)?;
        Ok(BatchPage {
            jobs,
            pagination: Pagination::new(total, page, limit),
        })
    }

    /// Work units for every job that is still `queued` or `processing`, oldest first.
    pub fn resumable_jobs(&self) -> Result<Vec<WorkUnit>, BatchError> {
        Ok(batch_repo::find_resumable(&self.db)?
            .into_iter()
            .map(|(job_id, priority)| WorkUnit { job_id, priority })
            .collect())
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }
}
