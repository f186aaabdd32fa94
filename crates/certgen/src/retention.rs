//! Age-based cleanup of finished batch jobs.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, tick, Sender};

use crate::db::{batch_repo, Database, DatabaseError};
use crate::error::WorkerError;

/// Deletes `completed` and `failed` jobs created more than `retention_days` ago.
/// Queued and processing jobs are never touched.
#[derive(Clone)]
pub struct RetentionSweeper {
    db: Database,
    retention: chrono::Duration,
}

impl RetentionSweeper {
    pub fn new(db: Database, retention_days: u32) -> Self {
        Self {
            db,
            retention: chrono::Duration::days(i64::from(retention_days)),
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.retention
    }

    /// Runs one sweep and returns the number of jobs removed.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let cutoff = self.cutoff(now);
        let deleted = batch_repo::delete_terminal_older_than(&self.db, &cutoff)?;
        if deleted > 0 {
            log::info!(
                "Retention sweep removed {} batch jobs created before {}",
                deleted,
                cutoff.to_rfc3339()
            );
        } else {
            log::debug!("Retention sweep found nothing to remove");
        }
        Ok(deleted)
    }

    /// Sweeps every `interval` on a background thread until the handle is
    /// stopped or dropped.
    pub fn spawn(self, interval: Duration) -> Result<SweeperHandle, WorkerError> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("certgen-retention".into())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if let Err(e) = self.sweep_once(Utc::now()) {
                                log::error!("Retention sweep failed: {}", e);
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                log::debug!("Retention sweeper stopped");
            })
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        log::info!("Retention sweeper started (every {}s)", interval.as_secs());

        Ok(SweeperHandle {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

/// Stops the background sweeper when dropped.
pub struct SweeperHandle {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender wakes the loop.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Retention sweeper thread panicked");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
