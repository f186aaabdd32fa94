use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::batch::admission::{BatchAcceptance, BatchRequest};
use crate::batch::orchestrator::{BatchOutcome, Orchestrator};
use crate::batch::queue::{work_queue, QueueReceiver, QueueSender, WorkUnit};
use crate::error::{BatchError, WorkerError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Worker threads draining the three-lane batch queue, one job per worker at a time.
pub struct BatchWorkerPool {
    queue: QueueSender,
    outcome_receiver: Receiver<BatchOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    /// Jobs queued or running in this process.
    in_flight: Arc<Mutex<HashSet<String>>>,
    orchestrator: Arc<Orchestrator>,
}

impl BatchWorkerPool {
    /// Starts `worker_count` workers (at least one).
    pub fn new(orchestrator: Arc<Orchestrator>, worker_count: usize) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let (queue, queue_receiver) = work_queue();
        let (outcome_sender, outcome_receiver) = unbounded::<BatchOutcome>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue_rx = queue_receiver.clone();
            let outcome_tx = outcome_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let in_flight = Arc::clone(&in_flight);
            let orchestrator = Arc::clone(&orchestrator);

            let handle = thread::Builder::new()
                .name(format!("certgen-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        queue_rx,
                        outcome_tx,
                        shutdown_flag,
                        in_flight,
                        orchestrator,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started {} batch workers", worker_count);

        Ok(Self {
            queue,
            outcome_receiver,
            workers,
            shutdown,
            in_flight,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Admits a batch request and queues it.
    ///
    /// Once admitted the job is durable: if queueing fails it is picked up by
    /// the next `recover` call.
    pub fn submit(&self, request: BatchRequest) -> Result<BatchAcceptance, BatchError> {
        if self.is_shutdown() {
            return Err(WorkerError::ShuttingDown.into());
        }

        let (acceptance, priority) = self.orchestrator.admit(request)?;
        let unit = WorkUnit {
            job_id: acceptance.job_id.clone(),
            priority,
        };
        if let Err(e) = self.enqueue(unit) {
            warn!(
                "Batch job {} admitted but not queued ({}); it will be resumed on recovery",
                acceptance.job_id, e
            );
        }
        Ok(acceptance)
    }

    /// Queues a unit unless its job is already queued or running here.
    /// Returns whether the unit was queued.
    pub fn enqueue(&self, unit: WorkUnit) -> Result<bool, WorkerError> {
        if self.is_shutdown() {
            return Err(WorkerError::ShuttingDown);
        }

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !in_flight.insert(unit.job_id.clone()) {
            debug!("Batch job {} already in flight", unit.job_id);
            return Ok(false);
        }

        let job_id = unit.job_id.clone();
        if let Err(e) = self.queue.push(unit) {
            in_flight.remove(&job_id);
            return Err(e);
        }
        Ok(true)
    }

    /// Re-queues every job left `queued` or `processing`. Returns how many
    /// units were queued.
    pub fn recover(&self) -> Result<usize, BatchError> {
        let mut queued = 0;
        for unit in self.orchestrator.resumable_jobs()? {
            if self.enqueue(unit)? {
                queued += 1;
            }
        }
        if queued > 0 {
            info!("Re-queued {} unfinished batch jobs", queued);
        }
        Ok(queued)
    }

    pub fn recv_outcome(&self) -> Option<BatchOutcome> {
        self.outcome_receiver.recv().ok()
    }

    pub fn recv_outcome_timeout(&self, timeout: Duration) -> Option<BatchOutcome> {
        self.outcome_receiver.recv_timeout(timeout).ok()
    }

    /// Units waiting in the queue, not counting running jobs.
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    pub fn shutdown(&self) {
        info!("Shutting down batch worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        drop(self.queue);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All batch workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    queue: QueueReceiver,
    outcome_sender: Sender<BatchOutcome>,
    shutdown: Arc<AtomicBool>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    orchestrator: Arc<Orchestrator>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match queue.next(POLL_INTERVAL) {
            Ok(unit) => {
                debug!(
                    "Worker {} processing batch job {} ({})",
                    worker_id,
                    unit.job_id,
                    unit.priority.as_str()
                );

                let outcome = orchestrator.run_job(&unit.job_id);
                in_flight
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .remove(&unit.job_id);

                if let Err(e) = outcome_sender.send(outcome) {
                    error!("Worker {} failed to send outcome: {}", worker_id, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} queue disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
