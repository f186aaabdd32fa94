//! Three-lane work queue. Receivers always drain `high` before `normal`
//! before `low`.

use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Select, Sender, TryRecvError};

use crate::error::WorkerError;
use crate::model::Priority;

/// One batch job waiting for a worker. Workers re-read the job from the
/// database, so the unit only carries the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub job_id: String,
    pub priority: Priority,
}

pub fn work_queue() -> (QueueSender, QueueReceiver) {
    let (high_tx, high_rx) = unbounded();
    let (normal_tx, normal_rx) = unbounded();
    let (low_tx, low_rx) = unbounded();
    (
        QueueSender {
            high: high_tx,
            normal: normal_tx,
            low: low_tx,
        },
        QueueReceiver {
            high: high_rx,
            normal: normal_rx,
            low: low_rx,
        },
    )
}

pub struct QueueSender {
    high: Sender<WorkUnit>,
    normal: Sender<WorkUnit>,
    low: Sender<WorkUnit>,
}

impl QueueSender {
    pub fn push(&self, unit: WorkUnit) -> Result<(), WorkerError> {
        let lane = match unit.priority {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
            Priority::Low => &self.low,
        };
        lane.send(unit).map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct QueueReceiver {
    high: Receiver<WorkUnit>,
    normal: Receiver<WorkUnit>,
    low: Receiver<WorkUnit>,
}

impl QueueReceiver {
    /// Takes the highest-priority unit, waiting up to `timeout` for one to
    /// arrive. Disconnected once the sender is dropped and every lane is drained.
    pub fn next(&self, timeout: Duration) -> Result<WorkUnit, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut open = false;
            for lane in [&self.high, &self.normal, &self.low] {
                match lane.try_recv() {
                    Ok(unit) => return Ok(unit),
                    Err(TryRecvError::Empty) => open = true,
                    Err(TryRecvError::Disconnected) => {}
                }
            }
            if !open {
                return Err(RecvTimeoutError::Disconnected);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RecvTimeoutError::Timeout);
            }

            let mut select = Select::new();
            select.recv(&self.high);
            select.recv(&self.normal);
            select.recv(&self.low);
            if select.ready_timeout(remaining).is_err() {
                return Err(RecvTimeoutError::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, priority: Priority) -> WorkUnit {
        WorkUnit {
            job_id: id.to_string(),
            priority,
        }
    }

    #[test]
    fn test_drains_by_priority() {
        let (tx, rx) = work_queue();
        tx.push(unit("low", Priority::Low)).unwrap();
        tx.push(unit("normal", Priority::Normal)).unwrap();
        tx.push(unit("high", Priority::High)).unwrap();
        assert_eq!(tx.len(), 3);

        let order: Vec<String> = (0..3)
            .map(|_| rx.next(Duration::from_millis(10)).unwrap().job_id)
            .collect();
        assert_eq!(order, vec!["high", "normal", "low"]);
    }

    #[test]
    fn test_fifo_within_lane() {
        let (tx, rx) = work_queue();
        tx.push(unit("a", Priority::Normal)).unwrap();
        tx.push(unit("b", Priority::Normal)).unwrap();
        assert_eq!(rx.next(Duration::from_millis(10)).unwrap().job_id, "a");
        assert_eq!(rx.next(Duration::from_millis(10)).unwrap().job_id, "b");
    }

    #[test]
    fn test_timeout_when_empty() {
        let (_tx, rx) = work_queue();
        assert_eq!(
            rx.next(Duration::from_millis(20)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn test_disconnect_after_drain() {
        let (tx, rx) = work_queue();
        tx.push(unit("last", Priority::Low)).unwrap();
        drop(tx);
        assert_eq!(rx.next(Duration::from_millis(10)).unwrap().job_id, "last");
        assert_eq!(
            rx.next(Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn test_wakes_on_push_from_other_thread() {
        let (tx, rx) = work_queue();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.push(unit("late", Priority::High)).unwrap();
            tx
        });
        assert_eq!(rx.next(Duration::from_secs(2)).unwrap().job_id, "late");
        drop(handle.join().unwrap());
    }
}
