//! Batch progress events fanned out to in-process observers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchEventKind {
    Queued,
    Started,
    ItemCompleted,
    ItemFailed,
    Finished,
    Failed,
}

impl std::fmt::Display for BatchEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchEventKind::Queued => write!(f, "Queued"),
            BatchEventKind::Started => write!(f, "Started"),
            BatchEventKind::ItemCompleted => write!(f, "Item completed"),
            BatchEventKind::ItemFailed => write!(f, "Item failed"),
            BatchEventKind::Finished => write!(f, "Finished"),
            BatchEventKind::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchEvent {
    pub job_id: String,
    pub kind: BatchEventKind,
    pub timestamp: DateTime<Utc>,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchEvent {
    pub fn new(job_id: &str, kind: BatchEventKind, total: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind,
            timestamp: Utc::now(),
            total,
            completed: 0,
            failed: 0,
            percentage: 0,
            student_id: None,
            certificate_id: None,
            error: None,
        }
    }

    pub fn with_counts(mut self, completed: u32, failed: u32, percentage: u8) -> Self {
        self.completed = completed;
        self.failed = failed;
        self.percentage = percentage;
        self
    }

    pub fn for_student(mut self, student_id: &str) -> Self {
        self.student_id = Some(student_id.to_string());
        self
    }

    pub fn with_certificate(mut self, certificate_id: &str) -> Self {
        self.certificate_id = Some(certificate_id.to_string());
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Broadcasts batch events. Sending with no subscribers is not an error.
#[derive(Clone)]
pub struct BatchEventBroadcaster {
    sender: Arc<broadcast::Sender<BatchEvent>>,
}

impl BatchEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }

    pub fn send(&self, event: BatchEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BatchEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = BatchEventBroadcaster::default();
        broadcaster.send(BatchEvent::new("BATCH-1", BatchEventKind::Queued, 3));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_receives_events_in_order() {
        let broadcaster = BatchEventBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(BatchEvent::new("BATCH-1", BatchEventKind::Started, 2));
        broadcaster.send(
            BatchEvent::new("BATCH-1", BatchEventKind::ItemFailed, 2)
                .with_counts(0, 1, 50)
                .for_student("s1")
                .with_error("render failed"),
        );

        assert_eq!(rx.try_recv().unwrap().kind, BatchEventKind::Started);
        let item = rx.try_recv().unwrap();
        assert_eq!(item.kind, BatchEventKind::ItemFailed);
        assert_eq!(item.percentage, 50);
        assert_eq!(item.student_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = BatchEvent::new("BATCH-1", BatchEventKind::ItemCompleted, 1)
            .with_certificate("CERT-1");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobId"], "BATCH-1");
        assert_eq!(json["kind"], "item_completed");
        assert_eq!(json["certificateId"], "CERT-1");
        assert!(json.get("error").is_none());
    }
}
