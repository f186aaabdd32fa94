//! Batch job records: the submitted request, its roster and the progress snapshot.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a batch job. Transitions only move forward:
/// `queued -> processing -> completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Per-student status inside a roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Pending,
    Completed,
    Failed,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Pending => "pending",
            StudentStatus::Completed => "completed",
            StudentStatus::Failed => "failed",
        }
    }
}

impl FromStr for StudentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StudentStatus::Pending),
            "completed" => Ok(StudentStatus::Completed),
            "failed" => Ok(StudentStatus::Failed),
            other => Err(format!("unknown student status '{}'", other)),
        }
    }
}

/// Queue lane a job enters. Workers drain `High` before `Normal` before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    /// Numeric rank, lower runs first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    #[serde(default)]
    pub send_email: bool,
    #[serde(default = "default_true")]
    pub generate_preview: bool,
    #[serde(default)]
    pub priority: Priority,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            send_email: false,
            generate_preview: true,
            priority: Priority::Normal,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Identity of whoever submitted the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub admin_id: String,
    pub admin_name: String,
    pub admin_email: String,
}

impl Default for Requester {
    fn default() -> Self {
        Self {
            admin_id: "system".to_string(),
            admin_name: "System".to_string(),
            admin_email: "system@platform.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDetails {
    pub course_id: String,
    pub course_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_description: Option<String>,
    pub language: String,
    pub completion_date: DateTime<Utc>,
    pub total_students: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Index in the submitted roster. Stable key for per-item updates.
    #[serde(skip)]
    pub position: u32,
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub status: StudentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub percentage: u8,
    pub status: JobStatus,
    pub estimated_time_ms: u64,
    pub queued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Progress {
    pub fn resolved(&self) -> u32 {
        self.completed + self.failed
    }
}

/// Full snapshot of a batch job as committed in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub job_id: String,
    pub requested_by: Requester,
    pub batch_details: BatchDetails,
    pub students: Vec<RosterEntry>,
    pub progress: Progress,
    pub options: BatchOptions,
    /// Reason the job failed as a whole, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    pub fn pending_entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.students
            .iter()
            .filter(|s| s.status == StudentStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobSummary {
    pub job_id: String,
    pub course_title: String,
    pub total: u32,
    pub status: JobStatus,
    pub completed: u32,
    pub failed: u32,
    pub percentage: u8,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            total,
            page,
            limit,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPage {
    pub jobs: Vec<BatchJobSummary>,
    pub pagination: Pagination,
}

/// Integer completion percentage, rounded down.
pub fn percentage(completed: u32, failed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let resolved = u64::from(completed) + u64::from(failed);
    (resolved * 100 / u64::from(total)).min(100) as u8
}
