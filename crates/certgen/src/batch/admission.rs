//! Batch submission payload and the checks it must pass before anything is persisted.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AdmissionError;
use crate::model::{
    BatchDetails, BatchJob, BatchOptions, JobStatus, Progress, Requester, RosterEntry,
    StudentStatus,
};

static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInput {
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub student_email: String,
}

/// A bulk certificate request as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub course_title: String,
    #[serde(default)]
    pub course_description: Option<String>,
    #[serde(default)]
    pub students: Vec<StudentInput>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub options: BatchOptions,
    #[serde(default)]
    pub requested_by: Option<Requester>,
}

fn default_language() -> String {
    "en".to_string()
}

/// Returned to the submitter once the job is persisted and queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAcceptance {
    pub job_id: String,
    pub total_students: u32,
    pub status: JobStatus,
    pub estimated_time_ms: u64,
}

impl BatchRequest {
    /// Checks the request in a fixed order: required course fields and a
    /// non-empty roster, then the size limit, then every student.
    pub fn validate(&self, max_batch_size: usize) -> Result<(), AdmissionError> {
        if self.course_id.trim().is_empty()
            || self.course_title.trim().is_empty()
            || self.students.is_empty()
        {
            return Err(AdmissionError::InvalidBatchRequest(
                "Missing required fields or invalid students array".to_string(),
            ));
        }

        if self.students.len() > max_batch_size {
            return Err(AdmissionError::BatchTooLarge {
                size: self.students.len(),
                max: max_batch_size,
            });
        }

        for (index, student) in self.students.iter().enumerate() {
            if student.student_id.trim().is_empty()
                || student.student_name.trim().is_empty()
                || student.student_email.trim().is_empty()
            {
                return Err(AdmissionError::InvalidBatchRequest(format!(
                    "Student at position {} must have studentId, studentName, and studentEmail",
                    index
                )));
            }
            if !RE_EMAIL.is_match(student.student_email.trim()) {
                return Err(AdmissionError::InvalidBatchRequest(format!(
                    "Invalid email '{}' for student {}",
                    student.student_email, student.student_id
                )));
            }
        }

        Ok(())
    }

    /// Builds the initial `queued` job record for an accepted request.
    /// Identifying fields are stored trimmed so lookups by pair match.
    pub fn into_job(
        self,
        job_id: String,
        now: DateTime<Utc>,
        estimate_per_student_ms: u64,
    ) -> BatchJob {
        let total = self.students.len() as u32;
        let students = self
            .students
            .into_iter()
            .enumerate()
            .map(|(position, s)| RosterEntry {
                position: position as u32,
                student_id: s.student_id.trim().to_string(),
                student_name: s.student_name.trim().to_string(),
                student_email: s.student_email.trim().to_string(),
                status: StudentStatus::Pending,
                certificate_id: None,
                certificate_url: None,
                error: None,
            })
            .collect();

        BatchJob {
            job_id,
            requested_by: self.requested_by.unwrap_or_default(),
            batch_details: BatchDetails {
                course_id: self.course_id.trim().to_string(),
                course_title: self.course_title.trim().to_string(),
                course_description: self.course_description,
                language: self.language,
                completion_date: self.completion_date.unwrap_or(now),
                total_students: total,
            },
            students,
            progress: Progress {
                total,
                completed: 0,
                failed: 0,
                percentage: 0,
                status: JobStatus::Queued,
                estimated_time_ms: u64::from(total) * estimate_per_student_ms,
                queued_at: now,
                started_at: None,
                completed_at: None,
            },
            options: self.options,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
