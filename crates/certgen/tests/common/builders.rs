//! Builder patterns for creating test requests programmatically.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use certgen::batch::{BatchRequest, StudentInput};
use certgen::certificate::IssueRequest;
use certgen::config::Config;
use certgen::model::{BatchOptions, Priority, Requester};
use chrono::Utc;

/// Builder for `BatchRequest` instances.
pub struct BatchRequestBuilder {
    course_id: String,
    course_title: String,
    course_description: Option<String>,
    students: Vec<StudentInput>,
    language: String,
    options: BatchOptions,
    requested_by: Option<Requester>,
}

impl BatchRequestBuilder {
    pub fn new(course_id: &str) -> Self {
        Self {
            course_id: course_id.to_string(),
            course_title: format!("Course {}", course_id),
            course_description: Some("An integration test course".to_string()),
            students: Vec::new(),
            language: "en".to_string(),
            options: BatchOptions::default(),
            requested_by: None,
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.course_title = title.to_string();
        self
    }

    /// Adds a student with a derived name and email.
    pub fn student(mut self, student_id: &str) -> Self {
        self.students.push(StudentInput {
            student_id: student_id.to_string(),
            student_name: student_name(student_id),
            student_email: format!("{}@example.com", student_id),
        });
        self
    }

    /// Adds `count` students named `stu-0`, `stu-1`, ...
    pub fn students(mut self, count: usize) -> Self {
        for i in 0..count {
            self = self.student(&format!("stu-{}", i));
        }
        self
    }

    pub fn raw_student(mut self, student: StudentInput) -> Self {
        self.students.push(student);
        self
    }

    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    pub fn requested_by(mut self, admin_id: &str) -> Self {
        self.requested_by = Some(Requester {
            admin_id: admin_id.to_string(),
            admin_name: format!("Admin {}", admin_id),
            admin_email: format!("{}@example.com", admin_id),
        });
        self
    }

    pub fn build(self) -> BatchRequest {
        BatchRequest {
            course_id: self.course_id,
            course_title: self.course_title,
            course_description: self.course_description,
            students: self.students,
            language: self.language,
            completion_date: None,
            options: self.options,
            requested_by: self.requested_by,
        }
    }
}

/// The display name the builders give a student ID.
pub fn student_name(student_id: &str) -> String {
    format!("Student {}", student_id)
}

/// DejaVu Sans, which covers Latin and most Arabic-script letters.
pub fn fixture_font_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fonts/DejaVuSans.ttf")
}

/// A single-certificate request for the pair.
pub fn issue_request(student_id: &str, course_id: &str) -> IssueRequest {
    IssueRequest {
        student_id: student_id.to_string(),
        student_name: student_name(student_id),
        student_email: format!("{}@example.com", student_id),
        course_id: course_id.to_string(),
        course_title: format!("Course {}", course_id),
        course_description: None,
        completion_date: Utc::now(),
        language: "en".to_string(),
        generated_by: "integration-test".to_string(),
    }
}

/// Builder for `Config` instances with small, fast batch settings.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.public_base_url = "https://learn.example.com".to_string();
        config.platform_name = "Example Academy".to_string();
        config.worker_count = 2;
        config.batch.max_batch_size = 10;
        config.batch.item_concurrency = 3;
        config.batch.item_timeout_secs = 30;
        config.storage.retry_backoff_ms = 1;
        Self { config }
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.batch.max_batch_size = size;
        self
    }

    pub fn item_concurrency(mut self, concurrency: usize) -> Self {
        self.config.batch.item_concurrency = concurrency;
        self
    }

    pub fn item_timeout_secs(mut self, secs: u64) -> Self {
        self.config.batch.item_timeout_secs = secs;
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn retention_days(mut self, days: u32) -> Self {
        self.config.retention.job_retention_days = days;
        self
    }

    pub fn quota_bytes(mut self, quota: u64) -> Self {
        self.config.storage.quota_bytes = Some(quota);
        self
    }

    /// Maps a template font family to the bundled DejaVu Sans fixture.
    pub fn fixture_font(mut self, family: &str) -> Self {
        self.config
            .rendering
            .fonts
            .insert(family.to_string(), fixture_font_path());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
