//! Batch job repository: the `batch_jobs` table and its `batch_students` roster.
//!
//! Every mutation is a single statement or a single transaction, so the
//! aggregate counters are always recomputed from the roster rather than
//! incremented from a value read in an earlier call.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};

use super::{format_ts, parse_opt_ts, parse_ts, Database, DatabaseError};
use crate::model::{
    percentage, BatchDetails, BatchJob, BatchJobSummary, BatchOptions, JobStatus, Priority,
    Progress, Requester, RosterEntry, StudentStatus,
};

/// A raw `batch_jobs` row.
#[derive(Debug, Clone)]
struct JobRow {
    job_id: String,
    admin_id: String,
    admin_name: String,
    admin_email: String,
    course_id: String,
    course_title: String,
    course_description: Option<String>,
    language: String,
    completion_date: String,
    total: u32,
    completed: u32,
    failed: u32,
    percentage: u8,
    status: String,
    estimated_time_ms: i64,
    send_email: bool,
    generate_preview: bool,
    priority: String,
    error: Option<String>,
    queued_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            admin_id: row.get("admin_id")?,
            admin_name: row.get("admin_name")?,
            admin_email: row.get("admin_email")?,
            course_id: row.get("course_id")?,
            course_title: row.get("course_title")?,
            course_description: row.get("course_description")?,
            language: row.get("language")?,
            completion_date: row.get("completion_date")?,
            total: row.get("total")?,
            completed: row.get("completed")?,
            failed: row.get("failed")?,
            percentage: row.get("percentage")?,
            status: row.get("status")?,
            estimated_time_ms: row.get("estimated_time_ms")?,
            send_email: row.get("send_email")?,
            generate_preview: row.get("generate_preview")?,
            priority: row.get("priority")?,
            error: row.get("error")?,
            queued_at: row.get("queued_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_job(self, students: Vec<RosterEntry>) -> Result<BatchJob, DatabaseError> {
        Ok(BatchJob {
            requested_by: Requester {
                admin_id: self.admin_id,
                admin_name: self.admin_name,
                admin_email: self.admin_email,
            },
            batch_details: BatchDetails {
                course_id: self.course_id,
                course_title: self.course_title,
                course_description: self.course_description,
                language: self.language,
                completion_date: parse_ts("completion_date", &self.completion_date)?,
                total_students: self.total,
            },
            students,
            progress: Progress {
                total: self.total,
                completed: self.completed,
                failed: self.failed,
                percentage: self.percentage,
                status: parse_job_status(&self.status)?,
                estimated_time_ms: u64::try_from(self.estimated_time_ms).map_err(|_| {
                    DatabaseError::Corrupt(format!(
                        "estimated_time_ms: {}",
                        self.estimated_time_ms
                    ))
                })?,
                queued_at: parse_ts("queued_at", &self.queued_at)?,
                started_at: parse_opt_ts("started_at", self.started_at.as_deref())?,
                completed_at: parse_opt_ts("completed_at", self.completed_at.as_deref())?,
            },
            options: BatchOptions {
                send_email: self.send_email,
                generate_preview: self.generate_preview,
                priority: parse_priority(&self.priority)?,
            },
            error: self.error,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            job_id: self.job_id,
        })
    }
}

/// A raw `batch_students` row.
#[derive(Debug, Clone)]
struct StudentRow {
    position: u32,
    student_id: String,
    student_name: String,
    student_email: String,
    status: String,
    certificate_id: Option<String>,
    certificate_url: Option<String>,
    error: Option<String>,
}

impl StudentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            position: row.get("position")?,
            student_id: row.get("student_id")?,
            student_name: row.get("student_name")?,
            student_email: row.get("student_email")?,
            status: row.get("status")?,
            certificate_id: row.get("certificate_id")?,
            certificate_url: row.get("certificate_url")?,
            error: row.get("error")?,
        })
    }

    fn into_entry(self) -> Result<RosterEntry, DatabaseError> {
        let status = self.status.parse::<StudentStatus>().map_err(|e| {
            DatabaseError::Corrupt(format!("batch_students.status at {}: {}", self.position, e))
        })?;
        Ok(RosterEntry {
            position: self.position,
            student_id: self.student_id,
            student_name: self.student_name,
            student_email: self.student_email,
            status,
            certificate_id: self.certificate_id,
            certificate_url: self.certificate_url,
            error: self.error,
        })
    }
}

fn parse_job_status(value: &str) -> Result<JobStatus, DatabaseError> {
    value
        .parse()
        .map_err(|e| DatabaseError::Corrupt(format!("batch_jobs.status: {}", e)))
}

fn parse_priority(value: &str) -> Result<Priority, DatabaseError> {
    value
        .parse()
        .map_err(|e| DatabaseError::Corrupt(format!("batch_jobs.priority: {}", e)))
}

/// How one roster entry was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResolution {
    Completed {
        certificate_id: String,
        certificate_url: String,
    },
    Failed {
        error: String,
    },
}

/// Aggregate counters after an item was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemRecord {
    /// False when the entry was no longer pending or the job no longer processing.
    pub applied: bool,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub percentage: u8,
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct BatchFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a job and its roster in one transaction.
pub fn insert(db: &Database, job: &BatchJob) -> Result<(), DatabaseError> {
    db.with_tx(|tx| {
        let details = &job.batch_details;
        let progress = &job.progress;
        tx.execute(
            "INSERT INTO batch_jobs (job_id, admin_id, admin_name, admin_email, course_id,
             course_title, course_description, language, completion_date, total, completed,
             failed, percentage, status, estimated_time_ms, send_email, generate_preview,
             priority, error, queued_at, started_at, completed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
            params![
                job.job_id,
                job.requested_by.admin_id,
                job.requested_by.admin_name,
                job.requested_by.admin_email,
                details.course_id,
                details.course_title,
                details.course_description,
                details.language,
                format_ts(&details.completion_date),
                progress.total,
                progress.completed,
                progress.failed,
                progress.percentage,
                progress.status.as_str(),
                progress.estimated_time_ms as i64,
                job.options.send_email,
                job.options.generate_preview,
                job.options.priority.as_str(),
                job.error,
                format_ts(&progress.queued_at),
                progress.started_at.as_ref().map(format_ts),
                progress.completed_at.as_ref().map(format_ts),
                format_ts(&job.created_at),
                format_ts(&job.updated_at),
            ],
        )
        .map_err(DatabaseError::from_write)?;

        let mut stmt = tx.prepare(
            "INSERT INTO batch_students (job_id, position, student_id, student_name,
             student_email, status, certificate_id, certificate_url, error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        let updated_at = format_ts(&job.updated_at);
        for entry in &job.students {
            stmt.execute(params![
                job.job_id,
                entry.position,
                entry.student_id,
                entry.student_name,
                entry.student_email,
                entry.status.as_str(),
                entry.certificate_id,
                entry.certificate_url,
                entry.error,
                updated_at,
            ])?;
        }
        Ok(())
    })
}

/// Reads a job and its roster in one read transaction.
pub fn find_by_id(db: &Database, job_id: &str) -> Result<Option<BatchJob>, DatabaseError> {
    db.with_tx(|tx| {
        let row = tx
            .query_row(
                "SELECT * FROM batch_jobs WHERE job_id = ?1",
                params![job_id],
                JobRow::from_row,
            )
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };
        let students = load_roster(tx, job_id)?;
        row.into_job(students).map(Some)
    })
}

fn load_roster(tx: &Transaction<'_>, job_id: &str) -> Result<Vec<RosterEntry>, DatabaseError> {
    let mut stmt =
        tx.prepare("SELECT * FROM batch_students WHERE job_id = ?1 ORDER BY position")?;
    let rows = stmt
        .query_map(params![job_id], StudentRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(StudentRow::into_entry).collect()
}

/// Claims a job for processing. Stamps `started_at` only the first time.
///
/// Returns false when the job is missing or already terminal.
pub fn mark_processing(
    db: &Database,
    job_id: &str,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let ts = format_ts(now);
        let changed = conn.execute(
            "UPDATE batch_jobs
             SET status = 'processing', started_at = COALESCE(started_at, ?2), updated_at = ?2
             WHERE job_id = ?1 AND status IN ('queued', 'processing')",
            params![job_id, ts],
        )?;
        Ok(changed > 0)
    })
}

/// Records one item's outcome and recomputes the aggregate counters, atomically.
///
/// The entry only changes while it is still `pending` and the job is
/// `processing`, so a replayed or late outcome never double counts.
pub fn record_item(
    db: &Database,
    job_id: &str,
    position: u32,
    resolution: &ItemResolution,
    now: &DateTime<Utc>,
) -> Result<ItemRecord, DatabaseError> {
    db.with_tx(|tx| {
        let ts = format_ts(now);
        let (status, certificate_id, certificate_url, error) = match resolution {
            ItemResolution::Completed {
                certificate_id,
                certificate_url,
            } => (
                StudentStatus::Completed,
                Some(certificate_id.as_str()),
                Some(certificate_url.as_str()),
                None,
            ),
            ItemResolution::Failed { error } => {
                (StudentStatus::Failed, None, None, Some(error.as_str()))
            }
        };

        let changed = tx.execute(
            "UPDATE batch_students
             SET status = ?3, certificate_id = ?4, certificate_url = ?5, error = ?6, updated_at = ?7
             WHERE job_id = ?1 AND position = ?2 AND status = 'pending'
               AND EXISTS (SELECT 1 FROM batch_jobs WHERE job_id = ?1 AND status = 'processing')",
            params![
                job_id,
                position,
                status.as_str(),
                certificate_id,
                certificate_url,
                error,
                ts
            ],
        )?;

        let (total, completed, failed): (u32, u32, u32) = tx.query_row(
            "SELECT total,
                    (SELECT COUNT(*) FROM batch_students WHERE job_id = ?1 AND status = 'completed'),
                    (SELECT COUNT(*) FROM batch_students WHERE job_id = ?1 AND status = 'failed')
             FROM batch_jobs WHERE job_id = ?1",
            params![job_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        let pct = percentage(completed, failed, total);

        if changed > 0 {
            tx.execute(
                "UPDATE batch_jobs
                 SET completed = ?2, failed = ?3, percentage = ?4, updated_at = ?5
                 WHERE job_id = ?1",
                params![job_id, completed, failed, pct, ts],
            )?;
        }

        Ok(ItemRecord {
            applied: changed > 0,
            total,
            completed,
            failed,
            percentage: pct,
        })
    })
}

/// Moves a processing job to `completed` once no roster entry is pending.
///
/// Returns false if entries are still pending or the job is not processing.
pub fn finalize(db: &Database, job_id: &str, now: &DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let ts = format_ts(now);
        let changed = conn.execute(
            "UPDATE batch_jobs
             SET status = 'completed', completed_at = ?2, updated_at = ?2
             WHERE job_id = ?1 AND status = 'processing'
               AND NOT EXISTS (
                   SELECT 1 FROM batch_students WHERE job_id = ?1 AND status = 'pending'
               )",
            params![job_id, ts],
        )?;
        Ok(changed > 0)
    })
}

/// Fails a non-terminal job as a whole.
pub fn mark_failed(
    db: &Database,
    job_id: &str,
    reason: &str,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let ts = format_ts(now);
        let changed = conn.execute(
            "UPDATE batch_jobs
             SET status = 'failed', error = ?2, completed_at = ?3, updated_at = ?3
             WHERE job_id = ?1 AND status IN ('queued', 'processing')",
            params![job_id, reason, ts],
        )?;
        Ok(changed > 0)
    })
}

/// Lists job summaries, newest first, returning (rows, total_count).
pub fn list(
    db: &Database,
    filter: &BatchFilter,
) -> Result<(Vec<BatchJobSummary>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM batch_jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(50) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT job_id, course_title, total, status, completed, failed, percentage, created_at
             FROM batch_jobs {} ORDER BY created_at DESC, job_id LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let raw = stmt
            .query_map(params_ref.as_slice(), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, u32>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, u32>(4)?,
                    r.get::<_, u32>(5)?,
                    r.get::<_, u8>(6)?,
                    r.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let rows = raw
            .into_iter()
            .map(
                |(job_id, course_title, total, status, completed, failed, pct, created_at)|
                 -> Result<BatchJobSummary, DatabaseError> {
                    Ok(BatchJobSummary {
                        job_id,
                        course_title,
                        total,
                        status: parse_job_status(&status)?,
                        completed,
                        failed,
                        percentage: pct,
                        created_at: parse_ts("created_at", &created_at)?,
                    })
                },
            )
            .collect::<Result<Vec<_>, DatabaseError>>()?;

        Ok((rows, total))
    })
}

/// Jobs that were admitted or started but never reached a terminal state,
/// oldest first.
pub fn find_resumable(db: &Database) -> Result<Vec<(String, Priority)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT job_id, priority FROM batch_jobs
             WHERE status IN ('queued', 'processing')
             ORDER BY created_at ASC",
        )?;
        let raw = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|(id, priority)| -> Result<(String, Priority), DatabaseError> {
                Ok((id, parse_priority(&priority)?))
            })
            .collect()
    })
}

/// Deletes terminal jobs created before `cutoff`. Roster rows cascade.
pub fn delete_terminal_older_than(
    db: &Database,
    cutoff: &DateTime<Utc>,
) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute(
            "DELETE FROM batch_jobs
             WHERE status IN ('completed', 'failed') AND created_at < ?1",
            params![format_ts(cutoff)],
        )?;
        Ok(deleted as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(id: &str, students: u32, created_at: DateTime<Utc>) -> BatchJob {
        let roster = (0..students)
            .map(|i| RosterEntry {
                position: i,
                student_id: format!("s{}", i),
                student_name: format!("Student {}", i),
                student_email: format!("s{}@example.com", i),
                status: StudentStatus::Pending,
                certificate_id: None,
                certificate_url: None,
                error: None,
            })
            .collect();
        BatchJob {
            job_id: id.to_string(),
            requested_by: Requester::default(),
            batch_details: BatchDetails {
                course_id: "course-1".to_string(),
                course_title: "Rust Basics".to_string(),
                course_description: None,
                language: "en".to_string(),
                completion_date: created_at,
                total_students: students,
            },
            students: roster,
            progress: Progress {
                total: students,
                completed: 0,
                failed: 0,
                percentage: 0,
                status: JobStatus::Queued,
                estimated_time_ms: u64::from(students) * 3000,
                queued_at: created_at,
                started_at: None,
                completed_at: None,
            },
            options: BatchOptions::default(),
            error: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn completed(n: u32) -> ItemResolution {
        ItemResolution::Completed {
            certificate_id: format!("CERT-{}", n),
            certificate_url: format!("https://example.com/view/{}", n),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample_job("BATCH-1", 3, now)).unwrap();

        let job = find_by_id(&db, "BATCH-1").unwrap().unwrap();
        assert_eq!(job.students.len(), 3);
        assert_eq!(job.progress.total, 3);
        assert_eq!(job.progress.status, JobStatus::Queued);
        assert_eq!(job.students[2].student_id, "s2");
        assert_eq!(job.students[2].position, 2);
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "BATCH-missing").unwrap().is_none());
    }

    #[test]
    fn test_record_item_requires_processing() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample_job("BATCH-2", 2, now)).unwrap();

        let record = record_item(&db, "BATCH-2", 0, &completed(0), &now).unwrap();
        assert!(!record.applied);

        assert!(mark_processing(&db, "BATCH-2", &now).unwrap());
        let record = record_item(&db, "BATCH-2", 0, &completed(0), &now).unwrap();
        assert!(record.applied);
        assert_eq!(record.completed, 1);
        assert_eq!(record.percentage, 50);
    }

    #[test]
    fn test_record_item_is_not_applied_twice() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample_job("BATCH-3", 2, now)).unwrap();
        mark_processing(&db, "BATCH-3", &now).unwrap();

        record_item(&db, "BATCH-3", 1, &completed(1), &now).unwrap();
        let again = record_item(
            &db,
            "BATCH-3",
            1,
            &ItemResolution::Failed {
                error: "late".to_string(),
            },
            &now,
        )
        .unwrap();
        assert!(!again.applied);
        assert_eq!(again.completed, 1);
        assert_eq!(again.failed, 0);

        let job = find_by_id(&db, "BATCH-3").unwrap().unwrap();
        assert_eq!(job.students[1].status, StudentStatus::Completed);
        assert!(job.students[1].error.is_none());
    }

    #[test]
    fn test_finalize_waits_for_pending_entries() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample_job("BATCH-4", 2, now)).unwrap();
        mark_processing(&db, "BATCH-4", &now).unwrap();

        record_item(&db, "BATCH-4", 0, &completed(0), &now).unwrap();
        assert!(!finalize(&db, "BATCH-4", &now).unwrap());

        record_item(
            &db,
            "BATCH-4",
            1,
            &ItemResolution::Failed {
                error: "render failed".to_string(),
            },
            &now,
        )
        .unwrap();
        assert!(finalize(&db, "BATCH-4", &now).unwrap());

        let job = find_by_id(&db, "BATCH-4").unwrap().unwrap();
        assert_eq!(job.progress.status, JobStatus::Completed);
        assert_eq!(job.progress.completed + job.progress.failed, 2);
        assert_eq!(job.progress.percentage, 100);
        assert!(job.progress.completed_at.is_some());
    }

    #[test]
    fn test_mark_processing_keeps_first_start() {
        let db = test_db();
        let first = Utc::now();
        insert(&db, &sample_job("BATCH-5", 1, first)).unwrap();
        mark_processing(&db, "BATCH-5", &first).unwrap();
        mark_processing(&db, "BATCH-5", &(first + Duration::seconds(30))).unwrap();

        let job = find_by_id(&db, "BATCH-5").unwrap().unwrap();
        assert_eq!(
            job.progress.started_at.unwrap().timestamp_micros(),
            first.timestamp_micros()
        );
    }

    #[test]
    fn test_terminal_jobs_stay_terminal() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample_job("BATCH-6", 1, now)).unwrap();
        assert!(mark_failed(&db, "BATCH-6", "boom", &now).unwrap());
        assert!(!mark_processing(&db, "BATCH-6", &now).unwrap());
        assert!(!mark_failed(&db, "BATCH-6", "again", &now).unwrap());

        let job = find_by_id(&db, "BATCH-6").unwrap().unwrap();
        assert_eq!(job.progress.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_list_newest_first_with_filter() {
        let db = test_db();
        let base = Utc::now();
        insert(&db, &sample_job("BATCH-a", 1, base - Duration::minutes(2))).unwrap();
        insert(&db, &sample_job("BATCH-b", 1, base - Duration::minutes(1))).unwrap();
        insert(&db, &sample_job("BATCH-c", 1, base)).unwrap();
        mark_failed(&db, "BATCH-b", "boom", &base).unwrap();

        let (rows, total) = list(&db, &BatchFilter::default()).unwrap();
        assert_eq!(total, 3);
        let ids: Vec<_> = rows.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["BATCH-c", "BATCH-b", "BATCH-a"]);

        let (rows, total) = list(
            &db,
            &BatchFilter {
                status: Some(JobStatus::Queued),
                limit: Some(1),
                offset: Some(1),
            },
        )
        .unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].job_id, "BATCH-a");
    }

    #[test]
    fn test_find_resumable_and_counts() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample_job("BATCH-q", 1, now)).unwrap();
        insert(&db, &sample_job("BATCH-p", 1, now)).unwrap();
        insert(&db, &sample_job("BATCH-f", 1, now)).unwrap();
        mark_processing(&db, "BATCH-p", &now).unwrap();
        mark_failed(&db, "BATCH-f", "boom", &now).unwrap();

        let resumable: Vec<String> = find_resumable(&db)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(resumable.len(), 2);
        assert!(resumable.contains(&"BATCH-q".to_string()));
        assert!(resumable.contains(&"BATCH-p".to_string()));
        let (failed, total) = list(
            &db,
            &BatchFilter {
                status: Some(JobStatus::Failed),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(failed[0].job_id, "BATCH-f");
    }

    #[test]
    fn test_delete_terminal_older_than() {
        let db = test_db();
        let now = Utc::now();
        let old = now - Duration::days(31);
        insert(&db, &sample_job("BATCH-old-done", 1, old)).unwrap();
        insert(&db, &sample_job("BATCH-old-queued", 1, old)).unwrap();
        insert(&db, &sample_job("BATCH-new-done", 1, now)).unwrap();
        mark_failed(&db, "BATCH-old-done", "boom", &now).unwrap();
        mark_failed(&db, "BATCH-new-done", "boom", &now).unwrap();

        let deleted = delete_terminal_older_than(&db, &(now - Duration::days(30))).unwrap();
        assert_eq!(deleted, 1);
        assert!(find_by_id(&db, "BATCH-old-done").unwrap().is_none());
        assert!(find_by_id(&db, "BATCH-old-queued").unwrap().is_some());
        assert!(find_by_id(&db, "BATCH-new-done").unwrap().is_some());

        let orphans: u32 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM batch_students WHERE job_id = 'BATCH-old-done'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_corrupt_roster_status_is_reported() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample_job("BATCH-x", 1, now)).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE batch_students SET status = 'bogus' WHERE job_id = 'BATCH-x'",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            find_by_id(&db, "BATCH-x"),
            Err(DatabaseError::Corrupt(_))
        ));
    }
}
