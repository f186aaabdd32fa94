//! Certificate repository: CRUD and counters for the `certificates` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_ts, parse_opt_ts, parse_ts, Database, DatabaseError};
use crate::model::{
    ArtifactMetadata, Certificate, CertificateDetails, CertificateStatus, CourseInfo,
    SocialSharing, StudentInfo, Verification,
};

/// A raw certificate row from the database.
#[derive(Debug, Clone)]
struct CertificateRow {
    certificate_id: String,
    student_id: String,
    student_name: String,
    student_email: String,
    course_id: String,
    course_title: String,
    course_description: Option<String>,
    issue_date: String,
    completion_date: String,
    status: String,
    language: String,
    artifact_url: String,
    view_url: String,
    download_url: String,
    access_token: String,
    qr_payload: String,
    verification_count: u32,
    last_verified: Option<String>,
    share_count: u32,
    last_shared: Option<String>,
    file_size: i64,
    generation_time_ms: i64,
    template_version: String,
    generated_by: String,
    created_at: String,
    updated_at: String,
}

impl CertificateRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            certificate_id: row.get("certificate_id")?,
            student_id: row.get("student_id")?,
            student_name: row.get("student_name")?,
            student_email: row.get("student_email")?,
            course_id: row.get("course_id")?,
            course_title: row.get("course_title")?,
            course_description: row.get("course_description")?,
            issue_date: row.get("issue_date")?,
            completion_date: row.get("completion_date")?,
            status: row.get("status")?,
            language: row.get("language")?,
            artifact_url: row.get("artifact_url")?,
            view_url: row.get("view_url")?,
            download_url: row.get("download_url")?,
            access_token: row.get("access_token")?,
            qr_payload: row.get("qr_payload")?,
            verification_count: row.get("verification_count")?,
            last_verified: row.get("last_verified")?,
            share_count: row.get("share_count")?,
            last_shared: row.get("last_shared")?,
            file_size: row.get("file_size")?,
            generation_time_ms: row.get("generation_time_ms")?,
            template_version: row.get("template_version")?,
            generated_by: row.get("generated_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_certificate(self) -> Result<Certificate, DatabaseError> {
        let status = self
            .status
            .parse::<CertificateStatus>()
            .map_err(|e| DatabaseError::Corrupt(format!("certificates.status: {}", e)))?;
        Ok(Certificate {
            student_info: StudentInfo {
                student_id: self.student_id,
                name: self.student_name,
                email: self.student_email,
            },
            course_info: CourseInfo {
                course_id: self.course_id,
                title: self.course_title,
                description: self.course_description,
            },
            certificate_details: CertificateDetails {
                issue_date: parse_ts("issue_date", &self.issue_date)?,
                completion_date: parse_ts("completion_date", &self.completion_date)?,
                status,
                language: self.language,
                artifact_url: self.artifact_url,
                view_url: self.view_url,
                download_url: self.download_url,
                access_token: self.access_token,
                qr_payload: self.qr_payload,
            },
            verification: Verification {
                count: self.verification_count,
                last_verified: parse_opt_ts("last_verified", self.last_verified.as_deref())?,
            },
            social_sharing: SocialSharing {
                share_count: self.share_count,
                last_shared: parse_opt_ts("last_shared", self.last_shared.as_deref())?,
            },
            metadata: ArtifactMetadata {
                file_size: non_negative("file_size", self.file_size)?,
                generation_time_ms: non_negative("generation_time_ms", self.generation_time_ms)?,
                template_version: self.template_version,
                generated_by: self.generated_by,
            },
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            certificate_id: self.certificate_id,
        })
    }
}

fn non_negative(column: &str, value: i64) -> Result<u64, DatabaseError> {
    u64::try_from(value).map_err(|_| DatabaseError::Corrupt(format!("{}: {}", column, value)))
}

/// Total, active and revoked certificate counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CertificateCounts {
    pub total: u64,
    pub active: u64,
    pub revoked: u64,
}

fn query_many(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<Certificate>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, CertificateRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(CertificateRow::into_certificate)
        .collect()
}

fn query_one(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<Certificate>, DatabaseError> {
    let row = conn
        .query_row(sql, params, CertificateRow::from_row)
        .optional()?;
    row.map(CertificateRow::into_certificate).transpose()
}

/// Inserts a certificate. A second certificate for the same (student, course)
/// pair or a reused access token fails with `DatabaseError::Conflict`.
pub fn insert(db: &Database, cert: &Certificate) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let details = &cert.certificate_details;
        conn.execute(
            "INSERT INTO certificates (certificate_id, student_id, student_name, student_email,
             course_id, course_title, course_description, issue_date, completion_date, status,
             language, artifact_url, view_url, download_url, access_token, qr_payload,
             verification_count, last_verified, share_count, last_shared, file_size,
             generation_time_ms, template_version, generated_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
            params![
                cert.certificate_id,
                cert.student_info.student_id,
                cert.student_info.name,
                cert.student_info.email,
                cert.course_info.course_id,
                cert.course_info.title,
                cert.course_info.description,
                format_ts(&details.issue_date),
                format_ts(&details.completion_date),
                details.status.as_str(),
                details.language,
                details.artifact_url,
                details.view_url,
                details.download_url,
                details.access_token,
                details.qr_payload,
                cert.verification.count,
                cert.verification.last_verified.as_ref().map(format_ts),
                cert.social_sharing.share_count,
                cert.social_sharing.last_shared.as_ref().map(format_ts),
                cert.metadata.file_size as i64,
                cert.metadata.generation_time_ms as i64,
                cert.metadata.template_version,
                cert.metadata.generated_by,
                format_ts(&cert.created_at),
                format_ts(&cert.updated_at),
            ],
        )
        .map_err(DatabaseError::from_write)?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, certificate_id: &str) -> Result<Option<Certificate>, DatabaseError> {
    db.with_conn(|conn| {
        query_one(
            conn,
            "SELECT * FROM certificates WHERE certificate_id = ?1",
            params![certificate_id],
        )
    })
}

pub fn find_by_student_course(
    db: &Database,
    student_id: &str,
    course_id: &str,
) -> Result<Option<Certificate>, DatabaseError> {
    db.with_conn(|conn| {
        query_one(
            conn,
            "SELECT * FROM certificates WHERE student_id = ?1 AND course_id = ?2",
            params![student_id, course_id],
        )
    })
}

pub fn find_by_access_token(
    db: &Database,
    access_token: &str,
) -> Result<Option<Certificate>, DatabaseError> {
    db.with_conn(|conn| {
        query_one(
            conn,
            "SELECT * FROM certificates WHERE access_token = ?1",
            params![access_token],
        )
    })
}

/// All certificates for a student, newest first.
pub fn list_by_student(db: &Database, student_id: &str) -> Result<Vec<Certificate>, DatabaseError> {
    db.with_conn(|conn| {
        query_many(
            conn,
            "SELECT * FROM certificates WHERE student_id = ?1 ORDER BY created_at DESC",
            params![student_id],
        )
    })
}

/// Marks an active certificate revoked. Returns false if it was not active.
pub fn revoke(db: &Database, certificate_id: &str, now: &DateTime<Utc>) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE certificates SET status = 'revoked', updated_at = ?2
             WHERE certificate_id = ?1 AND status = 'active'",
            params![certificate_id, format_ts(now)],
        )?;
        Ok(changed > 0)
    })
}

pub fn delete(db: &Database, certificate_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute(
            "DELETE FROM certificates WHERE certificate_id = ?1",
            params![certificate_id],
        )?;
        Ok(deleted > 0)
    })
}

/// Bumps the verification counter for the certificate holding `access_token`.
pub fn record_verification(
    db: &Database,
    access_token: &str,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let ts = format_ts(now);
        let changed = conn.execute(
            "UPDATE certificates
             SET verification_count = verification_count + 1, last_verified = ?2, updated_at = ?2
             WHERE access_token = ?1",
            params![access_token, ts],
        )?;
        Ok(changed > 0)
    })
}

pub fn increment_share(
    db: &Database,
    certificate_id: &str,
    now: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let ts = format_ts(now);
        let changed = conn.execute(
            "UPDATE certificates
             SET share_count = share_count + 1, last_shared = ?2, updated_at = ?2
             WHERE certificate_id = ?1",
            params![certificate_id, ts],
        )?;
        Ok(changed > 0)
    })
}

pub fn counts(db: &Database) -> Result<CertificateCounts, DatabaseError> {
    db.with_conn(|conn| {
        let counts = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'revoked' THEN 1 ELSE 0 END), 0)
             FROM certificates",
            [],
            |r| {
                Ok(CertificateCounts {
                    total: r.get(0)?,
                    active: r.get(1)?,
                    revoked: r.get(2)?,
                })
            },
        )?;
        Ok(counts)
    })
}

/// Most shared certificates, ties broken by recency.
pub fn top_shared(db: &Database, limit: u32) -> Result<Vec<Certificate>, DatabaseError> {
    db.with_conn(|conn| {
        query_many(
            conn,
            "SELECT * FROM certificates WHERE share_count > 0
             ORDER BY share_count DESC, created_at DESC LIMIT ?1",
            params![limit],
        )
    })
}

pub fn recent(db: &Database, limit: u32) -> Result<Vec<Certificate>, DatabaseError> {
    db.with_conn(|conn| {
        query_many(
            conn,
            "SELECT * FROM certificates ORDER BY created_at DESC LIMIT ?1",
            params![limit],
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample(id: &str, student: &str, course: &str, created_at: DateTime<Utc>) -> Certificate {
        Certificate {
            certificate_id: id.to_string(),
            student_info: StudentInfo {
                student_id: student.to_string(),
                name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
            },
            course_info: CourseInfo {
                course_id: course.to_string(),
                title: "Analytical Engines".to_string(),
                description: Some("Intro".to_string()),
            },
            certificate_details: CertificateDetails {
                issue_date: created_at,
                completion_date: created_at,
                status: CertificateStatus::Active,
                language: "en".to_string(),
                artifact_url: format!("https://certs.example.com/storage/certificates/{}.pdf", id),
                view_url: format!("https://certs.example.com/view/tok-{}", id),
                download_url: format!("https://certs.example.com/download/tok-{}", id),
                access_token: format!("tok-{}", id),
                qr_payload: format!("https://certs.example.com/verify/tok-{}", id),
            },
            verification: Verification::default(),
            social_sharing: SocialSharing::default(),
            metadata: ArtifactMetadata {
                file_size: 2048,
                generation_time_ms: 12,
                template_version: "1.0".to_string(),
                generated_by: "test".to_string(),
            },
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_insert_and_lookups() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample("CERT-1", "s1", "c1", now)).unwrap();

        let by_id = find_by_id(&db, "CERT-1").unwrap().unwrap();
        assert_eq!(by_id.course_info.description.as_deref(), Some("Intro"));
        assert_eq!(by_id.metadata.file_size, 2048);

        let by_pair = find_by_student_course(&db, "s1", "c1").unwrap().unwrap();
        assert_eq!(by_pair.certificate_id, "CERT-1");

        let by_token = find_by_access_token(&db, "tok-CERT-1").unwrap().unwrap();
        assert_eq!(by_token.certificate_id, "CERT-1");

        assert!(find_by_student_course(&db, "s1", "c2").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_pair_is_conflict() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample("CERT-1", "s1", "c1", now)).unwrap();
        let err = insert(&db, &sample("CERT-2", "s1", "c1", now)).unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict(_)));
    }

    #[test]
    fn test_revoke_only_once() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample("CERT-1", "s1", "c1", now)).unwrap();
        assert!(revoke(&db, "CERT-1", &now).unwrap());
        assert!(!revoke(&db, "CERT-1", &now).unwrap());
        let cert = find_by_id(&db, "CERT-1").unwrap().unwrap();
        assert_eq!(cert.certificate_details.status, CertificateStatus::Revoked);
    }

    #[test]
    fn test_counters_increment() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample("CERT-1", "s1", "c1", now)).unwrap();

        assert!(record_verification(&db, "tok-CERT-1", &now).unwrap());
        assert!(record_verification(&db, "tok-CERT-1", &now).unwrap());
        assert!(!record_verification(&db, "nope", &now).unwrap());
        assert!(increment_share(&db, "CERT-1", &now).unwrap());

        let cert = find_by_id(&db, "CERT-1").unwrap().unwrap();
        assert_eq!(cert.verification.count, 2);
        assert!(cert.verification.last_verified.is_some());
        assert_eq!(cert.social_sharing.share_count, 1);
        assert!(cert.social_sharing.last_shared.is_some());
    }

    #[test]
    fn test_stats_queries() {
        let db = test_db();
        let base = Utc::now();
        insert(&db, &sample("CERT-1", "s1", "c1", base - Duration::minutes(2))).unwrap();
        insert(&db, &sample("CERT-2", "s2", "c1", base - Duration::minutes(1))).unwrap();
        insert(&db, &sample("CERT-3", "s1", "c2", base)).unwrap();
        revoke(&db, "CERT-2", &base).unwrap();
        increment_share(&db, "CERT-1", &base).unwrap();
        increment_share(&db, "CERT-1", &base).unwrap();
        increment_share(&db, "CERT-3", &base).unwrap();

        let counts = counts(&db).unwrap();
        assert_eq!(
            counts,
            CertificateCounts {
                total: 3,
                active: 2,
                revoked: 1
            }
        );

        let top: Vec<_> = top_shared(&db, 10)
            .unwrap()
            .into_iter()
            .map(|c| c.certificate_id)
            .collect();
        assert_eq!(top, vec!["CERT-1", "CERT-3"]);

        let latest = recent(&db, 2).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].certificate_id, "CERT-3");

        let for_s1 = list_by_student(&db, "s1").unwrap();
        assert_eq!(for_s1.len(), 2);
    }

    #[test]
    fn test_delete() {
        let db = test_db();
        let now = Utc::now();
        insert(&db, &sample("CERT-1", "s1", "c1", now)).unwrap();
        assert!(delete(&db, "CERT-1").unwrap());
        assert!(!delete(&db, "CERT-1").unwrap());
        assert!(find_by_id(&db, "CERT-1").unwrap().is_none());
    }
}
