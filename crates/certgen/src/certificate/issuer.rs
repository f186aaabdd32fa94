//! Render, store and persist one certificate. Shared by the single-certificate
//! path and every batch item, so both enforce the same (student, course)
//! uniqueness.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{certificate_repo, Database, DatabaseError};
use crate::error::CertificateError;
use crate::ids::IdIssuer;
use crate::model::{
    ArtifactMetadata, Certificate, CertificateDetails, CertificateStatus, CourseInfo,
    SocialSharing, StudentInfo, Verification,
};
use crate::renderer::{ArtifactRenderer, RenderRequest};
use crate::storage::{certificate_blob_name, BlobStore};

/// Input for issuing one certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub course_id: String,
    pub course_title: String,
    #[serde(default)]
    pub course_description: Option<String>,
    #[serde(default = "Utc::now")]
    pub completion_date: DateTime<Utc>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_generated_by")]
    pub generated_by: String,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_generated_by() -> String {
    "system".to_string()
}

impl IssueRequest {
    fn validate(&self) -> Result<(), CertificateError> {
        let required = [
            ("studentId", &self.student_id),
            ("studentName", &self.student_name),
            ("studentEmail", &self.student_email),
            ("courseId", &self.course_id),
            ("courseTitle", &self.course_title),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CertificateError::MissingField(field));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueOutcome {
    pub certificate: Certificate,
    /// False when an existing certificate for the pair was returned.
    pub created: bool,
}

/// Builds the public view and download URLs for an access token.
#[derive(Debug, Clone)]
pub struct CertificateLinks {
    base_url: String,
}

impl CertificateLinks {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn view_url(&self, access_token: &str) -> String {
        format!("{}/view/{}", self.base_url, access_token)
    }

    pub fn download_url(&self, access_token: &str) -> String {
        format!("{}/download/{}", self.base_url, access_token)
    }
}

pub struct CertificateIssuer {
    db: Database,
    renderer: Arc<dyn ArtifactRenderer>,
    store: Arc<dyn BlobStore>,
    ids: IdIssuer,
    links: CertificateLinks,
    template_version: String,
}

impl CertificateIssuer {
    pub fn new(
        db: Database,
        renderer: Arc<dyn ArtifactRenderer>,
        store: Arc<dyn BlobStore>,
        ids: IdIssuer,
        links: CertificateLinks,
        template_version: &str,
    ) -> Self {
        Self {
            db,
            renderer,
            store,
            ids,
            links,
            template_version: template_version.to_string(),
        }
    }

    pub fn links(&self) -> &CertificateLinks {
        &self.links
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn find_existing(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Option<Certificate>, CertificateError> {
        Ok(certificate_repo::find_by_student_course(
            &self.db, student_id, course_id,
        )?)
    }

    /// Returns the existing certificate for the (student, course) pair, or
    /// renders, stores and records a new one.
    pub fn issue(&self, request: &IssueRequest) -> Result<IssueOutcome, CertificateError> {
        request.validate()?;

        if let Some(existing) = self.find_existing(&request.student_id, &request.course_id)? {
            log::debug!(
                "Certificate {} already exists for {}/{}",
                existing.certificate_id,
                request.student_id,
                request.course_id
            );
            return Ok(IssueOutcome {
                certificate: existing,
                created: false,
            });
        }

        let certificate_id = self.ids.new_certificate_id()?;
        let access_token = self.ids.new_access_token()?;
        let now = Utc::now();

        let artifact = self.renderer.render(&RenderRequest {
            student_name: request.student_name.clone(),
            course_title: request.course_title.clone(),
            course_description: request.course_description.clone(),
            completion_date: request.completion_date,
            issue_date: now,
            certificate_id: certificate_id.clone(),
            access_token: access_token.clone(),
            language: request.language.clone(),
        })?;

        let blob_name = certificate_blob_name(&certificate_id);
        let artifact_url = self
            .store
            .put(&blob_name, &artifact.bytes, "application/pdf")?;

        let certificate = Certificate {
            certificate_id: certificate_id.clone(),
            student_info: StudentInfo {
                student_id: request.student_id.clone(),
                name: request.student_name.clone(),
                email: request.student_email.clone(),
            },
            course_info: CourseInfo {
                course_id: request.course_id.clone(),
                title: request.course_title.clone(),
                description: request.course_description.clone(),
            },
            certificate_details: CertificateDetails {
                issue_date: now,
                completion_date: request.completion_date,
                status: CertificateStatus::Active,
                language: artifact.language.code().to_string(),
                artifact_url,
                view_url: self.links.view_url(&access_token),
                download_url: self.links.download_url(&access_token),
                access_token,
                qr_payload: artifact.qr_payload,
            },
            verification: Verification::default(),
            social_sharing: SocialSharing::default(),
            metadata: ArtifactMetadata {
                file_size: artifact.byte_size,
                generation_time_ms: artifact.render_duration_ms,
                template_version: self.template_version.clone(),
                generated_by: request.generated_by.clone(),
            },
            created_at: now,
            updated_at: now,
        };

        match certificate_repo::insert(&self.db, &certificate) {
            Ok(()) => {
                log::info!(
                    "Issued certificate {} for {}/{}",
                    certificate_id,
                    request.student_id,
                    request.course_id
                );
                Ok(IssueOutcome {
                    certificate,
                    created: true,
                })
            }
            Err(DatabaseError::Conflict(reason)) => {
                // Another writer won the race for this pair.
                let winner = self.find_existing(&request.student_id, &request.course_id)?;
                if let Err(e) = self.store.delete(&blob_name) {
                    log::warn!("Failed to remove orphaned blob {}: {}", blob_name, e);
                }
                match winner {
                    Some(existing) => Ok(IssueOutcome {
                        certificate: existing,
                        created: false,
                    }),
                    None => Err(DatabaseError::Conflict(reason).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}
