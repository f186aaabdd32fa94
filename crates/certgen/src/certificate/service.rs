use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::issuer::{CertificateIssuer, IssueOutcome, IssueRequest};
use super::social::{ShareContext, SharePlatform};
use crate::db::{certificate_repo, Database};
use crate::error::CertificateError;
use crate::model::Certificate;
use crate::storage::certificate_blob_name;

const STATS_LIMIT: u32 = 10;

/// Result of looking a certificate up by its access token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub valid: bool,
    pub certificate: Certificate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStats {
    pub total: u64,
    pub active: u64,
    pub revoked: u64,
    pub top_shared: Vec<Certificate>,
    pub recent: Vec<Certificate>,
}

/// The single-certificate path.
pub struct CertificateService {
    db: Database,
    issuer: Arc<CertificateIssuer>,
    platform_name: String,
}

impl CertificateService {
    pub fn new(db: Database, issuer: Arc<CertificateIssuer>, platform_name: &str) -> Self {
        Self {
            db,
            issuer,
            platform_name: platform_name.to_string(),
        }
    }

    pub fn issue(&self, request: &IssueRequest) -> Result<IssueOutcome, CertificateError> {
        self.issuer.issue(request)
    }

    pub fn get(&self, certificate_id: &str) -> Result<Certificate, CertificateError> {
        certificate_repo::find_by_id(&self.db, certificate_id)?
            .ok_or_else(|| CertificateError::NotFound(certificate_id.to_string()))
    }

    pub fn list_for_student(&self, student_id: &str) -> Result<Vec<Certificate>, CertificateError> {
        Ok(certificate_repo::list_by_student(&self.db, student_id)?)
    }

    /// Counts the verification and reports whether the certificate is still active.
    pub fn verify(&self, access_token: &str) -> Result<VerificationResult, CertificateError> {
        if !certificate_repo::record_verification(&self.db, access_token, &Utc::now())? {
            return Err(CertificateError::NotFound(access_token.to_string()));
        }
        let certificate = certificate_repo::find_by_access_token(&self.db, access_token)?
            .ok_or_else(|| CertificateError::NotFound(access_token.to_string()))?;
        Ok(VerificationResult {
            valid: certificate.is_active(),
            certificate,
        })
    }

    /// Revokes a certificate. Revoking an already revoked certificate is a no-op.
    pub fn revoke(&self, certificate_id: &str) -> Result<Certificate, CertificateError> {
        if certificate_repo::revoke(&self.db, certificate_id, &Utc::now())? {
            log::info!("Revoked certificate {}", certificate_id);
        }
        self.get(certificate_id)
    }

    /// Removes the stored artifact, then the record. A failed artifact
    /// removal is logged and does not stop the record deletion.
    pub fn delete(&self, certificate_id: &str) -> Result<(), CertificateError> {
        let certificate = self.get(certificate_id)?;
        let blob_name = certificate_blob_name(&certificate.certificate_id);
        if let Err(e) = self.issuer.store().delete(&blob_name) {
            log::warn!("Failed to delete artifact {}: {}", blob_name, e);
        }
        certificate_repo::delete(&self.db, certificate_id)?;
        log::info!("Deleted certificate {}", certificate_id);
        Ok(())
    }

    pub fn stats(&self) -> Result<CertificateStats, CertificateError> {
        let counts = certificate_repo::counts(&self.db)?;
        Ok(CertificateStats {
            total: counts.total,
            active: counts.active,
            revoked: counts.revoked,
            top_shared: certificate_repo::top_shared(&self.db, STATS_LIMIT)?,
            recent: certificate_repo::recent(&self.db, STATS_LIMIT)?,
        })
    }

    pub fn share_url(
        &self,
        certificate_id: &str,
        platform: SharePlatform,
    ) -> Result<String, CertificateError> {
        let certificate = self.get(certificate_id)?;
        let url = platform.share_url(&ShareContext {
            certificate_url: &certificate.certificate_details.view_url,
            course_title: &certificate.course_info.title,
            platform_name: &self.platform_name,
        })?;
        Ok(url.into())
    }

    /// Builds the share URL and counts the share.
    pub fn record_share(
        &self,
        certificate_id: &str,
        platform: SharePlatform,
    ) -> Result<String, CertificateError> {
        let url = self.share_url(certificate_id, platform)?;
        certificate_repo::increment_share(&self.db, certificate_id, &Utc::now())?;
        log::debug!("Certificate {} shared on {}", certificate_id, platform);
        Ok(url)
    }
}
