pub mod batch;
pub mod certificate;

pub use batch::{
    percentage, BatchDetails, BatchJob, BatchJobSummary, BatchOptions, BatchPage, JobStatus,
    Pagination, Priority, Progress, Requester, RosterEntry, StudentStatus,
};
pub use certificate::{
    ArtifactMetadata, Certificate, CertificateDetails, CertificateStatus, CourseInfo,
    SocialSharing, StudentInfo, Verification,
};
