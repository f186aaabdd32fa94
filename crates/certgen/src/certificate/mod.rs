pub mod issuer;
pub mod service;
pub mod social;

pub use issuer::{CertificateIssuer, CertificateLinks, IssueOutcome, IssueRequest};
pub use service::{CertificateService, CertificateStats, VerificationResult};
pub use social::{ShareContext, SharePlatform};
