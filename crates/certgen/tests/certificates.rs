//! Tests for the single-certificate path: issue, verify, revoke, delete,
//! statistics and sharing.

mod common;

use certgen::certificate::SharePlatform;
use certgen::error::CertificateError;
use certgen::model::CertificateStatus;

use common::{issue_request, BatchRequestBuilder, TestHarness};

#[test]
fn test_issue_then_reissue_returns_existing() {
    let harness = TestHarness::new();
    let service = harness.certificates();

    let first = service.issue(&issue_request("alice", "rust-101")).unwrap();
    assert!(first.created);
    assert_eq!(
        first.certificate.certificate_details.status,
        CertificateStatus::Active
    );
    assert_eq!(first.certificate.metadata.generated_by, "integration-test");
    assert!(harness
        .blob_path(&first.certificate.certificate_id)
        .exists());

    let second = service.issue(&issue_request("alice", "rust-101")).unwrap();
    assert!(!second.created);
    assert_eq!(
        second.certificate.certificate_id,
        first.certificate.certificate_id
    );
    assert_eq!(harness.renderer.total_calls(), 1);
}

#[test]
fn test_single_and_batch_paths_share_uniqueness() {
    let harness = TestHarness::new();
    let issued = harness
        .certificates()
        .issue(&issue_request("stu-0", "rust-101"))
        .unwrap();

    let (_, job) = harness.run_batch(BatchRequestBuilder::new("rust-101").students(2).build());
    assert_eq!(
        job.students[0].certificate_id.as_deref(),
        Some(issued.certificate.certificate_id.as_str())
    );
    assert_eq!(harness.certificate_count(), 2);
}

#[test]
fn test_get_and_list_for_student() {
    let harness = TestHarness::new();
    let service = harness.certificates();
    service.issue(&issue_request("alice", "rust-101")).unwrap();
    service.issue(&issue_request("alice", "rust-201")).unwrap();
    service.issue(&issue_request("bob", "rust-101")).unwrap();

    let alice = service.list_for_student("alice").unwrap();
    assert_eq!(alice.len(), 2);
    assert!(alice.iter().all(|c| c.student_info.student_id == "alice"));

    assert!(matches!(
        service.get("CERT-DOESNOTEXIST"),
        Err(CertificateError::NotFound(_))
    ));
}

#[test]
fn test_verify_counts_and_revoke_invalidates() {
    let harness = TestHarness::new();
    let service = harness.certificates();
    let certificate = service
        .issue(&issue_request("alice", "rust-101"))
        .unwrap()
        .certificate;
    let token = certificate.certificate_details.access_token.clone();

    let first = service.verify(&token).unwrap();
    assert!(first.valid);
    assert_eq!(first.certificate.verification.count, 1);
    assert!(first.certificate.verification.last_verified.is_some());

    let revoked = service.revoke(&certificate.certificate_id).unwrap();
    assert_eq!(
        revoked.certificate_details.status,
        CertificateStatus::Revoked
    );
    let again = service.revoke(&certificate.certificate_id).unwrap();
    assert_eq!(again.certificate_details.status, CertificateStatus::Revoked);

    let second = service.verify(&token).unwrap();
    assert!(!second.valid);
    assert_eq!(second.certificate.verification.count, 2);

    assert!(matches!(
        service.verify("0123456789abcdef0123456789abcdef"),
        Err(CertificateError::NotFound(_))
    ));
}

#[test]
fn test_delete_removes_record_and_blob() {
    let harness = TestHarness::new();
    let service = harness.certificates();
    let certificate = service
        .issue(&issue_request("alice", "rust-101"))
        .unwrap()
        .certificate;
    let blob = harness.blob_path(&certificate.certificate_id);
    assert!(blob.exists());

    service.delete(&certificate.certificate_id).unwrap();
    assert!(!blob.exists());
    assert!(matches!(
        service.get(&certificate.certificate_id),
        Err(CertificateError::NotFound(_))
    ));
    assert!(matches!(
        service.delete(&certificate.certificate_id),
        Err(CertificateError::NotFound(_))
    ));

    // The pair can be issued again once deleted.
    assert!(service
        .issue(&issue_request("alice", "rust-101"))
        .unwrap()
        .created);
}

#[test]
fn test_stats_and_sharing() {
    let harness = TestHarness::new();
    let service = harness.certificates();
    let a = service
        .issue(&issue_request("alice", "rust-101"))
        .unwrap()
        .certificate;
    let b = service
        .issue(&issue_request("bob", "rust-101"))
        .unwrap()
        .certificate;
    service.issue(&issue_request("carol", "rust-101")).unwrap();
    service.revoke(&b.certificate_id).unwrap();

    let url = service
        .record_share(&a.certificate_id, SharePlatform::Linkedin)
        .unwrap();
    assert!(url.starts_with("https://www.linkedin.com/"));
    assert!(url.contains("learn.example.com"));
    service
        .record_share(&a.certificate_id, SharePlatform::Twitter)
        .unwrap();
    service
        .record_share(&b.certificate_id, SharePlatform::Whatsapp)
        .unwrap();

    let shared = service.get(&a.certificate_id).unwrap();
    assert_eq!(shared.social_sharing.share_count, 2);
    assert!(shared.social_sharing.last_shared.is_some());

    let stats = service.stats().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.active, 2);
    assert_eq!(stats.revoked, 1);
    assert_eq!(stats.top_shared.len(), 2);
    assert_eq!(stats.top_shared[0].certificate_id, a.certificate_id);
    assert_eq!(stats.recent.len(), 3);

    // Building a share URL alone does not count as a share.
    service
        .share_url(&a.certificate_id, SharePlatform::Facebook)
        .unwrap();
    assert_eq!(
        service
            .get(&a.certificate_id)
            .unwrap()
            .social_sharing
            .share_count,
        2
    );
}

#[test]
fn test_unknown_platform_is_rejected() {
    assert!("myspace".parse::<SharePlatform>().is_err());
    assert_eq!(
        "LinkedIn".parse::<SharePlatform>().unwrap(),
        SharePlatform::Linkedin
    );
}
