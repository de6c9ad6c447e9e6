//! Unit tests for data models

use std::path::PathBuf;

use modelgate_local_models::{ArtifactStatus, ModelArtifact, ModelId, PullProgress};

fn progress(total: u64, completed: u64) -> PullProgress {
    PullProgress {
        model: "mistral".to_string(),
        status: "downloading".to_string(),
        digest: Some("abc123".to_string()),
        total,
        completed,
    }
}

#[test]
fn test_pull_progress_percentage() {
    assert_eq!(progress(1000, 500).percentage(), 50.0);
    assert_eq!(progress(1000, 250).percentage(), 25.0);
}

#[test]
fn test_pull_progress_complete() {
    assert!(progress(1000, 1000).is_complete());
    assert!(!progress(1000, 500).is_complete());
}

#[test]
fn test_pull_progress_zero_total() {
    let p = progress(0, 0);
    assert_eq!(p.percentage(), 0.0);
    assert!(!p.is_complete());
}

#[test]
fn test_missing_artifact_record() {
    let id = ModelId::parse("phi-2").unwrap();
    let artifact = ModelArtifact::missing(id.clone(), PathBuf::from("/models/phi-2"));

    assert_eq!(artifact.id, id);
    assert_eq!(artifact.status, ArtifactStatus::Missing);
    assert_eq!(artifact.attempts, 0);
    assert!(!artifact.is_ready());
}

#[test]
fn test_artifact_serializes_status_lowercase() {
    let id = ModelId::parse("phi-2").unwrap();
    let artifact = ModelArtifact::missing(id, PathBuf::from("/models/phi-2"));
    let json = serde_json::to_value(&artifact).unwrap();

    assert_eq!(json["id"], "phi-2");
    assert_eq!(json["status"], "missing");
}
