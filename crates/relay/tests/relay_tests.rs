use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use camrelay_core::{CaptureFile, CaptureStatus, ObjectKey, UploadTarget};
use camrelay_relay::ledger::marker_path;
use camrelay_relay::{
    ArchiveMode, Disposition, FileIdentity, PassSummary, Relay, RelayConfig, RelayError,
    UploadError,
};
use camrelay_storage::{MemoryObjectStore, ObjectStore, StorageError};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

const BUCKET: &str = "security-cam";

fn config_for(root: &Path) -> RelayConfig {
    RelayConfig {
        source_directory: root.to_path_buf(),
        bucket: BUCKET.into(),
        ..RelayConfig::default()
    }
}

fn relay_with(config: RelayConfig) -> (Relay, Arc<MemoryObjectStore>) {
    let store = Arc::new(MemoryObjectStore::new());
    let relay = Relay::new(config, store.clone()).unwrap();
    (relay, store)
}

#[tokio::test]
async fn stable_capture_is_uploaded_and_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    let body = vec![0xA5u8; 512_000];
    fs::write(&path, &body).unwrap();
    let (mut relay, store) = relay_with(config_for(dir.path()));

    // First sighting only records an observation.
    let first = relay.run_pass().await.unwrap();
    assert!(first.is_idle());
    assert!(store.is_empty());
    assert!(path.exists());

    let second = relay.run_pass().await.unwrap();
    assert_eq!(second.uploaded, 1);
    assert!(!path.exists());

    let object = store.get(BUCKET, "cam1/2024/01/01/120000.jpg").unwrap();
    assert_eq!(object.body.len(), 512_000);
    assert_eq!(object.content_type, "image/jpeg");
    assert_eq!(object.metadata["camera"], "cam1");
    assert_eq!(object.metadata["captured-at"], "2024-01-01T12:00:00Z");
    assert_eq!(object.metadata["source-name"], "cam1_20240101_120000.jpg");
    assert_eq!(object.metadata["size"], "512000");
    assert_eq!(object.metadata["sha256"], hex::encode(Sha256::digest(&body)));
    assert!(relay.ledger().confirmed_paths().is_empty());
    assert_eq!(relay.ledger().settled(&path), Some(Disposition::Deleted));
}

#[tokio::test]
async fn uploading_a_finished_capture_again_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg").unwrap();
    let modified = fs::metadata(&path).unwrap().modified().unwrap();
    let (relay, store) = relay_with(config_for(dir.path()));
    let capture = CaptureFile::from_entry(dir.path(), &path, 4, modified).unwrap();

    let first = relay.upload(&capture).await.unwrap();
    assert!(!first.already_confirmed);
    assert_eq!(first.disposition, Disposition::Deleted);
    assert!(!path.exists());

    let second = relay.upload(&capture).await.unwrap();
    assert!(second.already_confirmed);
    assert_eq!(second.key, first.key);
    assert_eq!(second.disposition, Disposition::Deleted);
    assert_eq!(store.put_attempts(), 1);
}

#[tokio::test]
async fn growing_file_is_never_uploaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam2_20240101_130000.mp4");
    let (mut relay, store) = relay_with(config_for(dir.path()));

    for size in [10usize, 20, 30, 40] {
        fs::write(&path, vec![1u8; size]).unwrap();
        relay.run_pass().await.unwrap();
        assert_eq!(store.put_attempts(), 0);
    }

    relay.run_pass().await.unwrap();
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn uploaded_files_are_not_uploaded_again() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("cam1_20240101_120000.jpg"), b"jpeg").unwrap();
    let (mut relay, store) = relay_with(config_for(dir.path()));

    for _ in 0..4 {
        relay.run_pass().await.unwrap();
    }
    assert_eq!(store.put_attempts(), 1);
}

#[tokio::test]
async fn throttled_upload_succeeds_on_next_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg").unwrap();
    let (mut relay, store) = relay_with(config_for(dir.path()));
    store.fail_next(StorageError::Throttled);

    relay.run_pass().await.unwrap();
    let throttled = relay.run_pass().await.unwrap();
    assert_eq!(throttled.retrying, 1);
    assert!(path.exists());
    assert_eq!(relay.ledger().status(&path), CaptureStatus::Pending);
    assert_eq!(relay.ledger().record(&path).unwrap().attempts, 1);

    let retried = relay.run_pass().await.unwrap();
    assert_eq!(retried.uploaded, 1);
    assert!(!path.exists());
    assert!(store.get(BUCKET, "cam1/2024/01/01/120000.jpg").is_some());
    assert_eq!(store.put_attempts(), 2);
}

#[tokio::test]
async fn retry_limit_flags_file_failed_and_leaves_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg").unwrap();
    let config = RelayConfig {
        retry_limit: 2,
        ..config_for(dir.path())
    };
    let (mut relay, store) = relay_with(config.clone());
    store.fail_next(StorageError::Service("500 InternalError".into()));
    store.fail_next(StorageError::Connection("reset by peer".into()));

    relay.run_pass().await.unwrap();
    assert_eq!(relay.run_pass().await.unwrap().retrying, 1);
    assert_eq!(relay.run_pass().await.unwrap().failed, 1);

    assert!(path.exists());
    assert!(marker_path(&path).exists());
    assert_eq!(relay.ledger().status(&path), CaptureStatus::Failed);

    // Neither retried nor deleted on later passes.
    relay.run_pass().await.unwrap();
    relay.run_pass().await.unwrap();
    assert_eq!(store.put_attempts(), 2);
    assert!(store.is_empty());
    assert!(path.exists());

    // The flag survives a restart.
    let (mut restarted, fresh_store) = relay_with(config);
    let failed = restarted.ledger().failed_entries();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].path, path);
    assert_eq!(failed[0].attempts, 2);
    assert_eq!(
        failed[0].key.as_ref().map(ObjectKey::as_str),
        Some("cam1/2024/01/01/120000.jpg")
    );
    restarted.run_pass().await.unwrap();
    restarted.run_pass().await.unwrap();
    assert_eq!(fresh_store.put_attempts(), 0);
}

#[tokio::test]
async fn reset_failed_makes_file_pending_again() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg").unwrap();
    let config = RelayConfig {
        retry_limit: 1,
        ..config_for(dir.path())
    };
    let (mut relay, store) = relay_with(config);
    store.fail_next(StorageError::Throttled);

    relay.run_pass().await.unwrap();
    assert_eq!(relay.run_pass().await.unwrap().failed, 1);

    let reset = relay.ledger().reset_failed().await.unwrap();
    assert_eq!(reset, vec![path.clone()]);
    assert!(!marker_path(&path).exists());

    assert_eq!(relay.run_pass().await.unwrap().uploaded, 1);
    assert!(!path.exists());
}

#[tokio::test]
async fn invalid_credentials_halt_the_relay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg").unwrap();
    let (mut relay, store) = relay_with(config_for(dir.path()));
    store.fail_next(StorageError::Credentials(
        "The AWS Access Key Id you provided does not exist in our records.".into(),
    ));

    relay.run_pass().await.unwrap();
    let err = relay.run_pass().await.unwrap_err();
    assert!(matches!(
        err,
        RelayError::Permanent(UploadError::PermanentConfig {
            source: StorageError::Credentials(_),
            ..
        })
    ));

    // Nothing is lost and no attempt is charged against the file.
    assert!(path.exists());
    assert!(!marker_path(&path).exists());
    assert_eq!(relay.ledger().status(&path), CaptureStatus::Pending);
    assert_eq!(relay.ledger().record(&path).unwrap().attempts, 0);
}

#[tokio::test]
async fn run_loop_stops_on_permanent_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("cam1_20240101_120000.jpg"), b"jpeg").unwrap();
    let config = RelayConfig {
        scan_interval: Duration::from_secs(1),
        ..config_for(dir.path())
    };
    let (relay, store) = relay_with(config);
    store.fail_next(StorageError::BucketNotFound(BUCKET.into()));

    let result = tokio::time::timeout(Duration::from_secs(10), relay.run(CancellationToken::new()))
        .await
        .expect("relay should halt on its own");
    assert!(matches!(result, Err(RelayError::Permanent(_))));
}

#[tokio::test]
async fn run_loop_uploads_until_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("porch").join("cam3_20240305_081500.jpg");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"jpeg").unwrap();
    let config = RelayConfig {
        scan_interval: Duration::from_secs(1),
        ..config_for(dir.path())
    };
    let (relay, store) = relay_with(config);
    let shutdown = CancellationToken::new();

    let driver = {
        let shutdown = shutdown.clone();
        let store = Arc::clone(&store);
        async move {
            for _ in 0..100 {
                if !store.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            shutdown.cancel();
        }
    };

    let (result, ()) = tokio::join!(relay.run(shutdown), driver);
    result.unwrap();
    assert!(store.get(BUCKET, "cam3/2024/03/05/081500.jpg").is_some());
    assert!(!path.exists());
}

#[tokio::test]
async fn upload_of_confirmed_capture_only_finalizes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg").unwrap();
    let (relay, store) = relay_with(config_for(dir.path()));

    let capture = CaptureFile::from_entry(dir.path(), &path, 4, SystemTime::now()).unwrap();
    relay.ledger().begin(
        &path,
        &ObjectKey::new("cam1/2024/01/01/120000.jpg"),
        FileIdentity::of(&capture),
    );
    relay.ledger().confirm(&path);

    let confirmed = relay.upload(&capture).await.unwrap();
    assert!(confirmed.already_confirmed);
    assert_eq!(confirmed.key.as_str(), "cam1/2024/01/01/120000.jpg");
    assert_eq!(confirmed.disposition, Disposition::Deleted);
    assert_eq!(store.put_attempts(), 0);
    assert!(!path.exists());
}

#[tokio::test]
async fn file_changed_after_stability_is_a_local_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg plus more").unwrap();
    let (relay, store) = relay_with(config_for(dir.path()));

    let capture = CaptureFile::from_entry(dir.path(), &path, 4, SystemTime::now()).unwrap();
    let err = relay.upload(&capture).await.unwrap_err();
    assert!(matches!(err, UploadError::LocalIo { .. }));
    assert_eq!(store.put_attempts(), 0);
    assert_eq!(relay.ledger().status(&path), CaptureStatus::Pending);
    assert_eq!(relay.ledger().record(&path).unwrap().attempts, 0);
}

#[tokio::test]
async fn move_mode_archives_and_skips_archive_dir() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("archive");
    let path = dir.path().join("garage").join("MDAlarm_0001.jpg");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"jpeg").unwrap();
    let config = RelayConfig {
        archive: ArchiveMode::Move {
            directory: archive.clone(),
        },
        key_prefix: Some("captures".into()),
        ..config_for(dir.path())
    };
    let (mut relay, store) = relay_with(config);

    relay.run_pass().await.unwrap();
    assert_eq!(relay.run_pass().await.unwrap().uploaded, 1);

    let archived = archive.join("garage").join("MDAlarm_0001.jpg");
    assert!(archived.exists());
    assert!(!path.exists());

    relay.run_pass().await.unwrap();
    relay.run_pass().await.unwrap();
    assert_eq!(store.put_attempts(), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn concurrent_uploads_drain_a_backlog() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10 {
        let name = format!("cam1_20240101_1200{i:02}.jpg");
        fs::write(dir.path().join(name), vec![i as u8 + 1; 64]).unwrap();
    }
    let config = RelayConfig {
        max_concurrent_uploads: 4,
        ..config_for(dir.path())
    };
    let (mut relay, store) = relay_with(config);

    relay.run_pass().await.unwrap();
    let summary = relay.run_pass().await.unwrap();
    assert_eq!(
        summary,
        PassSummary {
            uploaded: 10,
            ..PassSummary::default()
        }
    );
    assert_eq!(store.len(), 10);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let err = Relay::new(
        RelayConfig {
            retry_limit: 0,
            ..config_for(dir.path())
        },
        store,
    )
    .unwrap_err();
    assert!(matches!(err, RelayError::Configuration(_)));
}

#[tokio::test]
async fn run_once_uploads_files_already_present() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg").unwrap();
    let (mut relay, store) = relay_with(config_for(dir.path()));

    let summary = relay.run_once().await.unwrap();
    assert_eq!(summary.uploaded, 1);
    assert!(store.get(BUCKET, "cam1/2024/01/01/120000.jpg").is_some());
    assert!(!path.exists());
}

#[tokio::test]
async fn removing_marker_while_running_retries_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg").unwrap();
    let config = RelayConfig {
        retry_limit: 1,
        ..config_for(dir.path())
    };
    let (mut relay, store) = relay_with(config);
    store.fail_next(StorageError::Throttled);

    relay.run_pass().await.unwrap();
    assert_eq!(relay.run_pass().await.unwrap().failed, 1);

    fs::remove_file(marker_path(&path)).unwrap();
    assert_eq!(relay.run_pass().await.unwrap().uploaded, 1);
    assert!(!path.exists());
}

#[tokio::test]
async fn same_file_name_in_different_folders_gets_distinct_keys() {
    let dir = tempfile::tempdir().unwrap();
    for folder in ["snap", "record"] {
        let folder = dir.path().join("garage").join(folder);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("MDAlarm.jpg"), b"jpeg").unwrap();
    }
    let (mut relay, store) = relay_with(config_for(dir.path()));

    relay.run_pass().await.unwrap();
    assert_eq!(relay.run_pass().await.unwrap().uploaded, 2);
    assert_eq!(store.put_attempts(), 2);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn new_file_at_a_retried_path_starts_with_no_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg").unwrap();
    let config = RelayConfig {
        retry_limit: 2,
        ..config_for(dir.path())
    };
    let (mut relay, store) = relay_with(config);
    store.fail_next(StorageError::Throttled);

    relay.run_pass().await.unwrap();
    assert_eq!(relay.run_pass().await.unwrap().retrying, 1);
    assert_eq!(relay.ledger().record(&path).unwrap().attempts, 1);

    // The camera's file goes away and its record with it.
    fs::remove_file(&path).unwrap();
    relay.run_pass().await.unwrap();
    assert!(relay.ledger().record(&path).is_none());
    assert!(relay.ledger().is_empty());

    // A new capture with the same name gets a full retry budget.
    fs::write(&path, b"another jpeg").unwrap();
    store.fail_next(StorageError::Throttled);
    relay.run_pass().await.unwrap();
    let summary = relay.run_pass().await.unwrap();
    assert_eq!(summary.retrying, 1);
    assert_eq!(summary.failed, 0);
    assert!(!marker_path(&path).exists());
    assert_eq!(relay.ledger().record(&path).unwrap().attempts, 1);

    assert_eq!(relay.run_pass().await.unwrap().uploaded, 1);
    assert_eq!(store.get(BUCKET, "cam1/2024/01/01/120000.jpg").unwrap().body.len(), 12);
}

/// Accepts writes but never answers.
struct StalledStore;

impl ObjectStore for StalledStore {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn put_object(&self, _target: &UploadTarget, _body: Bytes) -> Result<(), StorageError> {
        std::future::pending().await
    }

    async fn health_check(&self, _bucket: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_upload_times_out_and_is_retried_later() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cam1_20240101_120000.jpg");
    fs::write(&path, b"jpeg").unwrap();
    let mut relay = Relay::new(config_for(dir.path()), Arc::new(StalledStore)).unwrap();

    relay.run_pass().await.unwrap();
    let summary = relay.run_pass().await.unwrap();
    assert_eq!(summary.retrying, 1);
    assert_eq!(summary.uploaded, 0);
    assert!(path.exists());

    let record = relay.ledger().record(&path).unwrap();
    assert_eq!(record.status, CaptureStatus::Pending);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.last_error.as_deref(), Some("timed out: upload exceeded 60s"));
}
