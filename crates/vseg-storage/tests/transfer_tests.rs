//! Transfer manager behavior against mock storage endpoints.

use std::time::Duration;

use vseg_storage::signer;
use vseg_storage::{Credential, RetryPolicy, StorageConfig, StorageError, TransferManager};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credential() -> Credential {
    Credential::new("AKIDtest", "test-secret").unwrap()
}

fn config_for(hosts: Vec<String>, attempts: u32) -> StorageConfig {
    let mut config = StorageConfig::new(credential(), "bucket-1250000000", "ap-beijing");
    config.scheme = "http".to_string();
    config.probe_domains = false;
    config.domains_override = Some(hosts);
    config.retry = RetryPolicy::new("transfer")
        .with_max_attempts(attempts)
        .with_backoff(vec![Duration::from_millis(1)])
        .with_timeouts(vec![Duration::from_secs(5)]);
    config
}

fn host_of(server: &MockServer) -> String {
    server.address().to_string()
}

#[tokio::test]
async fn upload_then_download_returns_identical_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/input/video_1.mp4"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("video.mp4");
    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    tokio::fs::write(&source, &payload).await.unwrap();

    let manager = TransferManager::new(config_for(vec![host_of(&server)], 3)).unwrap();
    let receipt = manager.upload(&source, "input/video_1.mp4").await.unwrap();
    assert_eq!(receipt.bytes, payload.len() as u64);
    assert_eq!(receipt.attempts, 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let put = &requests[0];
    assert_eq!(put.body, payload);
    assert_eq!(put.headers.get("content-type").unwrap().to_str().unwrap(), "video/mp4");
    assert!(put.headers.get("date").unwrap().to_str().unwrap().ends_with("GMT"));

    let authorization = put.headers.get("authorization").unwrap().to_str().unwrap();
    let now = chrono::Utc::now().timestamp();
    assert!(signer::verify(&credential(), authorization, "PUT", "/input/video_1.mp4", &host_of(&server), now).unwrap());

    Mock::given(method("GET"))
        .and(path("/input/video_1.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(put.body.clone()))
        .mount(&server)
        .await;

    let target = dir.path().join("nested").join("copy.mp4");
    let receipt = manager.download("input/video_1.mp4", &target).await.unwrap();
    assert_eq!(receipt.bytes, payload.len() as u64);
    assert_eq!(tokio::fs::read(&target).await.unwrap(), payload);

    // No partial files left behind.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn failed_rename_leaves_no_partial_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/output/processed_1.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"segmented".to_vec()))
        .mount(&server)
        .await;

    // A non-empty directory at the target path makes the final rename fail.
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("copy.mp4");
    std::fs::create_dir(&target).unwrap();
    std::fs::write(target.join("occupied"), b"x").unwrap();

    let manager = TransferManager::new(config_for(vec![host_of(&server)], 2)).unwrap();
    assert!(manager.download("output/processed_1.mp4", &target).await.is_err());
    assert!(!server.received_requests().await.unwrap().is_empty());

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty(), "partial files left: {leftovers:?}");
}

#[tokio::test]
async fn forbidden_aborts_after_single_call() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("video.mp4");
    tokio::fs::write(&source, b"data").await.unwrap();

    let port = server.address().port();
    let hosts = vec![host_of(&server), format!("localhost:{}", port)];
    let manager = TransferManager::new(config_for(hosts, 5)).unwrap();

    let err = manager.upload(&source, "input/video.mp4").await.unwrap_err();
    assert!(matches!(err, StorageError::PermissionDenied(_)));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_object_aborts_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.mp4");
    let manager = TransferManager::new(config_for(vec![host_of(&server)], 5)).unwrap();

    let err = manager.download("output/missing.mp4", &target).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(!target.exists());
}

#[tokio::test]
async fn persistent_timeouts_exhaust_every_domain_and_round() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("video.mp4");
    tokio::fs::write(&source, b"data").await.unwrap();

    let port = server.address().port();
    let hosts = vec![host_of(&server), format!("localhost:{}", port)];
    let mut config = config_for(hosts, 3);
    config.retry = config.retry.with_timeouts(vec![Duration::from_millis(50)]);
    let manager = TransferManager::new(config).unwrap();

    let err = manager.upload(&source, "input/video.mp4").await.unwrap_err();
    match err {
        StorageError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 6),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 6);
}

#[tokio::test]
async fn server_error_moves_to_next_domain() {
    let failing = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("slow down"))
        .mount(&failing)
        .await;

    let healthy = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&healthy)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bg.png");
    tokio::fs::write(&source, b"png").await.unwrap();

    let manager = TransferManager::new(config_for(vec![host_of(&failing), host_of(&healthy)], 3)).unwrap();
    let receipt = manager.upload(&source, "backgrounds/bg.png").await.unwrap();

    assert_eq!(receipt.host, host_of(&healthy));
    assert_eq!(receipt.attempts, 2);
    assert_eq!(failing.received_requests().await.unwrap().len(), 1);
    let requests = healthy.received_requests().await.unwrap();
    assert_eq!(requests[0].headers.get("content-type").unwrap().to_str().unwrap(), "image/png");
}

#[tokio::test]
async fn transient_failure_recovers_in_next_round() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"processed".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("processed.mp4");
    let manager = TransferManager::new(config_for(vec![host_of(&server)], 3)).unwrap();

    let receipt = manager.download("output/processed.mp4", &target).await.unwrap();
    assert_eq!(receipt.attempts, 2);
    assert_eq!(tokio::fs::read(&target).await.unwrap(), b"processed");
}
