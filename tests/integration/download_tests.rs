//! Integration tests for the gateway and the downloader
//!
//! These tests use wiremock to simulate a blocking tour host and check the
//! block handling, retry bounds and resume behaviour end-to-end.

use reqwest::StatusCode;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tour_mirror::config::{Config, DownloadConfig, RequestConfig, TourConfig};
use tour_mirror::crawler::{AntiWafGateway, Downloader, FetchOptions, TaskQueue, TileOutcome};
use tour_mirror::mirror::{run_mirror, MirrorOptions, REPORT_FILE};
use tour_mirror::storage::ResumableLog;
use tour_mirror::{FileStatus, MirrorError, StatusUpdate, TileTask};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with no pacing delays
fn create_test_config(base_url: String, output_dir: &Path) -> Config {
    Config {
        tour: TourConfig {
            base_url,
            xml_file: "tour.xml".to_string(),
            base_files: vec!["index.html".to_string(), "tour.js".to_string()],
            reserved_prefix: "/tour/".to_string(),
        },
        download: DownloadConfig {
            output_dir: output_dir.to_path_buf(),
            max_parallel: 2,
            max_retries: 2,
            log_file: "download_log.json".to_string(),
        },
        request: RequestConfig {
            base_delay_ms: 0,
            jitter_ms: 0,
            retry_backoff_base: 1,
            user_agents: vec!["TestAgent/1.0".to_string()],
            block_wait_ms: [1, 2],
            error_wait_ms: [1, 2],
            ..RequestConfig::default()
        },
    }
}

struct Harness {
    gateway: Arc<AntiWafGateway>,
    downloader: Downloader,
    log: Arc<ResumableLog>,
}

async fn create_harness(config: &Config) -> Harness {
    let log = Arc::new(ResumableLog::open(config.log_path()).await);
    let gateway = Arc::new(AntiWafGateway::new(config, Arc::clone(&log)).unwrap());
    let queue = TaskQueue::new(config.download.max_parallel);
    let downloader = Downloader::new(config, Arc::clone(&gateway), Arc::clone(&log), queue);
    Harness {
        gateway,
        downloader,
        log,
    }
}

fn tile(base_url: &str, name: &str, out: &Path) -> TileTask {
    TileTask {
        url: format!("{}panos/{}", base_url, name),
        local_path: out.join("s1/cube/f/l1").join(name),
        relative_path: format!("panos/{}", name),
        scene_name: "s1".to_string(),
    }
}

async fn mount_bytes(server: &MockServer, route: &str, body: &[u8], expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_without_block_retry_returns_blocked_response() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/tour/a.jpg"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config(base_url.clone(), temp_dir.path());
    let harness = create_harness(&config).await;

    let url = format!("{}a.jpg", base_url);
    let response = harness
        .gateway
        .fetch(&url, &FetchOptions::no_block_retry())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let entry = harness.log.file_status(&url).await.unwrap();
    assert_eq!(entry.status, FileStatus::Blocked);
    assert_eq!(entry.code, Some(429));
}

#[tokio::test]
async fn test_fetch_waits_out_block() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/tour/tour.xml"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tour/tour.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<krpano/>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config(base_url.clone(), temp_dir.path());
    let harness = create_harness(&config).await;

    let url = format!("{}tour.xml", base_url);
    let response = harness
        .gateway
        .fetch(&url, &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "<krpano/>");
    assert_eq!(
        harness.log.file_status(&url).await.unwrap().status,
        FileStatus::Blocked
    );
}

#[tokio::test]
async fn test_fetch_attempt_ceiling() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/tour/a.jpg"))
        .respond_with(ResponseTemplate::new(403))
        .expect(3)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(base_url.clone(), temp_dir.path());
    config.request.max_fetch_attempts = Some(3);
    let harness = create_harness(&config).await;

    let response = harness
        .gateway
        .fetch(&format!("{}a.jpg", base_url), &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_fetch_transport_error_is_logged() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config("http://127.0.0.1:1/tour/".to_string(), temp_dir.path());
    let harness = create_harness(&config).await;

    let url = "http://127.0.0.1:1/tour/a.jpg";
    let options = FetchOptions {
        max_attempts: Some(2),
        ..FetchOptions::default()
    };
    let result = harness.gateway.fetch(url, &options).await;

    assert!(matches!(result, Err(MirrorError::Transport { .. })));
    let entry = harness.log.file_status(url).await.unwrap();
    assert_eq!(entry.status, FileStatus::Error);
    assert!(entry.error.is_some());
}

#[tokio::test]
async fn test_cancellation_aborts_block_wait() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/tour/tour.xml"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(base_url.clone(), temp_dir.path());
    config.request.block_wait_ms = [60_000, 60_001];

    let log = Arc::new(ResumableLog::open(config.log_path()).await);
    let token = CancellationToken::new();
    let gateway = AntiWafGateway::new(&config, log)
        .unwrap()
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        token.cancel();
    });

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        gateway.fetch(&format!("{}tour.xml", base_url), &FetchOptions::default()),
    )
    .await
    .expect("cancellation should end the wait");

    assert!(matches!(result, Err(MirrorError::Cancelled { .. })));
    canceller.await.unwrap();
}

/// Tile A is new, B has a `downloaded` log entry but no file, C is on disk
#[tokio::test]
async fn test_tile_resume_uses_file_existence() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    mount_bytes(&mock_server, "/tour/panos/a.jpg", b"tile-a", 1).await;
    mount_bytes(&mock_server, "/tour/panos/b.jpg", b"tile-b", 1).await;
    mount_bytes(&mock_server, "/tour/panos/c.jpg", b"tile-c", 0).await;

    let temp_dir = tempfile::tempdir().unwrap();
    let out = temp_dir.path();
    let config = create_test_config(base_url.clone(), out);
    let harness = create_harness(&config).await;

    let tile_a = tile(&base_url, "a.jpg", out);
    let tile_b = tile(&base_url, "b.jpg", out);
    let tile_c = tile(&base_url, "c.jpg", out);

    harness
        .log
        .log_file_status(&tile_b.url, StatusUpdate::downloaded(6))
        .await;
    std::fs::create_dir_all(tile_c.local_path.parent().unwrap()).unwrap();
    std::fs::write(&tile_c.local_path, b"old-c").unwrap();

    harness
        .downloader
        .download_tiles(vec![tile_a.clone(), tile_b.clone(), tile_c.clone()])
        .await;

    let entry_a = harness.log.file_status(&tile_a.url).await.unwrap();
    assert_eq!(entry_a.status, FileStatus::Downloaded);
    assert_eq!(entry_a.size, Some(6));
    assert_eq!(entry_a.attempts, Some(1));
    assert_eq!(std::fs::read(&tile_a.local_path).unwrap(), b"tile-a");

    let entry_b = harness.log.file_status(&tile_b.url).await.unwrap();
    assert_eq!(entry_b.status, FileStatus::Downloaded);
    assert_eq!(std::fs::read(&tile_b.local_path).unwrap(), b"tile-b");

    let entry_c = harness.log.file_status(&tile_c.url).await.unwrap();
    assert_eq!(entry_c.status, FileStatus::AlreadyExists);
    assert_eq!(std::fs::read(&tile_c.local_path).unwrap(), b"old-c");
}

#[tokio::test]
async fn test_tile_retries_are_bounded() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    // One initial attempt plus max_retries
    Mock::given(method("GET"))
        .and(path("/tour/panos/bad.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config(base_url.clone(), temp_dir.path());
    let harness = create_harness(&config).await;

    let bad = tile(&base_url, "bad.jpg", temp_dir.path());
    let outcome = harness.downloader.download_tile(&bad).await;

    assert_eq!(
        outcome,
        TileOutcome::Failed {
            attempts: 3,
            backoff_ms: 2 + 4,
        }
    );
    let entry = harness.log.file_status(&bad.url).await.unwrap();
    assert_eq!(entry.status, FileStatus::Failed);
    assert!(entry.error.unwrap().contains("500"));
    assert!(!bad.local_path.exists());
}

#[tokio::test]
async fn test_tile_recovers_after_transient_error() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/tour/panos/flaky.jpg"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_bytes(&mock_server, "/tour/panos/flaky.jpg", b"ok", 1).await;

    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config(base_url.clone(), temp_dir.path());
    let harness = create_harness(&config).await;

    let flaky = tile(&base_url, "flaky.jpg", temp_dir.path());
    let outcome = harness.downloader.download_tile(&flaky).await;

    assert_eq!(
        outcome,
        TileOutcome::Downloaded {
            attempts: 2,
            backoff_ms: 2,
        }
    );
    let entry = harness.log.file_status(&flaky.url).await.unwrap();
    assert_eq!(entry.status, FileStatus::Downloaded);
    assert_eq!(entry.attempts, Some(2));
}

#[tokio::test]
async fn test_blocked_tile_is_skipped_without_retry() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/tour/panos/blocked.jpg"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config(base_url.clone(), temp_dir.path());
    let harness = create_harness(&config).await;

    let blocked = tile(&base_url, "blocked.jpg", temp_dir.path());
    let outcome = harness.downloader.download_tile(&blocked).await;

    assert_eq!(outcome, TileOutcome::Skipped);
    let entry = harness.log.file_status(&blocked.url).await.unwrap();
    assert_eq!(entry.status, FileStatus::Skipped);
    assert_eq!(entry.code, Some(403));
}

#[tokio::test]
async fn test_base_files_skip_existing_and_tolerate_failures() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    mount_bytes(&mock_server, "/tour/index.html", b"<html></html>", 0).await;
    mount_bytes(&mock_server, "/tour/tour.js", b"var tour;", 1).await;

    Mock::given(method("GET"))
        .and(path("/tour/krpano.js"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let out = temp_dir.path();
    std::fs::write(out.join("index.html"), b"local").unwrap();

    let config = create_test_config(base_url.clone(), out);
    let harness = create_harness(&config).await;

    harness
        .downloader
        .download_base_files(&["index.html", "tour.js", "krpano.js"])
        .await;

    assert_eq!(std::fs::read(out.join("index.html")).unwrap(), b"local");
    assert_eq!(std::fs::read(out.join("tour.js")).unwrap(), b"var tour;");
    assert!(!out.join("krpano.js").exists());

    let entry = harness
        .log
        .file_status(&format!("{}tour.js", base_url))
        .await
        .unwrap();
    assert_eq!(entry.status, FileStatus::Downloaded);
    assert_eq!(entry.size, Some(9));
    assert!(harness
        .log
        .file_status(&format!("{}index.html", base_url))
        .await
        .is_none());
}

#[tokio::test]
async fn test_manifest_skipped_when_present() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    mount_bytes(&mock_server, "/tour/tour.xml", b"<krpano/>", 0).await;

    let temp_dir = tempfile::tempdir().unwrap();
    let out = temp_dir.path();
    std::fs::write(out.join("tour.xml"), b"<krpano></krpano>").unwrap();

    let config = create_test_config(base_url, out);
    let harness = create_harness(&config).await;

    let manifest = harness.downloader.download_main_xml().await.unwrap();
    assert_eq!(manifest, out.join("tour.xml"));
}

#[tokio::test]
async fn test_manifest_http_error_is_fatal() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/tour/tour.xml"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_test_config(base_url, temp_dir.path());
    let harness = create_harness(&config).await;

    let result = harness.downloader.download_main_xml().await;
    assert!(matches!(
        result,
        Err(MirrorError::HttpStatus { status: 404, .. })
    ));
    assert!(!temp_dir.path().join("tour.xml").exists());
}

#[tokio::test]
async fn test_tile_backoff_doubles_per_attempt() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/tour/panos/slow.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(base_url.clone(), temp_dir.path());
    config.request.retry_backoff_base = 5;
    config.download.max_retries = 3;
    let harness = create_harness(&config).await;

    let slow = tile(&base_url, "slow.jpg", temp_dir.path());
    let started = std::time::Instant::now();
    let outcome = harness.downloader.download_tile(&slow).await;

    // Retry n waits base * 2^n: 10ms, 20ms, 40ms
    assert_eq!(
        outcome,
        TileOutcome::Failed {
            attempts: 4,
            backoff_ms: 10 + 20 + 40,
        }
    );
    assert!(started.elapsed() >= std::time::Duration::from_millis(70));
}

#[tokio::test]
async fn test_cancel_interrupts_tile_backoff() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/tour/panos/down.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(base_url.clone(), temp_dir.path());
    config.request.retry_backoff_base = 60_000;

    let token = CancellationToken::new();
    let log = Arc::new(ResumableLog::open(config.log_path()).await);
    let gateway = Arc::new(
        AntiWafGateway::new(&config, Arc::clone(&log))
            .unwrap()
            .with_cancellation(token.clone()),
    );
    let downloader = Downloader::new(&config, gateway, Arc::clone(&log), TaskQueue::new(1));

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        token.cancel();
    });

    let down = tile(&base_url, "down.jpg", temp_dir.path());
    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        downloader.download_tile(&down),
    )
    .await
    .expect("backoff should end on cancellation");

    assert_eq!(outcome, TileOutcome::Cancelled);
    assert!(!down.local_path.exists());
    canceller.await.unwrap();
}

#[tokio::test]
async fn test_run_mirror_tile_mode() {
    let mock_server = MockServer::start().await;
    let base_url = format!("{}/tour/", mock_server.uri());

    let manifest = r#"<krpano>
      <scene name="s1"><cube><face name="f"><level name="l1">
        <tile url="panos/t1.jpg" />
        <tile url="panos/t2.jpg" />
      </level></face></cube></scene>
    </krpano>"#;

    mount_bytes(&mock_server, "/tour/index.html", b"<html></html>", 1).await;
    mount_bytes(&mock_server, "/tour/tour.js", b"var tour;", 1).await;
    mount_bytes(&mock_server, "/tour/tour.xml", manifest.as_bytes(), 1).await;
    mount_bytes(&mock_server, "/tour/panos/t1.jpg", b"t1", 1).await;
    mount_bytes(&mock_server, "/tour/panos/t2.jpg", b"t2", 1).await;

    let temp_dir = tempfile::tempdir().unwrap();
    let out = temp_dir.path().join("mirror");
    let config = create_test_config(base_url, &out);

    let stats = run_mirror(
        &config,
        MirrorOptions { skip_crawl: true },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(stats.total, 5);
    assert_eq!(stats.downloaded, 5);
    assert_eq!(stats.failed, 0);
    assert_eq!(std::fs::read(out.join("s1/cube/f/l1/t1.jpg")).unwrap(), b"t1");
    assert!(out.join("tour.xml").exists());
    assert!(out.join("download_log.json").exists());
    assert!(out.join(REPORT_FILE).exists());

    // A second run finds everything on disk and fetches nothing new
    let stats = run_mirror(
        &config,
        MirrorOptions { skip_crawl: true },
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(stats.already_exists, 2);
    assert_eq!(stats.downloaded, 3);
}
