//! End-to-end carve tests.
//!
//! Each test carves real files from a temporary directory and uploads them
//! to a wiremock server speaking the carve begin/continue protocol.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_carver::carver::CarveSession;
use rust_carver::config::{CarverConfig, ExfilConfig, ExfilMode};
use rust_carver::dispatch::Dispatcher;
use rust_carver::exfil::build_exfiltrator;
use rust_carver::models::{CarveRecord, CarveRequest, CarveStatus};
use rust_carver::store::{load_record, FileStore};

fn write_source(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join("src").join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
    fs::write(&path, data).unwrap();
    path
}

fn carver_config(dir: &Path, server: &MockServer) -> CarverConfig {
    CarverConfig {
        block_size: 8192,
        staging_root: dir.join("staging"),
        store_path: dir.join("db"),
        retain_artifacts: true,
        exfil: ExfilConfig {
            base_url: Some(server.uri()),
            node_key: Some("node-key-1".to_string()),
            chunk_size: 10_000,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
            ..ExfilConfig::default()
        },
        ..CarverConfig::default()
    }
}

async fn mount_begin(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/carve_init"))
        .respond_with(
            ResponseTemplate::new(status).set_body_json(json!({"session_id": "sess-1", "success": status == 200})),
        )
        .mount(server)
        .await;
}

async fn mount_continue(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/carve_block"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(server)
        .await;
}

/// Run one carve through a dispatcher backed by a `FileStore`.
async fn run_carve(config: CarverConfig, sources: &[PathBuf]) -> (CarveStatus, CarveRecord) {
    let store = Arc::new(FileStore::open(&config.store_path).unwrap());
    let exfil = build_exfiltrator(&config.exfil).unwrap();
    let dispatcher = Dispatcher::new(config.clone(), store, exfil).unwrap();

    let patterns: Vec<String> = sources.iter().map(|p| p.display().to_string()).collect();
    let ticket = dispatcher.carve_paths_for_request(&patterns, "query-7").unwrap();
    let guid = ticket.guid.clone();
    let status = ticket.wait().await.unwrap();

    // reopen to read what actually reached disk
    let store = FileStore::open(&config.store_path).unwrap();
    let record = load_record(&store, &guid).unwrap().unwrap();
    (status, record)
}

async fn requests_to(server: &MockServer, endpoint: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == endpoint)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

/// File name -> contents of every member of a gzipped tar.
fn archive_members(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(fs::File::open(path).unwrap()));
    let mut members = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry
            .path()
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        members.insert(name, data);
    }
    members
}

#[tokio::test]
async fn test_three_files_carved_and_uploaded() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_begin(&server, 200).await;
    mount_continue(&server).await;

    let sources = vec![
        write_source(dir.path(), "empty.bin", 0),
        write_source(dir.path(), "under.bin", 8191),
        write_source(dir.path(), "over.bin", 16385),
    ];
    let (status, record) = run_carve(carver_config(dir.path(), &server), &sources).await;

    assert_eq!(status, CarveStatus::Succeeded);
    assert_eq!(record.status, CarveStatus::Succeeded);
    assert_eq!(record.request_id, "query-7");
    assert_eq!(record.file_count, 3);
    assert_eq!(record.bytes_collected, 8191 + 16385);
    assert!(record.failed_paths.is_empty());

    let artifact = record.compressed_path.clone().unwrap();
    let shipped = fs::read(&artifact).unwrap();
    assert_eq!(record.carve_size, shipped.len() as u64);

    let begins = requests_to(&server, "/carve_init").await;
    assert_eq!(begins.len(), 1);
    let begin = &begins[0];
    let expected_chunks = (shipped.len() as u64 + 9_999) / 10_000;
    assert_eq!(begin["carve_id"], record.guid.as_str());
    assert_eq!(begin["request_id"], "query-7");
    assert_eq!(begin["node_key"], "node-key-1");
    assert_eq!(begin["carve_size"], shipped.len() as u64);
    assert_eq!(begin["block_size"], 10_000);
    assert_eq!(begin["block_count"], expected_chunks);

    let chunks = requests_to(&server, "/carve_block").await;
    assert_eq!(chunks.len() as u64, expected_chunks);
    assert_eq!(record.chunk_count, expected_chunks);
    assert_eq!(record.chunks_sent, expected_chunks);

    let mut reassembled = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk["block_id"], i as u64);
        assert_eq!(chunk["session_id"], "sess-1");
        assert_eq!(chunk["request_id"], "query-7");
        reassembled.extend(BASE64.decode(chunk["data"].as_str().unwrap()).unwrap());
    }
    assert_eq!(reassembled, shipped);

    let members = archive_members(&artifact);
    assert_eq!(members.len(), 3);
    for source in &sources {
        let name = source.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(members[&name], fs::read(source).unwrap());
    }
}

#[tokio::test]
async fn test_missing_file_is_skipped() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_begin(&server, 200).await;
    mount_continue(&server).await;

    let config = carver_config(dir.path(), &server);
    let missing = dir.path().join("src").join("missing.bin");
    let request = CarveRequest::new(
        vec![
            write_source(dir.path(), "a.bin", 100),
            missing.clone(),
            write_source(dir.path(), "b.bin", 200),
        ],
        "guid-missing",
        "query-8",
    );
    let store = Arc::new(FileStore::open(&config.store_path).unwrap());
    let exfil = build_exfiltrator(&config.exfil).unwrap();
    let mut session = CarveSession::new(request, config, store.clone(), exfil).unwrap();

    assert_eq!(session.start().await, CarveStatus::Succeeded);

    let record = load_record(store.as_ref(), "guid-missing").unwrap().unwrap();
    assert_eq!(record.status, CarveStatus::Succeeded);
    assert_eq!(record.requested_count, 3);
    assert_eq!(record.file_count, 2);
    assert_eq!(record.failed_paths, vec![missing]);

    let members = archive_members(record.compressed_path.as_ref().unwrap());
    assert_eq!(members.keys().cloned().collect::<Vec<_>>(), vec!["a.bin", "b.bin"]);
}

#[tokio::test]
async fn test_begin_failure_sends_no_chunks() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_begin(&server, 500).await;
    Mock::given(method("POST"))
        .and(path("/carve_block"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = carver_config(dir.path(), &server);
    config.retain_artifacts = false;
    let sources = vec![write_source(dir.path(), "a.bin", 5000)];
    let (status, record) = run_carve(config, &sources).await;

    assert_eq!(status, CarveStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("500"));
    assert_eq!(record.chunks_sent, 0);
    assert!(record.staging_dir.as_ref().unwrap().is_dir());
    assert!(record.compressed_path.as_ref().unwrap().is_file());
    assert!(requests_to(&server, "/carve_block").await.is_empty());
}

#[tokio::test]
async fn test_failed_chunk_is_retried() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_begin(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/carve_block"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_continue(&server).await;

    let mut config = carver_config(dir.path(), &server);
    config.retain_artifacts = false;
    let sources = vec![write_source(dir.path(), "a.bin", 40_000)];
    let (status, record) = run_carve(config, &sources).await;

    assert_eq!(status, CarveStatus::Succeeded);
    let chunks = requests_to(&server, "/carve_block").await;
    assert_eq!(chunks.len() as u64, record.chunk_count + 1);
    assert_eq!(chunks[0]["block_id"], 0);
    assert_eq!(chunks[1]["block_id"], 0);
    assert!(!record.staging_dir.as_ref().unwrap().exists());
}

#[tokio::test]
async fn test_retries_exhausted_fails_carve() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_begin(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/carve_block"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut config = carver_config(dir.path(), &server);
    config.exfil.max_chunk_retries = 2;
    let sources = vec![write_source(dir.path(), "a.bin", 100)];
    let (status, record) = run_carve(config, &sources).await;

    assert_eq!(status, CarveStatus::Failed);
    assert_eq!(requests_to(&server, "/carve_block").await.len(), 3);
    assert!(record.error.unwrap().contains("chunk 0 failed after 3 attempt(s)"));
}

#[tokio::test]
async fn test_directory_mode_writes_artifact() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let config = CarverConfig {
        staging_root: dir.path().join("staging"),
        store_path: dir.path().join("db"),
        retain_artifacts: true,
        exfil: ExfilConfig {
            mode: ExfilMode::Directory,
            output_dir: Some(out.clone()),
            chunk_size: 1000,
            ..ExfilConfig::default()
        },
        ..CarverConfig::default()
    };
    let sources = vec![
        write_source(dir.path(), "a.bin", 3000),
        write_source(dir.path(), "b.bin", 12),
    ];
    let (status, record) = run_carve(config, &sources).await;

    assert_eq!(status, CarveStatus::Succeeded);
    let artifact = record.compressed_path.unwrap();
    let written = out.join(format!(
        "{}-{}",
        record.guid,
        artifact.file_name().unwrap().to_string_lossy()
    ));
    assert_eq!(fs::read(written).unwrap(), fs::read(&artifact).unwrap());
}
