//! Integration tests for the ingestion pipeline
//!
//! These tests use wiremock to stand in for the record API and a temporary
//! SQLite database as the document store, and run the full
//! read-fetch-store-report cycle end-to-end.

use catalog_ingest::config::{load_config, ApiConfig, PipelineConfig};
use catalog_ingest::report::load_report;
use catalog_ingest::source::{resume_items, SourceReader};
use catalog_ingest::storage::{open_storage, RunHistory, SqliteStore};
use catalog_ingest::{Coordinator, FailureKind, HttpFetcher};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        api_key: "test-key".to_string(),
        base_url: base_url.to_string(),
        request_timeout_secs: 2,
        language: "es-MX,es,en".to_string(),
        append_to_response: "videos,images,credits,keywords".to_string(),
        include_video_language: "es-MX,en-US".to_string(),
        include_image_language: "es-MX,en-US,null".to_string(),
    }
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        pool_size: 4,
        batch_size: 100,
        batch_delay_ms: 100,
        progress_interval: 2,
        cooldown_ms: 50,
        max_cooldown_ms: 200,
        checkpoint_every: 1,
    }
}

/// Writes an NDJSON export with one line per `(id, title, adult)`
fn write_export(dir: &Path, records: &[(u64, &str, bool)]) -> PathBuf {
    let mut content = String::new();
    for (id, title, adult) in records {
        content.push_str(
            &json!({
                "id": id,
                "original_title": title,
                "popularity": 1.5,
                "video": false,
                "adult": adult,
            })
            .to_string(),
        );
        content.push('\n');
    }
    let path = dir.join("movie_ids.json");
    std::fs::write(&path, content).unwrap();
    path
}

fn open_store(dir: &Path) -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::new(&dir.join("catalog.db"), "movies", Duration::from_secs(5)).unwrap(),
    )
}

async fn mount_record(server: &MockServer, id: u64, title: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/movie/{}", id)))
        .and(query_param("api_key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "title": title,
            "credits": {"cast": [], "crew": []},
        })))
        .mount(server)
        .await;
}

async fn mount_status(server: &MockServer, id: u64, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/movie/{}", id)))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_run_records_not_found() {
    let server = MockServer::start().await;
    mount_record(&server, 1, "One").await;
    mount_status(&server, 2, 404).await;
    mount_record(&server, 3, "Three").await;

    let dir = TempDir::new().unwrap();
    let input = write_export(
        dir.path(),
        &[(1, "One", false), (2, "Two", false), (4, "Adult", true), (3, "Three", false)],
    );
    let report_path = dir.path().join("dump-state.json");
    let store = open_store(dir.path());
    let fetcher = Arc::new(HttpFetcher::new(&api_config(&server.uri())).unwrap());

    let mut coordinator = Coordinator::new(fetcher, Arc::clone(&store), pipeline_config())
        .with_report_path(&report_path)
        .with_expected_total(3);
    let reader = SourceReader::open(&input).unwrap();
    let summary = coordinator.run(reader).await.unwrap();

    assert_eq!(summary.dispatched, 3);
    assert!(summary.has_permanent_failures());

    let report = load_report(&report_path).unwrap();
    assert_eq!(report.success_count, 2);
    assert_eq!(report.failure_count, 1);
    assert_eq!(report.failed, vec!["2".to_string()]);
    assert_eq!(report.failure_kinds.get("2"), Some(&FailureKind::NotFound));

    assert_eq!(store.count_documents().unwrap(), 2);
    let document = store.get_document(1).unwrap().unwrap();
    assert_eq!(document["title"], "One");
    assert!(store.get_document(4).unwrap().is_none());
}

#[tokio::test]
async fn test_retry_pass_recovers_rate_limited_id() {
    let server = MockServer::start().await;
    mount_record(&server, 4, "Four").await;
    mount_record(&server, 6, "Six").await;
    // First request for 5 is rate limited, later ones succeed
    Mock::given(method("GET"))
        .and(path("/movie/5"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_record(&server, 5, "Five").await;

    let dir = TempDir::new().unwrap();
    let input = write_export(
        dir.path(),
        &[(4, "Four", false), (5, "Five", false), (6, "Six", false)],
    );
    let report_path = dir.path().join("dump-state.json");
    let store = open_store(dir.path());
    let fetcher = Arc::new(HttpFetcher::new(&api_config(&server.uri())).unwrap());

    let mut first = Coordinator::new(Arc::clone(&fetcher), Arc::clone(&store), pipeline_config())
        .with_report_path(&report_path);
    let summary = first.run(SourceReader::open(&input).unwrap()).await.unwrap();
    assert!(!summary.has_permanent_failures());

    let report = load_report(&report_path).unwrap();
    assert_eq!(report.failed, vec!["5".to_string()]);
    assert_eq!(report.failure_kinds.get("5"), Some(&FailureKind::RateLimited));

    // Retry pass driven by the report
    let retry_ids = report.retry_ids().unwrap();
    assert_eq!(retry_ids, vec![5]);
    let mut second = Coordinator::new(fetcher, Arc::clone(&store), pipeline_config())
        .with_state(report.to_run_state().unwrap())
        .with_report_path(&report_path);
    let summary = second.run(resume_items(retry_ids)).await.unwrap();

    assert_eq!(summary.dispatched, 1);
    let report = load_report(&report_path).unwrap();
    assert_eq!(report.success_count, 3);
    assert_eq!(report.failure_count, 0);
    assert!(report.failed.is_empty());
    assert_eq!(store.get_document(5).unwrap().unwrap()["title"], "Five");
}

#[tokio::test]
async fn test_rerun_upserts_without_duplicates() {
    let server = MockServer::start().await;
    for id in 1..=3 {
        mount_record(&server, id, "Stored").await;
    }

    let dir = TempDir::new().unwrap();
    let input = write_export(
        dir.path(),
        &[(1, "One", false), (2, "Two", false), (3, "Three", false)],
    );
    let store = open_store(dir.path());
    let fetcher = Arc::new(HttpFetcher::new(&api_config(&server.uri())).unwrap());

    for _ in 0..2 {
        let mut coordinator =
            Coordinator::new(Arc::clone(&fetcher), Arc::clone(&store), pipeline_config());
        let summary = coordinator
            .run(SourceReader::open(&input).unwrap())
            .await
            .unwrap();
        assert_eq!(summary.snapshot.success_count, 3);
    }

    assert_eq!(store.count_documents().unwrap(), 3);
}

#[tokio::test]
async fn test_mismatched_and_failing_responses() {
    let server = MockServer::start().await;
    mount_record(&server, 1, "One").await;
    // Payload for a different id
    Mock::given(method("GET"))
        .and(path("/movie/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 99})))
        .mount(&server)
        .await;
    mount_status(&server, 3, 503).await;

    let dir = TempDir::new().unwrap();
    let input = write_export(
        dir.path(),
        &[(1, "One", false), (2, "Two", false), (3, "Three", false)],
    );
    let store = open_store(dir.path());
    let fetcher = Arc::new(HttpFetcher::new(&api_config(&server.uri())).unwrap());

    let mut coordinator = Coordinator::new(fetcher, Arc::clone(&store), pipeline_config());
    let summary = coordinator
        .run(SourceReader::open(&input).unwrap())
        .await
        .unwrap();

    let snapshot = &summary.snapshot;
    assert_eq!(snapshot.success_count, 1);
    assert_eq!(snapshot.failed.get(&2), Some(&FailureKind::Fatal));
    assert_eq!(snapshot.failed.get(&3), Some(&FailureKind::Transient));
    assert_eq!(snapshot.retry_ids(), vec![3]);
    assert!(store.get_document(2).unwrap().is_none());
}

#[tokio::test]
async fn test_config_file_drives_run_window() {
    let server = MockServer::start().await;
    for id in [10, 20, 30] {
        mount_record(&server, id, "Windowed").await;
    }

    let dir = TempDir::new().unwrap();
    let input = write_export(
        dir.path(),
        &[(10, "Ten", false), (15, "Adult", true), (20, "Twenty", false), (30, "Thirty", false)],
    );
    let config_path = dir.path().join("ingest.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[api]
api-key = "test-key"
base-url = "{base}"

[storage]
database-path = "{db}"
collection = "movies"

[input]
path = "{input}"
offset = 1
limit = 1

[pipeline]
pool-size = 2
batch-size = 50
batch-delay-ms = 100

[output]
report-path = "{report}"
"#,
            base = server.uri(),
            db = dir.path().join("catalog.db").display(),
            input = input.display(),
            report = dir.path().join("dump-state.json").display(),
        ),
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    let store = Arc::new(open_storage(&config.storage).unwrap());
    let fetcher = Arc::new(HttpFetcher::new(&config.api).unwrap());
    let reader = SourceReader::open(Path::new(&config.input.path))
        .unwrap()
        .with_range(config.input.offset, config.input.limit);

    let mut coordinator =
        Coordinator::new(fetcher, Arc::clone(&store), config.pipeline.clone())
            .with_report_path(&config.output.report_path);
    let summary = coordinator.run(reader).await.unwrap();

    // Offset skips the first eligible record (10), the adult record is not
    // counted, and the limit stops after one
    assert_eq!(summary.dispatched, 1);
    assert_eq!(store.count_documents().unwrap(), 1);
    assert!(store.get_document(20).unwrap().is_some());

    let report = load_report(Path::new(&config.output.report_path)).unwrap();
    assert_eq!(report.success_count, 1);
}
