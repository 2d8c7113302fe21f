//! Integration tests for the record / inspect / compare cycle

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tempfile::TempDir;
use tokio::net::TcpListener;

use apidiff::compare::{wait_for_path, Comparator, PAYLOAD_KEY};
use apidiff::config::{Config, PersistenceConfig};
use apidiff::manifest::Manifest;
use apidiff::recording::{Recorder, SessionStore};
use apidiff::storage::interaction_files;
use apidiff::ApiDiffError;

/// Local API whose `/users/1` answer changes with `version`
struct TestServer {
    addr: SocketAddr,
    version: Arc<AtomicUsize>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let version = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(AtomicUsize::new(0));

        let served_version = Arc::clone(&version);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let version = Arc::clone(&served_version);
                let requests = Arc::clone(&requests);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let version = version.load(Ordering::SeqCst);
                        let request_id = requests.fetch_add(1, Ordering::SeqCst);
                        async move { Ok::<_, Infallible>(respond(&req, version, request_id)) }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, version }
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

fn respond(req: &Request<Incoming>, version: usize, request_id: usize) -> Response<Full<Bytes>> {
    let body = match req.uri().path() {
        "/users/1" => {
            let name = if version == 0 { "ada" } else { "grace" };
            format!(r#"{{"id":1,"name":"{name}","roles":["admin"]}}"#)
        }
        "/health" => r#"{"status":"ok"}"#.to_string(),
        _ => {
            return Response::builder()
                .status(404)
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
    };

    Response::builder()
        .status(200)
        .header("content-type", "application/json")
        .header("etag", format!("\"v{version}\""))
        .header("x-request-id", request_id.to_string())
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn manifest(server: &TestServer, rules: &str) -> Manifest {
    let yaml = format!(
        r"
version: 1
matching_rules:
{rules}
request:
  headers:
    Accept: application/json
    Authorization: Bearer secret-token
interactions:
  - url: {users}
    method: GET
    status_code: 200
  - url: {health}
    method: get
    status_code: 200
",
        users = server.url("/users/1"),
        health = server.url("/health"),
    );
    Manifest::from_yaml_str(&yaml).unwrap()
}

const IGNORE_VOLATILE: &str = "  - name: ignore_headers
    value: [Date, X-Request-Id, Authorization]";

fn test_config(root: &Path) -> Config {
    Config {
        storage_dir: root.to_path_buf(),
        persistence: PersistenceConfig {
            poll_interval_ms: 20,
            max_attempts: 250,
        },
        ..Config::default()
    }
}

fn test_store(config: &Config) -> SessionStore {
    SessionStore::new(
        config.storage_dir.clone(),
        Recorder::new(&config.http).unwrap(),
    )
}

/// Record every interaction of `manifest` and wait until all cassettes are on disk
async fn record_all(
    store: &SessionStore,
    config: &Config,
    name: &str,
    manifest: &Manifest,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for interaction in &manifest.interactions {
        let path = store
            .record(name, interaction, &manifest.request, &manifest.matching_rules)
            .await
            .unwrap();
        paths.push(path);
    }
    for path in &paths {
        wait_for_path(path, &config.persistence).await.unwrap();
    }
    paths
}

#[tokio::test]
async fn test_record_then_list_and_show() {
    let server = TestServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let store = test_store(&config);
    let manifest = manifest(&server, IGNORE_VOLATILE);

    record_all(&store, &config, "baseline", &manifest).await;

    let sessions = store.list().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].name, "baseline");
    assert_eq!(sessions[0].interactions.len(), 2);

    let session = store.show("baseline").unwrap();
    assert_eq!(session, sessions[0]);

    let mut urls: Vec<_> = session
        .interactions
        .iter()
        .map(|i| (i.url.clone(), i.method.clone(), i.status_code))
        .collect();
    urls.sort();
    let mut expected = vec![
        (server.url("/health"), "GET".to_string(), 200),
        (server.url("/users/1"), "GET".to_string(), 200),
    ];
    expected.sort();
    assert_eq!(urls, expected);

    // Unmodified store lists identically
    assert_eq!(store.list().unwrap(), sessions);
}

#[tokio::test]
async fn test_detail_strips_ignored_request_headers() {
    let server = TestServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let store = test_store(&config);
    let manifest = manifest(&server, IGNORE_VOLATILE);

    record_all(&store, &config, "detail", &manifest).await;

    for index in 1..=2 {
        let (interaction, stats) = store.detail("detail", index).unwrap();
        assert!(interaction.request.headers.contains_key("Accept"));
        assert!(!interaction
            .request
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("authorization")));
        assert_eq!(interaction.response.code, 200);
        assert_eq!(interaction.response.duration_ms, stats.duration());
    }

    assert!(matches!(
        store.detail("detail", 3),
        Err(ApiDiffError::IndexOutOfRange {
            index: 3,
            available: 2
        })
    ));
}

#[tokio::test]
async fn test_delete_session() {
    let server = TestServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let store = test_store(&config);
    let manifest = manifest(&server, IGNORE_VOLATILE);

    record_all(&store, &config, "keep", &manifest).await;
    record_all(&store, &config, "drop", &manifest).await;

    store.delete("drop").unwrap();
    let names: Vec<_> = store.list().unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["keep"]);

    assert!(matches!(
        store.delete("never-recorded"),
        Err(ApiDiffError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_self_comparison_is_unchanged() {
    let server = TestServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let store = test_store(&config);
    let manifest = manifest(&server, IGNORE_VOLATILE);

    record_all(&store, &config, "stable", &manifest).await;
    let session = store.show("stable").unwrap();

    let comparator = Comparator::new(store.recorder(), config.persistence, config.diff);
    let results = comparator.compare(&session, &manifest).await.unwrap();

    assert_eq!(results.keys().copied().collect::<Vec<_>>(), [0, 1]);
    for (index, differences) in &results {
        assert_eq!(differences.interaction_index, *index);
        assert!(!differences.changed, "{differences:?}");
    }
}

#[tokio::test]
async fn test_comparison_detects_drift() {
    let server = TestServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let store = test_store(&config);
    let manifest = manifest(&server, IGNORE_VOLATILE);

    record_all(&store, &config, "drift", &manifest).await;
    let session = store.show("drift").unwrap();

    server.bump_version();

    let comparator = Comparator::new(store.recorder(), config.persistence, config.diff);
    let results = comparator.compare(&session, &manifest).await.unwrap();

    let users = &results[&0];
    assert!(users.changed);
    assert_eq!(users.url, server.url("/users/1"));
    assert!(users.headers.contains_key("etag"));
    assert!(!users.headers.contains_key("x-request-id"));
    assert!(!users.headers.contains_key("date"));
    assert_eq!(
        users.body[PAYLOAD_KEY],
        "~ $.name: \"ada\" => \"grace\""
    );

    // Health carries a versioned etag but an unchanged body
    let health = &results[&1];
    assert!(health.changed);
    assert!(health.headers.contains_key("etag"));
    assert!(health.body.is_empty());
}

#[tokio::test]
async fn test_unignored_volatile_header_is_reported() {
    let server = TestServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let store = test_store(&config);
    let manifest = manifest(
        &server,
        "  - name: ignore_headers\n    value: [Date]",
    );

    record_all(&store, &config, "volatile", &manifest).await;
    let session = store.show("volatile").unwrap();

    let comparator = Comparator::new(store.recorder(), config.persistence, config.diff);
    let results = comparator.compare(&session, &manifest).await.unwrap();

    assert!(results[&0].changed);
    assert!(results[&0].headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_sparse_comparison_skips_missing_indexes() {
    let server = TestServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let store = test_store(&config);

    let mut short = manifest(&server, IGNORE_VOLATILE);
    short.interactions.truncate(1);
    record_all(&store, &config, "sparse", &short).await;
    let session = store.show("sparse").unwrap();

    let mut long = manifest(&server, IGNORE_VOLATILE);
    long.interactions[1].url = server.url("/health?fresh=1");

    let comparator = Comparator::new(store.recorder(), config.persistence, config.diff);
    let results = comparator.compare(&session, &long).await.unwrap();

    assert_eq!(results.keys().copied().collect::<Vec<_>>(), [0]);
    assert!(!results[&0].changed);
}

#[tokio::test]
async fn test_rerecording_with_match_url_false_misses() {
    let server = TestServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let store = test_store(&config);
    let manifest = manifest(
        &server,
        "  - name: match_url\n    value: false",
    );

    record_all(&store, &config, "strict", &manifest).await;
    let files_before = interaction_files(&temp_dir.path().join("strict")).unwrap();

    let first = &manifest.interactions[0];
    let result = store
        .record("strict", first, &manifest.request, &manifest.matching_rules)
        .await;
    assert!(matches!(result, Err(ApiDiffError::NotFound(_))));

    let files_after = interaction_files(&temp_dir.path().join("strict")).unwrap();
    assert_eq!(files_before, files_after);
}

#[tokio::test]
async fn test_rerecording_replays_without_network() {
    let server = TestServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let store = test_store(&config);
    let manifest = manifest(&server, IGNORE_VOLATILE);

    let paths = record_all(&store, &config, "replayed", &manifest).await;
    let before = std::fs::read_to_string(&paths[0]).unwrap();

    server.bump_version();
    record_all(&store, &config, "replayed", &manifest).await;

    assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), before);
}
