use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use db_service::{DbConfig, DbService};
use shared_lib::call_structs::CallCategory;
use web_service::{build_app, AppState};

const TEST_POOL_SIZE: usize = 5;

/// Router plus the database it writes to. The temp dir lives as long as this does.
pub struct TestApp {
    pub db: Arc<DbService>,
    pub app: Router,
    _dir: tempfile::TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body should be JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn setup_tracing() {
    dotenv::dotenv().ok();
    let _ = tracing_subscriber::registry()
        .with(LevelFilter::INFO)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// App over a fresh local database with all call tables created.
pub async fn spawn_app() -> TestApp {
    spawn_app_with_pool_size(TEST_POOL_SIZE).await
}

pub async fn spawn_app_with_pool_size(pool_size: usize) -> TestApp {
    let app = local_app(pool_size).await;
    app.db
        .init_tables()
        .await
        .expect("Failed to create call tables");
    app
}

pub async fn spawn_app_without_tables() -> TestApp {
    local_app(TEST_POOL_SIZE).await
}

async fn local_app(pool_size: usize) -> TestApp {
    setup_tracing();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("calls.db");
    let mut config = DbConfig::local(path.to_string_lossy());
    config.pool_size = pool_size;

    let db = DbService::connect(config)
        .await
        .expect("Failed to open db");

    app_with_db(db, dir)
}

/// App whose database lives at `config`, e.g. an unreachable remote server.
pub async fn spawn_app_with_config(config: DbConfig) -> TestApp {
    setup_tracing();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = DbService::connect(config)
        .await
        .expect("Failed to build db handle");

    app_with_db(db, dir)
}

fn app_with_db(db: DbService, dir: tempfile::TempDir) -> TestApp {
    let db = Arc::new(db);
    let app = build_app(AppState { db: db.clone() });

    TestApp { db, app, _dir: dir }
}

pub fn post_request(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .expect("Failed to build request")
}

/// Drives one request through an owned router, so it can run inside a spawned task.
pub async fn send(router: Router, request: Request<Body>) -> TestResponse {
    let response = router
        .oneshot(request)
        .await
        .expect("router is infallible");

    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body())
        .await
        .expect("Failed to read response body")
        .to_vec();

    TestResponse { status, body }
}

impl TestApp {
    pub async fn post(&self, uri: &str, body: impl Into<Body>) -> TestResponse {
        send(self.app.clone(), post_request(uri, body)).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");

        send(self.app.clone(), request).await
    }

    pub async fn row_count(&self, category: CallCategory) -> i64 {
        self.db
            .count_rows(category)
            .await
            .expect("Failed to count rows")
    }

    pub async fn total_rows(&self) -> i64 {
        let mut total = 0;
        for category in CallCategory::ALL {
            total += self.row_count(category).await;
        }
        total
    }
}
