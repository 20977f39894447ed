//! End-to-end HTTP tests against the SQLite store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use news_api::api::{router, AppState};
use news_api::config::DatabaseConfig;
use news_api::{Database, SqliteNewsStore};

struct TestApp {
    app: Router,
    _dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&DatabaseConfig::with_path(dir.path().join("news.db"))).unwrap();
        db.migrate_up().unwrap();
        let state = AppState::new(Arc::new(SqliteNewsStore::new(db)));
        Self {
            app: router(state),
            _dir: dir,
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<&Value>) -> (StatusCode, String) {
        let body = match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

fn payload() -> Value {
    json!({
        "author": "A",
        "title": "T",
        "summary": "S",
        "content": "C",
        "source": "https://example.com",
        "createdAt": "2026-01-30T18:35:43+05:30",
        "tags": ["x"],
    })
}

#[tokio::test]
async fn test_create_get_delete_get() {
    let app = TestApp::new();

    let (status, body) = app.send("POST", "/news", Some(&payload())).await;
    assert_eq!(status, StatusCode::CREATED);
    let created: Value = serde_json::from_str(&body).unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    let uri = format!("/news/{}", id);
    let (status, body) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let found: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(found["id"], created["id"]);
    assert_eq!(found["author"], "A");
    assert_eq!(found["title"], "T");
    assert_eq!(found["summary"], "S");
    assert_eq!(found["content"], "C");
    assert_eq!(found["source"], "https://example.com/");
    assert_eq!(found["tags"], json!(["x"]));
    assert_eq!(found["created_at"], "2026-01-30T13:05:43Z");
    assert!(found.get("deleted_at").is_none());

    let (status, body) = app.send("DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, body) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());

    // Deleting again still succeeds
    let (status, _) = app.send("DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_update_returns_stored_record() {
    let app = TestApp::new();
    let (_, body) = app.send("POST", "/news", Some(&payload())).await;
    let created: Value = serde_json::from_str(&body).unwrap();
    let uri = format!("/news/{}", created["id"].as_str().unwrap());

    let mut changed = payload();
    changed["title"] = json!("Updated");
    changed["tags"] = json!(["y", "z"]);
    let (status, body) = app.send("PUT", &uri, Some(&changed)).await;
    assert_eq!(status, StatusCode::OK);

    let updated: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(updated["id"], created["id"]);
    assert_eq!(updated["title"], "Updated");
    assert_eq!(updated["tags"], json!(["y", "z"]));
    assert_eq!(updated["created_at"], created["created_at"]);
    assert_ne!(updated["updated_at"], created["updated_at"]);

    let (_, body) = app.send("GET", &uri, None).await;
    let found: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(found, updated);
}

#[tokio::test]
async fn test_update_unknown_is_404() {
    let app = TestApp::new();
    let uri = format!("/news/{}", uuid::Uuid::new_v4());
    let (status, body) = app.send("PUT", &uri, Some(&payload())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_list_returns_live_records() {
    let app = TestApp::new();

    let (status, body) = app.send("GET", "/news", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"news": []}));

    let (_, first) = app.send("POST", "/news", Some(&payload())).await;
    let (_, second) = app.send("POST", "/news", Some(&payload())).await;
    let first: Value = serde_json::from_str(&first).unwrap();
    let second: Value = serde_json::from_str(&second).unwrap();

    let uri = format!("/news/{}", first["id"].as_str().unwrap());
    app.send("DELETE", &uri, None).await;

    let (_, body) = app.send("GET", "/news", None).await;
    let list: Value = serde_json::from_str(&body).unwrap();
    let news = list["news"].as_array().unwrap();
    assert_eq!(news.len(), 1);
    assert_eq!(news[0]["id"], second["id"]);
}

#[tokio::test]
async fn test_validation_failure_lists_every_field() {
    let app = TestApp::new();
    let body = json!({"createdAt": "2026-01-30T18:35:43+05:30", "tags": ["x"]});

    let (status, text) = app.send("POST", "/news", Some(&body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "author is empty",
            "title is empty",
            "summary is empty",
            "content is empty",
            "source is empty",
        ]
    );
}

#[tokio::test]
async fn test_bad_requests_never_reach_store() {
    let app = TestApp::new();

    let mut bad_time = payload();
    bad_time["createdAt"] = json!("yesterday");
    let (status, text) = app.send("POST", "/news", Some(&bad_time)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.contains("invalid createdAt time 'yesterday'"));

    let mut no_tags = payload();
    no_tags["tags"] = json!([]);
    let (status, text) = app.send("POST", "/news", Some(&no_tags)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "tags are empty");

    let (status, _) = app.send("PUT", "/news/not-a-uuid", Some(&payload())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send("DELETE", "/news/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, text) = app.send("POST", "/news", Some(&json!({"tags": 3}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text.starts_with("unable to decode request body"));

    let (_, body) = app.send("GET", "/news", None).await;
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"news": []}));
}
