/// Common test utilities for integration tests
///
/// Builds the router over a fresh in-memory store and provides helpers to
/// send JSON requests and read the `{message, data}` envelope back.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use taskboard_api::app::{build_router, AppState};
use taskboard_api::config::Config;
use taskboard_shared::store::memory::MemoryStore;
use tower::ServiceExt;

/// Test context containing the app and its store
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub app: axum::Router,
}

/// Status and parsed body of a response
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }

    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    /// `_id` of the returned record
    pub fn id(&self) -> String {
        self.data()["_id"]
            .as_str()
            .expect("response data has an _id")
            .to_string()
    }
}

impl TestContext {
    /// Creates a new test context with an empty store
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config);
        Self {
            store,
            app: build_router(state),
        }
    }

    /// Sends a request with an optional JSON body
    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.send(request).await
    }

    /// Sends a prepared request
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                panic!(
                    "Expected JSON body, got {}: {}",
                    status,
                    String::from_utf8_lossy(&bytes)
                )
            })
        };
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request("GET", uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request("POST", uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> TestResponse {
        self.request("PUT", uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.request("DELETE", uri, None).await
    }

    /// Creates a user and returns its id
    pub async fn create_user(&self, name: &str) -> String {
        let response = self
            .post(
                "/api/users",
                json!({
                    "name": name,
                    "email": format!("{}@example.com", name.to_lowercase()),
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.id()
    }

    /// Creates a task, optionally assigned, and returns its id
    pub async fn create_task(&self, name: &str, assigned_user: Option<&str>) -> String {
        let mut body = json!({
            "name": name,
            "deadline": "2030-01-01T00:00:00Z",
        });
        if let Some(user) = assigned_user {
            body["assignedUser"] = json!(user);
        }
        let response = self.post("/api/tasks", body).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.id()
    }

    /// Reads a user's pendingTasks
    pub async fn pending_tasks(&self, user_id: &str) -> Vec<String> {
        let response = self.get(&format!("/api/users/{}", user_id)).await;
        assert_eq!(response.status, StatusCode::OK);
        response.data()["pendingTasks"]
            .as_array()
            .expect("pendingTasks is an array")
            .iter()
            .map(|id| id.as_str().unwrap_or_default().to_string())
            .collect()
    }
}
