use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use dash_core::{CredentialEntry, CredentialStore, SessionAuthenticator};
use firecrawl::poll::with_deadline;
use firecrawl::{
    AgentRequest, CrawlRequest, ExtractRequest, FirecrawlError, MapRequest, ScrapeBackend,
    ScrapeRequest,
};
use serde_json::Value;
use tower::ServiceExt;

use crate::routes::build_router;
use crate::state::AppState;

const TEST_USERS: &[(&str, &str)] = &[("admin", "root"), ("alice", "wonderland")];
const TEST_SECRET: &str = "unit-test-session-secret";
const AGENT_DEADLINE: Duration = Duration::from_secs(300);

enum Behavior {
    Reply(Value),
    Fail(Box<dyn Fn() -> FirecrawlError + Send + Sync>),
    /// Sleeps 301s under the 300s adapter deadline.
    SlowerThanDeadline,
}

pub struct MockBackend {
    behavior: Behavior,
    calls: AtomicUsize,
    last_agent_urls: Mutex<Option<Vec<String>>>,
}

impl MockBackend {
    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            last_agent_urls: Mutex::new(None),
        }
    }

    pub fn ok(reply: Value) -> Self {
        Self::with(Behavior::Reply(reply))
    }

    pub fn failing(make: impl Fn() -> FirecrawlError + Send + Sync + 'static) -> Self {
        Self::with(Behavior::Fail(Box::new(make)))
    }

    pub fn slower_than_deadline() -> Self {
        Self::with(Behavior::SlowerThanDeadline)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_agent_urls(&self) -> Option<Vec<String>> {
        self.last_agent_urls.lock().unwrap().clone()
    }

    async fn respond(&self) -> Result<Value, FirecrawlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Reply(value) => Ok(value.clone()),
            Behavior::Fail(make) => Err(make()),
            Behavior::SlowerThanDeadline => {
                with_deadline(AGENT_DEADLINE, async {
                    tokio::time::sleep(AGENT_DEADLINE + Duration::from_secs(1)).await;
                    Ok(Value::Null)
                })
                .await
            }
        }
    }
}

#[async_trait]
impl ScrapeBackend for MockBackend {
    async fn scrape(&self, _request: &ScrapeRequest) -> Result<Value, FirecrawlError> {
        self.respond().await
    }

    async fn crawl(&self, _request: &CrawlRequest) -> Result<Value, FirecrawlError> {
        self.respond().await
    }

    async fn map(&self, _request: &MapRequest) -> Result<Value, FirecrawlError> {
        self.respond().await
    }

    async fn extract(&self, _request: &ExtractRequest) -> Result<Value, FirecrawlError> {
        self.respond().await
    }

    async fn agent(&self, request: &AgentRequest) -> Result<Value, FirecrawlError> {
        *self.last_agent_urls.lock().unwrap() = Some(request.urls.clone());
        self.respond().await
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Log in as one of the seeded users and return the bearer token.
    pub async fn token_for(&self, username: &str) -> String {
        let password = TEST_USERS
            .iter()
            .find(|(name, _)| *name == username)
            .map(|(_, password)| *password)
            .unwrap_or_else(|| panic!("{username} is not a seeded test user"));
        let (token, _) = self
            .state
            .auth
            .authenticate(username, password)
            .await
            .unwrap();
        token
    }
}

pub async fn test_app(backend: MockBackend) -> (TestApp, Arc<MockBackend>) {
    let store = Arc::new(CredentialStore::new(TEST_USERS.iter().map(
        |(username, password)| CredentialEntry {
            username: username.to_string(),
            password: password.to_string(),
        },
    )));
    let auth = SessionAuthenticator::new(store.clone(), TEST_SECRET, Duration::from_secs(3600));
    let backend = Arc::new(backend);
    let state = AppState {
        store,
        auth,
        backend: Some(backend.clone() as Arc<dyn ScrapeBackend>),
    };
    let router = build_router(state.clone(), AGENT_DEADLINE + Duration::from_secs(30));
    (TestApp { router, state }, backend)
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Drive one request through the router and decode the JSON reply.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}
