use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use dash_core::config::FirecrawlConfig;
use firecrawl::{
    AgentRequest, CrawlRequest, ExtractRequest, FirecrawlClient, FirecrawlError, MapRequest,
    PollSettings, ScrapeBackend, ScrapeFormat, ScrapeRequest,
};
use serde_json::{json, Value};

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr, timeout: Duration) -> FirecrawlClient {
    let config = FirecrawlConfig {
        api_key: "fc-test-key".into(),
        endpoint: format!("http://{addr}/"),
    };
    FirecrawlClient::new(
        &config,
        PollSettings {
            interval: Duration::from_millis(10),
            timeout,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn scrape_sends_bearer_key_and_formats() {
    let app = Router::new().route(
        "/v1/scrape",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Json(json!({
                "success": true,
                "data": {"markdown": "# Hi", "echo": body, "auth": auth}
            }))
        }),
    );
    let addr = serve(app).await;

    let raw = client(addr, Duration::from_secs(5))
        .scrape(&ScrapeRequest {
            url: "https://example.com".into(),
            formats: vec![ScrapeFormat::Markdown, ScrapeFormat::Links],
        })
        .await
        .unwrap();

    assert_eq!(raw["data"]["markdown"], "# Hi");
    assert_eq!(raw["data"]["auth"], "Bearer fc-test-key");
    assert_eq!(
        raw["data"]["echo"],
        json!({"url": "https://example.com", "formats": ["markdown", "links"]})
    );
}

#[tokio::test]
async fn agent_polls_until_completed() {
    let polls = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route(
            "/v2/agent",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["prompt"], "list the pricing tiers");
                Json(json!({"success": true, "id": "job-1"}))
            }),
        )
        .route(
            "/v2/agent/:id",
            get(
                |State(polls): State<Arc<AtomicU32>>, Path(id): Path<String>| async move {
                    assert_eq!(id, "job-1");
                    let n = polls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Json(json!({"success": true, "status": "processing"}))
                    } else {
                        Json(json!({
                            "success": true,
                            "status": "completed",
                            "data": {"tiers": 3},
                            "creditsUsed": 12
                        }))
                    }
                },
            ),
        )
        .with_state(polls.clone());
    let addr = serve(app).await;

    let raw = client(addr, Duration::from_secs(5))
        .agent(&AgentRequest {
            prompt: "list the pricing tiers".into(),
            urls: Vec::new(),
        })
        .await
        .unwrap();

    assert_eq!(raw["status"], "completed");
    assert_eq!(raw["creditsUsed"], 12);
    assert_eq!(polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn agent_that_never_finishes_times_out() {
    let app = Router::new()
        .route(
            "/v2/agent",
            post(|| async { Json(json!({"success": true, "id": "slow"})) }),
        )
        .route(
            "/v2/agent/:id",
            get(|| async { Json(json!({"success": true, "status": "processing"})) }),
        );
    let addr = serve(app).await;

    let err = client(addr, Duration::from_millis(200))
        .agent(&AgentRequest {
            prompt: "this will never finish".into(),
            urls: vec!["https://a.com".into()],
        })
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {err:?}");
}

#[tokio::test]
async fn failed_crawl_job_is_reported() {
    let app = Router::new()
        .route(
            "/v1/crawl",
            post(|| async { Json(json!({"success": true, "id": "c1"})) }),
        )
        .route(
            "/v1/crawl/:id",
            get(|| async { Json(json!({"status": "failed", "error": "site unreachable"})) }),
        );
    let addr = serve(app).await;

    let err = client(addr, Duration::from_secs(5))
        .crawl(&CrawlRequest {
            url: "https://example.com".into(),
            limit: 5,
        })
        .await
        .unwrap_err();

    match err {
        FirecrawlError::JobFailed { job, message, .. } => {
            assert_eq!(job, "crawl");
            assert_eq!(message, "site unreachable");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn start_reply_without_job_id_is_returned_as_is() {
    let polls = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route(
            "/v1/extract",
            post(|| async { Json(json!({"success": true, "data": {"price": 3}})) }),
        )
        .route(
            "/v1/extract/:id",
            get(|State(polls): State<Arc<AtomicU32>>| async move {
                polls.fetch_add(1, Ordering::SeqCst);
                Json(json!({"success": true, "status": "completed"}))
            }),
        )
        .with_state(polls.clone());
    let addr = serve(app).await;

    let raw = client(addr, Duration::from_secs(5))
        .extract(&ExtractRequest {
            urls: vec!["https://shop.example".into()],
            prompt: "get the price".into(),
        })
        .await
        .unwrap();

    assert_eq!(raw, json!({"success": true, "data": {"price": 3}}));
    assert_eq!(polls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn extract_polls_its_status_endpoint() {
    let polls = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route(
            "/v1/extract",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["urls"], json!(["https://shop.example"]));
                assert_eq!(body["prompt"], "get the price");
                Json(json!({"success": true, "id": "e1"}))
            }),
        )
        .route(
            "/v1/extract/:id",
            get(
                |State(polls): State<Arc<AtomicU32>>, Path(id): Path<String>| async move {
                    assert_eq!(id, "e1");
                    if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Json(json!({"success": true, "status": "processing"}))
                    } else {
                        Json(json!({
                            "success": true,
                            "status": "completed",
                            "data": {"price": 3}
                        }))
                    }
                },
            ),
        )
        .with_state(polls.clone());
    let addr = serve(app).await;

    let raw = client(addr, Duration::from_secs(5))
        .extract(&ExtractRequest {
            urls: vec!["https://shop.example".into()],
            prompt: "get the price".into(),
        })
        .await
        .unwrap();

    assert_eq!(raw["status"], "completed");
    assert_eq!(raw["data"]["price"], 3);
    assert_eq!(polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancelled_crawl_job_is_a_failure() {
    let app = Router::new()
        .route(
            "/v1/crawl",
            post(|| async { Json(json!({"success": true, "id": "c2"})) }),
        )
        .route(
            "/v1/crawl/:id",
            get(|| async { Json(json!({"success": true, "status": "cancelled"})) }),
        );
    let addr = serve(app).await;

    let err = client(addr, Duration::from_secs(5))
        .crawl(&CrawlRequest {
            url: "https://example.com".into(),
            limit: 5,
        })
        .await
        .unwrap_err();

    match err {
        FirecrawlError::JobFailed { job, status, .. } => {
            assert_eq!(job, "crawl");
            assert_eq!(status, "cancelled");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn structured_http_error_keeps_its_details() {
    let app = Router::new().route(
        "/v1/map",
        post(|| async {
            (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "success": false,
                    "error": {"code": "INSUFFICIENT_CREDITS", "remaining": 0}
                })),
            )
        }),
    );
    let addr = serve(app).await;

    let err = client(addr, Duration::from_secs(5))
        .map(&MapRequest {
            url: "https://example.com".into(),
            search: None,
            limit: 10,
        })
        .await
        .unwrap_err();

    match err {
        FirecrawlError::HttpStatus { status, message } => {
            assert_eq!(status.as_u16(), 402);
            assert!(message.contains("INSUFFICIENT_CREDITS"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn success_false_on_ok_status_is_an_upstream_error() {
    let app = Router::new().route(
        "/v1/scrape",
        post(|| async { Json(json!({"success": false, "error": "URL is blocked"})) }),
    );
    let addr = serve(app).await;

    let err = client(addr, Duration::from_secs(5))
        .scrape(&ScrapeRequest {
            url: "https://blocked.example".into(),
            formats: vec![ScrapeFormat::Markdown],
        })
        .await
        .unwrap_err();

    assert!(matches!(err, FirecrawlError::Upstream(ref m) if m == "URL is blocked"));
}

#[test]
fn endpoint_must_be_http() {
    let config = FirecrawlConfig {
        api_key: "k".into(),
        endpoint: "ftp://example.com".into(),
    };
    assert!(matches!(
        FirecrawlClient::new(&config, PollSettings::default()),
        Err(FirecrawlError::InvalidUrl(_))
    ));
}
