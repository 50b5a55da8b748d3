//! AI relay contract tests plus the client-side analysis flows, driven
//! against an in-process mock of the completion API.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use idealog::ai::client::{AiClient, AiError};
use idealog::ai::proxy::{build_router, ProxyState};
use idealog::ai::quota::QuotaTracker;
use idealog::config::AiConfig;
use idealog::project::{Edit, Project};
use idealog::storage::LocalStore;

// ─── Mock completion upstream ─────────────────────────────────────────────────

struct Upstream {
    /// Body the next completions call answers with.
    content: Mutex<String>,
    hits: AtomicU64,
    fail: Mutex<bool>,
}

async fn completions(State(state): State<Arc<Upstream>>) -> Result<Json<Value>, StatusCode> {
    state.hits.fetch_add(1, Ordering::Relaxed);
    if *state.fail.lock().unwrap() {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let content = state.content.lock().unwrap().clone();
    Ok(Json(json!({
        "choices": [ { "message": { "content": content } } ]
    })))
}

async fn spawn_upstream() -> (Arc<Upstream>, SocketAddr) {
    let state = Arc::new(Upstream {
        content: Mutex::new("ok".to_string()),
        hits: AtomicU64::new(0),
        fail: Mutex::new(false),
    });
    let router = Router::new()
        .route("/chat/completions", post(completions))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (state, addr)
}

/// Proxy wired to the mock upstream, served on a random port.
async fn spawn_proxy(upstream: SocketAddr, api_key: Option<&str>) -> String {
    let ai = AiConfig {
        upstream_url: format!("http://{upstream}/chat/completions"),
        model: "test-model".into(),
        daily_limit: 3,
        proxy_url: None,
    };
    let state = Arc::new(ProxyState::new(ai, api_key.map(str::to_string)));
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/api/ai")
}

const PATTERNS_JSON: &str = r#"```json
{
  "patterns": [
    {"name": "Interruptions", "count": 3, "summary": "meetings cut the day apart",
     "relatedObservations": ["standup ran long", "pinged mid-task"]},
    {"name": "Tool friction", "count": 2, "summary": "login walls everywhere"},
    {"name": "Context loss", "count": 2, "summary": "restarting trains of thought"}
  ]
}
```"#;

// ─── Proxy contract ───────────────────────────────────────────────────────────

#[tokio::test]
async fn relay_returns_result_type_and_success() {
    let (upstream, addr) = spawn_upstream().await;
    *upstream.content.lock().unwrap() = "three patterns".into();
    let proxy_url = spawn_proxy(addr, Some("k")).await;

    let response = reqwest::Client::new()
        .post(&proxy_url)
        .json(&json!({ "prompt": "find patterns", "type": "pattern" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"], "three patterns");
    assert_eq!(body["type"], "pattern");
    assert_eq!(body["success"], true);
    assert_eq!(upstream.hits.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn empty_prompt_is_rejected_before_the_upstream() {
    let (upstream, addr) = spawn_upstream().await;
    let proxy_url = spawn_proxy(addr, Some("k")).await;

    let response = reqwest::Client::new()
        .post(&proxy_url)
        .json(&json!({ "prompt": "  ", "type": "pattern" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Prompt is required");
    assert_eq!(upstream.hits.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn upstream_failure_maps_to_bad_gateway() {
    let (upstream, addr) = spawn_upstream().await;
    *upstream.fail.lock().unwrap() = true;
    let proxy_url = spawn_proxy(addr, Some("k")).await;

    let response = reqwest::Client::new()
        .post(&proxy_url)
        .json(&json!({ "prompt": "hello", "type": "pattern" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "AI request failed");
}

#[tokio::test]
async fn missing_provider_key_is_a_server_error() {
    let (upstream, addr) = spawn_upstream().await;
    let proxy_url = spawn_proxy(addr, None).await;

    let response = reqwest::Client::new()
        .post(&proxy_url)
        .json(&json!({ "prompt": "hello", "type": "pattern" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(upstream.hits.load(Ordering::Relaxed), 0);
}

// ─── Client flows ─────────────────────────────────────────────────────────────

async fn client_with_limit(proxy_url: &str, dir: &TempDir, limit: u32) -> AiClient {
    let store = LocalStore::open(dir.path()).await.unwrap();
    AiClient::new(proxy_url.to_string(), QuotaTracker::new(store, limit))
}

fn project_with_observations(n: usize) -> Project {
    let mut p = Project::new("analysis");
    for i in 0..n {
        p.apply(Edit::AddObservation {
            text: format!("pain point {i}"),
            category: "Work".into(),
        })
        .unwrap();
    }
    p
}

#[tokio::test]
async fn analysis_returns_three_patterns_tagged_with_the_category() {
    let (upstream, addr) = spawn_upstream().await;
    *upstream.content.lock().unwrap() = PATTERNS_JSON.into();
    let proxy_url = spawn_proxy(addr, Some("k")).await;
    let dir = TempDir::new().unwrap();
    let client = client_with_limit(&proxy_url, &dir, 3).await;

    let mut project = project_with_observations(3);
    let patterns = client
        .analyze_patterns(&project.data, Some("Work"))
        .await
        .unwrap();
    assert_eq!(patterns.len(), 3);
    assert!(patterns.iter().all(|p| p.category.as_deref() == Some("Work")));

    project.apply(Edit::ApplyAnalysis { patterns }).unwrap();
    assert_eq!(project.data.patterns.len(), 3);
    assert!(project.data.analysis_complete);
    assert_eq!(client.quota().remaining().await.unwrap(), 2);
}

#[tokio::test]
async fn analysis_needs_three_observations_in_scope() {
    let (upstream, addr) = spawn_upstream().await;
    let proxy_url = spawn_proxy(addr, Some("k")).await;
    let dir = TempDir::new().unwrap();
    let client = client_with_limit(&proxy_url, &dir, 3).await;

    let mut project = project_with_observations(3);
    project
        .apply(Edit::AddCategory { name: "Sparse".into() })
        .unwrap();

    // Three observations overall, but none in the requested category.
    let err = client
        .analyze_patterns(&project.data, Some("Sparse"))
        .await
        .unwrap_err();
    assert!(matches!(err, AiError::NotEnoughObservations { got: 0 }));
    assert_eq!(upstream.hits.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn fourth_call_on_the_same_day_is_blocked_client_side() {
    let (upstream, addr) = spawn_upstream().await;
    *upstream.content.lock().unwrap() = PATTERNS_JSON.into();
    let proxy_url = spawn_proxy(addr, Some("k")).await;
    let dir = TempDir::new().unwrap();
    let client = client_with_limit(&proxy_url, &dir, 3).await;

    let project = project_with_observations(4);
    for _ in 0..3 {
        client
            .analyze_patterns(&project.data, None)
            .await
            .unwrap();
    }
    assert_eq!(upstream.hits.load(Ordering::Relaxed), 3);

    let err = client.analyze_patterns(&project.data, None).await.unwrap_err();
    assert!(matches!(err, AiError::QuotaExhausted { limit: 3 }));
    // Blocked without touching the network.
    assert_eq!(upstream.hits.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn failed_analysis_does_not_consume_quota() {
    let (upstream, addr) = spawn_upstream().await;
    *upstream.content.lock().unwrap() = "no json here, sorry".into();
    let proxy_url = spawn_proxy(addr, Some("k")).await;
    let dir = TempDir::new().unwrap();
    let client = client_with_limit(&proxy_url, &dir, 3).await;

    let project = project_with_observations(3);
    let err = client.analyze_patterns(&project.data, None).await.unwrap_err();
    assert!(matches!(err, AiError::BadResponse(_)));
    assert_eq!(client.quota().remaining().await.unwrap(), 3);
}

#[tokio::test]
async fn mvp_plan_flow_parses_the_full_shape() {
    let (upstream, addr) = spawn_upstream().await;
    *upstream.content.lock().unwrap() = r#"{
        "serviceNames": ["FocusFence", "DeepBlock", "Quiet Hours"],
        "coreMessage": "Reclaim two hours of deep work a day.",
        "deliveryMethod": "landing page",
        "testPlan": {
            "method": "fake-door landing page with signup",
            "channels": ["reddit", "newsletter"],
            "metrics": ["signup rate", "interview acceptances"],
            "successCriteria": "100 signups in two weeks"
        },
        "timeline": "2 weeks",
        "budget": "$100-200"
    }"#
    .into();
    let proxy_url = spawn_proxy(addr, Some("k")).await;
    let dir = TempDir::new().unwrap();
    let client = client_with_limit(&proxy_url, &dir, 3).await;

    let mut project = project_with_observations(3);
    project
        .apply(Edit::AddIdea {
            name: "focus blocker".into(),
            description: "blocks pings during deep work".into(),
        })
        .unwrap();
    let idea_id = project.data.ideas[0].id;
    project.apply(Edit::SelectIdea { id: Some(idea_id) }).unwrap();

    // MVP generation needs at least one interview.
    let err = client.generate_mvp_plan(&project.data).await.unwrap_err();
    assert!(matches!(err, AiError::NoInterviews));
    assert_eq!(upstream.hits.load(Ordering::Relaxed), 0);

    project.apply(Edit::AddInterview).unwrap();
    let plan = client.generate_mvp_plan(&project.data).await.unwrap();
    assert_eq!(plan.service_names.len(), 3);
    assert_eq!(plan.test_plan.channels, vec!["reddit", "newsletter"]);
    assert_eq!(plan.timeline, "2 weeks");

    project.apply(Edit::SetMvpPlan { plan }).unwrap();
    assert!(project.data.mvp_plan.is_some());
}

#[tokio::test]
async fn mvp_without_a_selected_idea_fails_fast() {
    let (upstream, addr) = spawn_upstream().await;
    let proxy_url = spawn_proxy(addr, Some("k")).await;
    let dir = TempDir::new().unwrap();
    let client = client_with_limit(&proxy_url, &dir, 3).await;

    let project = project_with_observations(3);
    let err = client.generate_mvp_plan(&project.data).await.unwrap_err();
    assert!(matches!(err, AiError::NoSelectedIdea));
    assert_eq!(upstream.hits.load(Ordering::Relaxed), 0);
}
