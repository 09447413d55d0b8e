use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use url::Url;

use tryon_bridge::tryon::keys::ApiKeyPolicy;
use tryon_bridge::tryon::normalize::NormalizeOptions;
use tryon_bridge::tryon::poller::PollSchedule;
use tryon_bridge::tryon::provider::{
    HttpTryOnProvider, ProviderContext, ProviderEndpoints, ProviderError, TryOnProvider,
};
use tryon_bridge::tryon::request::TryOnRequestBody;
use tryon_bridge::tryon::{ServiceSettings, TryOnError, TryOnService};

#[derive(Clone, Default)]
struct MockProvider {
    run_bodies: Arc<Mutex<Vec<Value>>>,
    auth_headers: Arc<Mutex<Vec<String>>>,
    status_calls: Arc<AtomicU32>,
}

impl MockProvider {
    fn record_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.auth_headers
            .lock()
            .expect("auth mutex poisoned")
            .push(value);
    }
}

async fn run_handler(
    State(mock): State<MockProvider>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.record_auth(&headers);
    mock.run_bodies
        .lock()
        .expect("run mutex poisoned")
        .push(body);
    if headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some("Bearer revoked-key")
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        );
    }
    (StatusCode::OK, Json(json!({ "id": "job/7", "error": null })))
}

async fn status_handler(
    State(mock): State<MockProvider>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    mock.record_auth(&headers);
    let call = mock.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let body = match call {
        1 => json!({ "id": job_id, "status": "starting" }),
        2 => json!({ "id": job_id, "status": "processing" }),
        _ => json!({
            "id": job_id,
            "status": "completed",
            "output": ["https://cdn.fashn.ai/job-7/output_0.png"],
            "error": null
        }),
    };
    (StatusCode::OK, Json(body))
}

async fn spawn_mock(mock: MockProvider) -> Url {
    let app = Router::new()
        .route("/v1/run", post(run_handler))
        .route("/v1/status/{job_id}", get(status_handler))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("mock listener should bind");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Url::parse(format!("http://{addr}/v1").as_str()).expect("mock url")
}

fn http_provider() -> HttpTryOnProvider {
    HttpTryOnProvider::new(Duration::from_secs(5)).expect("http client should build")
}

#[tokio::test]
async fn status_uses_percent_encoded_job_path_and_bearer_key() {
    let mock = MockProvider::default();
    let base = spawn_mock(mock.clone()).await;
    let ctx = ProviderContext {
        endpoints: ProviderEndpoints::new(base),
        api_key: String::from("sk-test"),
    };

    let status = http_provider()
        .status(&ctx, "job/7")
        .await
        .expect("status should decode");

    assert_eq!(status.id.as_deref(), Some("job/7"));
    assert_eq!(status.status, "starting");
    let auth = mock.auth_headers.lock().expect("auth mutex poisoned").clone();
    assert_eq!(auth, vec![String::from("Bearer sk-test")]);
}

#[tokio::test]
async fn service_runs_job_end_to_end_against_http_provider() {
    let mock = MockProvider::default();
    let base = spawn_mock(mock.clone()).await;
    let settings = ServiceSettings {
        endpoints: ProviderEndpoints::new(base),
        key_policy: ApiKeyPolicy::default(),
        schedule: PollSchedule {
            budget: Duration::from_secs(10),
            interval: Duration::from_millis(10),
        },
        normalize: NormalizeOptions::default(),
    };
    let service = TryOnService::new(Arc::new(http_provider()), settings);

    let result = service
        .run(TryOnRequestBody {
            model_image: Some(String::from("https://cdn.example.com/model.jpg")),
            garment_image: Some(String::from("https://cdn.example.com/shirt.jpg")),
            category: Some(String::from("bottom")),
            api_key: Some(String::from("sk-live")),
            ..TryOnRequestBody::default()
        })
        .await
        .expect("job should complete");

    assert_eq!(result.job_id, "job/7");
    assert_eq!(
        result.output,
        vec![String::from("https://cdn.fashn.ai/job-7/output_0.png")]
    );
    assert_eq!(result.polls, 3);
    assert_eq!(mock.status_calls.load(Ordering::SeqCst), 3);

    let run_bodies = mock.run_bodies.lock().expect("run mutex poisoned").clone();
    assert_eq!(run_bodies.len(), 1);
    assert_eq!(run_bodies[0]["model_name"], json!("tryon-v1.6"));
    assert_eq!(run_bodies[0]["inputs"]["category"], json!("bottoms"));
    assert_eq!(run_bodies[0]["inputs"]["seed"], json!(42));
    assert_eq!(run_bodies[0]["inputs"]["num_samples"], json!(1));

    let auth = mock.auth_headers.lock().expect("auth mutex poisoned").clone();
    assert_eq!(auth.len(), 4);
    assert!(auth.iter().all(|h| h == "Bearer sk-live"));
}

#[tokio::test]
async fn unauthorized_submit_surfaces_as_invalid_key() {
    let mock = MockProvider::default();
    let base = spawn_mock(mock.clone()).await;
    let settings = ServiceSettings {
        endpoints: ProviderEndpoints::new(base),
        key_policy: ApiKeyPolicy::default(),
        schedule: PollSchedule::default(),
        normalize: NormalizeOptions::default(),
    };
    let service = TryOnService::new(Arc::new(http_provider()), settings);

    let err = service
        .run(TryOnRequestBody {
            model_image: Some(String::from("https://cdn.example.com/model.jpg")),
            garment_image: Some(String::from("https://cdn.example.com/shirt.jpg")),
            api_key: Some(String::from("revoked-key")),
            ..TryOnRequestBody::default()
        })
        .await
        .expect_err("revoked key should fail");

    assert_eq!(err, TryOnError::InvalidApiKey);
    assert_eq!(mock.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let ctx = ProviderContext {
        endpoints: ProviderEndpoints::new(
            Url::parse(format!("http://{addr}/v1").as_str()).expect("url"),
        ),
        api_key: String::from("sk-test"),
    };
    let err = http_provider()
        .status(&ctx, "job-1")
        .await
        .expect_err("closed port should fail");

    assert!(matches!(err, ProviderError::Transport(_)));
}
