//! Boundary tests: drive the router end-to-end over the in-memory backend
//! with real signatures.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use ai4a_auth::{
    account_id_for_key, challenge_message, Ed25519Scheme, RequestAuthenticator, SignatureScheme,
};
use ai4a_kernel::DayCoordinator;
use ai4a_service::{router, ServiceState};
use ai4a_store_core::Stores;
use ai4a_store_memory::MemoryBackend;
use ai4a_types::{
    AccountId, AssignmentConfig, CanaryConfig, EpochConfig, RewardConfig,
};

const ADMIN_KEY: &str = "test-admin-key";
const DAY: &str = "2026-01-28";

fn memory_stores() -> Stores {
    let backend = Arc::new(MemoryBackend::new());
    Stores {
        events: backend.clone(),
        state: backend.clone(),
        assignments: backend.clone(),
        submissions: backend.clone(),
        operational: backend.clone(),
        balances: backend,
    }
}

async fn app() -> Router {
    let config = EpochConfig {
        assignment: AssignmentConfig {
            blocks_per_batch: 5,
            max_batches: 8,
            lookback_days: 7,
        },
        canary: CanaryConfig {
            canary_percentage: 0.1,
        },
        rewards: RewardConfig::default(),
    };
    let coordinator = Arc::new(DayCoordinator::new(memory_stores(), config).await.unwrap());
    let scheme: Arc<dyn SignatureScheme> = Arc::new(Ed25519Scheme);
    router(ServiceState {
        coordinator,
        authenticator: Arc::new(RequestAuthenticator::new(scheme)),
        admin_key: ADMIN_KEY.to_string(),
    })
}

struct Worker {
    secret: Vec<u8>,
    public_hex: String,
    account: AccountId,
}

fn worker(seed: u8) -> Worker {
    let signing = SigningKey::from_bytes(&[seed; 32]);
    let public = signing.verifying_key().to_bytes().to_vec();
    Worker {
        secret: signing.to_bytes().to_vec(),
        account: account_id_for_key(&public),
        public_hex: hex::encode(public),
    }
}

fn auth_fields(worker: &Worker) -> Value {
    let timestamp = Utc::now().to_rfc3339();
    let message = challenge_message(&worker.account, &timestamp);
    let signature = Ed25519Scheme
        .sign(message.as_bytes(), &worker.secret)
        .unwrap();
    json!({
        "accountId": worker.account.to_string(),
        "timestamp": timestamp,
        "signature": hex::encode(signature),
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn post_json(path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_admin(path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("x-admin-key", ADMIN_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

async fn register(app: &Router, worker: &Worker) {
    let (status, body) = send(
        app,
        post_json(
            "/nodes/register",
            &json!({
                "accountId": worker.account.to_string(),
                "publicKey": worker.public_hex,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["created"], json!(true));
}

#[tokio::test]
async fn full_day_over_http() {
    let app = app().await;
    let alice = worker(1);
    register(&app, &alice).await;

    // Admin starts the day.
    let (status, started) =
        send(&app, post_admin("/admin/day/start", &json!({ "dayId": DAY }))).await;
    assert_eq!(status, StatusCode::OK, "{started}");
    assert_eq!(started["rosterSize"], json!(1));

    // Worker pulls assignments.
    let mut request_body = auth_fields(&alice);
    let (status, work) = send(&app, post_json("/work/request", &request_body)).await;
    assert_eq!(status, StatusCode::OK, "{work}");
    let block_ids: Vec<String> = work["assignments"][0]["blockIds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();

    // Submit the first five blocks; at most four are canaries, so at least
    // one normal block lands and keeps the worker reward-eligible.
    let submissions: Vec<Value> = block_ids
        .iter()
        .take(5)
        .map(|block_id| {
            json!({
                "blockId": block_id,
                "blockType": "INFERENCE",
                "resourceUsage": 0.9,
                "difficultyMultiplier": 1.0,
                "validationPassed": true,
                "canaryAnswerCorrect": true,
            })
        })
        .collect();
    request_body = auth_fields(&alice);
    request_body["dayId"] = json!(DAY);
    request_body["submissions"] = json!(submissions);
    let (status, submitted) = send(&app, post_json("/work/submit", &request_body)).await;
    assert_eq!(status, StatusCode::OK, "{submitted}");
    assert_eq!(submitted["results"][0]["accepted"], json!(true));
    assert_eq!(submitted["pendingCount"], json!(5));

    // Admin finalizes.
    let (status, finalized) =
        send(&app, post_admin("/admin/day/finalize", &json!({}))).await;
    assert_eq!(status, StatusCode::OK, "{finalized}");
    assert_eq!(finalized["dayNumber"], json!(1));

    // Read models serve the finalized day.
    let (status, rewards) = send(&app, get(&format!("/rewards/day?dayId={DAY}"))).await;
    assert_eq!(status, StatusCode::OK, "{rewards}");
    assert_eq!(rewards["activeContributorCount"], json!(1));

    let (status, root) = send(&app, get(&format!("/rewards/root?dayId={DAY}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(root["leafCount"], json!(1));

    let (status, proof) = send(
        &app,
        get(&format!(
            "/rewards/proof?dayId={DAY}&accountId={}",
            alice.account
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{proof}");
    assert_eq!(proof["root"], root["rewardRoot"]);

    let (status, balance) = send(
        &app,
        get(&format!("/accounts/{}/balance", alice.account)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(balance["balanceMicro"].as_u64().unwrap() > 0);

    let (status, health) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["phase"], json!("IDLE"));
    assert_eq!(health["dayNumber"], json!(1));
}

#[tokio::test]
async fn admin_endpoints_require_the_key() {
    let app = app().await;
    let (status, _) = send(&app, post_json("/admin/day/start", &json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let bad = Request::builder()
        .method("GET")
        .uri("/admin/day/status")
        .header("x-admin-key", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, bad).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn bad_signature_is_unauthorized() {
    let app = app().await;
    let alice = worker(1);
    register(&app, &alice).await;
    let (status, _) = send(&app, post_admin("/admin/day/start", &json!({ "dayId": DAY }))).await;
    assert_eq!(status, StatusCode::OK);

    let mut body = auth_fields(&alice);
    body["signature"] = json!("ab".repeat(64));
    let (status, response) = send(&app, post_json("/work/request", &body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{response}");
}

#[tokio::test]
async fn unknown_account_is_unauthorized() {
    let app = app().await;
    let ghost = worker(9);
    let (status, _) = send(&app, post_json("/work/request", &auth_fields(&ghost))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_mismatched_address() {
    let app = app().await;
    let alice = worker(1);
    let bob = worker(2);
    let (status, _) = send(
        &app,
        post_json(
            "/nodes/register",
            &json!({
                "accountId": alice.account.to_string(),
                "publicKey": bob.public_hex,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn phase_conflicts_map_to_409() {
    let app = app().await;
    let (status, body) = send(&app, post_admin("/admin/day/finalize", &json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], json!("DAY_NOT_STARTED"));
}

#[tokio::test]
async fn missing_distribution_is_404() {
    let app = app().await;
    let (status, _) = send(&app, get(&format!("/rewards/day?dayId={DAY}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn heartbeat_round_trip() {
    let app = app().await;
    let alice = worker(1);
    register(&app, &alice).await;

    let (status, body) = send(&app, post_json("/nodes/heartbeat", &auth_fields(&alice))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["ok"], json!(true));
}
