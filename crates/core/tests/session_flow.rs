//! End-to-end session lifecycle tests against a stub of the EQDB REST API.
//!
//! The stub issues epoch-numbered access tokens (`access-N`) and only
//! honours the latest epoch, so expiring a token is a single counter
//! bump. Tests drive the real `SessionManager` over HTTP.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use eqdb_core::{
    config::AppConfig, ApiClient, ApiError, SessionManager, SessionSnapshot, TokenStore,
    WeightSetService,
};

const EMAIL: &str = "user@example.com";
const PASSWORD: &str = "password123";
const REFRESH_TOKEN: &str = "refresh-ok";

#[derive(Default)]
struct StubApi {
    hits: AtomicUsize,
    refresh_calls: AtomicUsize,
    weight_set_calls: AtomicUsize,
    valid_epoch: AtomicUsize,
    fail_refresh: AtomicBool,
    reject_weight_sets: AtomicBool,
}

impl StubApi {
    fn current_access(&self) -> String {
        format!("access-{}", self.valid_epoch.load(Ordering::SeqCst))
    }

    /// Invalidate the outstanding access token without telling anyone.
    fn expire_access(&self) {
        self.valid_epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        bearer(headers).is_some_and(|token| token == self.current_access())
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn user_json() -> Value {
    json!({
        "id": 1,
        "email": EMAIL,
        "is_admin": false,
        "created_at": "2024-03-01T12:00:00Z",
        "last_login": "2024-03-02T08:30:00Z",
        "preferences": {"theme": "dark"}
    })
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Token is invalid or expired"})),
    )
}

async fn login(
    State(api): State<Arc<StubApi>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    api.hits.fetch_add(1, Ordering::SeqCst);
    if body["email"] == EMAIL && body["password"] == PASSWORD {
        api.valid_epoch.fetch_add(1, Ordering::SeqCst);
        (
            StatusCode::OK,
            Json(json!({
                "access_token": api.current_access(),
                "refresh_token": REFRESH_TOKEN,
                "user": user_json(),
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid credentials"})),
        )
    }
}

async fn refresh(State(api): State<Arc<StubApi>>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    api.hits.fetch_add(1, Ordering::SeqCst);
    api.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if api.fail_refresh.load(Ordering::SeqCst) || bearer(&headers) != Some(REFRESH_TOKEN) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Token refresh failed"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"access_token": api.current_access()})),
    )
}

async fn profile(State(api): State<Arc<StubApi>>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    api.hits.fetch_add(1, Ordering::SeqCst);
    if !api.authorized(&headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(user_json()))
}

async fn preferences(
    State(api): State<Arc<StubApi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    api.hits.fetch_add(1, Ordering::SeqCst);
    if !api.authorized(&headers) {
        return unauthorized();
    }
    // The server stores and echoes back the new preference object.
    (StatusCode::OK, Json(body))
}

async fn change_password(
    State(api): State<Arc<StubApi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    api.hits.fetch_add(1, Ordering::SeqCst);
    if !api.authorized(&headers) {
        return unauthorized();
    }
    if body["current_password"] != PASSWORD {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "Invalid current password"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"message": "Password changed successfully"})),
    )
}

async fn logout(State(api): State<Arc<StubApi>>) -> (StatusCode, Json<Value>) {
    api.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, Json(json!({})))
}

async fn weight_sets(
    State(api): State<Arc<StubApi>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    api.hits.fetch_add(1, Ordering::SeqCst);
    api.weight_set_calls.fetch_add(1, Ordering::SeqCst);
    if api.reject_weight_sets.load(Ordering::SeqCst) || !api.authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "weight_sets": [{
                "id": 11,
                "name": "Caster",
                "weights": [{"stat": "mana", "value": 2.0}],
                "created_at": "2024-03-01T12:00:00Z",
                "updated_at": "2024-03-01T12:00:00Z"
            }]
        })),
    )
}

async fn start_stub() -> (Arc<StubApi>, SocketAddr) {
    let api = Arc::new(StubApi::default());
    let app = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/refresh", post(refresh))
        .route("/api/v1/auth/profile", get(profile))
        .route("/api/v1/auth/preferences", put(preferences))
        .route("/api/v1/auth/change-password", post(change_password))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/user/weight-sets", get(weight_sets))
        .with_state(api.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind stub listener");
    let addr = listener.local_addr().expect("stub listener has no addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server died");
    });
    (api, addr)
}

struct Harness {
    api: Arc<StubApi>,
    manager: Arc<SessionManager>,
    config: AppConfig,
    _dir: TempDir,
}

impl Harness {
    fn store(&self) -> TokenStore {
        TokenStore::new(self.config.tokens_path())
    }

    /// Fresh manager over the same stub and token directory, as if the
    /// application had been restarted.
    fn restarted(&self) -> Arc<SessionManager> {
        let client = ApiClient::new(&self.config).expect("client should build");
        Arc::new(SessionManager::new(client, self.store()))
    }
}

async fn setup() -> Harness {
    let (api, addr) = start_stub().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let config = AppConfig {
        api_base_url: format!("http://{addr}/api/v1"),
        request_timeout_secs: 5,
        data_root: dir.path().to_path_buf(),
    };
    let client = ApiClient::new(&config).expect("client should build");
    let manager = Arc::new(SessionManager::new(client, TokenStore::new(config.tokens_path())));
    Harness {
        api,
        manager,
        config,
        _dir: dir,
    }
}

/// The core invariant: authenticated if and only if a user is present.
fn assert_consistent(snapshot: &SessionSnapshot) {
    assert_eq!(snapshot.is_authenticated(), snapshot.user().is_some());
}

#[tokio::test]
async fn resume_with_no_tokens_is_anonymous_without_network() {
    let harness = setup().await;
    harness.manager.resume().await;

    let snapshot = harness.manager.snapshot();
    assert_consistent(&snapshot);
    assert!(!snapshot.is_authenticated());
    assert!(!snapshot.is_loading);
    assert!(snapshot.error.is_none());
    assert_eq!(harness.api.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn login_persists_tokens_and_clears_prior_error() {
    let harness = setup().await;
    harness.manager.resume().await;

    // A failed attempt first, so there is an error to clear.
    let err = harness.manager.login(EMAIL, "wrong").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));
    let snapshot = harness.manager.snapshot();
    assert_consistent(&snapshot);
    assert!(!snapshot.is_authenticated());
    assert!(snapshot.error.as_deref().is_some_and(|m| !m.is_empty()));
    assert!(harness.store().load().expect("store readable").is_none());

    let user = harness
        .manager
        .login(EMAIL, PASSWORD)
        .await
        .expect("login should succeed");
    assert_eq!(user.email, EMAIL);

    let snapshot = harness.manager.snapshot();
    assert_consistent(&snapshot);
    assert!(snapshot.is_authenticated());
    assert!(!snapshot.is_loading);
    assert!(snapshot.error.is_none());

    let persisted = harness
        .store()
        .load()
        .expect("store readable")
        .expect("tokens persisted");
    assert_eq!(persisted.access, harness.api.current_access());
    assert_eq!(persisted.refresh, REFRESH_TOKEN);
}

#[tokio::test]
async fn resume_restores_a_persisted_session() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");

    let restarted = harness.restarted();
    restarted.resume().await;

    let snapshot = restarted.snapshot();
    assert_consistent(&snapshot);
    assert!(snapshot.is_authenticated());
    assert_eq!(snapshot.user().map(|u| u.email.as_str()), Some(EMAIL));
    assert_eq!(harness.api.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn resume_refreshes_a_stale_access_token() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");
    harness.api.expire_access();

    let restarted = harness.restarted();
    restarted.resume().await;

    let snapshot = restarted.snapshot();
    assert_consistent(&snapshot);
    assert!(snapshot.is_authenticated());
    assert_eq!(harness.api.refresh_calls.load(Ordering::SeqCst), 1);

    // The refreshed access token must be back on disk.
    let persisted = harness
        .store()
        .load()
        .expect("store readable")
        .expect("tokens persisted");
    assert_eq!(persisted.access, harness.api.current_access());
    assert_eq!(persisted.refresh, REFRESH_TOKEN);
}

#[tokio::test]
async fn resume_degrades_to_anonymous_when_refresh_fails() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");
    harness.api.expire_access();
    harness.api.fail_refresh.store(true, Ordering::SeqCst);

    let restarted = harness.restarted();
    restarted.resume().await;

    let snapshot = restarted.snapshot();
    assert_consistent(&snapshot);
    assert!(!snapshot.is_authenticated());
    assert!(!snapshot.is_loading);
    assert!(harness.store().load().expect("store readable").is_none());
}

#[tokio::test]
async fn stale_token_request_refreshes_and_retries_exactly_once() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");
    harness.api.expire_access();

    let service = WeightSetService::new(harness.manager.clone());
    let sets = service.list().await.expect("list should succeed after refresh");
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].name, "Caster");

    assert_eq!(harness.api.refresh_calls.load(Ordering::SeqCst), 1);
    // First call 401s, the retry succeeds; never more than two.
    assert_eq!(harness.api.weight_set_calls.load(Ordering::SeqCst), 2);
    assert_consistent(&harness.manager.snapshot());
}

#[tokio::test]
async fn failed_refresh_on_a_request_signs_the_session_out() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");
    harness.api.expire_access();
    harness.api.fail_refresh.store(true, Ordering::SeqCst);

    let service = WeightSetService::new(harness.manager.clone());
    let err = service.list().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(harness.api.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.api.weight_set_calls.load(Ordering::SeqCst), 1);

    let snapshot = harness.manager.snapshot();
    assert_consistent(&snapshot);
    assert!(!snapshot.is_authenticated());
    assert!(snapshot.error.is_some());
    assert!(harness.store().load().expect("store readable").is_none());
}

#[tokio::test]
async fn retry_that_still_401s_signs_the_session_out() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");
    // The server keeps rejecting the endpoint even though refresh mints
    // perfectly good access tokens.
    harness.api.reject_weight_sets.store(true, Ordering::SeqCst);

    let service = WeightSetService::new(harness.manager.clone());
    let err = service.list().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));

    // One refresh, one retry, and nothing beyond that.
    assert_eq!(harness.api.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.api.weight_set_calls.load(Ordering::SeqCst), 2);

    let snapshot = harness.manager.snapshot();
    assert_consistent(&snapshot);
    assert!(!snapshot.is_authenticated());
    assert!(snapshot.error.is_some());
    assert!(harness.store().load().expect("store readable").is_none());
}

#[tokio::test]
async fn failed_relogin_drops_the_previous_session() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");

    let err = harness.manager.login(EMAIL, "wrong").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));

    let snapshot = harness.manager.snapshot();
    assert_consistent(&snapshot);
    assert!(!snapshot.is_authenticated());
    assert!(snapshot.error.is_some());
    assert!(harness.store().load().expect("store readable").is_none());

    // The old pair is gone from memory too, not just from the snapshot.
    let err = harness
        .manager
        .change_password(PASSWORD, "fresh-password")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotAuthenticated));
}

#[tokio::test]
async fn logout_clears_tokens_and_is_idempotent() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");

    harness.manager.logout();
    let snapshot = harness.manager.snapshot();
    assert_consistent(&snapshot);
    assert!(!snapshot.is_authenticated());
    assert!(snapshot.error.is_none());
    assert!(harness.store().load().expect("store readable").is_none());

    // Logging out while already anonymous changes nothing and panics nowhere.
    harness.manager.logout();
    let snapshot = harness.manager.snapshot();
    assert_consistent(&snapshot);
    assert!(!snapshot.is_authenticated());
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn update_preferences_replaces_the_stored_object() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");

    let updated = harness
        .manager
        .update_preferences(&json!({"theme": "light", "items_per_page": 50}))
        .await
        .expect("preference update should succeed");
    assert_eq!(updated["theme"], "light");

    let snapshot = harness.manager.snapshot();
    assert_consistent(&snapshot);
    let user = snapshot.user().expect("still signed in");
    assert_eq!(user.preferences["items_per_page"], 50);
}

#[tokio::test]
async fn change_password_surfaces_the_server_message() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");

    harness
        .manager
        .change_password(PASSWORD, "a-new-password")
        .await
        .expect("change should succeed");
    // Tokens are untouched, the session stays authenticated.
    assert!(harness.manager.snapshot().is_authenticated());

    let err = harness
        .manager
        .change_password("wrong-current", "another-password")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid current password"));
    assert!(harness.manager.snapshot().is_authenticated());
}

#[tokio::test]
async fn short_new_password_is_rejected_locally() {
    let harness = setup().await;
    harness.manager.login(EMAIL, PASSWORD).await.expect("login");
    let before = harness.api.hits.load(Ordering::SeqCst);

    let err = harness
        .manager
        .change_password(PASSWORD, "short")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(harness.api.hits.load(Ordering::SeqCst), before);
}
