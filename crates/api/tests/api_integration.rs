//! API integration tests.
//!
//! Every test drives the full application (region and auth middleware
//! included) against in-memory regional stores.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::redundant_clone)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use twinchat_api::{AppState, app};
use twinchat_common::{AppResult, Config, Region};
use twinchat_core::{CodeDelivery, GeoLocator, ServiceRegistry};
use twinchat_store::models::{CodeType, User};
use twinchat_store::{DocumentStore, MemoryStore, models::Record, patch};

const CN_HOST: &str = "chat.example.cn";
const GLOBAL_HOST: &str = "chat.example.com";

/// Captures delivered codes instead of mailing them.
#[derive(Default)]
struct RecordingDelivery {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingDelivery {
    fn last_code(&self, email: &str) -> String {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
            .expect("a code was delivered")
    }
}

#[async_trait]
impl CodeDelivery for RecordingDelivery {
    async fn deliver(&self, email: &str, _code_type: CodeType, code: &str) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}

struct TestApp {
    router: Router,
    delivery: Arc<RecordingDelivery>,
    global_store: Arc<MemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(Config::for_testing())
    }

    fn with_config(config: Config) -> Self {
        let registry = ServiceRegistry::with_geolocator(config, Arc::new(GeoLocator::disabled()));
        let global_store = Arc::new(MemoryStore::new(Region::Global));
        registry.install_backend(Region::Global, global_store.clone());

        let delivery = Arc::new(RecordingDelivery::default());
        let state = AppState::new(Arc::new(registry), delivery.clone());
        Self {
            router: app(state),
            delivery,
            global_store,
        }
    }

    async fn post(&self, host: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .uri(uri)
            .method("POST")
            .header("Host", host)
            .header("Content-Type", "application/json")
            .header("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0 Safari/537.36");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        let response = self
            .router
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Register `name@example.com` on `host` and return (user id, token).
    async fn register(&self, host: &str, name: &str) -> (String, String) {
        let email = format!("{name}@example.com");
        let (status, _) = self
            .post(
                host,
                "/auth/verification-code/send",
                None,
                json!({ "email": email, "type": "register" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let code = self.delivery.last_code(&email);
        let (status, body) = self
            .post(
                host,
                "/auth/register",
                None,
                json!({ "email": email, "code": code, "username": name }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        (
            body["data"]["user"]["id"].as_str().unwrap().to_string(),
            body["data"]["token"].as_str().unwrap().to_string(),
        )
    }
}

#[tokio::test]
async fn test_meta_reports_region_by_host() {
    let app = TestApp::new();

    let (status, body) = app.post(CN_HOST, "/meta", None, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["region"], "cn");

    let (_, body) = app.post(GLOBAL_HOST, "/meta", None, json!({})).await;
    assert_eq!(body["data"]["region"], "global");
}

#[tokio::test]
async fn test_unresolvable_region_is_rejected_when_fail_closed() {
    let mut config = Config::for_testing();
    config.deployment.fail_closed = true;
    config.deployment.global_hosts = vec!["example.com".to_string()];
    let app = TestApp::with_config(config);

    let (status, body) = app.post("chat.example.org", "/meta", None, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = app.post(GLOBAL_HOST, "/meta", None, json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_send_code_never_returns_the_code() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            GLOBAL_HOST,
            "/auth/verification-code/send",
            None,
            json!({ "email": "Alice@Example.com", "type": "register" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["expiresAt"].is_string());

    let code = app.delivery.last_code("Alice@Example.com");
    assert!(!body.to_string().contains(&code));
}

#[tokio::test]
async fn test_resend_within_interval_is_rate_limited() {
    let app = TestApp::new();
    let request = json!({ "email": "bob@example.com", "type": "register" });

    let (status, _) = app
        .post(GLOBAL_HOST, "/auth/verification-code/send", None, request.clone())
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(GLOBAL_HOST, "/auth/verification-code/send", None, request.clone())
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert!(body["error"]["retryAfter"].as_u64().unwrap() > 0);

    // the other region keeps its own history
    let (status, _) = app
        .post(CN_HOST, "/auth/verification-code/send", None, request)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_rejects_wrong_code() {
    let app = TestApp::new();
    app.post(
        GLOBAL_HOST,
        "/auth/verification-code/send",
        None,
        json!({ "email": "carol@example.com", "type": "register" }),
    )
    .await;
    let code = app.delivery.last_code("carol@example.com");
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let (status, body) = app
        .post(
            GLOBAL_HOST,
            "/auth/register",
            None,
            json!({ "email": "carol@example.com", "code": wrong, "username": "carol" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = app
        .post(
            GLOBAL_HOST,
            "/auth/register",
            None,
            json!({ "email": "carol@example.com", "code": code, "username": "carol" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_verify_endpoint_leaves_registration_codes_alone() {
    let app = TestApp::new();
    app.post(
        GLOBAL_HOST,
        "/auth/verification-code/send",
        None,
        json!({ "email": "frank@example.com", "type": "register" }),
    )
    .await;
    let code = app.delivery.last_code("frank@example.com");

    let (status, _) = app
        .post(
            GLOBAL_HOST,
            "/auth/verification-code/verify",
            None,
            json!({ "email": "frank@example.com", "code": code, "type": "register" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            GLOBAL_HOST,
            "/auth/register",
            None,
            json!({ "email": "frank@example.com", "code": code, "username": "frank" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_reset_code_verifies_once() {
    let app = TestApp::new();
    app.post(
        GLOBAL_HOST,
        "/auth/verification-code/send",
        None,
        json!({ "email": "gina@example.com", "type": "reset_password" }),
    )
    .await;
    let code = app.delivery.last_code("gina@example.com");
    let request = json!({ "email": "gina@example.com", "code": code, "type": "reset_password" });

    let (status, body) = app
        .post(GLOBAL_HOST, "/auth/verification-code/verify", None, request.clone())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["verified"], true);

    let (status, _) = app
        .post(GLOBAL_HOST, "/auth/verification-code/verify", None, request)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_authentication_is_required_and_regional() {
    let app = TestApp::new();

    let (status, body) = app.post(GLOBAL_HOST, "/i", None, json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app.post(GLOBAL_HOST, "/i", Some("bogus"), json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (id, token) = app.register(GLOBAL_HOST, "dave").await;
    let (status, body) = app.post(GLOBAL_HOST, "/i", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["data"]["region"], "global");

    // a global session means nothing in the China region
    let (status, _) = app.post(CN_HOST, "/i", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_block_denies_messaging_both_ways() {
    let app = TestApp::new();
    let (alice, alice_token) = app.register(CN_HOST, "alice").await;
    let (bob, bob_token) = app.register(CN_HOST, "bob").await;

    let (status, body) = app
        .post(CN_HOST, "/messaging/conversations/create", Some(&alice_token), json!({ "userId": bob }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let conversation_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post(CN_HOST, "/blocking/create", Some(&bob_token), json!({ "userId": alice, "reason": "spam" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(CN_HOST, "/messaging/conversations/create", Some(&alice_token), json!({ "userId": bob }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Permission denied: blocked");

    let (status, body) = app
        .post(
            CN_HOST,
            "/messaging/messages/create",
            Some(&alice_token),
            json!({ "conversationId": conversation_id, "text": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");

    let (status, _) = app
        .post(
            CN_HOST,
            "/messaging/messages/create",
            Some(&bob_token),
            json!({ "conversationId": conversation_id, "text": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app
        .post(CN_HOST, "/blocking/delete", Some(&bob_token), json!({ "userId": alice }))
        .await;
    assert_eq!(body["data"]["removed"], true);

    let (status, _) = app
        .post(
            CN_HOST,
            "/messaging/messages/create",
            Some(&alice_token),
            json!({ "conversationId": conversation_id, "text": "hi again" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_privacy_limits_messages_to_contacts() {
    let app = TestApp::new();
    let (_, alice_token) = app.register(GLOBAL_HOST, "alice").await;
    let (bob, bob_token) = app.register(GLOBAL_HOST, "bob").await;

    let (status, body) = app
        .post(
            GLOBAL_HOST,
            "/i/privacy/update",
            Some(&bob_token),
            json!({ "allowNonFriendMessages": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["allowNonFriendMessages"], false);

    let (status, body) = app
        .post(GLOBAL_HOST, "/messaging/conversations/create", Some(&alice_token), json!({ "userId": bob }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Permission denied: not a contact");

    let (_, body) = app
        .post(GLOBAL_HOST, "/contacts/request", Some(&alice_token), json!({ "userId": bob }))
        .await;
    let alice = body["data"]["requesterId"].as_str().unwrap().to_string();
    let (status, _) = app
        .post(GLOBAL_HOST, "/contacts/accept", Some(&bob_token), json!({ "userId": alice }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(GLOBAL_HOST, "/messaging/conversations/create", Some(&alice_token), json!({ "userId": bob }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["kind"], "direct");
}

#[tokio::test]
async fn test_device_deletion_is_owner_only() {
    let app = TestApp::new();
    let (_, alice_token) = app.register(GLOBAL_HOST, "alice").await;
    let (_, bob_token) = app.register(GLOBAL_HOST, "bob").await;

    let (_, body) = app
        .post(GLOBAL_HOST, "/i/devices/list", Some(&bob_token), json!({}))
        .await;
    let devices = body["data"].as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["current"], true);
    assert_eq!(devices[0]["deviceName"], "Chrome 120 on Windows");
    assert!(devices[0].get("sessionToken").is_none());
    let bob_device = devices[0]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(GLOBAL_HOST, "/i/devices/delete", Some(&alice_token), json!({ "deviceId": bob_device }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Not found: Device not found");

    let (status, _) = app
        .post(GLOBAL_HOST, "/i/devices/delete", Some(&bob_token), json!({ "deviceId": bob_device }))
        .await;
    assert_eq!(status, StatusCode::OK);

    // the session went with the device
    let (status, _) = app.post(GLOBAL_HOST, "/i", Some(&bob_token), json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reports_are_reviewed_by_admins() {
    let app = TestApp::new();
    let (alice, alice_token) = app.register(GLOBAL_HOST, "alice").await;
    let (bob, _) = app.register(GLOBAL_HOST, "bob").await;
    let (admin, admin_token) = app.register(GLOBAL_HOST, "admin").await;
    app.global_store
        .update(User::COLLECTION, &admin, patch(json!({ "is_admin": true })))
        .await
        .unwrap();

    let (status, body) = app
        .post(
            GLOBAL_HOST,
            "/reports/create",
            Some(&alice_token),
            json!({ "reportedUserId": bob, "type": "spam", "reason": "ads" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    let report_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post(GLOBAL_HOST, "/admin/reports/list", Some(&alice_token), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app
        .post(GLOBAL_HOST, "/admin/reports/list", Some(&admin_token), json!({ "status": "pending" }))
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .post(
            GLOBAL_HOST,
            "/admin/reports/update",
            Some(&admin_token),
            json!({ "reportId": report_id, "status": "pending" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .post(
            GLOBAL_HOST,
            "/admin/reports/update",
            Some(&admin_token),
            json!({ "reportId": report_id, "status": "resolved", "adminNotes": "warned" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resolvedBy"], admin.as_str());
    assert!(body["data"]["resolvedAt"].is_string());
    assert_eq!(body["data"]["reporterId"], alice.as_str());
}

#[tokio::test]
async fn test_status_update_reports_mirror_outcome() {
    let app = TestApp::new();
    let (_, token) = app.register(GLOBAL_HOST, "erin").await;

    let (status, body) = app
        .post(GLOBAL_HOST, "/i/status", Some(&token), json!({ "status": "busy" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["status"], "busy");
    // the user does not exist in the other region
    assert!(body["data"]["mirror"].as_str().unwrap().starts_with("skipped"));
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let app = TestApp::new();
    let (status, _) = app.post(GLOBAL_HOST, "/nonexistent/endpoint", None, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
