use std::sync::Arc;

use mentors_server::{AppConfig, AppState, build_app};
use mentors_storage::MentorStatus;
use mentors_test_utils::{MemoryStore, fixtures};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

const ADMIN_TOKEN: &str = "operator-secret";

struct TestServer {
    base: String,
    store: Arc<MemoryStore>,
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

async fn start_server() -> TestServer {
    let store = Arc::new(MemoryStore::with_records(
        vec![
            fixtures::mentor(1, "alice"),
            fixtures::mentor(2, "bob"),
            fixtures::mentor_with_status(3, "carol", MentorStatus::Pending),
        ],
        &["Backend", "Go", "Rust"],
    ));
    let mut cfg = AppConfig::default();
    cfg.admin.token = Some(ADMIN_TOKEN.into());
    let state = AppState::new(store.clone(), &cfg);
    let app = build_app(&cfg, state);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        base: format!("http://{addr}"),
        store,
        shutdown: tx,
        handle,
    }
}

#[tokio::test]
async fn health_and_public_directory() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let resp = client.get(server.url("/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let body: Value = client
        .get(server.url("/readyz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["cache"], "empty");

    // Public list: visible only, secure and long fields dropped
    let resp = client.get(server.url("/api/v1/mentors")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let list: Vec<Value> = resp.json().await.unwrap();
    let slugs: Vec<_> = list.iter().map(|m| m["slug"].as_str().unwrap()).collect();
    assert_eq!(slugs, vec!["bob", "alice"]);
    for mentor in &list {
        assert!(mentor.get("authToken").is_none());
        assert!(mentor.get("calendarUrl").is_none());
        assert!(mentor.get("telegramChatId").is_none());
        assert_eq!(mentor["about"], "");
    }

    // Public single keeps long fields
    let alice: Value = client
        .get(server.url("/api/v1/mentors/alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(alice["about"], "About alice");
    assert!(alice.get("authToken").is_none());

    let resp = client
        .get(server.url("/api/v1/mentors/id/2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap()["slug"], "bob");

    // Hidden and unknown mentors are 404
    let resp = client
        .get(server.url("/api/v1/mentors/carol"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    let tags: Vec<String> = client
        .get(server.url("/api/v1/tags"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tags, vec!["Backend", "Go", "Rust"]);

    assert_eq!(server.store.fetch_all_calls(), 1);
    server.stop().await;
}

#[tokio::test]
async fn force_reset_cache_reloads_the_catalog() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    client.get(server.url("/api/v1/mentors")).send().await.unwrap();
    server.store.upsert(fixtures::mentor(4, "dave")).await;

    let resp = client
        .get(server.url("/api/v1/mentors/dave"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client
        .get(server.url("/api/v1/mentors/dave?force_reset_cache=true"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(server.store.fetch_all_calls(), 2);
    server.stop().await;
}

#[tokio::test]
async fn change_notifications_always_succeed() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    client.get(server.url("/api/v1/mentors")).send().await.unwrap();

    server
        .store
        .modify(&fixtures::external_id(1), |r| r.price = "4200".into())
        .await;
    let resp = client
        .post(server.url("/api/v1/webhooks/record-changed"))
        .json(&json!({ "recordId": fixtures::external_id(1) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"], json!({ "cache": "refreshed", "slug": "alice" }));

    let alice: Value = client
        .get(server.url("/api/v1/mentors/alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(alice["price"], "4200");

    // Unknown ID and malformed bodies fall back to invalidation
    let resp = client
        .post(server.url("/api/v1/webhooks/record-changed"))
        .json(&json!({ "recordId": "recMissing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap()["result"]["cache"], "invalidated");

    let resp = client
        .post(server.url("/api/v1/webhooks/record-changed"))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn profile_requires_matching_token() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let resp = client.get(server.url("/api/v1/profile")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .get(server.url("/api/v1/profile"))
        .header("x-mentor-id", "1")
        .header("x-mentor-token", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .get(server.url("/api/v1/profile"))
        .header("x-mentor-id", "1")
        .header("x-mentor-token", "token-alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let me: Value = resp.json().await.unwrap();
    assert_eq!(me["authToken"], "token-alice");
    assert_eq!(me["calendarUrl"], "https://cal.example/alice");

    server.stop().await;
}

#[tokio::test]
async fn profile_save_is_visible_immediately() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/v1/profile"))
        .header("x-mentor-id", "2")
        .header("x-mentor-token", "token-bob")
        .json(&json!({ "jobTitle": "CTO", "tags": ["Go", "Rust"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let saved: Value = resp.json().await.unwrap();
    assert_eq!(saved["jobTitle"], "CTO");

    let bob: Value = client
        .get(server.url("/api/v1/mentors/bob"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bob["jobTitle"], "CTO");
    assert_eq!(bob["tags"], json!(["Go", "Rust"]));

    let resp = client
        .post(server.url("/api/v1/profile/picture"))
        .header("x-mentor-id", "2")
        .header("x-mentor-token", "token-bob")
        .json(&json!({ "imageUrl": "https://img.example/bob.png" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .post(server.url("/api/v1/profile"))
        .header("x-mentor-id", "2")
        .header("x-mentor-token", "token-bob")
        .json(&json!({ "tags": ["Cobol"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(server.store.fetch_all_calls(), 1);
    server.stop().await;
}

#[tokio::test]
async fn admin_endpoints_require_the_operator_token() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(server.url("/api/v1/admin/mentors"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .get(server.url("/api/v1/admin/mentors"))
        .header("x-admin-token", "nope")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let list: Vec<Value> = client
        .get(server.url("/api/v1/admin/mentors"))
        .header("x-admin-token", ADMIN_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.len(), 3);
    assert!(list.iter().all(|m| m.get("authToken").is_some()));

    server.stop().await;
}

#[tokio::test]
async fn moderation_flow() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/v1/admin/mentors/carol/status"))
        .header("x-admin-token", ADMIN_TOKEN)
        .json(&json!({ "action": "approve" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap()["result"]["cache"], "invalidated");

    let resp = client
        .get(server.url("/api/v1/mentors/carol"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .post(server.url("/api/v1/admin/mentors/bob/status"))
        .header("x-admin-token", ADMIN_TOKEN)
        .json(&json!({ "action": "decline" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap()["result"]["cache"], "removed");
    let resp = client
        .get(server.url("/api/v1/mentors/bob"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client
        .patch(server.url("/api/v1/admin/mentors/alice"))
        .header("x-admin-token", ADMIN_TOKEN)
        .json(&json!({ "workplace": "Initech" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let alice: Value = client
        .get(server.url("/api/v1/mentors/alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(alice["workplace"], "Initech");

    let stats: Value = client
        .get(server.url("/api/v1/admin/cache/stats"))
        .header("x-admin-token", ADMIN_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["directory"]["state"], "populated");
    assert_eq!(stats["directory"]["backend"], "memory");

    let resp = client
        .post(server.url("/api/v1/admin/cache/invalidate"))
        .header("x-admin-token", ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ready: Value = client
        .get(server.url("/readyz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ready["cache"], "empty");

    server.stop().await;
}

#[tokio::test]
async fn store_outage_on_cold_cache_is_503() {
    let server = start_server().await;
    server.store.set_unavailable(true);

    let resp = reqwest::get(server.url("/api/v1/mentors")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "backend_unavailable");

    server.stop().await;
}
