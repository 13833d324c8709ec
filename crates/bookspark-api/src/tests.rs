use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use bookspark_crypto::LinkSigner;
use bookspark_db::{Database, NewBookmark, SignInProfile};
use bookspark_services::digest::DigestGenerator;
use bookspark_services::email::EmailService;
use bookspark_services::processor::ContentProcessor;
use bookspark_services::sync::BookmarkSync;
use bookspark_services::testing::{RecordingMailer, ScriptedAnalyzer, StaticSource};
use bookspark_services::twitter::{BookmarkPage, Post};
use bookspark_types::models::{BookmarkStatus, ContentType, EngagementMetrics};

use crate::auth::{AppState, AppStateInner, BRIDGE_SECRET_HEADER, create_token};
use crate::router;

const JWT_SECRET: &str = "test-jwt-secret";
const BRIDGE_SECRET: &str = "test-bridge-secret";
const BASE_URL: &str = "https://bookspark.test";

struct TestApp {
    router: Router,
    state: AppState,
    mailer: Arc<RecordingMailer>,
    source: Arc<StaticSource>,
}

fn app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mailer = Arc::new(RecordingMailer::default());
    let source = Arc::new(StaticSource::default());
    let links = LinkSigner::new("test-link-secret", chrono::Duration::days(14));
    let email = Arc::new(EmailService::new(mailer.clone(), links.clone(), BASE_URL));

    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: JWT_SECRET.into(),
        bridge_secret: Some(BRIDGE_SECRET.into()),
        links,
        email: email.clone(),
        sync: BookmarkSync::new(db.clone(), source.clone()),
        processor: ContentProcessor::new(db.clone(), Arc::new(ScriptedAnalyzer::default()))
            .with_delay(Duration::ZERO),
        digest: DigestGenerator::new(db, email).with_user_delay(Duration::ZERO),
    });

    TestApp {
        router: router(state.clone()),
        state,
        mailer,
        source,
    }
}

impl TestApp {
    fn db(&self) -> &Database {
        &self.state.db
    }

    fn user(&self, provider_id: &str) -> (Uuid, String) {
        let user = self
            .db()
            .upsert_user(
                &SignInProfile {
                    provider_id: provider_id.into(),
                    username: Some(format!("user{provider_id}")),
                    email: Some(format!("{provider_id}@example.com")),
                    access_token: Some("oauth-token".into()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        let token = create_token(JWT_SECRET, user.id, "tester").unwrap();
        (user.id, token)
    }

    fn bookmark(&self, user_id: Uuid, external_id: &str) -> Uuid {
        let (id, _) = self
            .db()
            .upsert_bookmark(
                &NewBookmark {
                    user_id,
                    external_id: external_id.into(),
                    content: format!("post {external_id}"),
                    cleaned_content: format!("post {external_id}"),
                    author_name: None,
                    author_username: None,
                    author_avatar_url: None,
                    author_verified: false,
                    url: None,
                    expanded_urls: vec![],
                    media: vec![],
                    metrics: EngagementMetrics::default(),
                    content_type: ContentType::Tweet,
                    posted_at: None,
                },
                Utc::now(),
            )
            .unwrap();
        id
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn json(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.send(req).await;
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(resp: Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// -- Auth --

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let (status, body) = app.json(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let app = app();
    let (status, body) = app.json(get("/api/bookmarks", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "success": false, "error": "Not authenticated" }));

    let forged = create_token("some-other-secret", Uuid::new_v4(), "mallory").unwrap();
    let (status, _) = app.json(get("/api/bookmarks", Some(&forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_in_requires_the_bridge_secret() {
    let app = app();
    let profile = json!({ "provider_id": "42", "username": "ada", "access_token": "tok" });
    let request = |secret: Option<&str>| {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/auth/signin")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(secret) = secret {
            builder = builder.header(BRIDGE_SECRET_HEADER, secret);
        }
        builder.body(Body::from(profile.to_string())).unwrap()
    };

    let (status, _) = app.json(request(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.json(request(Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.json(request(Some(BRIDGE_SECRET))).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app.json(get("/api/user/settings", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["digest_time"], "08:00:00");
    assert_eq!(body["settings"]["timezone"], "UTC");
}

// -- Bookmarks --

#[tokio::test]
async fn lists_new_bookmarks_by_default() {
    let app = app();
    let (user_id, token) = app.user("1");
    let keep = app.bookmark(user_id, "a");
    let done = app.bookmark(user_id, "b");
    app.db()
        .update_bookmark_status(done, user_id, BookmarkStatus::Done, None, Utc::now())
        .unwrap();

    let (status, body) = app.json(get("/api/bookmarks", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["bookmarks"][0]["id"], keep.to_string());

    let (_, body) = app.json(get("/api/bookmarks?status=all&limit=500", Some(&token))).await;
    assert_eq!(body["count"], 2);

    let (status, _) = app.json(get("/api/bookmarks?status=bogus", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_with_snooze_date_snoozes() {
    let app = app();
    let (user_id, token) = app.user("1");
    let id = app.bookmark(user_id, "a");

    let body = json!({ "bookmarkId": id, "status": "done", "snoozeUntil": "2030-01-01T09:00:00Z" });
    let (status, resp) = app.json(with_json("PATCH", "/api/bookmarks", &token, body)).await;
    assert_eq!(status, StatusCode::OK, "{resp}");

    let stored = app.db().get_bookmark(id).unwrap().unwrap();
    assert_eq!(stored.status, BookmarkStatus::Snoozed);
    assert_eq!(
        stored.snooze_until.map(|t| t.to_rfc3339()),
        Some("2030-01-01T09:00:00+00:00".to_string())
    );
}

#[tokio::test]
async fn patch_validation_and_ownership() {
    let app = app();
    let (owner, _) = app.user("1");
    let (_, intruder) = app.user("2");
    let id = app.bookmark(owner, "a");

    let cases = [
        (json!({ "status": "done" }), StatusCode::BAD_REQUEST),
        (json!({ "bookmarkId": "nope", "status": "done" }), StatusCode::BAD_REQUEST),
        (json!({ "bookmarkId": id, "status": "pending" }), StatusCode::BAD_REQUEST),
        (json!({ "bookmarkId": id, "status": "deleted" }), StatusCode::BAD_REQUEST),
        (json!({ "bookmarkId": id, "status": "done" }), StatusCode::NOT_FOUND),
    ];
    for (body, expected) in cases {
        let (status, resp) = app.json(with_json("PATCH", "/api/bookmarks", &intruder, body)).await;
        assert_eq!(status, expected, "{resp}");
        assert_eq!(resp["success"], false);
    }
    assert_eq!(app.db().get_bookmark(id).unwrap().unwrap().status, BookmarkStatus::New);
}

#[tokio::test]
async fn sync_then_analyze() {
    let app = app();
    let (_, token) = app.user("1");
    let post = |id: &str| Post {
        id: id.into(),
        text: format!("post {id}"),
        author_id: None,
        created_at: None,
        attachments: None,
        entities: None,
        public_metrics: None,
    };
    app.source.replace(BookmarkPage {
        data: vec![post("10"), post("11")],
        ..Default::default()
    });

    let (status, body) = app.json(with_json("POST", "/api/bookmarks/sync", &token, json!({}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["processed"], 2);
    assert_eq!(body["new"], 2);
    assert_eq!(body["updated"], 0);
    assert_eq!(body["aiProcessed"], 2);
}

#[tokio::test]
async fn sync_without_import_token_is_unauthorized() {
    let app = app();
    let user = app
        .db()
        .upsert_user(
            &SignInProfile {
                provider_id: "9".into(),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
    let token = create_token(JWT_SECRET, user.id, "x").unwrap();

    let (status, body) = app.json(with_json("POST", "/api/bookmarks/sync", &token, json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No token found for user");
}

#[tokio::test]
async fn reprocess_is_scoped_to_the_owner() {
    let app = app();
    let (owner, owner_token) = app.user("1");
    let (_, other_token) = app.user("2");
    let id = app.bookmark(owner, "a");
    let uri = format!("/api/bookmarks/{id}/reprocess");

    let (status, _) = app.json(with_json("POST", &uri, &other_token, json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.json(with_json("POST", &uri, &owner_token, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analyzed"], true);
    assert!(app.db().get_bookmark(id).unwrap().unwrap().processed_at.is_some());
}

// -- Digest links --

#[tokio::test]
async fn action_link_marks_done() {
    let app = app();
    let (user_id, _) = app.user("1");
    let id = app.bookmark(user_id, "a");
    let token = app
        .state
        .links
        .action_token(&user_id.to_string(), &id.to_string(), "done", Utc::now())
        .unwrap();

    let resp = app.send(get(&format!("/api/digest/action?token={token}"), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Action Complete!"));
    assert_eq!(app.db().get_bookmark(id).unwrap().unwrap().status, BookmarkStatus::Done);
}

#[tokio::test]
async fn action_link_snoozes_for_a_week() {
    let app = app();
    let (user_id, _) = app.user("1");
    let id = app.bookmark(user_id, "a");
    let token = app
        .state
        .links
        .action_token(&user_id.to_string(), &id.to_string(), "snooze", Utc::now())
        .unwrap();

    let resp = app.send(get(&format!("/api/digest/action?token={token}"), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let stored = app.db().get_bookmark(id).unwrap().unwrap();
    assert_eq!(stored.status, BookmarkStatus::Snoozed);
    let days = (stored.snooze_until.unwrap() - Utc::now()).num_days();
    assert!((6..=7).contains(&days), "{days}");
}

#[tokio::test]
async fn view_link_redirects_to_dashboard() {
    let app = app();
    let (user_id, _) = app.user("1");
    let id = app.bookmark(user_id, "a");
    let token = app
        .state
        .links
        .action_token(&user_id.to_string(), &id.to_string(), "view", Utc::now())
        .unwrap();

    let resp = app.send(get(&format!("/api/digest/action?token={token}"), None)).await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        resp.headers()[header::LOCATION],
        format!("{BASE_URL}/dashboard?highlight={id}").as_str()
    );
    assert_eq!(app.db().get_bookmark(id).unwrap().unwrap().status, BookmarkStatus::New);
}

#[tokio::test]
async fn bad_action_tokens() {
    let app = app();
    let (user_id, _) = app.user("1");
    let (other, _) = app.user("2");
    let id = app.bookmark(user_id, "a");
    let links = &app.state.links;
    let now = Utc::now();

    let unknown_action = links
        .action_token(&user_id.to_string(), &id.to_string(), "delete", now)
        .unwrap();
    let wrong_owner = links
        .action_token(&other.to_string(), &id.to_string(), "done", now)
        .unwrap();
    let foreign = LinkSigner::new("other", chrono::Duration::days(14))
        .action_token(&user_id.to_string(), &id.to_string(), "done", now)
        .unwrap();

    for (token, expected) in [
        ("", StatusCode::BAD_REQUEST),
        ("dXNlcjpib29rbWFyaw", StatusCode::BAD_REQUEST),
        (foreign.as_str(), StatusCode::BAD_REQUEST),
        (unknown_action.as_str(), StatusCode::BAD_REQUEST),
        (wrong_owner.as_str(), StatusCode::NOT_FOUND),
    ] {
        let resp = app.send(get(&format!("/api/digest/action?token={token}"), None)).await;
        assert_eq!(resp.status(), expected, "{token}");
    }
    assert_eq!(app.db().get_bookmark(id).unwrap().unwrap().status, BookmarkStatus::New);
}

#[tokio::test]
async fn unsubscribe_link_disables_digest() {
    let app = app();
    let (user_id, _) = app.user("1");
    let token = app.state.links.unsubscribe_token(&user_id.to_string(), Utc::now()).unwrap();

    let resp = app.send(get(&format!("/api/digest/unsubscribe?token={token}"), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!app.db().get_user(user_id).unwrap().unwrap().digest_enabled);

    // An action token is not an unsubscribe token
    let action = app
        .state
        .links
        .action_token(&user_id.to_string(), "b", "done", Utc::now())
        .unwrap();
    let resp = app.send(get(&format!("/api/digest/unsubscribe?token={action}"), None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// -- Digest triggers --

#[tokio::test]
async fn send_digest_for_unknown_user_is_not_found() {
    let app = app();
    let (_, token) = app.user("1");
    let body = json!({ "userId": Uuid::new_v4() });
    let (status, _) = app.json(with_json("POST", "/api/digest/send", &token, body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn send_to_all_reports_stats() {
    let app = app();
    let (_, token) = app.user("1");
    let (status, body) = app
        .json(with_json("POST", "/api/digest/send", &token, json!({ "sendToAll": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let stats = &body["stats"];
    let total = stats["sent"].as_u64().unwrap() + stats["failed"].as_u64().unwrap() + stats["skipped"].as_u64().unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_digest_uses_account_address() {
    let app = app();
    let (_, token) = app.user("1");

    let (status, body) = app.json(get("/api/digest/test", Some(&token))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Test digest sent to 1@example.com");

    let (status, _) = app
        .json(with_json(
            "POST",
            "/api/digest/test",
            &token,
            json!({ "email": "other@example.com", "name": "Other" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].to, vec!["other@example.com"]);
    assert!(sent[1].text.contains("Hello Other!"));
}

// -- Settings --

#[tokio::test]
async fn settings_roundtrip_and_validation() {
    let app = app();
    let (_, token) = app.user("1");

    let body = json!({ "digest_enabled": false, "digest_time": "21:15:00", "timezone": "Europe/Paris" });
    let (status, _) = app.json(with_json("PUT", "/api/user/settings", &token, body)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.json(get("/api/user/settings", Some(&token))).await;
    assert_eq!(
        body["settings"],
        json!({
            "digest_enabled": false,
            "digest_time": "21:15:00",
            "timezone": "Europe/Paris",
            "email": null
        })
    );

    let body = json!({ "digest_enabled": true, "digest_time": "25:00:00" });
    let (status, resp) = app.json(with_json("PUT", "/api/user/settings", &token, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"], "Invalid time format");
}

// -- Rejected requests keep the JSON envelope --

fn raw(method: &str, uri: &str, token: &str, content_type: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn malformed_json_body_is_a_json_error() {
    let app = app();
    let (_, token) = app.user("1");

    for req in [
        raw("PATCH", "/api/bookmarks", &token, Some("application/json"), "{not json"),
        raw("PATCH", "/api/bookmarks", &token, None, r#"{"status":"done"}"#),
        raw("PUT", "/api/user/settings", &token, Some("application/json"), r#"{"digest_enabled":true,"digest_time":7}"#),
        raw("POST", "/api/digest/send", &token, Some("application/json"), "{not json"),
    ] {
        let (status, body) = app.json(req).await;
        assert_eq!(status.as_u16() / 100, 4, "{body}");
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn bad_query_and_path_are_json_errors() {
    let app = app();
    let (_, token) = app.user("1");

    let (status, body) = app.json(get("/api/bookmarks?limit=-1", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = app
        .json(with_json("POST", "/api/bookmarks/not-a-uuid/reprocess", &token, json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn send_digest_accepts_an_empty_body() {
    let app = app();
    let (_, token) = app.user("1");

    let (status, body) = app.json(raw("POST", "/api/digest/send", &token, None, "")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    assert!(body["stats"].is_null());
}
