//! Router-level tests: each request goes through the full middleware stack
//! against an in-memory store.

use std::sync::Arc;

use axum::{
  body::Body,
  http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use gumbo_core::{
  content::{ContentBody, ContentKind, NewCategory, NewContent, NewTopic, TextBody, VideoBody},
  module::{ModuleItemRef, NewModule},
  principal::{NewPrincipal, Role},
  store::Repository,
  subscription::{NewSubscription, Plan, PricingConfig, SubscriptionStatus, Transition},
  tenant::{TenantId, TenantRegistry},
};
use gumbo_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use super::*;
use crate::{payments::LocalProvider, signer::CdnSigner, token::TokenConfig};

const LEARNING: &str = "com.gumbo.learning";
const ENGLISH: &str = "com.gumbo.english";

fn tenant(raw: &str) -> TenantId { TenantId::parse(raw).unwrap() }

async fn make_state() -> AppState<SqliteStore> {
  AppState {
    store:          Arc::new(SqliteStore::open_in_memory().await.unwrap()),
    tenants:        Arc::new(TenantRegistry::gumbo()),
    tokens:         Arc::new(TokenConfig::new("test-secret", Duration::days(7))),
    pricing:        Arc::new(PricingConfig::default()),
    signer:         Arc::new(CdnSigner::new("https://cdn.test", "cdn-secret").unwrap()),
    payments:       Arc::new(LocalProvider),
    identity:       Arc::new(identity::tests::verifier()),
    signed_url_ttl: Duration::hours(1),
  }
}

async fn call(
  state:   &AppState<SqliteStore>,
  method:  Method,
  uri:     &str,
  headers: &[(&str, &str)],
  body:    Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  for (k, v) in headers {
    builder = builder.header(*k, *v);
  }
  let req = match body {
    Some(json) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(json.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };

  let resp    = router(state.clone()).oneshot(req).await.unwrap();
  let status  = resp.status();
  let headers = resp.headers().clone();
  let bytes   = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let json    = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, headers, json)
}

fn bearer(token: &str) -> String { format!("Bearer {token}") }

/// Register through the API; returns the token and principal id.
async fn register(state: &AppState<SqliteStore>, package: &str, email: &str) -> (String, Uuid) {
  let (status, _, json) = call(
    state,
    Method::POST,
    "/api/auth/register",
    &[("x-package-id", package)],
    Some(json!({ "email": email, "password": "correct horse" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{json}");
  let token = json["data"]["token"].as_str().unwrap().to_owned();
  let id    = json["data"]["principal"]["principal_id"].as_str().unwrap().parse().unwrap();
  (token, id)
}

async fn admin_token(state: &AppState<SqliteStore>) -> String {
  let mut input = NewPrincipal::new(tenant(LEARNING), "root@example.com");
  input.role = Role::Admin;
  let admin = state.store.create_principal(input).await.unwrap();
  state.tokens.issue(admin.principal_id, Utc::now()).unwrap()
}

/// Activate a monthly subscription for `principal_id` directly in the store.
async fn subscribe(state: &AppState<SqliteStore>, principal_id: Uuid, package: &str) {
  let now = Utc::now();
  let mut sub = state
    .store
    .create_subscription(NewSubscription::checkout(
      principal_id,
      tenant(package),
      Plan::Monthly,
      &state.pricing,
      now,
    ))
    .await
    .unwrap();
  sub.activate(Some("pay_seed"), now, &state.pricing).unwrap();
  state.store.save_subscription(&sub).await.unwrap();
}

async fn seed_topic(state: &AppState<SqliteStore>, package: &str) -> Uuid {
  let t = tenant(package);
  let category = state
    .store
    .create_category(&t, NewCategory {
      name:          format!("{package} basics"),
      description:   None,
      display_order: 0,
    })
    .await
    .unwrap();
  state
    .store
    .create_topic(&t, NewTopic {
      category_id:   category.category_id,
      title:         "Greetings".into(),
      description:   None,
      is_premium:    false,
      display_order: 0,
    })
    .await
    .unwrap()
    .topic_id
}

async fn seed_content(
  state:     &AppState<SqliteStore>,
  package:   &str,
  topic_id:  Uuid,
  body:      ContentBody,
  is_locked: bool,
) -> Uuid {
  state
    .store
    .create_content(&tenant(package), NewContent {
      topic_id,
      title: "Lesson".into(),
      description: None,
      body,
      is_locked,
      position: 0,
    })
    .await
    .unwrap()
    .content_id
}

fn text(body: &str) -> ContentBody {
  ContentBody::Text(TextBody { body: body.into(), reading_minutes: Some(3) })
}

fn video(key: &str, is_free: bool) -> ContentBody {
  ContentBody::Video(VideoBody {
    asset_key: key.into(),
    duration_secs: Some(90),
    thumbnail_url: None,
    is_free,
  })
}

async fn webhook(state: &AppState<SqliteStore>, event: &str, payload: Value) -> Value {
  let (status, _, json) = call(
    state,
    Method::POST,
    "/api/webhooks/payments",
    &[],
    Some(json!({ "event": event, "payload": payload })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{json}");
  json["data"]["outcome"].clone()
}

// ─── Tenant resolution ───────────────────────────────────────────────────────

#[tokio::test]
async fn health_is_outside_tenant_resolution() {
  let state = make_state().await;
  let (status, _, json) =
    call(&state, Method::GET, "/health", &[("x-package-id", "NotAPackage")], None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(json["data"]["status"], "ok");
}

#[tokio::test]
async fn malformed_package_header_is_rejected() {
  let state = make_state().await;
  let (status, headers, json) =
    call(&state, Method::GET, "/api/categories", &[("x-package-id", "NotAPackage")], None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(json["code"], "INVALID_PACKAGE_ID_FORMAT");
  assert_eq!(json["success"], false);
  assert!(headers.get("x-response-package-id").is_none());
}

#[tokio::test]
async fn unsupported_package_lists_supported_ones() {
  let state = make_state().await;
  let (status, _, json) =
    call(&state, Method::GET, "/api/categories", &[("x-package-id", "com.other.app")], None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(json["code"], "UNSUPPORTED_PACKAGE_ID");
  assert_eq!(json["supportedPackages"], json!([LEARNING, ENGLISH]));
}

#[tokio::test]
async fn missing_header_reads_the_default_tenant_catalog() {
  let state = make_state().await;
  seed_topic(&state, LEARNING).await;
  seed_topic(&state, ENGLISH).await;

  let (status, headers, json) = call(&state, Method::GET, "/api/categories", &[], None).await;
  assert_eq!(status, StatusCode::OK);
  let categories = json["data"].as_array().unwrap();
  assert_eq!(categories.len(), 1);
  assert_eq!(categories[0]["tenant"], LEARNING);
  assert_eq!(headers["x-response-package-id"], LEARNING);
  assert_eq!(headers["x-app-name"], "Seekho");
}

#[tokio::test]
async fn response_echoes_the_resolved_tenant() {
  let state = make_state().await;
  let (_, headers, _) =
    call(&state, Method::GET, "/api/categories", &[("x-package-id", ENGLISH)], None).await;
  assert_eq!(headers["x-response-package-id"], ENGLISH);
  assert_eq!(headers["x-app-name"], "Bolo");
}

#[tokio::test]
async fn unknown_route_is_a_json_404() {
  let state = make_state().await;
  let (status, _, json) = call(&state, Method::GET, "/api/nowhere", &[], None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(json["code"], "NOT_FOUND");
}

// ─── Credentials ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_then_login_in_the_same_tenant() {
  let state = make_state().await;
  register(&state, ENGLISH, "Learner@Example.com").await;

  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/auth/login",
    &[("x-package-id", ENGLISH)],
    Some(json!({ "email": "learner@example.com", "password": "correct horse" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{json}");
  assert!(json["data"]["token"].as_str().is_some());
  assert!(json["data"]["principal"].get("password_hash").is_none());

  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/auth/login",
    &[("x-package-id", LEARNING)],
    Some(json!({ "email": "learner@example.com", "password": "correct horse" })),
  )
  .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(json["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
  let state = make_state().await;
  register(&state, LEARNING, "a@example.com").await;
  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/auth/login",
    &[],
    Some(json!({ "email": "a@example.com", "password": "wrong password" })),
  )
  .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(json["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn malformed_json_body_is_a_validation_error() {
  let state = make_state().await;
  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/auth/register",
    &[],
    Some(json!({ "email": "a@example.com" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn token_from_another_tenant_is_a_mismatch() {
  let state = make_state().await;
  let (token, _) = register(&state, LEARNING, "a@example.com").await;
  let auth = bearer(&token);

  let (status, _, _) =
    call(&state, Method::GET, "/api/auth/me", &[("authorization", &auth)], None).await;
  assert_eq!(status, StatusCode::OK);

  let (status, _, json) = call(
    &state,
    Method::GET,
    "/api/auth/me",
    &[("authorization", &auth), ("x-package-id", ENGLISH)],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(json["code"], "TENANT_MISMATCH");
  assert_eq!(json["message"], "Invalid or expired token");
}

#[tokio::test]
async fn admin_token_is_valid_in_every_tenant() {
  let state = make_state().await;
  let auth  = bearer(&admin_token(&state).await);
  for package in [LEARNING, ENGLISH] {
    let (status, _, json) = call(
      &state,
      Method::GET,
      "/api/auth/me",
      &[("authorization", &auth), ("x-package-id", package)],
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{package}: {json}");
    assert_eq!(json["data"]["principal"]["role"], "admin");
  }
}

#[tokio::test]
async fn missing_and_garbage_tokens() {
  let state = make_state().await;
  let (status, _, json) = call(&state, Method::GET, "/api/auth/me", &[], None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(json["code"], "NO_TOKEN");

  let (status, _, json) =
    call(&state, Method::GET, "/api/auth/me", &[("authorization", "Bearer nope")], None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(json["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn deleted_account_cannot_authenticate() {
  let state = make_state().await;
  let (token, _) = register(&state, LEARNING, "gone@example.com").await;
  let auth = bearer(&token);

  let (status, _, _) =
    call(&state, Method::DELETE, "/api/auth/me", &[("authorization", &auth)], None).await;
  assert_eq!(status, StatusCode::OK);

  let (status, _, json) =
    call(&state, Method::GET, "/api/auth/me", &[("authorization", &auth)], None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(json["code"], "ACCOUNT_DEACTIVATED");

  // The address is free again.
  register(&state, LEARNING, "gone@example.com").await;
}

async fn external_login(state: &AppState<SqliteStore>, package: &str, id_token: &str) -> (StatusCode, Value) {
  let (status, _, json) = call(
    state,
    Method::POST,
    "/api/auth/external",
    &[("x-package-id", package)],
    Some(json!({ "id_token": id_token })),
  )
  .await;
  (status, json)
}

#[tokio::test]
async fn external_login_creates_then_reuses_the_principal() {
  let state    = make_state().await;
  let id_token = identity::tests::mint(json!({ "sub": "g-42", "email": "ext@example.com", "name": "Meera" }));

  let (status, first) = external_login(&state, ENGLISH, &id_token).await;
  assert_eq!(status, StatusCode::OK, "{first}");
  assert_eq!(first["data"]["principal"]["tenant"], ENGLISH);
  assert_eq!(first["data"]["principal"]["external_id"], "g-42");
  assert_eq!(first["data"]["principal"]["display_name"], "Meera");

  let auth = bearer(first["data"]["token"].as_str().unwrap());
  let (status, _, _) = call(
    &state,
    Method::GET,
    "/api/auth/me",
    &[("authorization", &auth), ("x-package-id", ENGLISH)],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let renamed = identity::tests::mint(json!({ "sub": "g-42", "email": "ext@example.com", "name": "Meera K" }));
  let (status, second) = external_login(&state, ENGLISH, &renamed).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(second["data"]["principal"]["principal_id"], first["data"]["principal"]["principal_id"]);
  assert_eq!(second["data"]["principal"]["display_name"], "Meera K");

  // The same identity in the other app is a separate account.
  let (status, other) = external_login(&state, LEARNING, &id_token).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(other["data"]["principal"]["tenant"], LEARNING);
  assert_ne!(other["data"]["principal"]["principal_id"], first["data"]["principal"]["principal_id"]);
}

#[tokio::test]
async fn external_login_links_an_existing_local_account() {
  let state = make_state().await;
  let (_, id) = register(&state, LEARNING, "both@example.com").await;

  let id_token = identity::tests::mint(json!({ "sub": "g-both", "email": "Both@Example.com" }));
  let (status, json) = external_login(&state, LEARNING, &id_token).await;
  assert_eq!(status, StatusCode::OK, "{json}");
  assert_eq!(json["data"]["principal"]["principal_id"], id.to_string());

  let stored = state.store.get_principal(id).await.unwrap().unwrap();
  assert_eq!(stored.external_id.as_deref(), Some("g-both"));
  assert!(stored.last_login_at.is_some());

  // A different identity asserting the same email is refused.
  let other = identity::tests::mint(json!({ "sub": "g-other", "email": "both@example.com" }));
  let (status, json) = external_login(&state, LEARNING, &other).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn external_login_rejects_unverifiable_tokens() {
  let state = make_state().await;
  let (status, json) = external_login(&state, LEARNING, "forged.token.value").await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(json["code"], "INVALID_TOKEN");

  // An access token issued by this service is not an identity token.
  let (token, _) = register(&state, LEARNING, "local@example.com").await;
  let (status, _) = external_login(&state, LEARNING, &token).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleted_external_account_signs_up_fresh() {
  let state    = make_state().await;
  let id_token = identity::tests::mint(json!({ "sub": "g-del", "email": "del@example.com" }));
  let (_, first) = external_login(&state, LEARNING, &id_token).await;
  let auth = bearer(first["data"]["token"].as_str().unwrap());

  let (status, _, _) =
    call(&state, Method::DELETE, "/api/auth/me", &[("authorization", &auth)], None).await;
  assert_eq!(status, StatusCode::OK);

  let (status, second) = external_login(&state, LEARNING, &id_token).await;
  assert_eq!(status, StatusCode::OK, "{second}");
  assert_ne!(second["data"]["principal"]["principal_id"], first["data"]["principal"]["principal_id"]);
}

#[tokio::test]
async fn profile_is_only_visible_within_its_tenant() {
  let state = make_state().await;
  let (token, id) = register(&state, ENGLISH, "p@example.com").await;
  let auth = bearer(&token);
  let uri  = format!("/api/profile/{id}");

  let (status, _, json) = call(
    &state,
    Method::GET,
    &uri,
    &[("authorization", &auth), ("x-package-id", ENGLISH)],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{json}");
  assert_eq!(json["data"]["principal"]["tenant"], ENGLISH);

  let (status, _, json) = call(
    &state,
    Method::GET,
    &uri,
    &[("authorization", &auth), ("x-package-id", LEARNING)],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(json["code"], "TENANT_MISMATCH");

  // An admin acting in the learning tenant does not see it either.
  let admin = bearer(&admin_token(&state).await);
  let (status, _, _) = call(
    &state,
    Method::GET,
    &uri,
    &[("authorization", &admin), ("x-package-id", LEARNING)],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Entitlement ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn open_content_is_visible_to_everyone() {
  let state    = make_state().await;
  let topic_id = seed_topic(&state, LEARNING).await;
  let id       = seed_content(&state, LEARNING, topic_id, text("hello"), false).await;
  let (token, _) = register(&state, LEARNING, "u@example.com").await;
  let auth = bearer(&token);
  let uri  = format!("/api/content/{id}");

  for headers in [vec![], vec![("authorization", auth.as_str())]] {
    let (status, _, json) = call(&state, Method::GET, &uri, &headers, None).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["has_access"], true);
    assert_eq!(json["data"]["payload"]["body"], "hello");
  }
}

#[tokio::test]
async fn premium_content_is_denied_with_a_preview() {
  let state    = make_state().await;
  let topic_id = seed_topic(&state, LEARNING).await;
  let id       = seed_content(&state, LEARNING, topic_id, text("secret"), true).await;
  let (token, _) = register(&state, LEARNING, "u@example.com").await;
  let uri = format!("/api/content/{id}");

  for headers in [vec![], vec![("authorization", format!("Bearer {token}"))]] {
    let headers: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let (status, _, json) = call(&state, Method::GET, &uri, &headers, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "SUBSCRIPTION_REQUIRED");
    assert_eq!(json["data"]["title"], "Lesson");
    assert_eq!(json["data"]["has_access"], false);
    assert!(json["data"].get("payload").is_none());
  }
}

#[tokio::test]
async fn subscriber_gets_premium_content_and_a_signed_url() {
  let state    = make_state().await;
  let topic_id = seed_topic(&state, LEARNING).await;
  let id       = seed_content(&state, LEARNING, topic_id, video("v/intro.mp4", false), true).await;
  let (token, principal_id) = register(&state, LEARNING, "s@example.com").await;
  subscribe(&state, principal_id, LEARNING).await;

  let auth = bearer(&token);
  let (status, _, json) =
    call(&state, Method::GET, &format!("/api/content/{id}"), &[("authorization", &auth)], None)
      .await;
  assert_eq!(status, StatusCode::OK, "{json}");
  let url = json["data"]["payload"]["video_url"].as_str().unwrap();
  assert!(url.starts_with("https://cdn.test/v/intro.mp4?Expires="), "{url}");
  assert!(url.contains("&Signature="));
}

#[tokio::test]
async fn foreign_tenant_token_reads_as_anonymous() {
  let state = make_state().await;
  let (token, principal_id) = register(&state, LEARNING, "sub@example.com").await;
  subscribe(&state, principal_id, LEARNING).await;

  let topic_id = seed_topic(&state, ENGLISH).await;
  let premium  = seed_content(&state, ENGLISH, topic_id, text("advanced"), true).await;
  let open     = seed_content(&state, ENGLISH, topic_id, text("basics"), false).await;
  let auth     = bearer(&token);
  let headers  = [("authorization", auth.as_str()), ("x-package-id", ENGLISH)];

  // The learning subscription does not carry over into the english app.
  let (status, _, json) =
    call(&state, Method::GET, &format!("/api/content/{premium}"), &headers, None).await;
  assert_eq!(status, StatusCode::FORBIDDEN, "{json}");
  assert_eq!(json["code"], "SUBSCRIPTION_REQUIRED");
  assert!(json["data"].get("payload").is_none());

  let (status, _, json) =
    call(&state, Method::GET, &format!("/api/content/{open}"), &headers, None).await;
  assert_eq!(status, StatusCode::OK, "{json}");
  assert_eq!(json["data"]["payload"]["body"], "basics");
}

#[tokio::test]
async fn bad_or_expired_tokens_read_as_anonymous() {
  let state    = make_state().await;
  let topic_id = seed_topic(&state, LEARNING).await;
  let open     = seed_content(&state, LEARNING, topic_id, text("hello"), false).await;
  let premium  = seed_content(&state, LEARNING, topic_id, text("secret"), true).await;
  let (_, principal_id) = register(&state, LEARNING, "old@example.com").await;
  subscribe(&state, principal_id, LEARNING).await;
  let expired = bearer(&state.tokens.issue(principal_id, Utc::now() - Duration::days(8)).unwrap());

  for auth in ["Bearer garbage".to_owned(), expired] {
    let headers = [("authorization", auth.as_str())];

    let (status, _, json) = call(&state, Method::GET, "/api/categories", &headers, None).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (status, _, json) =
      call(&state, Method::GET, &format!("/api/content/{open}"), &headers, None).await;
    assert_eq!(status, StatusCode::OK, "{json}");

    let (status, _, json) =
      call(&state, Method::GET, &format!("/api/content/{premium}"), &headers, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{json}");
    assert_eq!(json["code"], "SUBSCRIPTION_REQUIRED");
  }
}

#[tokio::test]
async fn deactivated_principal_reads_as_anonymous() {
  let state    = make_state().await;
  let topic_id = seed_topic(&state, LEARNING).await;
  let open     = seed_content(&state, LEARNING, topic_id, text("hello"), false).await;
  let premium  = seed_content(&state, LEARNING, topic_id, text("secret"), true).await;
  let (token, _) = register(&state, LEARNING, "bye@example.com").await;
  let auth = bearer(&token);

  let (status, _, _) =
    call(&state, Method::DELETE, "/api/auth/me", &[("authorization", &auth)], None).await;
  assert_eq!(status, StatusCode::OK);

  let headers = [("authorization", auth.as_str())];
  let (status, _, json) =
    call(&state, Method::GET, &format!("/api/topics/{topic_id}"), &headers, None).await;
  assert_eq!(status, StatusCode::OK, "{json}");
  let (status, _, json) =
    call(&state, Method::GET, &format!("/api/content/{open}"), &headers, None).await;
  assert_eq!(status, StatusCode::OK, "{json}");
  let (status, _, json) =
    call(&state, Method::GET, &format!("/api/content/{premium}"), &headers, None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(json["code"], "SUBSCRIPTION_REQUIRED");
}

#[tokio::test]
async fn free_video_ignores_the_lock() {
  let state    = make_state().await;
  let topic_id = seed_topic(&state, LEARNING).await;
  let id       = seed_content(&state, LEARNING, topic_id, video("v/free.mp4", true), true).await;

  let (status, _, json) = call(&state, Method::GET, &format!("/api/content/{id}"), &[], None).await;
  assert_eq!(status, StatusCode::OK, "{json}");
  assert_eq!(json["data"]["is_premium"], false);
  assert_eq!(json["data"]["payload"]["video_url"], "https://cdn.test/v/free.mp4");
}

#[tokio::test]
async fn lapsed_active_subscription_grants_nothing() {
  let state    = make_state().await;
  let topic_id = seed_topic(&state, LEARNING).await;
  let id       = seed_content(&state, LEARNING, topic_id, text("secret"), true).await;
  let (token, principal_id) = register(&state, LEARNING, "l@example.com").await;

  let then = Utc::now() - Duration::days(40);
  let mut sub = state
    .store
    .create_subscription(NewSubscription::checkout(
      principal_id,
      tenant(LEARNING),
      Plan::Monthly,
      &state.pricing,
      then,
    ))
    .await
    .unwrap();
  sub.activate(Some("pay_old"), then, &state.pricing).unwrap();
  state.store.save_subscription(&sub).await.unwrap();
  assert_eq!(sub.status, SubscriptionStatus::Active);

  let auth = bearer(&token);
  let (status, _, json) =
    call(&state, Method::GET, "/api/subscriptions/current", &[("authorization", &auth)], None)
      .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(json["data"]["is_subscribed"], false);
  assert!(json["data"]["subscription"].is_null());

  let (status, _, _) =
    call(&state, Method::GET, &format!("/api/content/{id}"), &[("authorization", &auth)], None)
      .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn content_from_another_tenant_is_not_found() {
  let state    = make_state().await;
  let topic_id = seed_topic(&state, ENGLISH).await;
  let id       = seed_content(&state, ENGLISH, topic_id, text("bolo"), false).await;

  let (status, _, _) = call(&state, Method::GET, &format!("/api/content/{id}"), &[], None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _, _) = call(
    &state,
    Method::GET,
    &format!("/api/content/{id}"),
    &[("x-package-id", ENGLISH)],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn topic_detail_annotates_each_item() {
  let state    = make_state().await;
  let topic_id = seed_topic(&state, LEARNING).await;
  seed_content(&state, LEARNING, topic_id, text("open"), false).await;
  seed_content(&state, LEARNING, topic_id, text("locked"), true).await;

  let (status, _, json) =
    call(&state, Method::GET, &format!("/api/topics/{topic_id}"), &[], None).await;
  assert_eq!(status, StatusCode::OK, "{json}");
  let content = json["data"]["content"].as_array().unwrap();
  assert_eq!(content.len(), 2);
  let granted: Vec<bool> = content.iter().map(|c| c["has_access"].as_bool().unwrap()).collect();
  assert!(granted.contains(&true));
  assert!(granted.contains(&false));

  let (_, _, json) =
    call(&state, Method::GET, &format!("/api/topics/{topic_id}?kind=video"), &[], None).await;
  assert!(json["data"]["content"].as_array().unwrap().is_empty());
}

// ─── Subscriptions and webhooks ──────────────────────────────────────────────

async fn checkout(state: &AppState<SqliteStore>, token: &str, plan: &str) -> (Uuid, String) {
  let (status, _, json) = call(
    state,
    Method::POST,
    "/api/subscriptions/checkout",
    &[("authorization", &bearer(token))],
    Some(json!({ "plan": plan })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{json}");
  assert_eq!(json["data"]["subscription"]["status"], "pending");
  let id = json["data"]["subscription"]["subscription_id"].as_str().unwrap().parse().unwrap();
  let provider = json["data"]["checkout"]["provider_subscription_id"].as_str().unwrap().to_owned();
  (id, provider)
}

#[tokio::test]
async fn replayed_capture_does_not_extend_twice() {
  let state = make_state().await;
  let (token, _) = register(&state, LEARNING, "c@example.com").await;
  let (id, provider) = checkout(&state, &token, "monthly").await;

  let payload = json!({ "payment": { "entity": { "id": "pay_1", "subscription_id": provider } } });
  assert_eq!(webhook(&state, "payment.captured", payload.clone()).await, "applied");
  let first = state.store.get_subscription(id).await.unwrap().unwrap();
  assert_eq!(first.status, SubscriptionStatus::Active);

  assert_eq!(webhook(&state, "payment.captured", payload).await, "duplicate");
  let second = state.store.get_subscription(id).await.unwrap().unwrap();
  assert_eq!(second.end_date, first.end_date);
  assert_eq!(second.last_payment_id.as_deref(), Some("pay_1"));

  let (_, _, json) = call(
    &state,
    Method::GET,
    "/api/subscriptions/current",
    &[("authorization", &bearer(&token))],
    None,
  )
  .await;
  assert_eq!(json["data"]["is_subscribed"], true);
}

#[tokio::test]
async fn trial_converts_once_on_first_charge() {
  let state = make_state().await;
  let (token, _) = register(&state, LEARNING, "t@example.com").await;
  let (id, provider) = checkout(&state, &token, "trial").await;

  let activated = json!({
    "subscription": { "entity": { "id": provider } },
    "payment":      { "entity": { "id": "pay_trial" } },
  });
  assert_eq!(webhook(&state, "subscription.activated", activated).await, "applied");
  let trial = state.store.get_subscription(id).await.unwrap().unwrap();
  assert!(trial.is_trial_subscription);
  assert_eq!(trial.plan, Plan::Trial);

  let charged = json!({
    "subscription": { "entity": { "id": provider } },
    "payment":      { "entity": { "id": "pay_first_month" } },
  });
  assert_eq!(webhook(&state, "subscription.charged", charged.clone()).await, "applied");
  let converted = state.store.get_subscription(id).await.unwrap().unwrap();
  assert_eq!(converted.plan, Plan::Monthly);
  assert!(!converted.is_trial_subscription);
  assert!(converted.trial_converted);
  assert_eq!(converted.end_date - converted.start_date, Duration::days(30));

  assert_eq!(webhook(&state, "subscription.charged", charged).await, "duplicate");
  let replayed = state.store.get_subscription(id).await.unwrap().unwrap();
  assert_eq!(replayed.end_date, converted.end_date);
  assert_eq!(replayed.plan, Plan::Monthly);

  // The trial is spent.
  let (status, _, _) = call(
    &state,
    Method::POST,
    "/api/subscriptions/checkout",
    &[("authorization", &bearer(&token))],
    Some(json!({ "plan": "trial" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn repeated_checkout_reuses_the_pending_session() {
  let state = make_state().await;
  let (token, _) = register(&state, LEARNING, "r@example.com").await;
  let (first, provider) = checkout(&state, &token, "monthly").await;
  let (second, again) = checkout(&state, &token, "monthly").await;
  assert_eq!(first, second);
  assert_eq!(provider, again);

  let (third, _) = checkout(&state, &token, "yearly").await;
  assert_ne!(third, first);
  let superseded = state.store.get_subscription(first).await.unwrap().unwrap();
  assert_eq!(superseded.status, SubscriptionStatus::Cancelled);
}

#[tokio::test]
async fn checkout_with_a_live_subscription_conflicts() {
  let state = make_state().await;
  let (token, principal_id) = register(&state, LEARNING, "x@example.com").await;
  subscribe(&state, principal_id, LEARNING).await;

  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/subscriptions/checkout",
    &[("authorization", &bearer(&token))],
    Some(json!({ "plan": "monthly" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn cancel_without_a_body() {
  let state = make_state().await;
  let (token, principal_id) = register(&state, LEARNING, "k@example.com").await;
  subscribe(&state, principal_id, LEARNING).await;

  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/subscriptions/cancel",
    &[("authorization", &bearer(&token))],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{json}");
  assert_eq!(json["data"]["status"], "cancelled");
  assert_eq!(json["data"]["cancellation_reason"], "cancelled by user");
}

#[tokio::test]
async fn unmatched_webhook_is_acknowledged_and_logged() {
  let state = make_state().await;
  let payload = json!({ "payment": { "entity": { "id": "pay_x", "subscription_id": "sub_ghost" } } });
  assert_eq!(webhook(&state, "payment.captured", payload).await, "unmatched");
  assert_eq!(webhook(&state, "refund.created", json!({})).await, "ignored");

  let auth = bearer(&admin_token(&state).await);
  let (status, _, json) = call(
    &state,
    Method::GET,
    "/api/admin/webhook-failures",
    &[("authorization", &auth), ("x-package-id", LEARNING)],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{json}");
  let failures = json["data"]["failures"].as_array().unwrap();
  assert_eq!(failures.len(), 1);
  assert_eq!(failures[0]["provider_subscription_id"], "sub_ghost");
  assert_eq!(failures[0]["payment_id"], "pay_x");
}

#[tokio::test]
async fn charge_on_a_cancelled_subscription_is_rejected_but_acknowledged() {
  let state = make_state().await;
  let (token, _) = register(&state, LEARNING, "z@example.com").await;
  let (id, provider) = checkout(&state, &token, "monthly").await;
  let captured = json!({ "payment": { "entity": { "id": "pay_1", "subscription_id": provider } } });
  assert_eq!(webhook(&state, "payment.captured", captured).await, "applied");
  let cancelled = json!({ "subscription": { "entity": { "id": provider } } });
  assert_eq!(webhook(&state, "subscription.cancelled", cancelled).await, "applied");

  let charged = json!({
    "subscription": { "entity": { "id": provider } },
    "payment":      { "entity": { "id": "pay_2" } },
  });
  assert_eq!(webhook(&state, "subscription.charged", charged).await, "rejected");
  let sub = state.store.get_subscription(id).await.unwrap().unwrap();
  assert_eq!(sub.status, SubscriptionStatus::Cancelled);
  assert_eq!(state.store.list_webhook_failures(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn transition_on_a_stale_copy_is_reapplied_to_the_stored_record() {
  let state = make_state().await;
  let (_, principal_id) = register(&state, LEARNING, "race@example.com").await;
  subscribe(&state, principal_id, LEARNING).await;
  let now  = Utc::now();
  let live = state.store.active_subscription(principal_id, now).await.unwrap().unwrap();

  // A cancellation lands between the webhook's read and its write.
  let stale_for_charge = live.clone();
  let (_, verdict) =
    handlers::save_transition(state.store.as_ref(), live.clone(), |s| s.cancel("by user", now))
      .await
      .unwrap();
  assert_eq!(verdict.unwrap(), Transition::Applied);

  let (sub, verdict) = handlers::save_transition(state.store.as_ref(), stale_for_charge, |s| {
    s.charge("pay_2", now, &state.pricing)
  })
  .await
  .unwrap();
  assert!(verdict.is_err(), "charge must be re-checked against the cancelled record");
  assert_eq!(sub.status, SubscriptionStatus::Cancelled);

  let stored = state.store.get_subscription(live.subscription_id).await.unwrap().unwrap();
  assert_eq!(stored.status, SubscriptionStatus::Cancelled);
  assert!(!stored.auto_renew);
}

#[tokio::test]
async fn interleaved_failed_payments_are_all_counted() {
  let state = make_state().await;
  let (_, principal_id) = register(&state, LEARNING, "fails@example.com").await;
  subscribe(&state, principal_id, LEARNING).await;
  let now  = Utc::now();
  let live = state.store.active_subscription(principal_id, now).await.unwrap().unwrap();

  let first  = live.clone();
  let second = live.clone();
  handlers::save_transition(state.store.as_ref(), first, |s| {
    Ok(s.record_failed_payment(Some("pay_f1"), now))
  })
  .await
  .unwrap();
  let (sub, _) = handlers::save_transition(state.store.as_ref(), second, |s| {
    Ok(s.record_failed_payment(Some("pay_f2"), now))
  })
  .await
  .unwrap();
  assert_eq!(sub.failed_payment_count, 2);

  let stored = state.store.get_subscription(live.subscription_id).await.unwrap().unwrap();
  assert_eq!(stored.failed_payment_count, 2);
  assert_eq!(stored.revision, sub.revision);
}

#[tokio::test]
async fn malformed_webhook_is_a_400() {
  let state = make_state().await;
  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/webhooks/payments",
    &[],
    Some(json!({ "event": "payment.captured", "payload": { "payment": {} } })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(json["code"], "VALIDATION_ERROR");
}

// ─── Admin ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_routes_require_the_admin_role() {
  let state = make_state().await;
  let (token, _) = register(&state, LEARNING, "user@example.com").await;
  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/admin/categories",
    &[("authorization", &bearer(&token)), ("x-package-id", LEARNING)],
    Some(json!({ "name": "Maths" })),
  )
  .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(json["code"], "INSUFFICIENT_ROLE");
}

#[tokio::test]
async fn admin_routes_require_an_explicit_package() {
  let state = make_state().await;
  let auth  = bearer(&admin_token(&state).await);
  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/admin/categories",
    &[("authorization", &auth)],
    Some(json!({ "name": "Maths" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(json["code"], "TENANT_REQUIRED");
}

#[tokio::test]
async fn admin_authors_a_module_in_the_request_tenant() {
  let state = make_state().await;
  let auth  = bearer(&admin_token(&state).await);
  let hdrs  = [("authorization", auth.as_str()), ("x-package-id", ENGLISH)];

  let (status, _, category) = call(
    &state,
    Method::POST,
    "/api/admin/categories",
    &hdrs,
    Some(json!({ "name": "Speaking" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{category}");
  assert_eq!(category["data"]["tenant"], ENGLISH);

  let (status, _, topic) = call(
    &state,
    Method::POST,
    "/api/admin/topics",
    &hdrs,
    Some(json!({ "category_id": category["data"]["category_id"], "title": "Small talk" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{topic}");
  let topic_id = topic["data"]["topic_id"].clone();

  let (status, _, item) = call(
    &state,
    Method::POST,
    "/api/admin/content",
    &hdrs,
    Some(json!({
      "topic_id": topic_id,
      "title": "Weather",
      "body": { "kind": "text", "data": { "body": "It is sunny.", "reading_minutes": 1 } },
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{item}");
  let content_id = item["data"]["content_id"].clone();

  // Declared kind must match the stored item.
  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/admin/modules",
    &hdrs,
    Some(json!({
      "topic_id": topic_id,
      "title": "Day one",
      "items": [{ "kind": "video", "content_id": content_id }],
    })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(json["code"], "VALIDATION_ERROR");

  let (status, _, module) = call(
    &state,
    Method::POST,
    "/api/admin/modules",
    &hdrs,
    Some(json!({
      "topic_id": topic_id,
      "title": "Day one",
      "items": [{ "kind": "text", "content_id": content_id }],
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{module}");

  let module_id = module["data"]["module_id"].as_str().unwrap();
  let (status, _, json) = call(
    &state,
    Method::GET,
    &format!("/api/modules/{module_id}"),
    &[("x-package-id", ENGLISH)],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{json}");
  assert_eq!(json["data"]["items"][0]["payload"]["body"], "It is sunny.");

  // Not visible from the other app.
  let (status, _, _) =
    call(&state, Method::GET, &format!("/api/modules/{module_id}"), &[], None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn module_skips_references_of_the_wrong_kind() {
  let state    = make_state().await;
  let t        = tenant(LEARNING);
  let topic_id = seed_topic(&state, LEARNING).await;
  let lesson   = seed_content(&state, LEARNING, topic_id, text("Read me."), false).await;
  let clip     = seed_content(&state, LEARNING, topic_id, video("v/clip.mp4", true), false).await;

  // Written straight to the store, bypassing the authoring checks.
  let module = state
    .store
    .create_module(&t, NewModule {
      topic_id,
      title: "Mixed".into(),
      description: None,
      items: vec![
        ModuleItemRef { kind: ContentKind::Video, content_id: lesson },
        ModuleItemRef { kind: ContentKind::Text, content_id: lesson },
        ModuleItemRef { kind: ContentKind::Mcq, content_id: clip },
      ],
      is_premium: false,
    })
    .await
    .unwrap();

  let (status, _, json) =
    call(&state, Method::GET, &format!("/api/modules/{}", module.module_id), &[], None).await;
  assert_eq!(status, StatusCode::OK, "{json}");
  let items = json["data"]["items"].as_array().unwrap();
  assert_eq!(items.len(), 1, "{json}");
  assert_eq!(items[0]["kind"], "text");
  assert_eq!(items[0]["payload"]["body"], "Read me.");
  assert_eq!(json["data"]["item_count"], 3);
}

#[tokio::test]
async fn manual_sweep_reports_counts() {
  let state = make_state().await;
  let auth  = bearer(&admin_token(&state).await);
  let (status, _, json) = call(
    &state,
    Method::POST,
    "/api/admin/maintenance",
    &[("authorization", &auth), ("x-package-id", LEARNING)],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{json}");
  assert_eq!(json["data"], json!({ "expired": 0, "reaped": 0 }));
}
