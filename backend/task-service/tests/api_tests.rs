use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::StatusCode, test, web, App};
use crypto_core::testing::{internal_keys, principal, token_for, verifier};
use crypto_core::{AuthorizationPolicy, Role, TokenVerifier};
use event_broker::{EventBroker, SubscriptionSession};
use identity_propagation::{AssertionIssuer, IdentityResolver, INTERNAL_ASSERTION_HEADER};
use serde_json::{json, Value};
use task_service::repository::InMemoryTaskRepository;
use task_service::{routes, state::AppState};

fn state_with(resolver: IdentityResolver) -> AppState {
    AppState::new(
        Arc::new(InMemoryTaskRepository::new()),
        EventBroker::default(),
        resolver,
        AuthorizationPolicy::new(),
    )
}

fn state() -> AppState {
    state_with(IdentityResolver::bearer_only(verifier()))
}

macro_rules! app {
    ($state:expr) => {{
        let state: AppState = $state;
        let resolver = state.resolver.clone();
        test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(|cfg| routes::configure(cfg, resolver)),
        )
        .await
    }};
}

macro_rules! send {
    ($app:expr, $req:expr) => {{
        match test::try_call_service(&$app, $req.to_request()).await {
            Ok(res) => {
                let status = res.status();
                let body = test::read_body(res).await;
                (status, serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null))
            }
            Err(e) => {
                let res = e.error_response();
                let status = res.status();
                let body = actix_web::body::to_bytes(res.into_body()).await.unwrap();
                (status, serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null))
            }
        }
    }};
}

fn bearer(sub: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token_for(sub, Role::User)))
}

async fn next_event(session: &mut SubscriptionSession) -> (String, Value) {
    let event = tokio::time::timeout(Duration::from_secs(2), session.recv())
        .await
        .expect("no event published")
        .expect("session ended");
    (event.kind.clone(), event.payload.clone())
}

#[actix_rt::test]
async fn test_requires_authentication() {
    let app = app!(state());

    let (status, body) = send!(app, test::TestRequest::get().uri("/api/tasks"));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_INVALID");

    let (status, _) = send!(app, test::TestRequest::get().uri("/health"));
    assert_eq!(status, StatusCode::OK);
}

#[actix_rt::test]
async fn test_create_task_publishes_task_added() {
    let state = state();
    let mut session = state.broker.subscribe(principal("watcher", Role::User), "tasks").unwrap();
    let app = app!(state);

    let (status, task) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/tasks")
            .insert_header(bearer("u-1"))
            .set_json(json!({ "title": "Write docs", "content": "All of them" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["authorId"], "u-1");
    assert_eq!(task["author"], "u-1@example.com");

    let (kind, payload) = next_event(&mut session).await;
    assert_eq!(kind, "taskAdded");
    assert_eq!(payload, task);
}

#[actix_rt::test]
async fn test_update_and_delete_publish_events() {
    let state = state();
    let mut session = state.broker.subscribe(principal("watcher", Role::User), "tasks").unwrap();
    let app = app!(state);

    let (_, task) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/tasks")
            .insert_header(bearer("u-1"))
            .set_json(json!({ "title": "Draft" }))
    );
    let id = task["id"].as_str().unwrap().to_string();
    next_event(&mut session).await;

    let (status, updated) = send!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/tasks/{id}"))
            .insert_header(bearer("u-2"))
            .set_json(json!({ "title": "Final" }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Final");
    assert_eq!(next_event(&mut session).await, ("taskUpdated".to_string(), updated));

    let (status, _) = send!(
        app,
        test::TestRequest::delete().uri(&format!("/api/tasks/{id}")).insert_header(bearer("u-1"))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        next_event(&mut session).await,
        ("taskDeleted".to_string(), json!({ "id": id }))
    );

    let (status, _) = send!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/tasks/{id}"))
            .insert_header(bearer("u-1"))
            .set_json(json!({ "title": "Too late" }))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_comments_lifecycle() {
    let state = state();
    let mut comments = state
        .broker
        .subscribe(principal("watcher", Role::User), "comments")
        .unwrap();
    let app = app!(state);

    let (_, task) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/tasks")
            .insert_header(bearer("u-1"))
            .set_json(json!({ "title": "Discuss" }))
    );
    let task_id = task["id"].as_str().unwrap().to_string();

    let (status, comment) = send!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/tasks/{task_id}/comments"))
            .insert_header(bearer("u-2"))
            .set_json(json!({ "content": "Agreed" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["taskId"], task_id.as_str());
    assert_eq!(next_event(&mut comments).await, ("commentAdded".to_string(), comment.clone()));

    let (_, detail) = send!(
        app,
        test::TestRequest::get().uri(&format!("/api/tasks/{task_id}")).insert_header(bearer("u-3"))
    );
    assert_eq!(detail["title"], "Discuss");
    assert_eq!(detail["comments"][0]["content"], "Agreed");

    let comment_id = comment["id"].as_str().unwrap().to_string();
    let (status, _) = send!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/comments/{comment_id}"))
            .insert_header(bearer("u-2"))
    );
    assert_eq!(status, StatusCode::OK);
    let (kind, payload) = next_event(&mut comments).await;
    assert_eq!(kind, "commentDeleted");
    assert_eq!(payload["id"], comment_id.as_str());

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/tasks/missing/comments")
            .insert_header(bearer("u-2"))
            .set_json(json!({ "content": "Hello?" }))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_deleting_a_task_removes_its_comments() {
    let app = app!(state());

    let (_, task) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/tasks")
            .insert_header(bearer("u-1"))
            .set_json(json!({ "title": "Temporary" }))
    );
    let task_id = task["id"].as_str().unwrap().to_string();
    let (_, comment) = send!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/tasks/{task_id}/comments"))
            .insert_header(bearer("u-1"))
            .set_json(json!({ "content": "Soon gone" }))
    );

    send!(
        app,
        test::TestRequest::delete().uri(&format!("/api/tasks/{task_id}")).insert_header(bearer("u-1"))
    );

    let (status, _) = send!(
        app,
        test::TestRequest::get()
            .uri(&format!("/api/tasks/{task_id}/comments"))
            .insert_header(bearer("u-1"))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/comments/{}", comment["id"].as_str().unwrap()))
            .insert_header(bearer("u-1"))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_invalid_input() {
    let app = app!(state());

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/tasks")
            .insert_header(bearer("u-1"))
            .set_json(json!({ "title": "" }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/tasks")
            .insert_header(bearer("u-1"))
            .set_json(json!({ "content": "no title" }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_accepts_gateway_assertion() {
    let resolver = IdentityResolver::with_assertions(verifier(), TokenVerifier::new(internal_keys()));
    let app = app!(state_with(resolver));

    let assertion = AssertionIssuer::new(internal_keys(), chrono::Duration::seconds(30))
        .unwrap()
        .issue(&principal("u-7", Role::User))
        .unwrap();

    let (status, task) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/tasks")
            .insert_header((INTERNAL_ASSERTION_HEADER, assertion))
            .set_json(json!({ "title": "Via gateway" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["authorId"], "u-7");

    // A forged identity header is not an identity
    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/tasks")
            .insert_header(("x-user-payload", r#"{"sub":"u-1","role":"admin"}"#))
            .set_json(json!({ "title": "Sneaky" }))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
