mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{fixture_with, FakeEmbedder};
use midword_hive::auth::{SECRET_HEADER, USER_HEADER};
use midword_hive::routes;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(u) = user {
        req = req.header(USER_HEADER, u);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().uri(uri);
    if let Some(u) = user {
        req = req.header(USER_HEADER, u);
    }
    req.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_guess_endpoints() {
    let fx = fixture_with(FakeEmbedder::new(), Some("s3cret")).await;
    let round = fx.active_round().await;
    let app = routes::app(fx.state.clone());
    let guesses = format!("/rounds/{}/guesses", round.id);

    let (status, body) = send(&app, post_json(&guesses, Some("ada"), json!({"title": "tepid"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delta"], 5);
    assert_eq!(body["attemptsUsed"], 1);
    assert_eq!(body["submitted"], false);

    let (status, body) = send(&app, post_json(&guesses, None, json!({"title": "mild"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("signed in"));

    let (status, _) = send(&app, post_json(&guesses, Some("ada"), json!({"title": "hotter"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get(&format!("{}/me", guesses), Some("ada"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "InProgress");
    assert_eq!(body["attemptsLeft"], 8);

    let (status, body) = send(
        &app,
        get(&format!("/rounds/{}/leaderboard?limit=5", round.id), Some("ada")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalScore"], 5);
    assert_eq!(body["myRank"], 1);
    assert_eq!(body["entries"][0]["userId"], "ada");

    let (_, body) = send(&app, get("/counters/guesses:total", None)).await;
    assert_eq!(body["value"], 1);

    let (status, body) = send(&app, get("/users/ada/rank", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rank"], 1);

    let (status, body) = send(
        &app,
        get(&format!("/namespaces/{}/active-round", fx.namespace_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], round.id.to_string());
}

#[tokio::test]
async fn test_unknown_round_is_404() {
    let fx = fixture_with(FakeEmbedder::new(), None).await;
    let app = routes::app(fx.state.clone());

    let uri = format!("/rounds/{}/guesses", uuid::Uuid::new_v4());
    let (status, _) = send(&app, post_json(&uri, Some("ada"), json!({"title": "tepid"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_routes_require_secret() {
    let fx = fixture_with(FakeEmbedder::new(), Some("s3cret")).await;
    let app = routes::app(fx.state.clone());
    let payload = json!({"namespaceId": fx.namespace_id, "left": "hot", "right": "cold"});

    let (status, _) = send(&app, post_json("/admin/midpoints", None, payload.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut req = post_json("/admin/midpoints", None, payload);
    req.headers_mut()
        .insert(SECRET_HEADER, "s3cret".parse().unwrap());
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topMatches"][0]["title"], "tepid");

    let mut req = post_json(
        "/admin/rounds",
        None,
        json!({"namespaceId": fx.namespace_id, "left": "hot", "right": "cold", "activate": true}),
    );
    req.headers_mut()
        .insert(SECRET_HEADER, "s3cret".parse().unwrap());
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
    assert_eq!(body["matches"].as_array().unwrap().len(), 5);

    let mut req = post_json(
        "/admin/users",
        None,
        json!({"userId": "ada", "displayName": "Ada", "anonymous": false}),
    );
    req.headers_mut()
        .insert(SECRET_HEADER, "s3cret".parse().unwrap());
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["displayName"], "Ada");
    assert_eq!(body["anonymous"], false);

    let (_, body) = send(&app, get("/users/ada/rank", None)).await;
    assert_eq!(body["rank"], 1);
}

#[tokio::test]
async fn test_health() {
    let fx = fixture_with(FakeEmbedder::new(), None).await;
    let app = routes::app(fx.state.clone());
    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
