use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use tabletop_api::{AppStateInner, router};
use tabletop_db::Database;
use tabletop_store::{AssetCatalog, AssetStorage, RoomDirectory, SystemClock};

const MAX_UPLOAD: usize = 1024;

async fn app() -> (Router, PathBuf) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let clock = Arc::new(SystemClock);
    let root = std::env::temp_dir().join(format!("tabletop-api-{}", Uuid::new_v4()));
    let state = Arc::new(AppStateInner {
        rooms: RoomDirectory::new(db.clone(), clock.clone()),
        assets: AssetCatalog::new(db, clock),
        storage: AssetStorage::new(root.clone()).await.unwrap(),
        max_upload_bytes: MAX_UPLOAD,
    });
    (router(state), root)
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(code: &str, token: Option<&str>, mime: &str, data: Vec<u8>) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri(format!("/api/rooms/{code}/assets"))
        .header(header::CONTENT_TYPE, mime)
        .header("x-filename", "map.png");
    if let Some(token) = token {
        req = req.header("x-session-token", token);
    }
    req.body(Body::from(data)).unwrap()
}

#[tokio::test]
async fn create_join_list_delete() {
    let (app, root) = app().await;

    let (status, created) = call(&app, json_request("POST", "/api/rooms", json!({ "name": "Keep" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["participant"]["isGm"], true);
    let code = created["room"]["code"].as_str().unwrap().to_string();
    let room_id = created["room"]["id"].as_str().unwrap().to_string();
    let secret = created["gmSecret"].as_str().unwrap().to_string();

    let (status, player) = call(
        &app,
        json_request("POST", &format!("/api/rooms/{}/join", code.to_lowercase()), json!({ "name": "Aria" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(player["participant"]["isGm"], false);

    let (_, gm) = call(
        &app,
        json_request(
            "POST",
            &format!("/api/rooms/{code}/join"),
            json!({ "name": "Co-GM", "gmSecret": secret }),
        ),
    )
    .await;
    assert_eq!(gm["participant"]["isGm"], true);

    let (status, listed) = call(&app, Request::get("/api/rooms").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["rooms"][0]["participantCount"], 3);

    let delete = |id: &str| {
        Request::delete(format!("/api/rooms/{id}"))
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(call(&app, delete(&room_id)).await.0, StatusCode::OK);
    assert_eq!(call(&app, delete(&room_id)).await.0, StatusCode::NOT_FOUND);

    tokio::fs::remove_dir_all(root).await.ok();
}

#[tokio::test]
async fn validation_and_not_found() {
    let (app, root) = app().await;

    let (status, _) = call(&app, json_request("POST", "/api/rooms", json!({ "name": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let long = "x".repeat(101);
    let (status, _) = call(&app, json_request("POST", "/api/rooms", json!({ "name": long }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        json_request("POST", "/api/rooms/NOPE42/join", json!({ "name": "Aria" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, Request::get("/api/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    tokio::fs::remove_dir_all(root).await.ok();
}

#[tokio::test]
async fn upload_checks_token_room_type_and_size() {
    let (app, root) = app().await;
    let (_, a) = call(&app, json_request("POST", "/api/rooms", json!({ "name": "A" }))).await;
    let (_, b) = call(&app, json_request("POST", "/api/rooms", json!({ "name": "B" }))).await;
    let code = a["room"]["code"].as_str().unwrap();
    let token = a["sessionToken"].as_str().unwrap();
    let other_token = b["sessionToken"].as_str().unwrap();
    let png = vec![0x89, b'P', b'N', b'G'];

    let cases = [
        (upload(code, None, "image/png", png.clone()), StatusCode::UNAUTHORIZED),
        (upload(code, Some("bogus"), "image/png", png.clone()), StatusCode::UNAUTHORIZED),
        (upload(code, Some(other_token), "image/png", png.clone()), StatusCode::NOT_FOUND),
        (upload(code, Some(token), "text/html", png.clone()), StatusCode::UNSUPPORTED_MEDIA_TYPE),
        (
            upload(code, Some(token), "image/png", vec![0; MAX_UPLOAD + 1]),
            StatusCode::PAYLOAD_TOO_LARGE,
        ),
    ];
    for (req, expected) in cases {
        assert_eq!(call(&app, req).await.0, expected);
    }

    let (status, asset) = call(&app, upload(code, Some(token), "image/png", png.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(asset["filename"], "map.png");
    assert_eq!(asset["mimeType"], "image/png");
    assert_eq!(asset["sizeBytes"], 4);

    let room_id = a["room"]["id"].as_str().unwrap();
    let id = asset["id"].as_str().unwrap();
    assert_eq!(asset["url"], format!("/uploads/{room_id}/{id}.png"));
    let on_disk = tokio::fs::read(root.join(room_id).join(format!("{id}.png"))).await.unwrap();
    assert_eq!(on_disk, png);

    tokio::fs::remove_dir_all(root).await.ok();
}
