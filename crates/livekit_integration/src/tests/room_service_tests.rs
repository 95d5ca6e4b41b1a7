use super::*;
use crate::{JwtCredentialSigner, LiveKitConfig};
use axum::{
    http::{HeaderMap, StatusCode as HttpStatus},
    routing::post,
    Json, Router,
};
use tokio::net::TcpListener;

fn signer() -> Arc<dyn CredentialSigner> {
    Arc::new(JwtCredentialSigner::new(&LiveKitConfig {
        url: "ws://unused".into(),
        api_key: "k".into(),
        api_secret: "s".into(),
    }))
}

async fn spawn_room_service(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("ws://{addr}")
}

#[test]
fn api_base_maps_websocket_schemes() {
    assert_eq!(
        api_base_url("ws://media.local:7880").expect("ws").as_str(),
        "http://media.local:7880/"
    );
    assert_eq!(
        api_base_url("wss://media.example.com").expect("wss").as_str(),
        "https://media.example.com/"
    );
    assert!(api_base_url("ftp://media.example.com").is_err());
    assert!(api_base_url("not a url").is_err());
}

#[tokio::test]
async fn lists_participants_in_service_order() {
    let app = Router::new().route(
        "/twirp/livekit.RoomService/ListParticipants",
        post(
            |headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.starts_with("Bearer "));
                if !authorized || body["room"] != "r1" {
                    return (HttpStatus::UNAUTHORIZED, Json(serde_json::json!({})));
                }
                (
                    HttpStatus::OK,
                    Json(serde_json::json!({
                        "participants": [
                            { "identity": "u2", "name": "Bob", "state": "ACTIVE" },
                            { "identity": "u1", "name": "Alice" }
                        ]
                    })),
                )
            },
        ),
    );
    let url = spawn_room_service(app).await;
    let client = RoomServiceClient::new(&url, signer(), Duration::from_secs(5)).expect("client");

    let snapshot = client
        .list_participants(&RoomId::from("r1"))
        .await
        .expect("snapshot");
    assert_eq!(snapshot.room_name, RoomId::from("r1"));
    let identities: Vec<_> = snapshot
        .participants
        .iter()
        .map(|p| p.identity.as_str())
        .collect();
    assert_eq!(identities, vec!["u2", "u1"]);
    assert_eq!(snapshot.participants[0].display_name, "Bob");
}

#[tokio::test]
async fn missing_room_is_empty_snapshot() {
    let app = Router::new().route(
        "/twirp/livekit.RoomService/ListParticipants",
        post(|| async {
            (
                HttpStatus::NOT_FOUND,
                Json(serde_json::json!({ "code": "not_found", "msg": "room not found" })),
            )
        }),
    );
    let url = spawn_room_service(app).await;
    let client = RoomServiceClient::new(&url, signer(), Duration::from_secs(5)).expect("client");

    let snapshot = client
        .fetch_room(&RoomId::from("r1"))
        .await
        .expect("empty snapshot");
    assert!(snapshot.participants.is_empty());
}

#[tokio::test]
async fn server_error_is_absorbed_by_provider() {
    let app = Router::new().route(
        "/twirp/livekit.RoomService/ListParticipants",
        post(|| async { (HttpStatus::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let url = spawn_room_service(app).await;
    let client = RoomServiceClient::new(&url, signer(), Duration::from_secs(5)).expect("client");

    let err = client
        .list_participants(&RoomId::from("r1"))
        .await
        .expect_err("status error");
    assert!(matches!(err, LiveKitError::Status { status: 500, .. }));

    assert!(client.fetch_room(&RoomId::from("r1")).await.is_none());
}

#[tokio::test]
async fn slow_service_times_out() {
    let app = Router::new().route(
        "/twirp/livekit.RoomService/ListParticipants",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(serde_json::json!({ "participants": [] }))
        }),
    );
    let url = spawn_room_service(app).await;
    let client =
        RoomServiceClient::new(&url, signer(), Duration::from_millis(100)).expect("client");

    let err = client
        .list_participants(&RoomId::from("r1"))
        .await
        .expect_err("timeout");
    assert!(matches!(err, LiveKitError::Timeout));
}

#[tokio::test]
async fn unreachable_service_yields_none() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = RoomServiceClient::new(&format!("ws://{addr}"), signer(), Duration::from_secs(1))
        .expect("client");
    assert!(client.fetch_room(&RoomId::from("r1")).await.is_none());
}
