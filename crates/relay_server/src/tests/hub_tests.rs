use super::*;
use crate::test_support::{app_state, spawn_relay, FakeRoomService};
use std::time::Duration;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, client::IntoClientRequest, http::HeaderValue, Message as WsMessage},
};

fn origins(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn empty_allow_list_accepts_any_origin() {
    assert!(origin_allowed(&[], Some("https://anything.example")));
    assert!(origin_allowed(&[], None));
}

#[test]
fn origin_matches_by_fragment() {
    let allowed = origins(&["app.example", "localhost:5173"]);

    assert!(origin_allowed(&allowed, Some("https://app.example")));
    assert!(origin_allowed(&allowed, Some("http://localhost:5173")));
    assert!(!origin_allowed(&allowed, Some("https://evil.example")));
}

#[test]
fn missing_origin_is_accepted_even_with_allow_list() {
    assert!(origin_allowed(&origins(&["app.example"]), None));
}

#[tokio::test]
async fn disallowed_origin_is_refused_before_upgrade() {
    let state = app_state(FakeRoomService::default(), origins(&["app.example"]));
    let addr = spawn_relay(state.clone()).await;

    let mut request = format!("ws://{addr}/ws")
        .into_client_request()
        .expect("request");
    request.headers_mut().insert(
        "origin",
        HeaderValue::from_static("https://evil.example"),
    );

    match connect_async(request).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 403),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
    assert_eq!(state.hub.live_sessions(), 0);
}

#[tokio::test]
async fn allowed_origin_upgrades() {
    let state = app_state(FakeRoomService::default(), origins(&["app.example"]));
    let addr = spawn_relay(state).await;

    let mut request = format!("ws://{addr}/ws")
        .into_client_request()
        .expect("request");
    request.headers_mut().insert(
        "origin",
        HeaderValue::from_static("https://app.example"),
    );

    assert!(connect_async(request).await.is_ok());
}

#[tokio::test]
async fn shutdown_closes_live_sessions() {
    let state = app_state(FakeRoomService::default(), Vec::new());
    let addr = spawn_relay(state.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");
    ws.send(WsMessage::Text(
        r#"{"event":"join","data":{"roomId":"r1","userId":"u1","name":"Alice"}}"#.into(),
    ))
    .await
    .expect("send");
    let reply = ws.next().await.expect("open").expect("frame");
    assert!(matches!(reply, WsMessage::Text(_)));
    assert_eq!(state.hub.live_sessions(), 1);

    tokio::time::timeout(Duration::from_secs(5), state.hub.shutdown())
        .await
        .expect("sessions drained");
    assert_eq!(state.hub.live_sessions(), 0);

    match ws.next().await {
        Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_binary_frame_closes_the_session() {
    let state = app_state(FakeRoomService::default(), Vec::new());
    let addr = spawn_relay(state.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");
    ws.send(WsMessage::Text(
        r#"{"event":"join","data":{"roomId":"r1","userId":"u1","name":"Alice"}}"#.into(),
    ))
    .await
    .expect("send");
    ws.next().await.expect("open").expect("joined");
    assert_eq!(state.hub.live_sessions(), 1);

    ws.send(WsMessage::Binary(vec![0xff, 0xfe]))
        .await
        .expect("send");

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.hub.live_sessions() != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session released");
}
