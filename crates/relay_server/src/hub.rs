use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::ServerEvent,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    session::{ConnectionSession, SessionContext},
};

#[derive(Debug, Clone)]
pub(crate) struct SessionRecord {
    pub(crate) connected_at: DateTime<Utc>,
    pub(crate) origin: Option<String>,
}

/// Owns every live connection task so shutdown can cancel and drain them.
pub(crate) struct ConnectionHub {
    ctx: SessionContext,
    sessions: DashMap<Uuid, SessionRecord>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl ConnectionHub {
    pub(crate) fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            sessions: DashMap::new(),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub(crate) fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops every session loop and waits for them to finish.
    pub(crate) async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        info!(live = self.live_sessions(), "closing websocket sessions");
        self.tracker.wait().await;
        info!("all sessions closed");
    }

    async fn run(&self, socket: WebSocket, origin: Option<String>) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionRecord {
                connected_at: Utc::now(),
                origin,
            },
        );
        info!(session = %id, live = self.sessions.len(), "websocket connection established");

        let (mut sender, mut receiver) = socket.split();
        let mut session = ConnectionSession::new(id, self.ctx.clone());

        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                frame = receiver.next() => frame,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!(session = %id, "closing on non-utf8 binary frame");
                        break;
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Err(error)) => {
                    debug!(session = %id, %error, "websocket read failed");
                    break;
                }
            };

            let reply = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                reply = session.handle_text(&text) => reply,
            };

            if let Some(event) = reply {
                if let Err(error) = send_event(&mut sender, &event).await {
                    debug!(session = %id, %error, "websocket write failed");
                    break;
                }
            }
        }

        session.close();
        if let Some((_, record)) = self.sessions.remove(&id) {
            info!(
                session = %id,
                state = ?session.state(),
                origin = ?record.origin,
                connected_for_secs = (Utc::now() - record.connected_at).num_seconds(),
                live = self.sessions.len(),
                "websocket connection closed"
            );
        }
    }
}

async fn send_event<S>(sender: &mut S, event: &ServerEvent) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(error) => {
            warn!(%error, "failed to encode outbound event");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}

/// Empty `allowed` accepts every origin; a missing `Origin` header is always accepted.
pub(crate) fn origin_allowed(allowed: &[String], origin: Option<&str>) -> bool {
    match origin {
        None => true,
        Some(_) if allowed.is_empty() => true,
        Some(origin) => allowed.iter().any(|fragment| origin.contains(fragment.as_str())),
    }
}

pub(crate) async fn ws_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(%rejection, "rejecting non-upgrade request on websocket route");
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiError::new(
                    ErrorCode::Validation,
                    "expected websocket upgrade",
                )),
            )
                .into_response();
        }
    };

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if !origin_allowed(&state.ws_allowed_origins, origin.as_deref()) {
        warn!(origin = ?origin, "rejecting websocket from disallowed origin");
        return (
            StatusCode::FORBIDDEN,
            Json(ApiError::new(ErrorCode::Forbidden, "origin not allowed")),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| {
        let tracker = state.hub.tracker.clone();
        tracker.track_future(async move { state.hub.run(socket, origin).await })
    })
}

#[cfg(test)]
#[path = "tests/hub_tests.rs"]
mod tests;
