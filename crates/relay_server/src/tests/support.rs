use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Duration as TokenTtl;
use livekit_integration::{
    CredentialIssuer, CredentialSigner, JwtCredentialSigner, LiveKitConfig, LiveKitError,
    RoomInfoProvider, RoomSnapshot, SnapshotParticipant, VideoGrant,
};
use shared::domain::{RoomId, UserIdentity};
use tokio::sync::RwLock;
use voice_state::{RoomReconciler, VoiceStateRegistry};

use crate::{
    app_state::AppState, build_cors, build_router, hub::ConnectionHub, session::SessionContext,
};

pub(crate) const TEST_SECRET: &str = "test-secret";
pub(crate) const TEST_MEDIA_URL: &str = "wss://media.test";

/// Room provider whose membership tests can change while sessions run.
#[derive(Clone, Default)]
pub(crate) struct FakeRoomService {
    rooms: Arc<RwLock<Vec<(String, String, String)>>>,
    unavailable: Arc<RwLock<bool>>,
}

impl FakeRoomService {
    pub(crate) async fn connect(&self, room: &str, identity: &str, name: &str) {
        self.rooms
            .write()
            .await
            .push((room.into(), identity.into(), name.into()));
    }

    pub(crate) async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }
}

#[async_trait]
impl RoomInfoProvider for FakeRoomService {
    async fn fetch_room(&self, room: &RoomId) -> Option<RoomSnapshot> {
        if *self.unavailable.read().await {
            return None;
        }
        let participants = self
            .rooms
            .read()
            .await
            .iter()
            .filter(|(r, _, _)| r == room.as_str())
            .map(|(_, identity, name)| SnapshotParticipant {
                identity: UserIdentity::from(identity.as_str()),
                display_name: name.clone(),
            })
            .collect();
        Some(RoomSnapshot {
            room_name: room.clone(),
            participants,
        })
    }
}

pub(crate) struct FailingSigner;

impl CredentialSigner for FailingSigner {
    fn sign(
        &self,
        _grant: &VideoGrant,
        _identity: Option<&UserIdentity>,
        _display_name: Option<&str>,
        _ttl: TokenTtl,
    ) -> Result<String, LiveKitError> {
        Err(LiveKitError::Signing(
            jsonwebtoken::errors::ErrorKind::InvalidKeyFormat.into(),
        ))
    }
}

pub(crate) fn jwt_signer() -> Arc<dyn CredentialSigner> {
    Arc::new(JwtCredentialSigner::new(&LiveKitConfig {
        url: TEST_MEDIA_URL.into(),
        api_key: "test-key".into(),
        api_secret: TEST_SECRET.into(),
    }))
}

pub(crate) fn context_with(
    rooms: FakeRoomService,
    signer: Arc<dyn CredentialSigner>,
) -> SessionContext {
    SessionContext {
        reconciler: RoomReconciler::new(
            VoiceStateRegistry::new(),
            Arc::new(rooms),
            Duration::from_millis(500),
        ),
        issuer: CredentialIssuer::new(signer),
        media_url: TEST_MEDIA_URL.into(),
    }
}

pub(crate) fn context(rooms: FakeRoomService) -> SessionContext {
    context_with(rooms, jwt_signer())
}

pub(crate) fn app_state(rooms: FakeRoomService, ws_allowed_origins: Vec<String>) -> Arc<AppState> {
    Arc::new(AppState {
        hub: ConnectionHub::new(context(rooms)),
        ws_allowed_origins,
    })
}

/// Serves the real router on an ephemeral port.
pub(crate) async fn spawn_relay(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = build_router(state, build_cors("*").expect("cors"));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}
