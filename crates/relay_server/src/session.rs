use livekit_integration::CredentialIssuer;
use shared::{
    domain::{RoomId, UserIdentity, VoiceStateUpdate},
    protocol::{
        decode_client_event, ClientEvent, JoinRequest, JoinedPayload, ParticipantsUpdate,
        PeerSummary, ServerEvent,
    },
};
use tracing::{debug, info, warn};
use uuid::Uuid;
use voice_state::{RoomReconciler, VoiceStateRegistry};

/// Collaborators shared by every session.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) reconciler: RoomReconciler,
    pub(crate) issuer: CredentialIssuer,
    /// Media-service URL handed to clients in `joined`.
    pub(crate) media_url: String,
}

impl SessionContext {
    fn registry(&self) -> &VoiceStateRegistry {
        self.reconciler.registry()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionState {
    Connected,
    Joined {
        user_id: UserIdentity,
        room_id: RoomId,
    },
    Closed,
}

/// Protocol state for one client connection.
///
/// Events are handled strictly one at a time; replies go back to the same
/// connection only.
pub(crate) struct ConnectionSession {
    id: Uuid,
    ctx: SessionContext,
    state: SessionState,
}

impl ConnectionSession {
    pub(crate) fn new(id: Uuid, ctx: SessionContext) -> Self {
        Self {
            id,
            ctx,
            state: SessionState::Connected,
        }
    }

    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }

    pub(crate) fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Decodes and handles one text frame, returning the reply to send, if any.
    pub(crate) async fn handle_text(&mut self, text: &str) -> Option<ServerEvent> {
        if self.state == SessionState::Closed {
            return None;
        }

        match decode_client_event(text) {
            Ok(event) => self.handle_event(event).await,
            Err(error) if error.event() == Some("join") => {
                warn!(session = %self.id, %error, "rejecting malformed join");
                Some(ServerEvent::error(format!("invalid join: {error}")))
            }
            Err(error) => {
                debug!(session = %self.id, %error, "ignoring malformed frame");
                None
            }
        }
    }

    pub(crate) async fn handle_event(&mut self, event: ClientEvent) -> Option<ServerEvent> {
        debug!(session = %self.id, event = event.name(), "client event");

        match event {
            ClientEvent::Join(request) => self.join(request).await,
            ClientEvent::MuteState { is_muted } => {
                self.update_bound_user(VoiceStateUpdate::muted(is_muted)).await;
                None
            }
            ClientEvent::AudioState { is_enabled } => {
                self.update_bound_user(VoiceStateUpdate::audio_disabled(!is_enabled))
                    .await;
                None
            }
            ClientEvent::GetVoiceChannelParticipants => Some(self.participants_update().await),
            ClientEvent::Disconnect => {
                if let SessionState::Joined { user_id, room_id } = &self.state {
                    info!(session = %self.id, %user_id, %room_id, "user left voice channel");
                }
                self.update_bound_user(VoiceStateUpdate::channel(RoomId::default()))
                    .await;
                None
            }
            ClientEvent::Unrecognized { event } => {
                debug!(session = %self.id, %event, "ignoring unrecognized event");
                None
            }
        }
    }

    async fn join(&mut self, request: JoinRequest) -> Option<ServerEvent> {
        let JoinRequest {
            room_id,
            name,
            user_id,
            initial_muted,
            initial_audio_enabled,
        } = request;

        let token = match self.ctx.issuer.issue(&room_id, &user_id, &name) {
            Ok(token) => token,
            Err(error) => {
                warn!(session = %self.id, %user_id, %room_id, %error, "credential issuance failed");
                return Some(ServerEvent::error(error.to_string()));
            }
        };

        if let SessionState::Joined {
            user_id: previous, ..
        } = &self.state
        {
            if *previous != user_id {
                self.ctx
                    .registry()
                    .upsert(previous, VoiceStateUpdate::channel(RoomId::default()))
                    .await;
            }
        }

        self.ctx
            .registry()
            .upsert(
                &user_id,
                VoiceStateUpdate {
                    channel_id: Some(room_id.clone()),
                    is_muted: Some(initial_muted),
                    is_audio_disabled: Some(!initial_audio_enabled),
                    display_name: Some(name.clone()),
                },
            )
            .await;
        self.state = SessionState::Joined {
            user_id: user_id.clone(),
            room_id: room_id.clone(),
        };
        info!(session = %self.id, %user_id, %room_id, "user joined voice channel");

        let existing_peers = self
            .ctx
            .reconciler
            .reconcile(&room_id, Some(&user_id))
            .await
            .into_iter()
            .map(PeerSummary::from)
            .collect();

        Some(ServerEvent::Joined(JoinedPayload {
            token,
            url: self.ctx.media_url.clone(),
            existing_peers,
            existing_producers: Vec::new(),
        }))
    }

    async fn participants_update(&self) -> ServerEvent {
        let SessionState::Joined { room_id, .. } = &self.state else {
            return ServerEvent::VoiceChannelParticipantsUpdate(ParticipantsUpdate {
                channel_id: RoomId::default(),
                participants: Vec::new(),
            });
        };

        let participants = self.ctx.reconciler.reconcile(room_id, None).await;
        ServerEvent::VoiceChannelParticipantsUpdate(ParticipantsUpdate {
            channel_id: room_id.clone(),
            participants,
        })
    }

    async fn update_bound_user(&self, update: VoiceStateUpdate) {
        match &self.state {
            SessionState::Joined { user_id, .. } => {
                self.ctx.registry().upsert(user_id, update).await;
            }
            _ => debug!(session = %self.id, "ignoring state update before join"),
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
