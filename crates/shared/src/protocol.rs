use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{ReconciledParticipant, RoomId, UserIdentity};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("invalid {event} payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {event} payload: {reason}")]
    Field { event: String, reason: &'static str },
}

impl DecodeError {
    /// Name of the event whose payload failed to decode, if the envelope itself was readable.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Envelope(_) => None,
            Self::Payload { event, .. } | Self::Field { event, .. } => Some(event),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    data: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room_id: RoomId,
    pub name: String,
    pub user_id: UserIdentity,
    #[serde(default)]
    pub initial_muted: bool,
    #[serde(default = "default_true")]
    pub initial_audio_enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MuteStatePayload {
    is_muted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioStatePayload {
    is_enabled: bool,
}

/// Inbound client events. Anything the relay does not know lands in `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Join(JoinRequest),
    MuteState { is_muted: bool },
    AudioState { is_enabled: bool },
    GetVoiceChannelParticipants,
    Disconnect,
    Unrecognized { event: String },
}

impl ClientEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::Join(_) => "join",
            Self::MuteState { .. } => "muteState",
            Self::AudioState { .. } => "audioState",
            Self::GetVoiceChannelParticipants => "getVoiceChannelParticipants",
            Self::Disconnect => "disconnect",
            Self::Unrecognized { event } => event,
        }
    }
}

/// Decodes one `{"event": ..., "data": {...}}` text frame.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Envelope)?;
    let Envelope { event, data } = envelope;
    let data = Value::Object(data);

    let payload_err = |event: &str, source| DecodeError::Payload {
        event: event.to_string(),
        source,
    };

    match event.as_str() {
        "join" => {
            let join: JoinRequest =
                serde_json::from_value(data).map_err(|e| payload_err(&event, e))?;
            if join.room_id.is_empty() {
                return Err(DecodeError::Field {
                    event: event.clone(),
                    reason: "roomId must not be empty",
                });
            }
            if join.user_id.is_empty() {
                return Err(DecodeError::Field {
                    event: event.clone(),
                    reason: "userId must not be empty",
                });
            }
            Ok(ClientEvent::Join(join))
        }
        "muteState" => {
            let payload: MuteStatePayload =
                serde_json::from_value(data).map_err(|e| payload_err(&event, e))?;
            Ok(ClientEvent::MuteState {
                is_muted: payload.is_muted,
            })
        }
        "audioState" => {
            let payload: AudioStatePayload =
                serde_json::from_value(data).map_err(|e| payload_err(&event, e))?;
            Ok(ClientEvent::AudioState {
                is_enabled: payload.is_enabled,
            })
        }
        "getVoiceChannelParticipants" => Ok(ClientEvent::GetVoiceChannelParticipants),
        "disconnect" => Ok(ClientEvent::Disconnect),
        _ => Ok(ClientEvent::Unrecognized {
            event: event.clone(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub id: UserIdentity,
    pub name: String,
    pub is_muted: bool,
    pub is_audio_enabled: bool,
    pub is_global_audio_muted: bool,
    pub user_id: UserIdentity,
}

impl From<ReconciledParticipant> for PeerSummary {
    fn from(participant: ReconciledParticipant) -> Self {
        Self {
            id: participant.user_id.clone(),
            name: participant.name,
            is_muted: participant.is_muted,
            is_audio_enabled: !participant.is_audio_disabled,
            is_global_audio_muted: participant.is_audio_disabled,
            user_id: participant.user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPayload {
    pub token: String,
    pub url: String,
    pub existing_peers: Vec<PeerSummary>,
    /// Always empty; the media service announces producers itself.
    pub existing_producers: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsUpdate {
    pub channel_id: RoomId,
    pub participants: Vec<ReconciledParticipant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Joined(JoinedPayload),
    VoiceChannelParticipantsUpdate(ParticipantsUpdate),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            error: message.into(),
        })
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
