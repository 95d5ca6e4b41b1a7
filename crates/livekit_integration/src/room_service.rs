use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::domain::{RoomId, UserIdentity};
use tracing::{debug, warn};
use url::Url;

use crate::{CredentialSigner, LiveKitError, VideoGrant, SERVICE_TOKEN_TTL_HOURS};

const LIST_PARTICIPANTS_PATH: &str = "twirp/livekit.RoomService/ListParticipants";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotParticipant {
    pub identity: UserIdentity,
    pub display_name: String,
}

/// Who the media service currently sees in a room, in its order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_name: RoomId,
    pub participants: Vec<SnapshotParticipant>,
}

impl RoomSnapshot {
    pub fn empty(room_name: RoomId) -> Self {
        Self {
            room_name,
            participants: Vec::new(),
        }
    }
}

/// Source of room membership snapshots.
///
/// Implementations absorb and log their own failures; `None` means the
/// snapshot is unavailable.
#[async_trait]
pub trait RoomInfoProvider: Send + Sync {
    async fn fetch_room(&self, room: &RoomId) -> Option<RoomSnapshot>;
}

#[derive(Debug, Serialize)]
struct ListParticipantsRequest<'a> {
    room: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Deserialize)]
struct ParticipantInfo {
    identity: String,
    #[serde(default)]
    name: String,
}

/// Client for the media service's Twirp management API.
pub struct RoomServiceClient {
    http: Client,
    list_participants_url: String,
    signer: Arc<dyn CredentialSigner>,
}

impl RoomServiceClient {
    pub fn new(
        media_url: &str,
        signer: Arc<dyn CredentialSigner>,
        timeout: Duration,
    ) -> Result<Self, LiveKitError> {
        let base = api_base_url(media_url)?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            list_participants_url: format!(
                "{}/{LIST_PARTICIPANTS_PATH}",
                base.as_str().trim_end_matches('/')
            ),
            signer,
        })
    }

    pub async fn list_participants(&self, room: &RoomId) -> Result<RoomSnapshot, LiveKitError> {
        let token = self.signer.sign(
            &VideoGrant::admin(room),
            None,
            None,
            chrono::Duration::hours(SERVICE_TOKEN_TTL_HOURS),
        )?;

        let response = self
            .http
            .post(&self.list_participants_url)
            .bearer_auth(token)
            .json(&ListParticipantsRequest {
                room: room.as_str(),
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(%room, "room not known to media service");
            return Ok(RoomSnapshot::empty(room.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LiveKitError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ListParticipantsResponse = response.json().await?;
        Ok(RoomSnapshot {
            room_name: room.clone(),
            participants: body
                .participants
                .into_iter()
                .map(|p| SnapshotParticipant {
                    identity: UserIdentity::from(p.identity),
                    display_name: p.name,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl RoomInfoProvider for RoomServiceClient {
    async fn fetch_room(&self, room: &RoomId) -> Option<RoomSnapshot> {
        match self.list_participants(room).await {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                warn!(%room, %error, "failed to fetch room participants from media service");
                None
            }
        }
    }
}

/// Maps the client-facing media URL onto the HTTP management endpoint.
fn api_base_url(media_url: &str) -> Result<Url, LiveKitError> {
    let mut url =
        Url::parse(media_url.trim()).map_err(|_| LiveKitError::InvalidUrl(media_url.into()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        _ => return Err(LiveKitError::InvalidUrl(media_url.into())),
    };
    url.set_scheme(scheme)
        .map_err(|_| LiveKitError::InvalidUrl(media_url.into()))?;
    Ok(url)
}

#[cfg(test)]
#[path = "tests/room_service_tests.rs"]
mod tests;
