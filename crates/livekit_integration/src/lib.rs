//! Bridge to the external LiveKit media service: join credentials and the
//! room-membership snapshot used for reconciliation.

mod error;
mod room_service;
mod token;

pub use error::LiveKitError;
pub use room_service::{RoomInfoProvider, RoomServiceClient, RoomSnapshot, SnapshotParticipant};
pub use token::{
    CredentialIssuer, CredentialSigner, JwtCredentialSigner, VideoGrant, JOIN_TOKEN_TTL_HOURS,
    SERVICE_TOKEN_TTL_HOURS,
};

#[derive(Debug, Clone)]
pub struct LiveKitConfig {
    /// Media-service URL as configured, usually `ws://` or `wss://`.
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}
