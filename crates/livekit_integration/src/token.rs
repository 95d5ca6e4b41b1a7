use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use shared::domain::{RoomId, UserIdentity};

use crate::{LiveKitConfig, LiveKitError};

pub const JOIN_TOKEN_TTL_HOURS: i64 = 24;
pub const SERVICE_TOKEN_TTL_HOURS: i64 = 1;

/// Capability grant understood by the media service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub room_join: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub room_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
}

impl VideoGrant {
    pub fn join(room: &RoomId) -> Self {
        Self {
            room: Some(room.to_string()),
            room_join: true,
            can_publish: Some(true),
            can_subscribe: Some(true),
            ..Self::default()
        }
    }

    pub fn admin(room: &RoomId) -> Self {
        Self {
            room: Some(room.to_string()),
            room_admin: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jti: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    nbf: i64,
    exp: i64,
    video: &'a VideoGrant,
}

/// Signs capability grants into bearer credentials.
pub trait CredentialSigner: Send + Sync {
    fn sign(
        &self,
        grant: &VideoGrant,
        identity: Option<&UserIdentity>,
        display_name: Option<&str>,
        ttl: Duration,
    ) -> Result<String, LiveKitError>;
}

/// HS256 signer keyed by the media-service API key/secret pair.
pub struct JwtCredentialSigner {
    api_key: String,
    encoding_key: EncodingKey,
}

impl JwtCredentialSigner {
    pub fn new(cfg: &LiveKitConfig) -> Self {
        Self {
            api_key: cfg.api_key.clone(),
            encoding_key: EncodingKey::from_secret(cfg.api_secret.as_bytes()),
        }
    }
}

impl CredentialSigner for JwtCredentialSigner {
    fn sign(
        &self,
        grant: &VideoGrant,
        identity: Option<&UserIdentity>,
        display_name: Option<&str>,
        ttl: Duration,
    ) -> Result<String, LiveKitError> {
        let now = Utc::now();
        let identity = identity.map(UserIdentity::as_str);
        let claims = Claims {
            iss: &self.api_key,
            sub: identity,
            jti: identity,
            name: display_name,
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
            video: grant,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }
}

/// Issues per-user room join credentials.
#[derive(Clone)]
pub struct CredentialIssuer {
    signer: Arc<dyn CredentialSigner>,
}

impl CredentialIssuer {
    pub fn new(signer: Arc<dyn CredentialSigner>) -> Self {
        Self { signer }
    }

    /// Grants join, publish and subscribe on `room` for 24 hours.
    pub fn issue(
        &self,
        room: &RoomId,
        identity: &UserIdentity,
        display_name: &str,
    ) -> Result<String, LiveKitError> {
        self.signer.sign(
            &VideoGrant::join(room),
            Some(identity),
            Some(display_name),
            Duration::hours(JOIN_TOKEN_TTL_HOURS),
        )
    }
}

#[cfg(test)]
#[path = "tests/token_tests.rs"]
mod tests;
