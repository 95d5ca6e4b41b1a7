use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(UserIdentity);
id_newtype!(RoomId);

/// Display name used for identities that never announced one.
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown";

/// Per-identity voice state tracked by the relay.
///
/// An empty `channel_id` means the user is not in any room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserVoiceState {
    pub channel_id: RoomId,
    pub is_muted: bool,
    pub is_audio_disabled: bool,
    pub display_name: String,
}

impl Default for UserVoiceState {
    fn default() -> Self {
        Self {
            channel_id: RoomId::default(),
            is_muted: false,
            is_audio_disabled: false,
            display_name: UNKNOWN_DISPLAY_NAME.to_string(),
        }
    }
}

/// A partial update; `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceStateUpdate {
    pub channel_id: Option<RoomId>,
    pub is_muted: Option<bool>,
    pub is_audio_disabled: Option<bool>,
    pub display_name: Option<String>,
}

impl VoiceStateUpdate {
    pub fn channel(channel_id: RoomId) -> Self {
        Self {
            channel_id: Some(channel_id),
            ..Self::default()
        }
    }

    pub fn muted(is_muted: bool) -> Self {
        Self {
            is_muted: Some(is_muted),
            ..Self::default()
        }
    }

    pub fn audio_disabled(is_audio_disabled: bool) -> Self {
        Self {
            is_audio_disabled: Some(is_audio_disabled),
            ..Self::default()
        }
    }

    pub fn apply_to(self, state: &mut UserVoiceState) {
        if let Some(channel_id) = self.channel_id {
            state.channel_id = channel_id;
        }
        if let Some(is_muted) = self.is_muted {
            state.is_muted = is_muted;
        }
        if let Some(is_audio_disabled) = self.is_audio_disabled {
            state.is_audio_disabled = is_audio_disabled;
        }
        if let Some(display_name) = self.display_name {
            state.display_name = display_name;
        }
    }
}

/// Derived room membership entry; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledParticipant {
    pub user_id: UserIdentity,
    pub name: String,
    pub is_muted: bool,
    pub is_speaking: bool,
    pub is_audio_disabled: bool,
    pub is_active: bool,
}
