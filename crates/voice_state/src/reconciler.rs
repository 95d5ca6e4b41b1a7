use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use livekit_integration::{RoomInfoProvider, RoomSnapshot};
use shared::domain::{ReconciledParticipant, RoomId, UserIdentity};
use tracing::{debug, warn};

use crate::VoiceStateRegistry;

/// Merges the media service's view of a room with locally tracked presence.
#[derive(Clone)]
pub struct RoomReconciler {
    registry: VoiceStateRegistry,
    provider: Arc<dyn RoomInfoProvider>,
    fetch_timeout: Duration,
}

impl RoomReconciler {
    pub fn new(
        registry: VoiceStateRegistry,
        provider: Arc<dyn RoomInfoProvider>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            provider,
            fetch_timeout,
        }
    }

    pub fn registry(&self) -> &VoiceStateRegistry {
        &self.registry
    }

    /// Participants of `room`: everyone the media service reports (active),
    /// followed by identities only the registry places in the room (inactive).
    ///
    /// Never fails. An unavailable or slow snapshot is treated as empty.
    pub async fn reconcile(
        &self,
        room: &RoomId,
        exclude: Option<&UserIdentity>,
    ) -> Vec<ReconciledParticipant> {
        let snapshot = self.fetch_snapshot(room).await;
        let local = self.registry.all_entries().await;
        let by_identity: HashMap<&UserIdentity, _> =
            local.iter().map(|(identity, state)| (identity, state)).collect();

        let mut seen: HashSet<&UserIdentity> = HashSet::new();
        if let Some(excluded) = exclude {
            seen.insert(excluded);
        }

        let mut participants = Vec::with_capacity(snapshot.participants.len());
        for remote in &snapshot.participants {
            if !seen.insert(&remote.identity) {
                continue;
            }
            let state = by_identity.get(&remote.identity).copied().cloned().unwrap_or_default();
            let name = if remote.display_name.is_empty() {
                state.display_name
            } else {
                remote.display_name.clone()
            };
            participants.push(ReconciledParticipant {
                user_id: remote.identity.clone(),
                name,
                is_muted: state.is_muted,
                is_speaking: false,
                is_audio_disabled: state.is_audio_disabled,
                is_active: true,
            });
        }

        for (identity, state) in &local {
            if state.channel_id != *room || !seen.insert(identity) {
                continue;
            }
            participants.push(ReconciledParticipant {
                user_id: identity.clone(),
                name: state.display_name.clone(),
                is_muted: state.is_muted,
                is_speaking: false,
                is_audio_disabled: state.is_audio_disabled,
                is_active: false,
            });
        }

        debug!(
            %room,
            remote = snapshot.participants.len(),
            total = participants.len(),
            "reconciled room participants"
        );
        participants
    }

    async fn fetch_snapshot(&self, room: &RoomId) -> RoomSnapshot {
        match tokio::time::timeout(self.fetch_timeout, self.provider.fetch_room(room)).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => RoomSnapshot::empty(room.clone()),
            Err(_) => {
                warn!(%room, timeout = ?self.fetch_timeout, "room snapshot fetch timed out");
                RoomSnapshot::empty(room.clone())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
