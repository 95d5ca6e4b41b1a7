use std::{collections::HashMap, sync::Arc};

use shared::domain::{UserIdentity, UserVoiceState, VoiceStateUpdate};
use tokio::sync::RwLock;

/// Process-wide voice state keyed by user identity.
///
/// Cloning shares the underlying map. Every `upsert` is applied under a single
/// write guard, so readers observe either none or all of its fields.
#[derive(Clone, Default)]
pub struct VoiceStateRegistry {
    states: Arc<RwLock<HashMap<UserIdentity, UserVoiceState>>>,
}

impl VoiceStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the present fields of `update`, creating a default entry first.
    /// Returns the state as stored after the update.
    pub async fn upsert(&self, identity: &UserIdentity, update: VoiceStateUpdate) -> UserVoiceState {
        let mut states = self.states.write().await;
        let state = states.entry(identity.clone()).or_default();
        update.apply_to(state);
        state.clone()
    }

    /// Stored state, or the default state for identities never seen.
    pub async fn get(&self, identity: &UserIdentity) -> UserVoiceState {
        self.states
            .read()
            .await
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }

    /// Point-in-time copy of every entry.
    pub async fn all_entries(&self) -> Vec<(UserIdentity, UserVoiceState)> {
        self.states
            .read()
            .await
            .iter()
            .map(|(identity, state)| (identity.clone(), state.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
