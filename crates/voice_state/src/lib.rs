mod reconciler;
mod registry;

pub use reconciler::RoomReconciler;
pub use registry::VoiceStateRegistry;
