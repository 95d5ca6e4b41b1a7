use crate::hub::ConnectionHub;

pub(crate) struct AppState {
    pub(crate) hub: ConnectionHub,
    pub(crate) ws_allowed_origins: Vec<String>,
}
