use std::{
    collections::HashMap,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use tracing::warn;

const SETTINGS_FILE: &str = "relay.toml";
const FALLBACK_API_KEY: &str = "api_key";
const FALLBACK_API_SECRET: &str = "api_secret";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub port: Option<u16>,
    pub livekit_url: String,
    pub livekit_public_url: Option<String>,
    pub livekit_api_key: String,
    pub livekit_api_secret: String,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub cors_origin: String,
    pub ws_allowed_origins: Vec<String>,
    pub external_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "0.0.0.0:3000".into(),
            port: None,
            livekit_url: "ws://localhost:7880".into(),
            livekit_public_url: None,
            livekit_api_key: String::new(),
            livekit_api_secret: String::new(),
            tls_cert: None,
            tls_key: None,
            cors_origin: "*".into(),
            ws_allowed_origins: Vec::new(),
            external_timeout_seconds: 10,
        }
    }
}

impl Settings {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let mut addr: SocketAddr = self
            .server_bind
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.server_bind))?;
        if let Some(port) = self.port {
            addr.set_port(port);
        }
        Ok(addr)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_seconds.max(1))
    }

    /// Certificate and key paths, only when both are configured and present on disk.
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        let cert = self.tls_cert.as_deref()?;
        let key = self.tls_key.as_deref()?;
        if !cert.exists() || !key.exists() {
            warn!(
                cert = %cert.display(),
                key = %key.display(),
                "tls material not found; serving without tls"
            );
            return None;
        }
        Some((cert, key))
    }

    /// Media URL handed to clients. Loopback URLs are swapped for the public one when set.
    pub fn client_media_url(&self) -> String {
        let is_loopback =
            self.livekit_url.contains("localhost") || self.livekit_url.contains("127.0.0.1");
        match &self.livekit_public_url {
            Some(public) if is_loopback => public.clone(),
            _ => self.livekit_url.clone(),
        }
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(file.as_deref(), |name| std::env::var(name).ok())
}

pub(crate) fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<HashMap<String, String>>(raw) {
            Ok(file_cfg) => apply_file(&mut settings, &file_cfg),
            Err(error) => warn!(%error, file = SETTINGS_FILE, "ignoring unreadable settings file"),
        }
    }

    let var = |names: &[&str]| -> Option<String> {
        names
            .iter()
            .rev()
            .find_map(|name| env(name).filter(|v| !v.trim().is_empty()))
    };

    if let Some(v) = var(&["SERVER_BIND", "APP__BIND_ADDR"]) {
        settings.server_bind = v;
    }
    if let Some(v) = var(&["PORT", "APP__PORT"]) {
        match v.trim().parse::<u16>() {
            Ok(port) => settings.port = Some(port),
            Err(_) => warn!(value = %v, "ignoring invalid PORT"),
        }
    }
    if let Some(v) = var(&["LIVEKIT_URL", "APP__LIVEKIT_URL"]) {
        settings.livekit_url = v;
    }
    if let Some(v) = var(&["LIVEKIT_PUBLIC_URL", "APP__LIVEKIT_PUBLIC_URL"]) {
        settings.livekit_public_url = Some(v);
    }
    if let Some(v) = var(&["LIVEKIT_API_KEY", "APP__LIVEKIT_API_KEY"]) {
        settings.livekit_api_key = v;
    }
    if let Some(v) = var(&["LIVEKIT_API_SECRET", "APP__LIVEKIT_API_SECRET"]) {
        settings.livekit_api_secret = v;
    }
    if let Some(v) = var(&["TLS_CERT", "APP__TLS_CERT"]) {
        settings.tls_cert = Some(PathBuf::from(v));
    }
    if let Some(v) = var(&["TLS_KEY", "APP__TLS_KEY"]) {
        settings.tls_key = Some(PathBuf::from(v));
    }
    if let Some(v) = var(&["CORS_ORIGIN", "APP__CORS_ORIGIN"]) {
        settings.cors_origin = v;
    }
    if let Some(v) = var(&["WS_ALLOWED_ORIGINS", "APP__WS_ALLOWED_ORIGINS"]) {
        settings.ws_allowed_origins = split_origins(&v);
    }
    if let Some(v) = var(&["APP__EXTERNAL_TIMEOUT_SECONDS"]) {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.external_timeout_seconds = parsed;
        }
    }

    resolve_api_keys(&mut settings, var(&["LIVEKIT_KEYS"]).as_deref());
    settings
}

fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("livekit_url") {
        settings.livekit_url = v.clone();
    }
    if let Some(v) = file_cfg.get("livekit_public_url") {
        settings.livekit_public_url = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("livekit_api_key") {
        settings.livekit_api_key = v.clone();
    }
    if let Some(v) = file_cfg.get("livekit_api_secret") {
        settings.livekit_api_secret = v.clone();
    }
    if let Some(v) = file_cfg.get("tls_cert") {
        settings.tls_cert = Some(PathBuf::from(v));
    }
    if let Some(v) = file_cfg.get("tls_key") {
        settings.tls_key = Some(PathBuf::from(v));
    }
    if let Some(v) = file_cfg.get("cors_origin") {
        settings.cors_origin = v.clone();
    }
    if let Some(v) = file_cfg.get("ws_allowed_origins") {
        settings.ws_allowed_origins = split_origins(v);
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

/// Explicit key/secret win; missing halves come from a `key:secret` pair,
/// then from development placeholders.
fn resolve_api_keys(settings: &mut Settings, combined: Option<&str>) {
    if settings.livekit_api_key.is_empty() || settings.livekit_api_secret.is_empty() {
        if let Some(combined) = combined {
            let parts: Vec<&str> = combined.split(':').collect();
            if let [key, secret] = parts.as_slice() {
                if settings.livekit_api_key.is_empty() {
                    settings.livekit_api_key = key.trim().to_string();
                }
                if settings.livekit_api_secret.is_empty() {
                    settings.livekit_api_secret = secret.trim().to_string();
                }
            } else {
                warn!("LIVEKIT_KEYS must have the form 'key:secret'; ignoring");
            }
        }
    }

    if settings.livekit_api_key.is_empty() {
        warn!("no LiveKit API key configured; using development placeholder");
        settings.livekit_api_key = FALLBACK_API_KEY.into();
    }
    if settings.livekit_api_secret.is_empty() {
        warn!("no LiveKit API secret configured; using development placeholder");
        settings.livekit_api_secret = FALLBACK_API_SECRET.into();
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
