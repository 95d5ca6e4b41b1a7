use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Router,
};
use livekit_integration::{
    CredentialIssuer, CredentialSigner, JwtCredentialSigner, LiveKitConfig, RoomServiceClient,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_state::{RoomReconciler, VoiceStateRegistry};

mod app_state;
mod config;
mod hub;
mod session;
mod tls;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

use app_state::AppState;
use config::{load_settings, Settings};
use hub::{ws_handler, ConnectionHub};
use session::SessionContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    info!(
        url = %settings.livekit_url,
        api_key = %settings.livekit_api_key,
        "livekit configured"
    );

    let ctx = build_session_context(&settings)?;
    let state = Arc::new(AppState {
        hub: ConnectionHub::new(ctx),
        ws_allowed_origins: settings.ws_allowed_origins.clone(),
    });
    let app = build_router(state.clone(), build_cors(&settings.cors_origin)?);

    let addr = settings.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let shutdown = state.hub.shutdown_token();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        }
    });

    match settings.tls_paths() {
        Some((cert, key)) => {
            let acceptor = tls::load_tls_acceptor(cert, key)?;
            info!(%addr, "server listening (tls)");
            info!("websocket endpoint: wss://{addr}/ws");
            tls::serve_tls(listener, acceptor, app, shutdown).await?;
        }
        None => {
            info!(%addr, "server listening");
            info!("websocket endpoint: ws://{addr}/ws");
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await?;
        }
    }

    state.hub.shutdown().await;
    Ok(())
}

fn build_session_context(settings: &Settings) -> anyhow::Result<SessionContext> {
    let livekit = LiveKitConfig {
        url: settings.livekit_url.clone(),
        api_key: settings.livekit_api_key.clone(),
        api_secret: settings.livekit_api_secret.clone(),
    };
    let signer: Arc<dyn CredentialSigner> = Arc::new(JwtCredentialSigner::new(&livekit));
    let room_service =
        RoomServiceClient::new(&livekit.url, signer.clone(), settings.external_timeout())
            .context("failed to build room service client")?;

    Ok(SessionContext {
        reconciler: RoomReconciler::new(
            VoiceStateRegistry::new(),
            Arc::new(room_service),
            settings.external_timeout(),
        ),
        issuer: CredentialIssuer::new(signer),
        media_url: settings.client_media_url(),
    })
}

fn build_cors(origin: &str) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ]);

    if origin.trim() == "*" {
        return Ok(cors.allow_origin(AllowOrigin::any()));
    }
    let origin = HeaderValue::from_str(origin.trim())
        .with_context(|| format!("invalid CORS origin '{origin}'"))?;
    Ok(cors
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true))
}

fn build_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
