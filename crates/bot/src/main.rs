use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use bot_api::{BotContext, Dispatcher};
use storage::{RecordStore, Storage};
use telegram::{TelegramClient, Update};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod poller;

use config::{load_settings, prepare_database_url};

const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
const MAX_WEBHOOK_BODY_BYTES: usize = 1024 * 1024;

struct AppState {
    dispatcher: Dispatcher,
    webhook_enabled: bool,
    webhook_secret: Option<String>,
    /// Webhook updates are dispatched one at a time, like the poller does.
    dispatch_lock: Mutex<()>,
}

impl AppState {
    fn new(dispatcher: Dispatcher, webhook_enabled: bool, webhook_secret: Option<String>) -> Self {
        Self {
            dispatcher,
            webhook_enabled,
            webhook_secret,
            dispatch_lock: Mutex::new(()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::with_timeout(&database_url, settings.store_timeout())
        .await
        .map_err(|error| {
            error!(
                %database_url,
                "failed to open SQLite database; verify parent directory exists and permissions are correct: {error:#}"
            );
            error
        })?;

    let telegram =
        TelegramClient::new(&settings.telegram_config()).context("failed to build telegram client")?;
    match telegram.get_me().await {
        Ok(me) => info!(
            bot = me.username.as_deref().unwrap_or_default(),
            "connected to telegram"
        ),
        Err(error) => warn!(%error, "could not verify bot identity; continuing"),
    }

    let ctx = BotContext::new(Arc::new(storage.clone()), Arc::new(telegram.clone()))
        .with_broadcast(settings.broadcast_settings());
    let dispatcher = Dispatcher::new(ctx);

    if settings.webhook_enabled {
        info!("webhook mode; long polling disabled");
    } else {
        tokio::spawn(poller::run(
            telegram,
            dispatcher.clone(),
            settings.poll_timeout(),
        ));
    }

    let app = build_router(Arc::new(AppState::new(
        dispatcher,
        settings.webhook_enabled,
        settings.webhook_secret.clone(),
    )));

    let addr: SocketAddr = settings
        .http_bind
        .parse()
        .with_context(|| format!("invalid http_bind '{}'", settings.http_bind))?;
    info!(%addr, "http listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.close().await;
    info!("bot stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new().route("/healthz", get(healthz));
    if state.webhook_enabled {
        router = router.route(
            "/webhook",
            post(webhook).layer(RequestBodyLimitLayer::new(MAX_WEBHOOK_BODY_BYTES)),
        );
    }
    router.with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.dispatcher.context().store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            error!("health check failed: {error:#}");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(expected) = &state.webhook_secret {
        let provided = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!("rejected webhook call with a missing or wrong secret");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(error) => {
            warn!(%error, "malformed webhook update");
            return StatusCode::BAD_REQUEST;
        }
    };
    if let Some(event) = update.into_inbound() {
        let _turn = state.dispatch_lock.lock().await;
        state.dispatcher.handle(event).await;
    }
    StatusCode::OK
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
