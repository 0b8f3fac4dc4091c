//! Console HTTP server with WebSocket support

use super::html::{self, CONSOLE_HTML};
use super::state::{Console, ConsoleError};
use super::SERVICE_NAME;
use crate::emulate::EmulationForm;
use crate::feed::detail::{DetailError, DetailOutcome};
use crate::feed::render;
use crate::feed::sanitize::Sanitize;
use crate::feed::{Placement, RowFragment};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use sniffy_common::{OperatorOption, SubmitMode};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

type AppState = Arc<Console>;

/// Build the console router
pub fn router(console: Arc<Console>) -> Router {
    Router::new()
        // Shell
        .route("/", get(serve_shell))
        // Health check (for port detection)
        .route("/api/health", get(health_check))
        // Pages and feed
        .route("/api/navigate", post(navigate))
        .route("/api/feed", get(get_feed))
        .route("/api/feed/pause", post(toggle_pause))
        .route("/api/feed/clear", post(clear_feed))
        .route("/api/feed/toggle-all", post(toggle_all))
        .route("/api/rows/{id}/activate", post(activate_row))
        // Operator options
        .route("/api/options/{option}", post(toggle_option))
        // Emulation
        .route("/api/emulate", post(submit_emulation))
        .route("/api/emulate/new", get(new_emulation))
        .route("/api/emulate/{id}", get(edit_emulation))
        // WebSocket
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(console)
}

/// Start the console server on the given port
pub async fn start_server(port: u16, console: Arc<Console>) -> Result<JoinHandle<()>> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind console to {}", addr))?;

    let app = router(console);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Console server stopped: {}", e);
        }
    });

    Ok(handle)
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let status = match &self {
            ConsoleError::NoFeed => StatusCode::CONFLICT,
            ConsoleError::UnknownTransaction(_)
            | ConsoleError::Detail(DetailError::UnknownRow(_))
            | ConsoleError::Detail(DetailError::NotFound(_)) => StatusCode::NOT_FOUND,
            ConsoleError::Detail(DetailError::Api(_)) | ConsoleError::Api(_) => {
                StatusCode::BAD_GATEWAY
            }
            ConsoleError::Emulation(_) | ConsoleError::Protocol(_) => StatusCode::BAD_REQUEST,
        };

        if status.is_server_error() {
            tracing::warn!("{}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// ============================================================================
// Shell & Health
// ============================================================================

async fn serve_shell() -> Html<&'static str> {
    Html(CONSOLE_HTML)
}

#[derive(Serialize)]
struct HealthResponse {
    service: &'static str,
    version: &'static str,
}

/// Health check endpoint for port detection
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Pages & Feed
// ============================================================================

#[derive(Deserialize)]
struct NavigateBody {
    hash: String,
}

#[derive(Serialize)]
struct PageResponse {
    generation: u64,
    page: Option<&'static str>,
    proxy_server: String,
    html: String,
}

async fn navigate(State(console): State<AppState>, Json(body): Json<NavigateBody>) -> Json<PageResponse> {
    let page = console.navigate(&body.hash).await;
    let options = console.options().await;
    let html = html::page_fragment(&page, &page.proxy_server.clone().sanitize(), &options);

    Json(PageResponse {
        generation: page.generation,
        page: page.page.map(|p| p.as_str()),
        proxy_server: page.proxy_server,
        html,
    })
}

#[derive(Serialize)]
struct FeedResponse {
    generation: u64,
    placement: Placement,
    paused: bool,
    rows: Vec<RowFragment>,
}

/// Current rows in display order
async fn get_feed(State(console): State<AppState>) -> Result<Json<FeedResponse>, ConsoleError> {
    let feed = console.feed().await?;
    let paused = console
        .current_page()
        .await
        .is_some_and(|page| page.paused);

    Ok(Json(FeedResponse {
        generation: feed.generation(),
        placement: feed.order().placement(),
        paused,
        rows: feed.snapshot().await,
    }))
}

async fn toggle_pause(State(console): State<AppState>) -> Result<Json<serde_json::Value>, ConsoleError> {
    let paused = console.toggle_pause().await?;
    Ok(Json(serde_json::json!({ "paused": paused })))
}

async fn clear_feed(State(console): State<AppState>) -> Result<Json<serde_json::Value>, ConsoleError> {
    console.clear().await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn toggle_all(State(console): State<AppState>) -> Result<Json<serde_json::Value>, ConsoleError> {
    let failed = console.toggle_all().await?;
    Ok(Json(serde_json::json!({ "failed": failed })))
}

#[derive(Serialize)]
struct ActivateResponse {
    id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<String>,
    visible: bool,
    pending: bool,
}

async fn activate_row(
    State(console): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ActivateResponse>, ConsoleError> {
    let response = match console.activate_row(id).await? {
        DetailOutcome::Fetched { html } => ActivateResponse {
            id,
            html: Some(html),
            visible: true,
            pending: false,
        },
        DetailOutcome::Toggled { visible } => ActivateResponse {
            id,
            html: None,
            visible,
            pending: false,
        },
        DetailOutcome::Pending => ActivateResponse {
            id,
            html: None,
            visible: false,
            pending: true,
        },
    };
    Ok(Json(response))
}

// ============================================================================
// Operator Options
// ============================================================================

async fn toggle_option(
    State(console): State<AppState>,
    Path(option): Path<String>,
) -> Result<Json<serde_json::Value>, ConsoleError> {
    let option: OperatorOption = option.parse()?;
    let enabled = console.toggle_option(option).await?;
    Ok(Json(serde_json::json!({ "option": option.as_str(), "enabled": enabled })))
}

// ============================================================================
// Emulation
// ============================================================================

async fn new_emulation() -> Html<String> {
    Html(render::emulation_form(&EmulationForm::blank().sanitize()))
}

async fn edit_emulation(
    State(console): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Html<String>, ConsoleError> {
    let form = console.emulation_form(Some(id)).await?;
    Ok(Html(render::emulation_form(&form.sanitize())))
}

#[derive(Serialize)]
struct SubmitResponse {
    mode: SubmitMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<String>,
}

async fn submit_emulation(
    State(console): State<AppState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Json<SubmitResponse>, ConsoleError> {
    let outcome = console.submit_emulation(&fields).await?;
    Ok(Json(SubmitResponse {
        mode: outcome.mode,
        html: outcome
            .response
            .map(|body| render::replay_response(&body.sanitize())),
    }))
}

// ============================================================================
// WebSocket
// ============================================================================

/// WebSocket handler for live feed events
async fn ws_handler(State(console): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, console))
}

async fn handle_websocket(socket: WebSocket, console: Arc<Console>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = console.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("WebSocket client skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
}
