use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    serve, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::completion::CompletionDriver;
use crate::connection::{ChatConnection, ServerMessage};
use crate::constants;
use crate::sidebar;

/// Where the server listens and what it serves.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub templates_dir: String,
    pub static_dir: String,
}

// Shared application state. Holds no conversation data: every WebSocket
// connection creates and owns its own session.
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    driver: CompletionDriver,
}

impl AppState {
    pub fn new(templates_dir: &str, driver: CompletionDriver) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir.to_string())),
            driver,
        }
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: String) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "Strategy Labs AI Portal",
                    models => constants::MODEL_OPTIONS,
                    default_model => constants::DEFAULT_MODEL,
                    // Pre-formatted so f32 noise never reaches the slider attributes
                    min_temperature => format!("{:.1}", constants::MIN_TEMPERATURE),
                    max_temperature => format!("{:.1}", constants::MAX_TEMPERATURE),
                    temperature_step => format!("{:.1}", constants::TEMPERATURE_STEP),
                    default_temperature => format!("{:.1}", constants::DEFAULT_TEMPERATURE),
                    system_prompt => constants::DEFAULT_SYSTEM_PROMPT,
                    credential_prompt => constants::CREDENTIAL_PROMPT,
                    knowledge_bases => sidebar::KNOWLEDGE_BASES,
                    recent_chats => sidebar::RECENT_CHATS,
                    accepted_attachments => sidebar::ACCEPTED_ATTACHMENTS,
                    active_kb_badge => sidebar::ACTIVE_KB_BADGE,
                    brand_note => sidebar::BRAND_NOTE,
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// One socket, one session. Outbound messages go through a channel drained by
// a writer task so fragments reach the client while the cycle is still
// running; inbound frames are handled strictly one after another.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut connection = ChatConnection::new(state.driver.clone());
    let session_id = connection.session().id();
    info!(%session_id, "New WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let json_msg = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json_msg)).await.is_err() {
                warn!("WebSocket client disconnected or send error. Closing writer.");
                break;
            }
        }
    });

    for msg in connection.greeting() {
        let _ = out_tx.send(msg);
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        connection.handle_text(&text, &out_tx).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(%session_id, "Received unexpected binary message from client");
                    }
                    // Axum answers pings itself
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!(%session_id, "Client requested WebSocket close");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(%session_id, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        info!(%session_id, "WebSocket client disconnected");
                        break;
                    }
                }
            }
            _ = &mut writer => {
                break;
            }
        }
    }

    drop(out_tx);
    writer.abort();
    info!(%session_id, turns = connection.session().len(), "WebSocket connection closed");
}

pub fn router(state: AppState, static_dir: &str) -> Router {
    let static_files_service =
        ServeDir::new(static_dir).not_found_service(tower::service_fn(|_: Request| async {
            Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        }));

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(settings: ServerSettings, driver: CompletionDriver) -> Result<()> {
    let state = AppState::new(&settings.templates_dir, driver);
    let app = router(state, &settings.static_dir);

    info!("Web server listening on http://{}", settings.addr);
    let listener = tokio::net::TcpListener::bind(settings.addr)
        .await
        .context(format!("Failed to bind to address {}", settings.addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
