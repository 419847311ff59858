//! Gateway HTTP surface (§6): a request endpoint that opens a server-sent
//! event stream, a reconnect endpoint, and a health check, mirroring
//! `agenticlaw-gateway::server`'s `start_gateway`/`Router` shape, adapted
//! from its WebSocket upgrade to axum's SSE response.

use crate::config::GatewayConfig;
use crate::sse::{spawn_heartbeat, SessionEventStream};
use axum::extract::{Query, State};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use searchagent_actions::ActionRegistry;
use searchagent_admission::AdmissionController;
use searchagent_agent::orchestrator::{self, AgentConfig, RequestInput};
use searchagent_core::{ChatTurn, OptimizationMode, Session, SessionId, SessionRegistry, UserId};
use searchagent_llm::LlmProvider;
use searchagent_widgets::WidgetRegistry;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub struct AppState {
    pub admission: Arc<AdmissionController>,
    pub sessions: Arc<SessionRegistry>,
    pub widgets: Arc<WidgetRegistry>,
    pub actions: Arc<ActionRegistry>,
    pub provider: Arc<dyn LlmProvider>,
    pub agent_config: AgentConfig,
    pub heartbeat_interval: Duration,
    pub started_at: std::time::Instant,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub mode: OptimizationMode,
    #[serde(default)]
    pub system_instructions: Option<String>,
    #[serde(default)]
    pub max_iterations: Option<usize>,
    /// Opaque per-request user identity; the transport layer's job to
    /// authenticate is out of scope (§1 Non-goals), so this is trusted as
    /// given.
    #[serde(default = "default_user")]
    pub user_id: String,
}

fn default_user() -> String {
    "anonymous".to_string()
}

#[derive(Deserialize)]
pub struct ReconnectQuery {
    pub session_id: String,
    #[serde(default)]
    pub last_event_id: u64,
}

pub async fn start_gateway(config: GatewayConfig) -> anyhow::Result<()> {
    let raw_provider: Arc<dyn LlmProvider> =
        Arc::new(searchagent_llm::AnthropicProvider::new(config.anthropic_api_key.clone()));
    let embeddings = Arc::new(searchagent_llm::AnthropicEmbeddingProvider::new(
        config.anthropic_api_key.clone(),
        config.embedding_base_url.clone(),
    ));

    let admission = AdmissionController::new(config.admission.clone());
    // Every chat-model call goes through one breaker ("llm") shared across
    // requests, so a run of Anthropic failures trips admission for everyone
    // rather than each request discovering the outage independently (§4.2, §5).
    let provider: Arc<dyn LlmProvider> =
        Arc::new(searchagent_agent::BreakerGuardedProvider::new(raw_provider, admission.breaker("llm")));

    let state = Arc::new(AppState {
        admission,
        sessions: Arc::new(SessionRegistry::new(config.session_retention)),
        widgets: Arc::new(searchagent_widgets::default_registry()),
        actions: Arc::new(searchagent_actions::default_registry(embeddings)),
        provider,
        agent_config: config.agent.clone(),
        heartbeat_interval: config.heartbeat_interval,
        started_at: std::time::Instant::now(),
    });

    spawn_session_sweeper(state.sessions.clone(), config.session_retention);

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<axum::http::HeaderValue>().unwrap_or(axum::http::HeaderValue::from_static("*")))
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/v1/query", post(query_handler))
        .route("/v1/reconnect", get(reconnect_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state);

    let bind_addr: SocketAddr = format!("{}:{}", config.bind.to_addr(), config.port).parse()?;
    info!("searchagent gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  listening on: {bind_addr}");
    info!("  query:        POST http://{bind_addr}/v1/query");
    info!("  reconnect:    GET  http://{bind_addr}/v1/reconnect?sessionId=..&lastEventId=..");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_session_sweeper(sessions: Arc<SessionRegistry>, retention: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(retention.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            sessions.sweep();
        }
    });
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

/// POST /v1/query (§6): admits the request before the stream opens so
/// admission failures map to a plain HTTP status (400/429/503) rather than
/// an in-band `error` event.
async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryRequest>,
) -> axum::response::Response {
    if body.query.trim().is_empty() {
        return (axum::http::StatusCode::BAD_REQUEST, "query must be non-empty").into_response();
    }

    let user = UserId::new(body.user_id.clone());
    let priority = if body.history.is_empty() {
        searchagent_admission::RequestPriority::Fresh
    } else {
        searchagent_admission::RequestPriority::FollowUp
    };

    let ticket = match state.admission.admit(user.clone(), priority).await {
        Ok(ticket) => ticket,
        Err(e) => {
            let status = axum::http::StatusCode::from_u16(e.http_status()).unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
            let mut response =
                (status, Json(serde_json::json!({ "code": e.code(), "message": e.to_string() }))).into_response();
            if status == axum::http::StatusCode::TOO_MANY_REQUESTS {
                response.headers_mut().insert("Retry-After", axum::http::HeaderValue::from_static("1"));
            }
            return response;
        }
    };

    let session = Arc::new(Session::new());
    state.sessions.insert(session.clone());
    let rx = session.subscribe();
    spawn_heartbeat(session.clone(), state.heartbeat_interval);

    let history = state.admission.memory().get(&user);
    let history = if history.is_empty() { body.history.clone() } else { history };

    let input = RequestInput {
        user,
        query: body.query,
        history,
        mode: body.mode,
        system_instructions: body.system_instructions,
        max_iterations_override: body.max_iterations,
    };

    let orchestrator_state = state.clone();
    let orchestrator_session = session.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator::run(
            orchestrator_session.clone(),
            ticket,
            &orchestrator_state.admission,
            &orchestrator_state.widgets,
            &orchestrator_state.actions,
            orchestrator_state.provider.clone(),
            &orchestrator_state.agent_config,
            input,
        )
        .await
        {
            warn!("session {} ended with error: {e}", orchestrator_session.id);
        }
    });

    let stream = SessionEventStream::new(session, rx);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// GET /v1/reconnect (§6): replays events with `eventId > lastEventId` for a
/// still-retained session.
async fn reconnect_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReconnectQuery>,
) -> axum::response::Response {
    let session_id = SessionId::new(params.session_id);
    let Some(session) = state.sessions.get(&session_id) else {
        return (axum::http::StatusCode::NOT_FOUND, "session not found or expired").into_response();
    };

    let rx = session.subscribe_from(params.last_event_id);
    let stream = SessionEventStream::new(session, rx);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
