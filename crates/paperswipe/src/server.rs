use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use paperswipe_core::{normalize, Error, PaperGateway, ResearchQuery};

const LANDING_PAGE: &str = r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <title>PaperSwipe API</title>
  <style>
    body { font-family: system-ui, sans-serif; background: #5b5fc7; color: #fff;
           display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; }
    .card { background: rgba(255,255,255,0.12); padding: 40px; border-radius: 20px; }
    code { background: rgba(0,0,0,0.3); padding: 4px 8px; border-radius: 5px; }
    li { margin: 10px 0; }
  </style>
</head>
<body>
  <div class="card">
    <h1>PaperSwipe API</h1>
    <p>The relay is running. This server has no web UI; open the front-end separately.</p>
    <h2>Endpoints</h2>
    <ul>
      <li><code>POST /api/get-papers</code>: paper recommendations for <code>{"research_topic": "..."}</code></li>
      <li><code>POST /api/save-selection</code>: acknowledge <code>{"selected_papers": [...]}</code></li>
      <li><code>GET /health</code></li>
    </ul>
  </div>
</body>
</html>
"#;

#[derive(Clone)]
pub struct AppState {
    gateway: Arc<dyn PaperGateway>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn PaperGateway>) -> Self {
        Self { gateway }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/get-papers", post(get_papers))
        .route("/api/save-selection", post(save_selection))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves until ctrl-c.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        version = env!("CARGO_PKG_VERSION"),
        "paperswipe listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("ctrl-c received; shutting down");
        })
        .await?;
    Ok(())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn gateway_error_response(e: Error) -> Response {
    let status = if e.is_caller_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    match e {
        Error::Upstream {
            code,
            message,
            body,
        } => (
            status,
            Json(json!({
                "error": format!("API error ({code}): {message}"),
                "code": code,
                "details": body,
            })),
        )
            .into_response(),
        other => error_response(status, other.to_string()),
    }
}

async fn index() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Deserialize)]
struct GetPapersRequest {
    #[serde(default)]
    research_topic: String,
}

async fn get_papers(
    State(state): State<AppState>,
    payload: Result<Json<GetPapersRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "get-papers: bad request body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };
    let query = match ResearchQuery::new(&req.research_topic) {
        Ok(q) => q,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "research_topic is required"),
    };

    tracing::info!(topic = query.as_str(), gateway = state.gateway.name(), "get-papers");
    match state.gateway.fetch(&query).await {
        Ok(envelope) => {
            let normalized = normalize(envelope);
            tracing::info!(
                strategy = ?normalized.strategy(),
                papers = normalized.papers_len(),
                "get-papers: responding"
            );
            (StatusCode::OK, Json(normalized.into_value())).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "get-papers: gateway failed");
            gateway_error_response(e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SaveSelectionRequest {
    #[serde(default)]
    selected_papers: Vec<Value>,
}

async fn save_selection(payload: Result<Json<SaveSelectionRequest>, JsonRejection>) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let count = req.selected_papers.len();
    let titles: Vec<&str> = req
        .selected_papers
        .iter()
        .filter_map(|p| p.get("title").and_then(|t| t.as_str()))
        .collect();
    tracing::info!(count, ?titles, "save-selection");
    Json(json!({
        "success": true,
        "message": format!("saved {count} papers"),
        "count": count,
    }))
    .into_response()
}
