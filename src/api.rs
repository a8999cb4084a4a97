//! Combined REST API
//!
//! Hosts market data, analysis, retrieval and generation in one process.
//! Responses are wrapped as `{status, data, error, timestamp}`, except the
//! `/api/*` routes used by the chat UI, which answer with bare payloads and
//! `{"detail"}` errors.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agents::{AgentServices, DocumentRequest};
use crate::analysis;
use crate::error::AssistantError;
use crate::extract::JsonBody;
use crate::language::LanguageAgent;
use crate::market::MarketDataProvider;
use crate::models::{AnalysisResult, GenerationResponse, MarketData};
use crate::retriever::{Retriever, DEFAULT_TOP_K};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

/// Chat UI request; `market_data` is the snapshot the client is displaying
#[derive(Debug, Deserialize)]
pub struct UiChatRequest {
    pub query: String,
    #[serde(default)]
    pub market_data: Option<MarketData>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn failure(err: AssistantError) -> (StatusCode, Json<ApiResponse>) {
    warn!("Request failed: {}", err);
    (err.status_code(), Json(ApiResponse::error(err.to_string())))
}

#[derive(Debug, Serialize)]
struct OverviewData {
    market_data: MarketData,
    analysis: AnalysisResult,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub market: Arc<dyn MarketDataProvider>,
    pub symbols: Vec<String>,
    pub retriever: Arc<Retriever>,
    pub language: Arc<LanguageAgent>,
}

impl From<&AgentServices> for ApiState {
    fn from(services: &AgentServices) -> Self {
        Self {
            market: services.market.clone(),
            symbols: services.symbols.clone(),
            retriever: services.retriever.clone(),
            language: services.language.clone(),
        }
    }
}

impl ApiState {
    async fn market_data(&self) -> MarketData {
        self.market.fetch(&self.symbols).await.unwrap_or_else(|e| {
            warn!(provider = self.market.name(), "Market data unavailable: {}", e);
            MarketData::empty()
        })
    }
}

/// =============================
/// Endpoints
/// =============================

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "success",
        "message": "Finance Assistant API is running",
        "endpoints": {
            "market_overview": "/market/overview",
            "chat": "/chat",
            "documents": "/documents",
            "health": "/health",
            "ui_chat": "/api/chat",
            "ui_market_overview": "/api/market-overview"
        }
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn market_overview(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let market_data = state.market_data().await;
    let analysis = analysis::analyze(&market_data);

    info!(
        stocks = market_data.stocks.len(),
        risk = %analysis.risk_level,
        "Market overview"
    );

    (
        StatusCode::OK,
        Json(ApiResponse::success(OverviewData {
            market_data,
            analysis,
        })),
    )
}

async fn chat_handler(
    State(state): State<ApiState>,
    body: std::result::Result<JsonBody<ChatRequest>, AssistantError>,
) -> (StatusCode, Json<ApiResponse>) {
    let req = match body {
        Ok(JsonBody(req)) => req,
        Err(e) => return failure(e),
    };
    if req.query.trim().is_empty() {
        return failure(AssistantError::InvalidInput("query is empty".into()));
    }

    let market_data = state.market_data().await;
    let results = state.retriever.search(&req.query, DEFAULT_TOP_K).await;

    let answer = state
        .language
        .answer(&req.query, &results.results, Some(&market_data))
        .await;

    (StatusCode::OK, Json(ApiResponse::success(answer)))
}

async fn add_document(
    State(state): State<ApiState>,
    body: std::result::Result<JsonBody<DocumentRequest>, AssistantError>,
) -> (StatusCode, Json<ApiResponse>) {
    let req = match body {
        Ok(JsonBody(req)) => req,
        Err(e) => return failure(e),
    };
    match state.retriever.add_document(req.text, req.metadata).await {
        Ok(document) => (StatusCode::CREATED, Json(ApiResponse::success(document))),
        Err(e) => failure(e),
    }
}

/// =============================
/// Chat UI Endpoints
/// =============================

async fn ui_chat(
    State(state): State<ApiState>,
    JsonBody(req): JsonBody<UiChatRequest>,
) -> crate::Result<Json<GenerationResponse>> {
    if req.query.trim().is_empty() {
        return Err(AssistantError::InvalidInput("query is empty".into()));
    }

    let market_data = match req.market_data {
        Some(data) => data,
        None => state.market_data().await,
    };
    let results = state.retriever.search(&req.query, DEFAULT_TOP_K).await;

    let answer = state
        .language
        .answer(&req.query, &results.results, Some(&market_data))
        .await;
    info!(sources = answer.sources.len(), "UI chat answered");
    Ok(Json(answer))
}

async fn ui_market_overview(State(state): State<ApiState>) -> Json<MarketData> {
    Json(state.market_data().await)
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/market/overview", get(market_overview))
        .route("/chat", post(chat_handler))
        .route("/documents", post(add_document))
        .route("/api/chat", post(ui_chat))
        .route("/api/market-overview", get(ui_market_overview))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(state: ApiState, host: &str, port: u16) -> crate::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    info!("API Server listening on http://{}:{}", host, port);
    info!("Local: http://127.0.0.1:{}", port);
    axum::serve(listener, router).await?;
    Ok(())
}
