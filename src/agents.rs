//! HTTP services for the six specialist agents
//!
//! Each agent is a standalone axum router so it can run in its own process
//! (`agents agent <kind>`) or share a runtime with the others (`agents all`).
//! Errors render as `{"detail": ...}` through `AssistantError`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::analysis;
use crate::config::{AgentKind, Settings};
use crate::extract::{JsonBody, QueryParams};
use crate::language::LanguageAgent;
use crate::market::{self, MarketDataProvider};
use crate::models::{
    AnalysisResult, GenerationRequest, GenerationResponse, MarketData, Metadata, NewsArticle,
    SearchResults,
};
use crate::news::{self, NewsSource, DEFAULT_MAX_ARTICLES};
use crate::retriever::{Document, Retriever};
use crate::voice::{self, DisabledVoiceEngine, VoiceEngine, VoiceInfo};
use crate::Result;

/// Result count for `/search` when the request does not set `top_k`
pub const HTTP_DEFAULT_TOP_K: usize = 5;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct MarketQuery {
    /// Comma separated symbols
    pub symbols: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewsQuery {
    #[serde(default)]
    pub query: String,
    pub max_articles: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    HTTP_DEFAULT_TOP_K
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub text: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceProcessRequest {
    /// Base64 encoded audio
    pub audio: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceProcessResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SynthesizeResponse {
    /// Base64 encoded audio
    pub audio: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceInfo>,
}

/// =============================
/// Shared Services
/// =============================

/// Backing services for every agent router
#[derive(Clone)]
pub struct AgentServices {
    pub market: Arc<dyn MarketDataProvider>,
    pub symbols: Vec<String>,
    pub news: Arc<dyn NewsSource>,
    pub retriever: Arc<Retriever>,
    pub language: Arc<LanguageAgent>,
    pub voice: Arc<dyn VoiceEngine>,
    pub snapshot_dir: PathBuf,
}

impl AgentServices {
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            market: market::provider_from_settings(settings),
            symbols: settings.symbols.clone(),
            news: news::source_from_settings(settings),
            retriever: Arc::new(Retriever::from_settings(settings).await),
            language: Arc::new(LanguageAgent::from_settings(&settings.llm)?),
            voice: Arc::new(DisabledVoiceEngine),
            snapshot_dir: settings.vector_store_dir.clone(),
        })
    }

    pub fn router(&self, kind: AgentKind) -> Router {
        match kind {
            AgentKind::Api => api_router(self.market.clone(), self.symbols.clone()),
            AgentKind::Scraping => scraping_router(self.news.clone()),
            AgentKind::Retriever => {
                retriever_router(self.retriever.clone(), self.snapshot_dir.clone())
            }
            AgentKind::Analysis => analysis_router(),
            AgentKind::Language => language_router(self.language.clone()),
            AgentKind::Voice => voice_router(self.voice.clone()),
        }
    }
}

fn service_name(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Api => "api-agent",
        AgentKind::Scraping => "scraping-agent",
        AgentKind::Retriever => "retriever-agent",
        AgentKind::Analysis => "analysis-agent",
        AgentKind::Language => "language-agent",
        AgentKind::Voice => "voice-agent",
    }
}

fn health_router<S: Clone + Send + Sync + 'static>(service: &'static str) -> Router<S> {
    Router::new().route(
        "/",
        get(move || async move { Json(json!({ "status": "healthy", "service": service })) }),
    )
}

/// =============================
/// API Agent (market data)
/// =============================

#[derive(Clone)]
struct MarketState {
    provider: Arc<dyn MarketDataProvider>,
    symbols: Vec<String>,
}

pub fn api_router(provider: Arc<dyn MarketDataProvider>, symbols: Vec<String>) -> Router {
    Router::new()
        .route("/market-data", get(market_data))
        .merge(health_router(service_name(AgentKind::Api)))
        .with_state(MarketState { provider, symbols })
}

async fn market_data(
    State(state): State<MarketState>,
    QueryParams(query): QueryParams<MarketQuery>,
) -> Result<Json<MarketData>> {
    let requested = query
        .symbols
        .as_deref()
        .map(crate::config::parse_symbols)
        .filter(|s| !s.is_empty())
        .unwrap_or(state.symbols);

    info!(provider = state.provider.name(), symbols = ?requested, "Market data request");
    let data = state.provider.fetch(&requested).await?;
    Ok(Json(data))
}

/// =============================
/// Scraping Agent (news)
/// =============================

pub fn scraping_router(source: Arc<dyn NewsSource>) -> Router {
    Router::new()
        .route("/news", get(get_news))
        .merge(health_router(service_name(AgentKind::Scraping)))
        .with_state(source)
}

async fn get_news(
    State(source): State<Arc<dyn NewsSource>>,
    QueryParams(query): QueryParams<NewsQuery>,
) -> Result<Json<Vec<NewsArticle>>> {
    let max = query.max_articles.unwrap_or(DEFAULT_MAX_ARTICLES);
    let articles = source.fetch(&query.query, max).await?;
    info!(source = source.name(), count = articles.len(), "News request");
    Ok(Json(articles))
}

/// =============================
/// Retriever Agent
/// =============================

#[derive(Clone)]
struct RetrieverState {
    retriever: Arc<Retriever>,
    snapshot_dir: PathBuf,
}

pub fn retriever_router(retriever: Arc<Retriever>, snapshot_dir: PathBuf) -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/documents", post(add_document))
        .route("/snapshot", post(save_snapshot))
        .merge(health_router(service_name(AgentKind::Retriever)))
        .with_state(RetrieverState {
            retriever,
            snapshot_dir,
        })
}

async fn search(
    State(state): State<RetrieverState>,
    JsonBody(req): JsonBody<SearchRequest>,
) -> Json<SearchResults> {
    Json(state.retriever.search(&req.query, req.top_k).await)
}

async fn add_document(
    State(state): State<RetrieverState>,
    JsonBody(req): JsonBody<DocumentRequest>,
) -> Result<(StatusCode, Json<Document>)> {
    let document = state.retriever.add_document(req.text, req.metadata).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn save_snapshot(State(state): State<RetrieverState>) -> Result<Json<serde_json::Value>> {
    state.retriever.save_snapshot(&state.snapshot_dir).await?;
    let documents = state.retriever.len().await;
    info!(documents, dir = %state.snapshot_dir.display(), "Snapshot saved");
    Ok(Json(json!({
        "status": "saved",
        "documents": documents,
        "path": state.snapshot_dir.display().to_string(),
    })))
}

/// =============================
/// Analysis Agent
/// =============================

pub fn analysis_router() -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .merge(health_router(service_name(AgentKind::Analysis)))
}

async fn analyze(JsonBody(market_data): JsonBody<MarketData>) -> Json<AnalysisResult> {
    Json(analysis::analyze(&market_data))
}

/// =============================
/// Language Agent
/// =============================

pub fn language_router(agent: Arc<LanguageAgent>) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .merge(health_router(service_name(AgentKind::Language)))
        .with_state(agent)
}

async fn generate(
    State(agent): State<Arc<LanguageAgent>>,
    JsonBody(req): JsonBody<GenerationRequest>,
) -> Json<GenerationResponse> {
    Json(
        agent
            .answer(&req.query, &req.context, req.market_data.as_ref())
            .await,
    )
}

/// =============================
/// Voice Agent
/// =============================

pub fn voice_router(engine: Arc<dyn VoiceEngine>) -> Router {
    Router::new()
        .route("/process", post(process_voice))
        .route("/synthesize", post(synthesize))
        .route("/voices", get(list_voices))
        .merge(health_router(service_name(AgentKind::Voice)))
        .with_state(engine)
}

async fn process_voice(
    State(engine): State<Arc<dyn VoiceEngine>>,
    JsonBody(req): JsonBody<VoiceProcessRequest>,
) -> Result<Json<VoiceProcessResponse>> {
    let audio = voice::decode_audio(&req.audio)?;
    let text = engine.speech_to_text(&audio).await?;
    Ok(Json(VoiceProcessResponse { text }))
}

async fn synthesize(
    State(engine): State<Arc<dyn VoiceEngine>>,
    JsonBody(req): JsonBody<SynthesizeRequest>,
) -> Result<Json<SynthesizeResponse>> {
    let audio = engine.text_to_speech(&req.text).await?;
    Ok(Json(SynthesizeResponse {
        audio: voice::encode_audio(&audio),
    }))
}

async fn list_voices(State(engine): State<Arc<dyn VoiceEngine>>) -> Result<Json<VoicesResponse>> {
    Ok(Json(VoicesResponse {
        voices: engine.available_voices().await?,
    }))
}

/// =============================
/// Server
/// =============================

/// Bind `host:port` and serve `router` with request tracing and permissive CORS
pub async fn serve(router: Router, service: &str, host: &str, port: u16) -> Result<()> {
    let app = router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    info!(service, "Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn run_agent(kind: AgentKind, services: &AgentServices, settings: &Settings) -> Result<()> {
    serve(
        services.router(kind),
        service_name(kind),
        &settings.host,
        settings.agent_port(kind),
    )
    .await
}
