//! Orchestrator service
//!
//! Fans a request out to the remote agents and stitches their answers
//! together. Only the language agent is essential to `/chat`; every other
//! agent degrades to an empty contribution when it fails.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::agents::{
    SearchRequest, SynthesizeRequest, SynthesizeResponse, VoiceProcessRequest,
    VoiceProcessResponse, HTTP_DEFAULT_TOP_K,
};
use crate::config::{AgentKind, AgentUrls, Settings};
use crate::error::AssistantError;
use crate::extract::JsonBody;
use crate::models::{
    AnalysisResult, GenerationRequest, GenerationResponse, MarketData, MarketMetrics,
    NewsArticle, SearchResults,
};
use crate::Result;

pub const ANALYSIS_UNAVAILABLE: &str = "Market analysis is currently unavailable.";
const OVERVIEW_NEWS_LIMIT: usize = 5;

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub use_voice: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub confidence: f32,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarketOverview {
    pub summary: String,
    pub metrics: MarketMetrics,
    pub news: Vec<NewsArticle>,
    pub timestamp: DateTime<Utc>,
}

/// HTTP client for the six agents
pub struct AgentClient {
    client: Client,
    urls: AgentUrls,
}

impl AgentClient {
    pub fn new(urls: AgentUrls, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, urls })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.agent_urls.clone(), settings.agent_timeout)
    }

    fn url(&self, kind: AgentKind, path: &str) -> String {
        format!("{}{}", self.urls.get(kind), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, kind: AgentKind, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(kind, path))
            .send()
            .await
            .map_err(|e| AssistantError::unavailable(kind.name(), e))?;
        Self::decode(kind, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        kind: AgentKind,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url(kind, path))
            .json(body)
            .send()
            .await
            .map_err(|e| AssistantError::unavailable(kind.name(), e))?;
        Self::decode(kind, response).await
    }

    async fn decode<T: DeserializeOwned>(kind: AgentKind, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::unavailable(
                kind.name(),
                format!("returned {}: {}", status, body),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| AssistantError::unavailable(kind.name(), format!("bad response: {}", e)))
    }

    pub async fn market_data(&self) -> Result<MarketData> {
        self.get_json(AgentKind::Api, "/market-data").await
    }

    pub async fn analyze(&self, market_data: &MarketData) -> Result<AnalysisResult> {
        self.post_json(AgentKind::Analysis, "/analyze", market_data)
            .await
    }

    pub async fn news(&self) -> Result<Vec<NewsArticle>> {
        self.get_json(AgentKind::Scraping, "/news").await
    }

    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let request = SearchRequest {
            query: query.to_string(),
            top_k: HTTP_DEFAULT_TOP_K,
        };
        self.post_json(AgentKind::Retriever, "/search", &request)
            .await
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        self.post_json(AgentKind::Language, "/generate", request)
            .await
    }

    /// Base64 audio in, transcription out
    pub async fn transcribe(&self, audio: &str) -> Result<String> {
        let request = VoiceProcessRequest {
            audio: audio.to_string(),
        };
        let response: VoiceProcessResponse =
            self.post_json(AgentKind::Voice, "/process", &request).await?;
        Ok(response.text)
    }

    /// Text in, base64 audio out
    pub async fn synthesize(&self, text: &str) -> Result<String> {
        let request = SynthesizeRequest {
            text: text.to_string(),
        };
        let response: SynthesizeResponse =
            self.post_json(AgentKind::Voice, "/synthesize", &request).await?;
        Ok(response.audio)
    }
}

pub fn router(client: Arc<AgentClient>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/news", get(news))
        .route("/market/overview", get(market_overview))
        .route("/chat", post(chat))
        .with_state(client)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "orchestrator" }))
}

async fn news(State(client): State<Arc<AgentClient>>) -> Result<Json<Vec<NewsArticle>>> {
    Ok(Json(client.news().await?))
}

async fn market_overview(State(client): State<Arc<AgentClient>>) -> Json<MarketOverview> {
    let market_data = client.market_data().await.unwrap_or_else(|e| {
        warn!("Market data unavailable: {}", e);
        MarketData::empty()
    });

    let summary = match client.analyze(&market_data).await {
        Ok(analysis) => analysis.summary,
        Err(e) => {
            warn!("Analysis unavailable: {}", e);
            ANALYSIS_UNAVAILABLE.to_string()
        }
    };

    let mut news = client.news().await.unwrap_or_else(|e| {
        warn!("News unavailable: {}", e);
        Vec::new()
    });
    news.truncate(OVERVIEW_NEWS_LIMIT);

    Json(MarketOverview {
        summary,
        metrics: market_data.metrics,
        news,
        timestamp: Utc::now(),
    })
}

async fn chat(
    State(client): State<Arc<AgentClient>>,
    JsonBody(req): JsonBody<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let query = if req.use_voice {
        client.transcribe(&req.message).await?
    } else {
        req.message
    };
    if query.trim().is_empty() {
        return Err(AssistantError::InvalidInput(if req.use_voice {
            "could not transcribe audio".to_string()
        } else {
            "message is empty".to_string()
        }));
    }

    let context = match client.search(&query).await {
        Ok(results) => results.results,
        Err(e) => {
            warn!("Retriever unavailable, answering without context: {}", e);
            Vec::new()
        }
    };

    let market_data = client.market_data().await.unwrap_or_else(|e| {
        warn!("Market data unavailable, answering without it: {}", e);
        MarketData::empty()
    });

    let generation = client
        .generate(&GenerationRequest {
            query,
            context,
            market_data: Some(market_data),
        })
        .await?;

    let audio = if req.use_voice {
        match client.synthesize(&generation.response).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                warn!("Speech synthesis failed, returning text only: {}", e);
                None
            }
        }
    } else {
        None
    };

    info!(
        sources = generation.sources.len(),
        voice = req.use_voice,
        "Chat answered"
    );

    Ok(Json(ChatResponse {
        response: generation.response,
        confidence: generation.confidence,
        sources: generation.sources,
        audio,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{
        analysis_router, api_router, language_router, retriever_router, scraping_router,
        voice_router,
    };
    use crate::language::LanguageAgent;
    use crate::market::StaticMarketProvider;
    use crate::models::Metadata;
    use crate::news::StaticNewsFeed;
    use crate::retriever::{Document, Retriever};
    use crate::test_support::{spawn_router, ScriptedModel};
    use crate::voice::{self, DisabledVoiceEngine, VoiceEngine, VoiceInfo};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    const DEAD: &str = "http://127.0.0.1:1";

    /// Treats audio bytes as UTF-8 text and speaks text back as bytes
    struct EchoVoice {
        fail_synthesis: bool,
    }

    #[async_trait]
    impl VoiceEngine for EchoVoice {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn speech_to_text(&self, audio: &[u8]) -> Result<String> {
            Ok(String::from_utf8_lossy(audio).into_owned())
        }

        async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>> {
            if self.fail_synthesis {
                return Err(AssistantError::VoiceError("tts offline".into()));
            }
            Ok(text.as_bytes().to_vec())
        }

        async fn available_voices(&self) -> Result<Vec<VoiceInfo>> {
            Ok(Vec::new())
        }
    }

    struct Agents {
        urls: AgentUrls,
        model: Arc<ScriptedModel>,
    }

    async fn spawn_agents(voice_engine: Arc<dyn VoiceEngine>) -> Agents {
        let mut meta = Metadata::new();
        meta.insert("source".into(), json!("WSJ"));
        let retriever = Arc::new(Retriever::new(
            vec![Document::new(
                "The Federal Reserve kept interest rates unchanged".into(),
                meta,
            )],
            None,
        ));
        let model = Arc::new(ScriptedModel::new(vec![]));
        let language = Arc::new(LanguageAgent::new(
            model.clone(),
            3,
            Duration::from_millis(1),
        ));
        let dir = std::env::temp_dir();

        Agents {
            urls: AgentUrls {
                api: spawn_router(api_router(
                    Arc::new(StaticMarketProvider),
                    vec!["AAPL".into(), "MSFT".into()],
                ))
                .await,
                scraping: spawn_router(scraping_router(Arc::new(StaticNewsFeed))).await,
                retriever: spawn_router(retriever_router(retriever, dir)).await,
                analysis: spawn_router(analysis_router()).await,
                language: spawn_router(language_router(language)).await,
                voice: spawn_router(voice_router(voice_engine)).await,
            },
            model,
        }
    }

    fn orchestrator(urls: AgentUrls) -> Router {
        router(Arc::new(
            AgentClient::new(urls, Duration::from_secs(5)).unwrap(),
        ))
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn chat_req(body: Value) -> Request<Body> {
        Request::post("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(orchestrator(AgentUrls::localhost()), get_req("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "orchestrator");
    }

    #[tokio::test]
    async fn test_market_overview() {
        let agents = spawn_agents(Arc::new(DisabledVoiceEngine)).await;
        let (status, body) = call(orchestrator(agents.urls), get_req("/market/overview")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["summary"].as_str().unwrap().starts_with("Market sentiment"));
        assert_eq!(body["metrics"]["total_value"], 450.0);
        assert_eq!(body["news"].as_array().unwrap().len(), 3);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_market_overview_degrades() {
        let mut urls = spawn_agents(Arc::new(DisabledVoiceEngine)).await.urls;
        urls.api = DEAD.into();
        urls.analysis = DEAD.into();
        urls.scraping = DEAD.into();

        let (status, body) = call(orchestrator(urls), get_req("/market/overview")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], ANALYSIS_UNAVAILABLE);
        assert_eq!(body["metrics"]["total_value"], 0.0);
        assert_eq!(body["news"], json!([]));
    }

    #[tokio::test]
    async fn test_news_proxy_and_failure() {
        let agents = spawn_agents(Arc::new(DisabledVoiceEngine)).await;
        let (status, body) = call(orchestrator(agents.urls.clone()), get_req("/news")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);

        let mut urls = agents.urls;
        urls.scraping = DEAD.into();
        let (status, body) = call(orchestrator(urls), get_req("/news")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["detail"].as_str().unwrap().contains("scraping"));
    }

    #[tokio::test]
    async fn test_chat_text() {
        let agents = spawn_agents(Arc::new(DisabledVoiceEngine)).await;
        let model = agents.model.clone();
        let (status, body) = call(
            orchestrator(agents.urls),
            chat_req(json!({"message": "What happened to interest rates?"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "ok");
        assert_eq!(body["sources"], json!(["WSJ"]));
        assert!(body.get("audio").is_none());

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("Federal Reserve kept interest rates unchanged"));
        assert!(prompt.contains("- AAPL: $150.00 (+2.50%)"));
    }

    #[tokio::test]
    async fn test_chat_without_retriever_or_market() {
        let mut urls = spawn_agents(Arc::new(DisabledVoiceEngine)).await.urls;
        urls.retriever = DEAD.into();
        urls.api = DEAD.into();

        let (status, body) = call(orchestrator(urls), chat_req(json!({"message": "rates?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sources"], json!([]));
        assert_eq!(body["confidence"], 0.5);
    }

    #[tokio::test]
    async fn test_chat_language_failure_is_bad_gateway() {
        let mut urls = spawn_agents(Arc::new(DisabledVoiceEngine)).await.urls;
        urls.language = DEAD.into();

        let (status, body) = call(orchestrator(urls), chat_req(json!({"message": "rates?"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["detail"].as_str().unwrap().contains("language"));
    }

    #[tokio::test]
    async fn test_chat_voice_round_trip() {
        let agents = spawn_agents(Arc::new(EchoVoice {
            fail_synthesis: false,
        }))
        .await;
        let audio = voice::encode_audio(b"interest rates");

        let (status, body) = call(
            orchestrator(agents.urls),
            chat_req(json!({"message": audio, "use_voice": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["audio"], voice::encode_audio(b"ok"));
    }

    #[tokio::test]
    async fn test_chat_voice_synthesis_failure_is_text_only() {
        let agents = spawn_agents(Arc::new(EchoVoice {
            fail_synthesis: true,
        }))
        .await;
        let audio = voice::encode_audio(b"interest rates");

        let (status, body) = call(
            orchestrator(agents.urls),
            chat_req(json!({"message": audio, "use_voice": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "ok");
        assert!(body.get("audio").is_none());
    }

    #[tokio::test]
    async fn test_chat_empty_transcription() {
        let agents = spawn_agents(Arc::new(DisabledVoiceEngine)).await;
        let (status, body) = call(
            orchestrator(agents.urls),
            chat_req(json!({"message": "AAEC", "use_voice": true})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("transcribe"));
    }

    #[tokio::test]
    async fn test_chat_malformed_body_is_detail() {
        let (status, body) = call(
            orchestrator(AgentUrls::localhost()),
            chat_req(json!({"use_voice": false})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("message"));
    }
}
