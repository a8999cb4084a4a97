//! Environment-driven configuration
//!
//! Values come from the process environment (optionally seeded from `.env`
//! via `dotenv`). Every setting has a default so a bare checkout runs with
//! canned market data and keyword-only retrieval.

use crate::error::AssistantError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SYMBOLS: &[&str] = &["AAPL", "GOOGL", "MSFT", "AMZN"];
pub const DEFAULT_GROQ_MODEL: &str = "qwen-qwq-32b";
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// The six remote agents the orchestrator fans out to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Api,
    Scraping,
    Retriever,
    Analysis,
    Language,
    Voice,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Api,
        AgentKind::Scraping,
        AgentKind::Retriever,
        AgentKind::Analysis,
        AgentKind::Language,
        AgentKind::Voice,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Api => "api",
            AgentKind::Scraping => "scraping",
            AgentKind::Retriever => "retriever",
            AgentKind::Analysis => "analysis",
            AgentKind::Language => "language",
            AgentKind::Voice => "voice",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            AgentKind::Api => 8001,
            AgentKind::Scraping => 8002,
            AgentKind::Retriever => 8003,
            AgentKind::Analysis => 8004,
            AgentKind::Language => 8005,
            AgentKind::Voice => 8006,
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            AgentKind::Api => "API_AGENT",
            AgentKind::Scraping => "SCRAPING_AGENT",
            AgentKind::Retriever => "RETRIEVER_AGENT",
            AgentKind::Analysis => "ANALYSIS_AGENT",
            AgentKind::Language => "LANGUAGE_AGENT",
            AgentKind::Voice => "VOICE_AGENT",
        }
    }
}

/// Base URLs of the remote agents
#[derive(Debug, Clone)]
pub struct AgentUrls {
    pub api: String,
    pub scraping: String,
    pub retriever: String,
    pub analysis: String,
    pub language: String,
    pub voice: String,
}

impl AgentUrls {
    pub fn get(&self, kind: AgentKind) -> &str {
        match kind {
            AgentKind::Api => &self.api,
            AgentKind::Scraping => &self.scraping,
            AgentKind::Retriever => &self.retriever,
            AgentKind::Analysis => &self.analysis,
            AgentKind::Language => &self.language,
            AgentKind::Voice => &self.voice,
        }
    }

    /// Point every agent at `http://{host}:{default port}`
    pub fn localhost() -> Self {
        let url = |kind: AgentKind| format!("http://localhost:{}", kind.default_port());
        Self {
            api: url(AgentKind::Api),
            scraping: url(AgentKind::Scraping),
            retriever: url(AgentKind::Retriever),
            analysis: url(AgentKind::Analysis),
            language: url(AgentKind::Language),
            voice: url(AgentKind::Voice),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    /// First backoff delay; doubles on every quota retry
    pub backoff_base: Duration,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub agent_ports: Vec<(AgentKind, u16)>,
    pub agent_urls: AgentUrls,
    pub agent_timeout: Duration,
    pub alpha_vantage_api_key: Option<String>,
    pub symbols: Vec<String>,
    pub news_scraping: bool,
    pub llm: LlmSettings,
    pub embedding: Option<EmbeddingSettings>,
    pub docs_path: PathBuf,
    pub vector_store_dir: PathBuf,
}

impl Settings {
    /// Load `.env` (if present) and read settings from the environment
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let port = parse_var("PORT")?
            .or(parse_var("API_PORT")?)
            .unwrap_or(8000);

        let agent_ports = AgentKind::ALL
            .iter()
            .map(|kind| {
                let key = format!("{}_PORT", kind.env_prefix());
                parse_var(&key).map(|p| (*kind, p.unwrap_or(kind.default_port())))
            })
            .collect::<Result<Vec<_>>>()?;

        let defaults = AgentUrls::localhost();
        let url = |kind: AgentKind| {
            env::var(format!("{}_URL", kind.env_prefix()))
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| defaults.get(kind).to_string())
        };
        let agent_urls = AgentUrls {
            api: url(AgentKind::Api),
            scraping: url(AgentKind::Scraping),
            retriever: url(AgentKind::Retriever),
            analysis: url(AgentKind::Analysis),
            language: url(AgentKind::Language),
            voice: url(AgentKind::Voice),
        };

        let symbols = non_empty("MARKET_SYMBOLS")
            .map(|raw| parse_symbols(&raw))
            .unwrap_or_else(|| DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect());

        let embedding = non_empty("EMBEDDING_API_URL").map(|api_url| EmbeddingSettings {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: non_empty("EMBEDDING_API_KEY"),
            model: non_empty("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        });

        let llm = LlmSettings {
            api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            model: non_empty("GROQ_MODEL").unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
            base_url: non_empty("GROQ_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: 0.7,
            max_tokens: 500,
            max_retries: parse_var("LLM_MAX_RETRIES")?.unwrap_or(3),
            backoff_base: Duration::from_secs(1),
        };

        Ok(Self {
            host: non_empty("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            agent_ports,
            agent_urls,
            agent_timeout: Duration::from_secs(parse_var("AGENT_TIMEOUT_SECS")?.unwrap_or(30)),
            alpha_vantage_api_key: non_empty("ALPHA_VANTAGE_API_KEY"),
            symbols,
            news_scraping: parse_bool(non_empty("NEWS_SCRAPING").as_deref()),
            llm,
            embedding,
            docs_path: non_empty("RETRIEVER_DOCS_PATH")
                .unwrap_or_else(|| "data/fallback_docs.json".to_string())
                .into(),
            vector_store_dir: non_empty("VECTOR_STORE_DIR")
                .unwrap_or_else(|| "vector_store".to_string())
                .into(),
        })
    }

    pub fn agent_port(&self, kind: AgentKind) -> u16 {
        self.agent_ports
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, p)| *p)
            .unwrap_or(kind.default_port())
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a set, non-blank variable; `None` when unset
fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match non_empty(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AssistantError::ConfigError(format!("{}={}: {}", key, raw, e))),
        None => Ok(None),
    }
}

fn parse_bool(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}

/// Split a comma separated symbol list, upper-casing and dropping blanks
pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbols() {
        assert_eq!(parse_symbols(" aapl, MSFT,,googl "), vec!["AAPL", "MSFT", "GOOGL"]);
        assert!(parse_symbols(" , ").is_empty());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(Some("TRUE")));
        assert!(parse_bool(Some("1")));
        assert!(!parse_bool(Some("no")));
        assert!(!parse_bool(None));
    }

    #[test]
    fn test_localhost_urls() {
        let urls = AgentUrls::localhost();
        assert_eq!(urls.get(AgentKind::Retriever), "http://localhost:8003");
        assert_eq!(urls.get(AgentKind::Voice), "http://localhost:8006");
    }

    #[test]
    fn test_agent_names_are_unique() {
        let mut names: Vec<_> = AgentKind::ALL.iter().map(|k| k.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), AgentKind::ALL.len());
    }

    #[test]
    fn test_parse_var() {
        env::set_var("FA_TEST_PARSE_VAR_PORT", " 8123 ");
        env::set_var("FA_TEST_PARSE_VAR_BAD", "eighty");
        env::set_var("FA_TEST_PARSE_VAR_BLANK", "  ");

        assert_eq!(parse_var::<u16>("FA_TEST_PARSE_VAR_PORT").unwrap(), Some(8123));
        assert_eq!(parse_var::<u16>("FA_TEST_PARSE_VAR_BLANK").unwrap(), None);
        assert_eq!(parse_var::<u16>("FA_TEST_PARSE_VAR_UNSET").unwrap(), None);
        assert!(matches!(
            parse_var::<u16>("FA_TEST_PARSE_VAR_BAD"),
            Err(AssistantError::ConfigError(_))
        ));
    }
}
