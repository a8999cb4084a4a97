//! Shared helpers for unit tests: a local HTTP server for client tests and
//! a scripted language model.

use crate::config::{AgentUrls, LlmSettings, Settings, DEFAULT_SYMBOLS};
use crate::language::LanguageModel;
use crate::Result;
use async_trait::async_trait;
use axum::Router;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral localhost port and return its base URL
pub async fn spawn_router(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn test_llm_settings(base_url: &str) -> LlmSettings {
    LlmSettings {
        api_key: "test-key".to_string(),
        model: "test-model".to_string(),
        base_url: base_url.trim_end_matches('/').to_string(),
        temperature: 0.7,
        max_tokens: 500,
        max_retries: 3,
        backoff_base: Duration::from_millis(1),
    }
}

/// Offline settings whose data files live under `dir` (neither is created)
pub fn test_settings(dir: &Path) -> Settings {
    Settings {
        host: "127.0.0.1".to_string(),
        port: 0,
        agent_ports: Vec::new(),
        agent_urls: AgentUrls::localhost(),
        agent_timeout: Duration::from_secs(5),
        alpha_vantage_api_key: None,
        symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        news_scraping: false,
        llm: test_llm_settings("http://127.0.0.1:1"),
        embedding: None,
        docs_path: dir.join("fallback_docs.json"),
        vector_store_dir: dir.join("vector_store"),
    }
}

/// Replays queued results in order; an exhausted script answers "ok"
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String>>>,
    calls: AtomicUsize,
    last: Mutex<Option<(String, String)>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_system(&self) -> Option<String> {
        self.last.lock().unwrap().as_ref().map(|(s, _)| s.clone())
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last.lock().unwrap().as_ref().map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((system.to_string(), prompt.to_string()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}
