//! Answer generation
//!
//! Builds a prompt from retrieved context and a market snapshot, then asks a
//! `LanguageModel` for an answer. `LanguageAgent::generate` never fails:
//! quota errors are retried with exponential backoff and everything else
//! degrades to a canned apology.

pub mod groq;

pub use groq::GroqClient;

use crate::config::LlmSettings;
use crate::error::AssistantError;
use crate::models::{GenerationResponse, MarketData, SearchResult};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const SYSTEM_PROMPT: &str = "You are a helpful financial analysis assistant.";

pub const GENERIC_APOLOGY: &str = "I apologize, but I encountered an error while processing your request. Please try again later.";

pub const FALLBACK_RESPONSES: [&str; 4] = [
    "I apologize, but I'm currently unable to access my full capabilities. Please try again later or rephrase your question.",
    "I'm experiencing some technical difficulties. Could you please try again in a few moments?",
    "I'm temporarily limited in my ability to process your request. Please try again later.",
    "I'm unable to provide a detailed response at the moment. Please try again in a few minutes.",
];

/// A chat model that turns a system prompt and a user prompt into text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Render a market snapshot as the "Market Summary" block of the prompt
pub fn format_market_data(market_data: &MarketData) -> String {
    let mut summary = String::from("Market Overview:\n");

    if !market_data.stocks.is_empty() {
        summary.push_str("\nStock Performance:\n");
        for stock in &market_data.stocks {
            summary.push_str(&format!(
                "- {}: ${:.2} ({:+.2}%)\n",
                stock.symbol, stock.price, stock.change_percent
            ));
        }
    }

    let metrics = &market_data.metrics;
    if !market_data.stocks.is_empty() || *metrics != Default::default() {
        summary.push_str("\nMarket Metrics:\n");
        summary.push_str(&format!(
            "- Total Value: ${}B\n",
            group_thousands(&format!("{:.2}", metrics.total_value))
        ));
        summary.push_str(&format!("- Average Change: {:+.2}%\n", metrics.avg_change));
        summary.push_str(&format!(
            "- Total Volume: {}\n",
            group_thousands(&metrics.total_volume.to_string())
        ));
    }

    summary
}

/// Insert `,` separators into the integer part of a formatted number
fn group_thousands(formatted: &str) -> String {
    let (sign, rest) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

pub fn construct_prompt(query: &str, context: &str, market_summary: &str) -> String {
    format!(
        "You are a financial analysis assistant. Use the following information to answer the user's question:\n\
         \n\
         Market Summary:\n\
         {market_summary}\n\
         \n\
         Relevant Context:\n\
         {context}\n\
         \n\
         User Question: {query}\n\
         \n\
         Please provide a clear and concise response based on the available information. If you're not sure about something, say so.\n"
    )
}

/// Heuristic confidence in `[0.5, 1.0]`
pub fn calculate_confidence(response: &str, results: &[SearchResult]) -> f32 {
    let mut confidence: f32 = 0.5;
    if response.chars().count() > 100 {
        confidence += 0.2;
    }
    if !results.is_empty() {
        confidence += 0.3;
    }
    confidence.min(1.0)
}

pub struct LanguageAgent {
    model: Arc<dyn LanguageModel>,
    max_retries: u32,
    backoff_base: Duration,
}

impl LanguageAgent {
    pub fn new(model: Arc<dyn LanguageModel>, max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            model,
            max_retries,
            backoff_base,
        }
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        if settings.api_key.is_empty() {
            warn!("GROQ_API_KEY not set, generation will return fallback responses");
        }
        let client = GroqClient::new(settings)?;
        info!(model = %settings.model, "Language model configured");
        Ok(Self::new(
            Arc::new(client),
            settings.max_retries,
            settings.backoff_base,
        ))
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Ask the model, retrying quota errors. Always yields text.
    pub async fn generate(&self, prompt: &str) -> String {
        for attempt in 0..self.max_retries {
            match self.model.complete(SYSTEM_PROMPT, prompt).await {
                Ok(text) => return text,
                Err(AssistantError::QuotaExceeded(msg)) => {
                    error!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        "Language model quota exceeded: {}",
                        msg
                    );
                    if attempt + 1 == self.max_retries {
                        return FALLBACK_RESPONSES[attempt as usize % FALLBACK_RESPONSES.len()]
                            .to_string();
                    }
                    tokio::time::sleep(self.backoff_base * 2u32.pow(attempt)).await;
                }
                Err(e) => {
                    error!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        "Language model call failed: {}",
                        e
                    );
                    return GENERIC_APOLOGY.to_string();
                }
            }
        }

        FALLBACK_RESPONSES[FALLBACK_RESPONSES.len() - 1].to_string()
    }

    /// Full answer for a query: prompt, generation, confidence and sources
    pub async fn answer(
        &self,
        query: &str,
        context: &[SearchResult],
        market_data: Option<&MarketData>,
    ) -> GenerationResponse {
        let context_text = context
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let market_summary = market_data.map(format_market_data).unwrap_or_default();

        let prompt = construct_prompt(query, &context_text, &market_summary);
        let response = self.generate(&prompt).await;
        let confidence = calculate_confidence(&response, context);

        info!(
            context_docs = context.len(),
            confidence = confidence,
            "Generated answer"
        );

        GenerationResponse {
            response,
            confidence,
            sources: context.iter().map(SearchResult::source).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, StockQuote};
    use crate::test_support::ScriptedModel;

    fn agent(model: Arc<ScriptedModel>, retries: u32) -> LanguageAgent {
        LanguageAgent::new(model, retries, Duration::from_millis(1))
    }

    fn quota() -> Result<String> {
        Err(AssistantError::QuotaExceeded("429".into()))
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("3250.00"), "3,250.00");
        assert_eq!(group_thousands("2250000"), "2,250,000");
        assert_eq!(group_thousands("999"), "999");
        assert_eq!(group_thousands("-1234567.5"), "-1,234,567.5");
        assert_eq!(group_thousands("0"), "0");
    }

    #[test]
    fn test_format_market_data() {
        let data = MarketData::new(vec![
            StockQuote {
                symbol: "AAPL".into(),
                price: 150.0,
                change: 2.5,
                change_percent: 2.5,
                volume: 1_000_000,
            },
            StockQuote {
                symbol: "MSFT".into(),
                price: 3100.0,
                change: -1.0,
                change_percent: -1.5,
                volume: 1_250_000,
            },
        ]);

        let text = format_market_data(&data);
        assert!(text.starts_with("Market Overview:\n"));
        assert!(text.contains("- AAPL: $150.00 (+2.50%)\n"));
        assert!(text.contains("- MSFT: $3100.00 (-1.50%)\n"));
        assert!(text.contains("- Total Value: $3,250.00B\n"));
        assert!(text.contains("- Average Change: +0.50%\n"));
        assert!(text.contains("- Total Volume: 2,250,000\n"));
    }

    #[test]
    fn test_format_empty_market_data() {
        assert_eq!(format_market_data(&MarketData::empty()), "Market Overview:\n");
    }

    #[test]
    fn test_construct_prompt() {
        let prompt = construct_prompt("Is AAPL up?", "Apple rallied.", "Market Overview:\n");
        assert!(prompt.starts_with("You are a financial analysis assistant."));
        assert!(prompt.contains("Market Summary:\nMarket Overview:\n\n\nRelevant Context:\nApple rallied.\n"));
        assert!(prompt.contains("User Question: Is AAPL up?\n"));
        assert!(prompt.ends_with("say so.\n"));
    }

    #[test]
    fn test_calculate_confidence() {
        let result = SearchResult {
            text: "doc".into(),
            metadata: Metadata::new(),
        };
        assert_eq!(calculate_confidence("short", &[]), 0.5);
        assert_eq!(calculate_confidence(&"x".repeat(101), &[]), 0.7);
        assert_eq!(calculate_confidence("short", &[result.clone()]), 0.8);
        assert_eq!(calculate_confidence(&"x".repeat(101), &[result]), 1.0);
        assert_eq!(calculate_confidence(&"x".repeat(100), &[]), 0.5);
    }

    #[tokio::test]
    async fn test_generate_success() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("Markets are up.".into())]));
        let agent = agent(model.clone(), 3);
        assert_eq!(agent.generate("prompt").await, "Markets are up.");
        assert_eq!(model.calls(), 1);
        assert_eq!(model.last_system().as_deref(), Some(SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_generate_retries_quota_then_succeeds() {
        let model = Arc::new(ScriptedModel::new(vec![quota(), Ok("Recovered.".into())]));
        let agent = agent(model.clone(), 3);
        assert_eq!(agent.generate("prompt").await, "Recovered.");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_generate_quota_exhausted_returns_fallback() {
        let model = Arc::new(ScriptedModel::new(vec![quota(), quota(), quota()]));
        let agent = agent(model.clone(), 3);
        assert_eq!(agent.generate("prompt").await, FALLBACK_RESPONSES[2]);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_generate_other_error_is_immediate_apology() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(AssistantError::LlmError("bad key".into())),
            Ok("never reached".into()),
        ]));
        let agent = agent(model.clone(), 3);
        assert_eq!(agent.generate("prompt").await, GENERIC_APOLOGY);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_generate_without_attempts() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let agent = agent(model.clone(), 0);
        assert_eq!(agent.generate("prompt").await, FALLBACK_RESPONSES[3]);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_answer_collects_sources() {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), serde_json::json!("Reuters"));
        let context = vec![
            SearchResult {
                text: "Fed holds rates.".into(),
                metadata,
            },
            SearchResult {
                text: "Oil slips.".into(),
                metadata: Metadata::new(),
            },
        ];

        let model = Arc::new(ScriptedModel::new(vec![Ok("Rates are unchanged.".into())]));
        let agent = agent(model.clone(), 3);
        let answer = agent
            .answer("What did the Fed do?", &context, Some(&MarketData::empty()))
            .await;

        assert_eq!(answer.response, "Rates are unchanged.");
        assert_eq!(answer.sources, vec!["Reuters", "Unknown"]);
        assert_eq!(answer.confidence, 0.8);

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("Relevant Context:\nFed holds rates.\nOil slips.\n"));
        assert!(prompt.contains("Market Summary:\nMarket Overview:\n"));
    }
}
