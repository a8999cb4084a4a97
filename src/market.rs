//! Market quote providers
//!
//! `AlphaVantageProvider` calls the GLOBAL_QUOTE endpoint once per symbol.
//! `StaticMarketProvider` serves canned quotes when no API key is configured.

use crate::config::Settings;
use crate::error::AssistantError;
use crate::models::{MarketData, StockQuote};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// Trait for anything that can produce a market snapshot
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, symbols: &[String]) -> Result<MarketData>;
}

pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, ALPHA_VANTAGE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AssistantError::ConfigError(
                "ALPHA_VANTAGE_API_KEY not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<StockQuote>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| {
                AssistantError::MarketDataError(format!("quote request for {} failed: {}", symbol, e))
            })?;

        let body: Value = response.json().await?;
        parse_global_quote(symbol, &body)
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn name(&self) -> &'static str {
        "alpha_vantage"
    }

    async fn fetch(&self, symbols: &[String]) -> Result<MarketData> {
        let mut stocks = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            match self.fetch_quote(symbol).await? {
                Some(quote) => stocks.push(quote),
                None => warn!(symbol = %symbol, "No quote returned, skipping symbol"),
            }
        }

        info!(requested = symbols.len(), received = stocks.len(), "Fetched market data");
        Ok(MarketData::new(stocks))
    }
}

/// Parse a GLOBAL_QUOTE body. An empty or missing quote (unknown symbol,
/// throttling note) is `Ok(None)`.
pub fn parse_global_quote(symbol: &str, body: &Value) -> Result<Option<StockQuote>> {
    let quote = match body.get("Global Quote").and_then(Value::as_object) {
        Some(q) if !q.is_empty() => q,
        _ => {
            if let Some(note) = body.get("Note").or_else(|| body.get("Information")) {
                warn!(symbol = %symbol, "Alpha Vantage note: {}", note);
            }
            return Ok(None);
        }
    };

    let field = |key: &str| quote.get(key).and_then(Value::as_str).unwrap_or("0").trim();

    let number = |key: &str| -> Result<f64> {
        let raw = field(key).trim_end_matches('%');
        raw.parse::<f64>().map_err(|e| {
            AssistantError::MarketDataError(format!("{} field '{}' = '{}': {}", symbol, key, raw, e))
        })
    };

    let volume = field("06. volume").parse::<u64>().map_err(|e| {
        AssistantError::MarketDataError(format!("{} volume: {}", symbol, e))
    })?;

    Ok(Some(StockQuote {
        symbol: quote
            .get("01. symbol")
            .and_then(Value::as_str)
            .unwrap_or(symbol)
            .to_string(),
        price: number("05. price")?,
        change: number("09. change")?,
        change_percent: number("10. change percent")?,
        volume,
    }))
}

/// Canned quotes used when no market API is configured
pub struct StaticMarketProvider;

impl StaticMarketProvider {
    fn quotes() -> Vec<StockQuote> {
        [
            ("AAPL", 150.0, 2.5, 1_000_000),
            ("GOOGL", 2800.0, 1.8, 500_000),
            ("MSFT", 300.0, 3.2, 750_000),
        ]
        .into_iter()
        .map(|(symbol, price, change, volume)| StockQuote {
            symbol: symbol.to_string(),
            price,
            change,
            change_percent: change,
            volume,
        })
        .collect()
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    /// Requested symbols filter the canned set; an unmatched request returns all of it
    async fn fetch(&self, symbols: &[String]) -> Result<MarketData> {
        let all = Self::quotes();
        let selected: Vec<StockQuote> = all
            .iter()
            .filter(|q| symbols.iter().any(|s| s.eq_ignore_ascii_case(&q.symbol)))
            .cloned()
            .collect();

        Ok(MarketData::new(if selected.is_empty() { all } else { selected }))
    }
}

/// Alpha Vantage when a key is configured, canned data otherwise
pub fn provider_from_settings(settings: &Settings) -> Arc<dyn MarketDataProvider> {
    match &settings.alpha_vantage_api_key {
        Some(key) => match AlphaVantageProvider::new(key.clone()) {
            Ok(provider) => {
                info!("Market data provider: alpha_vantage");
                return Arc::new(provider);
            }
            Err(e) => warn!("Failed to initialise Alpha Vantage provider: {}", e),
        },
        None => warn!("ALPHA_VANTAGE_API_KEY not set, serving static market data"),
    }

    Arc::new(StaticMarketProvider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_router;
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn av_body(symbol: &str, price: &str, change: &str, pct: &str, volume: &str) -> Value {
        json!({
            "Global Quote": {
                "01. symbol": symbol,
                "05. price": price,
                "06. volume": volume,
                "09. change": change,
                "10. change percent": pct,
            }
        })
    }

    #[test]
    fn test_parse_global_quote() {
        let body = av_body("IBM", "182.5200", "-1.2300", "-0.6694%", "3021456");
        let quote = parse_global_quote("IBM", &body).unwrap().unwrap();
        assert_eq!(quote.symbol, "IBM");
        assert_eq!(quote.price, 182.52);
        assert_eq!(quote.change, -1.23);
        assert_eq!(quote.change_percent, -0.6694);
        assert_eq!(quote.volume, 3_021_456);
    }

    #[test]
    fn test_parse_empty_quote() {
        assert!(parse_global_quote("XYZ", &json!({"Global Quote": {}})).unwrap().is_none());
        assert!(parse_global_quote("XYZ", &json!({"Note": "API call frequency"}))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_malformed_number() {
        let body = av_body("IBM", "n/a", "0", "0%", "1");
        tokio_test::assert_err!(parse_global_quote("IBM", &body));
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(AlphaVantageProvider::new("  ".into()).is_err());
    }

    #[tokio::test]
    async fn test_static_provider_filters() {
        let provider = StaticMarketProvider;
        let data = provider.fetch(&["msft".to_string()]).await.unwrap();
        assert_eq!(data.stocks.len(), 1);
        assert_eq!(data.metrics.total_value, 300.0);

        let all = provider.fetch(&["TSLA".to_string()]).await.unwrap();
        assert_eq!(all.stocks.len(), 3);
    }

    #[tokio::test]
    async fn test_alpha_vantage_against_local_server() {
        let router = Router::new().route(
            "/query",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("function").map(String::as_str), Some("GLOBAL_QUOTE"));
                assert_eq!(params.get("apikey").map(String::as_str), Some("demo"));
                let body = match params.get("symbol").map(String::as_str) {
                    Some("AAPL") => av_body("AAPL", "190.00", "2.00", "1.0638%", "1000"),
                    Some("MSFT") => av_body("MSFT", "410.00", "-4.00", "-0.9662%", "3000"),
                    _ => json!({"Global Quote": {}}),
                };
                Json(body)
            }),
        );
        let base = spawn_router(router).await;

        let provider =
            AlphaVantageProvider::with_base_url("demo".into(), format!("{}/query", base)).unwrap();
        let symbols: Vec<String> = ["AAPL", "MSFT", "NOPE"].iter().map(|s| s.to_string()).collect();
        let data = provider.fetch(&symbols).await.unwrap();

        assert_eq!(data.stocks.len(), 2);
        assert_eq!(data.metrics.total_value, 600.0);
        assert_eq!(data.metrics.total_volume, 4000);
        assert!((data.metrics.avg_change - 0.0488).abs() < 1e-9);
    }
}
