//! Core data models shared by every agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-form document metadata (`source`, `date`, ...)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

//
// ================= Market Data =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockQuote {
    pub symbol: String,
    pub price: f64,
    /// Absolute price change since previous close
    pub change: f64,
    pub change_percent: f64,
    #[serde(default)]
    pub volume: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketMetrics {
    pub total_value: f64,
    pub avg_change: f64,
    pub total_volume: u64,
}

impl MarketMetrics {
    /// Aggregate portfolio metrics; all zero for an empty quote list.
    pub fn from_quotes(quotes: &[StockQuote]) -> Self {
        if quotes.is_empty() {
            return Self::default();
        }

        Self {
            total_value: quotes.iter().map(|q| q.price).sum(),
            avg_change: quotes.iter().map(|q| q.change_percent).sum::<f64>()
                / quotes.len() as f64,
            total_volume: quotes.iter().map(|q| q.volume).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketData {
    #[serde(default)]
    pub stocks: Vec<StockQuote>,
    #[serde(default)]
    pub metrics: MarketMetrics,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl MarketData {
    pub fn new(stocks: Vec<StockQuote>) -> Self {
        let metrics = MarketMetrics::from_quotes(&stocks);
        Self {
            stocks,
            metrics,
            timestamp: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }
}

//
// ================= News =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsArticle {
    pub title: String,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub summary: String,
    /// Publication date as reported by the source (free-form)
    #[serde(default)]
    pub published_at: Option<String>,
}

//
// ================= Retrieval =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl SearchResult {
    /// `metadata.source` when present, `"Unknown"` otherwise
    pub fn source(&self) -> String {
        self.metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Semantic,
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResults {
    pub results: Vec<SearchResult>,
    /// Euclidean distance (semantic) or word overlap (keyword), aligned with `results`
    pub scores: Vec<f32>,
    pub mode: SearchMode,
}

impl SearchResults {
    pub fn empty(mode: SearchMode) -> Self {
        Self {
            results: Vec::new(),
            scores: Vec::new(),
            mode,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Concatenate result texts into a prompt context block
    pub fn context(&self, separator: &str) -> String {
        self.results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

//
// ================= Analysis =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Sentiment {
    Bullish,
    Bearish,
    Cautious,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub summary: String,
    pub volatility: f64,
    pub beta: f64,
    pub insights: Vec<String>,
    pub risk_level: RiskLevel,
    pub sentiment: Sentiment,
    pub metrics: MarketMetrics,
}

//
// ================= Generation =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub query: String,
    #[serde(default)]
    pub context: Vec<SearchResult>,
    #[serde(default)]
    pub market_data: Option<MarketData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResponse {
    pub response: String,
    pub confidence: f32,
    pub sources: Vec<String>,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
            RiskLevel::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sentiment::Bullish => "Bullish",
            Sentiment::Bearish => "Bearish",
            Sentiment::Cautious => "Cautious",
            Sentiment::Neutral => "Neutral",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(symbol: &str, price: f64, change_percent: f64, volume: u64) -> StockQuote {
        StockQuote {
            symbol: symbol.to_string(),
            price,
            change: change_percent,
            change_percent,
            volume,
        }
    }

    #[test]
    fn test_metrics_from_quotes() {
        let quotes = vec![
            quote("AAPL", 150.0, 2.0, 100),
            quote("MSFT", 300.0, 4.0, 300),
        ];
        let metrics = MarketMetrics::from_quotes(&quotes);
        assert_eq!(metrics.total_value, 450.0);
        assert_eq!(metrics.avg_change, 3.0);
        assert_eq!(metrics.total_volume, 400);
    }

    #[test]
    fn test_metrics_empty() {
        assert_eq!(MarketMetrics::from_quotes(&[]), MarketMetrics::default());
        assert!(MarketData::empty().is_empty());
    }

    #[test]
    fn test_search_result_source() {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), serde_json::json!("Bloomberg"));
        let with_source = SearchResult {
            text: "rates".into(),
            metadata,
        };
        let without = SearchResult {
            text: "rates".into(),
            metadata: Metadata::new(),
        };
        assert_eq!(with_source.source(), "Bloomberg");
        assert_eq!(without.source(), "Unknown");
    }

    #[test]
    fn test_market_data_deserializes_with_defaults() {
        let data: MarketData = serde_json::from_str(r#"{"stocks": []}"#).unwrap();
        assert!(data.is_empty());
        assert_eq!(data.metrics.total_volume, 0);
    }

    #[test]
    fn test_risk_level_serialization() {
        let json = serde_json::to_string(&RiskLevel::Moderate).unwrap();
        assert_eq!(json, "\"Moderate\"");
        assert_eq!(Sentiment::Cautious.to_string(), "Cautious");
    }
}
