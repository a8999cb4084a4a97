//! Portfolio analysis
//!
//! Deterministic metrics over a market snapshot. No LLM involvement.

use crate::models::{AnalysisResult, MarketData, MarketMetrics, RiskLevel, Sentiment, StockQuote};

pub const NO_DATA_INSIGHT: &str = "No market data available";

/// Population standard deviation of percentage changes
pub fn calculate_volatility(stocks: &[StockQuote]) -> f64 {
    if stocks.is_empty() {
        return 0.0;
    }
    let mean = calculate_beta(stocks);
    let variance = stocks
        .iter()
        .map(|s| (s.change_percent - mean).powi(2))
        .sum::<f64>()
        / stocks.len() as f64;
    variance.sqrt()
}

/// Simplified beta: mean percentage change of the basket
pub fn calculate_beta(stocks: &[StockQuote]) -> f64 {
    if stocks.is_empty() {
        return 0.0;
    }
    stocks.iter().map(|s| s.change_percent).sum::<f64>() / stocks.len() as f64
}

pub fn determine_risk_level(volatility: f64, beta: f64) -> RiskLevel {
    if volatility > 3.0 && beta > 1.5 {
        RiskLevel::High
    } else if volatility > 2.0 || beta > 1.2 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

pub fn determine_sentiment(weighted_change: f64, volatility: f64) -> Sentiment {
    if weighted_change > 2.0 && volatility < 2.0 {
        Sentiment::Bullish
    } else if weighted_change < -2.0 && volatility > 2.0 {
        Sentiment::Bearish
    } else if volatility > 2.0 {
        Sentiment::Cautious
    } else {
        Sentiment::Neutral
    }
}

pub fn generate_insights(
    stocks: &[StockQuote],
    weighted_change: f64,
    volatility: f64,
) -> Vec<String> {
    if stocks.is_empty() {
        return vec![NO_DATA_INSIGHT.to_string()];
    }

    let mut insights = Vec::with_capacity(4);

    let by_change = |a: &&StockQuote, b: &&StockQuote| {
        a.change_percent
            .partial_cmp(&b.change_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    };

    if let Some(top) = stocks.iter().max_by(by_change) {
        insights.push(format!(
            "{} is the strongest performer at {:+.2}%",
            top.symbol, top.change_percent
        ));
    }
    if stocks.len() > 1 {
        if let Some(bottom) = stocks.iter().min_by(by_change) {
            insights.push(format!(
                "{} is the weakest performer at {:+.2}%",
                bottom.symbol, bottom.change_percent
            ));
        }
    }

    insights.push(if weighted_change > 0.0 {
        format!("Portfolio is up {:+.2}% on average", weighted_change)
    } else if weighted_change < 0.0 {
        format!("Portfolio is down {:+.2}% on average", weighted_change)
    } else {
        "Portfolio is flat on average".to_string()
    });

    if volatility > 2.0 {
        insights.push(format!(
            "High dispersion between holdings (volatility {:.2})",
            volatility
        ));
    }

    insights
}

/// Full analysis of a market snapshot
pub fn analyze(market_data: &MarketData) -> AnalysisResult {
    if market_data.is_empty() {
        return AnalysisResult {
            summary: NO_DATA_INSIGHT.to_string(),
            volatility: 0.0,
            beta: 0.0,
            insights: vec![NO_DATA_INSIGHT.to_string()],
            risk_level: RiskLevel::Unknown,
            sentiment: Sentiment::Neutral,
            metrics: market_data.metrics.clone(),
        };
    }

    let stocks = &market_data.stocks;
    // posted snapshots may omit metrics entirely
    let metrics = if market_data.metrics == MarketMetrics::default() {
        MarketMetrics::from_quotes(stocks)
    } else {
        market_data.metrics.clone()
    };
    let volatility = calculate_volatility(stocks);
    let beta = calculate_beta(stocks);
    let weighted_change = metrics.avg_change;

    let risk_level = determine_risk_level(volatility, beta);
    let sentiment = determine_sentiment(weighted_change, volatility);

    let summary = format!(
        "Market sentiment is {} with {} risk: average change {:+.2}% across {} symbols, volatility {:.2}.",
        sentiment,
        risk_level.to_string().to_lowercase(),
        weighted_change,
        stocks.len(),
        volatility
    );

    AnalysisResult {
        summary,
        volatility,
        beta,
        insights: generate_insights(stocks, weighted_change, volatility),
        risk_level,
        sentiment,
        metrics,
    }
}
