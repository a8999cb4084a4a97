//! Financial news sources
//!
//! Headline scraping is best-effort: `FallbackNewsSource` always answers,
//! degrading to the canned feed when the live source fails or finds nothing.

use crate::config::Settings;
use crate::error::AssistantError;
use crate::models::NewsArticle;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_MAX_ARTICLES: usize = 5;
const YAHOO_BASE: &str = "https://finance.yahoo.com";
const ARTICLES_PER_SYMBOL: usize = 5;

#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, query: &str, max_articles: usize) -> Result<Vec<NewsArticle>>;
}

/// Canned headlines
pub struct StaticNewsFeed;

impl StaticNewsFeed {
    fn articles() -> Vec<NewsArticle> {
        vec![
            NewsArticle {
                title: "Tech Stocks Show Strong Growth".into(),
                source: "Financial Times".into(),
                url: "https://example.com/article1".into(),
                summary: "Technology stocks continue to show strong performance in the market."
                    .into(),
                published_at: Some("2024-03-15".into()),
            },
            NewsArticle {
                title: "Federal Reserve Maintains Interest Rates".into(),
                source: "Wall Street Journal".into(),
                url: "https://example.com/article2".into(),
                summary: "The Federal Reserve has decided to keep interest rates unchanged.".into(),
                published_at: Some("2024-03-14".into()),
            },
            NewsArticle {
                title: "Global Markets Face Volatility".into(),
                source: "Bloomberg".into(),
                url: "https://example.com/article3".into(),
                summary: "Global markets are experiencing increased volatility due to geopolitical tensions."
                    .into(),
                published_at: Some("2024-03-13".into()),
            },
        ]
    }
}

#[async_trait]
impl NewsSource for StaticNewsFeed {
    fn name(&self) -> &'static str {
        "static"
    }

    /// A query keeps articles sharing a word with it; no match returns the whole feed
    async fn fetch(&self, query: &str, max_articles: usize) -> Result<Vec<NewsArticle>> {
        let all = Self::articles();
        let words: HashSet<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut selected: Vec<NewsArticle> = if words.is_empty() {
            all.clone()
        } else {
            all.iter()
                .filter(|a| {
                    let text = format!("{} {}", a.title, a.summary).to_lowercase();
                    text.split_whitespace().any(|w| words.contains(w))
                })
                .cloned()
                .collect()
        };
        if selected.is_empty() {
            selected = all;
        }

        selected.truncate(max_articles);
        Ok(selected)
    }
}

/// Headline scraper for Yahoo Finance symbol news pages
pub struct YahooNewsScraper {
    client: Client,
    base_url: String,
    symbols: Vec<String>,
}

impl YahooNewsScraper {
    pub fn new(symbols: Vec<String>) -> Result<Self> {
        Self::with_base_url(symbols, YAHOO_BASE.to_string())
    }

    pub fn with_base_url(symbols: Vec<String>, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; finance-assistant)")
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            symbols,
        })
    }

    async fn fetch_symbol(&self, symbol: &str) -> Result<Vec<NewsArticle>> {
        let url = format!("{}/quote/{}/news", self.base_url, symbol);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AssistantError::NewsError(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        let html = response.text().await?;
        parse_headlines(&html, &self.base_url, ARTICLES_PER_SYMBOL)
    }
}

#[async_trait]
impl NewsSource for YahooNewsScraper {
    fn name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn fetch(&self, query: &str, max_articles: usize) -> Result<Vec<NewsArticle>> {
        // a query that names a ticker narrows the scrape to it
        let query_upper = query.to_uppercase();
        let targeted: Vec<&String> = self
            .symbols
            .iter()
            .filter(|s| query_upper.split_whitespace().any(|w| w == s.as_str()))
            .collect();
        let symbols: Vec<&String> = if targeted.is_empty() {
            self.symbols.iter().collect()
        } else {
            targeted
        };

        let mut articles = Vec::new();
        for symbol in symbols {
            match self.fetch_symbol(symbol).await {
                Ok(found) => articles.extend(found),
                Err(e) => warn!(symbol = %symbol, "Error scraping news: {}", e),
            }
            if articles.len() >= max_articles {
                break;
            }
        }

        articles.truncate(max_articles);
        Ok(articles)
    }
}

/// Extract headline links from a quote news page
pub fn parse_headlines(html: &str, base_url: &str, limit: usize) -> Result<Vec<NewsArticle>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("div.js-content-viewer a, h3 a")
        .map_err(|e| AssistantError::NewsError(format!("selector: {}", e)))?;

    let mut seen = HashSet::new();
    let mut articles = Vec::new();

    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let title = link.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", base_url, href)
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        articles.push(NewsArticle {
            title,
            source: "Yahoo Finance".to_string(),
            url,
            summary: String::new(),
            published_at: None,
        });
        if articles.len() >= limit {
            break;
        }
    }

    Ok(articles)
}

/// Live source with the canned feed behind it
pub struct FallbackNewsSource {
    primary: Arc<dyn NewsSource>,
    fallback: StaticNewsFeed,
}

impl FallbackNewsSource {
    pub fn new(primary: Arc<dyn NewsSource>) -> Self {
        Self {
            primary,
            fallback: StaticNewsFeed,
        }
    }
}

#[async_trait]
impl NewsSource for FallbackNewsSource {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn fetch(&self, query: &str, max_articles: usize) -> Result<Vec<NewsArticle>> {
        match self.primary.fetch(query, max_articles).await {
            Ok(articles) if !articles.is_empty() => Ok(articles),
            Ok(_) => {
                warn!(source = self.primary.name(), "No articles found, serving static feed");
                self.fallback.fetch(query, max_articles).await
            }
            Err(e) => {
                warn!(source = self.primary.name(), "News source failed, serving static feed: {}", e);
                self.fallback.fetch(query, max_articles).await
            }
        }
    }
}

pub fn source_from_settings(settings: &Settings) -> Arc<dyn NewsSource> {
    if settings.news_scraping {
        match YahooNewsScraper::new(settings.symbols.clone()) {
            Ok(scraper) => {
                info!("News source: yahoo_finance with static fallback");
                return Arc::new(FallbackNewsSource::new(Arc::new(scraper)));
            }
            Err(e) => warn!("Failed to initialise news scraper: {}", e),
        }
    }
    info!("News source: static");
    Arc::new(StaticNewsFeed)
}
