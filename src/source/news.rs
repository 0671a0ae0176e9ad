use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::client::get_http_client;
use crate::config::Config;
use crate::constant::*;

use super::{DataSource, Measured};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Headline {
    pub headline: String,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub source: String,
    pub date: DateTime<Utc>,
}

impl Headline {
    pub fn date_str(&self) -> String {
        self.date.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewsData {
    /// Most recent first, across every feed.
    pub all_headlines: Vec<Headline>,
    pub source_headlines: BTreeMap<String, Vec<Headline>>,
}

impl Measured for NewsData {
    fn item_count(&self) -> usize {
        self.source_headlines.values().map(Vec::len).sum()
    }
}

impl NewsData {
    pub fn to_markdown(&self) -> String {
        let mut report = vec!["# Financial News Headlines".to_string()];

        if self.all_headlines.is_empty() {
            report.push("No recent headlines available.".into());
            return report.join("\n");
        }

        for headline in &self.all_headlines {
            report.push(format!("## {}", headline.headline));
            if let Some(summary) = &headline.summary {
                report.push(summary.clone());
            }
            report.push(format!(
                "*Source: {} - {}*",
                headline.source,
                headline.date_str()
            ));
            if let Some(url) = &headline.url {
                report.push(format!("[Read more]({url})"));
            }
            report.push(String::new());
        }

        report.join("\n")
    }
}

fn strip_html(text: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"));

    let text = tags.replace_all(text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    spaces.replace_all(text.trim(), " ").to_string()
}

/// Parses an RSS document into at most `max_headlines` headlines tagged with `source`.
pub fn parse_feed(source: &str, bytes: &[u8], max_headlines: usize) -> Result<Vec<Headline>> {
    let channel = rss::Channel::read_from(bytes)?;
    let now = Utc::now();

    let headlines = channel
        .items()
        .iter()
        .filter_map(|item| {
            let headline = item.title().map(strip_html).filter(|t| !t.is_empty())?;
            let summary = item
                .description()
                .map(strip_html)
                .filter(|s| !s.is_empty());
            let date = item
                .pub_date()
                .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or(now);
            Some(Headline {
                headline,
                url: item.link().map(str::to_string),
                summary,
                source: source.to_string(),
                date,
            })
        })
        .take(max_headlines)
        .collect();

    Ok(headlines)
}

pub struct NewsHeadlinesSource {
    feeds: Vec<(String, String)>,
    max_headlines: usize,
}

impl NewsHeadlinesSource {
    pub fn new() -> Self {
        Self::from_feeds(&Config::get().news_feeds)
    }

    pub fn from_feeds(feeds: &[(String, String)]) -> Self {
        Self {
            feeds: feeds.to_vec(),
            max_headlines: DEFAULT_MAX_HEADLINES,
        }
    }

    async fn fetch_feed(&self, name: &str, url: &str) -> Result<Vec<Headline>> {
        let bytes = get_http_client()
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        parse_feed(name, &bytes[..], self.max_headlines)
    }
}

#[async_trait]
impl DataSource for NewsHeadlinesSource {
    type Output = NewsData;

    fn name(&self) -> &str {
        "Financial News Headlines"
    }

    async fn fetch(&self) -> Result<NewsData> {
        let mut data = NewsData::default();

        for (name, url) in &self.feeds {
            match self.fetch_feed(name, url).await {
                Ok(headlines) => {
                    data.all_headlines.extend(headlines.iter().cloned());
                    data.source_headlines.insert(name.clone(), headlines);
                }
                Err(e) => tracing::error!("Error fetching headlines from {}: {}", name, e),
            }
        }

        data.all_headlines.sort_by(|a, b| b.date.cmp(&a.date));
        data.all_headlines.truncate(self.max_headlines);

        Ok(data)
    }
}
