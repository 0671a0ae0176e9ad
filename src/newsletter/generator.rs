use anyhow::Result;
use chrono::{Local, NaiveDate};

use crate::config::Config;
use crate::llm::prompt::{PromptContext, SectionType};
use crate::llm::LanguageModel;
use crate::source::crypto::{CoinGeckoSource, CryptoData};
use crate::source::economy::{EconomicData, EconomicIndicatorsSource};
use crate::source::market::{MarketData, StockMarketSource};
use crate::source::news::{NewsData, NewsHeadlinesSource};
use crate::source::DataSource;

use super::html::render_document;
use super::{Newsletter, RawData};

const INTRODUCTION_FALLBACK: &str = "Welcome to this week's financial newsletter.";

pub struct NewsletterGenerator {
    title: String,
    model: Box<dyn LanguageModel>,
    market: Box<dyn DataSource<Output = MarketData>>,
    economy: Box<dyn DataSource<Output = EconomicData>>,
    crypto: Box<dyn DataSource<Output = CryptoData>>,
    news: Box<dyn DataSource<Output = NewsData>>,
}

fn data_section<T>(result: &Result<T>, what: &str, render: impl Fn(&T) -> String) -> String {
    match result {
        Ok(data) => render(data),
        Err(e) => format!("Error fetching {what}: {e}"),
    }
}

impl NewsletterGenerator {
    /// Generator over the live providers, configured from the environment.
    pub fn new(model: Box<dyn LanguageModel>) -> Self {
        Self {
            title: Config::get().newsletter_title.clone(),
            model,
            market: Box::new(StockMarketSource::new()),
            economy: Box::new(EconomicIndicatorsSource::new()),
            crypto: Box::new(CoinGeckoSource::new()),
            news: Box::new(NewsHeadlinesSource::new()),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_market_source(mut self, source: impl DataSource<Output = MarketData> + 'static) -> Self {
        self.market = Box::new(source);
        self
    }

    pub fn with_economy_source(
        mut self,
        source: impl DataSource<Output = EconomicData> + 'static,
    ) -> Self {
        self.economy = Box::new(source);
        self
    }

    pub fn with_crypto_source(mut self, source: impl DataSource<Output = CryptoData> + 'static) -> Self {
        self.crypto = Box::new(source);
        self
    }

    pub fn with_news_source(mut self, source: impl DataSource<Output = NewsData> + 'static) -> Self {
        self.news = Box::new(source);
        self
    }

    async fn prose(&self, section: SectionType, ctx: &PromptContext<'_>) -> Option<String> {
        let prompt = section.build(ctx);
        match self.model.complete(&prompt).await {
            Ok(text) => Some(text.trim().to_string()),
            Err(e) => {
                tracing::error!("Error generating {}: {}", section.heading(), e);
                None
            }
        }
    }

    async fn prose_section(&self, section: SectionType, ctx: &PromptContext<'_>) -> String {
        let body = self.prose(section, ctx).await.unwrap_or_else(|| {
            format!("{} could not be generated due to an error.", section.heading())
        });
        format!("## {}\n\n{}", section.heading(), body)
    }

    pub async fn generate(&self) -> Result<Newsletter> {
        self.generate_for(Local::now().date_naive()).await
    }

    pub async fn generate_for(&self, date: NaiveDate) -> Result<Newsletter> {
        tracing::info!("Generating newsletter for {}", date);

        let (market, economy, crypto, news) = tokio::join!(
            self.market.fetch_logged(),
            self.economy.fetch_logged(),
            self.crypto.fetch_logged(),
            self.news.fetch_logged(),
        );

        let ctx = PromptContext {
            date,
            market: market.as_ref().ok(),
            economy: economy.as_ref().ok(),
            crypto: crypto.as_ref().ok(),
            news: news.as_ref().ok(),
        };

        let intro = self
            .prose(SectionType::Introduction, &ctx)
            .await
            .unwrap_or_else(|| INTRODUCTION_FALLBACK.to_string());
        let introduction = format!(
            "# {}\n\n**{}**\n\n{}",
            self.title,
            date.format("%B %d, %Y"),
            intro
        );

        let sections = vec![
            introduction,
            data_section(&market, "market data", MarketData::to_markdown),
            self.prose_section(SectionType::MarketAnalysis, &ctx).await,
            data_section(&economy, "economic data", EconomicData::to_markdown),
            self.prose_section(SectionType::EconomicAnalysis, &ctx).await,
            data_section(&crypto, "cryptocurrency data", CryptoData::to_markdown),
            self.prose_section(SectionType::CryptoAnalysis, &ctx).await,
            data_section(&news, "news headlines", NewsData::to_markdown),
            self.prose_section(SectionType::Outlook, &ctx).await,
            format!(
                "---\n\n*This newsletter was automatically generated on {}.*",
                date.format("%Y-%m-%d")
            ),
        ];

        let content = sections.join("\n\n");
        let html_content = render_document(&self.title, &content);

        tracing::info!("Newsletter generated successfully");

        Ok(Newsletter {
            title: self.title.clone(),
            date: date.format("%Y-%m-%d").to_string(),
            content,
            html_content,
            raw_data: RawData {
                market_data: market.ok(),
                economic_data: economy.ok(),
                crypto_data: crypto.ok(),
                news_data: news.ok(),
            },
        })
    }
}
