pub mod archive;
pub mod generator;
pub mod html;

use serde::{Deserialize, Serialize};

use crate::source::crypto::CryptoData;
use crate::source::economy::EconomicData;
use crate::source::market::MarketData;
use crate::source::news::NewsData;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newsletter {
    pub title: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// Markdown body.
    pub content: String,
    pub html_content: String,
    pub raw_data: RawData,
}

impl Newsletter {
    pub fn subject(&self) -> String {
        format!("{} - {}", self.title, self.date)
    }
}

/// What each source returned, `None` where the fetch failed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawData {
    pub market_data: Option<MarketData>,
    pub economic_data: Option<EconomicData>,
    pub crypto_data: Option<CryptoData>,
    pub news_data: Option<NewsData>,
}
