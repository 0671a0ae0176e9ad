use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::get_http_client;
use crate::config::Config;
use crate::constant::*;

use super::{change_arrow, DataSource, Measured};

/// One row of the `/coins/markets` listing. Every field can come back null.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketCoin {
    pub id: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub price_change_percentage_24h: Option<f64>,
    pub price_change_percentage_7d_in_currency: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CryptoQuote {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub latest_price: f64,
    pub market_cap: Option<f64>,
    pub daily_change_pct: Option<f64>,
    pub weekly_change_pct: Option<f64>,
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CryptoData {
    pub top_cryptos: Vec<CryptoQuote>,
}

impl Measured for CryptoData {
    fn item_count(&self) -> usize {
        self.top_cryptos.len()
    }
}

fn format_change(change: Option<f64>) -> String {
    match change {
        Some(c) if c == 0.0 => format!("{:.2}%", c.abs()),
        Some(c) => format!("{}{:.2}%", change_arrow(c), c.abs()),
        None => "N/A".to_string(),
    }
}

/// `$1.2T`, `$400.5B`, `$50.1M`, or the plain dollar amount below a million.
pub fn format_market_cap(market_cap: f64) -> String {
    if market_cap >= 1e12 {
        format!("${:.1}T", market_cap / 1e12)
    } else if market_cap >= 1e9 {
        format!("${:.1}B", market_cap / 1e9)
    } else if market_cap >= 1e6 {
        format!("${:.1}M", market_cap / 1e6)
    } else {
        format!("${}", group_thousands(market_cap.round() as u64))
    }
}

pub fn format_price(price: f64) -> String {
    let whole = price.trunc() as u64;
    let cents = ((price - price.trunc()) * 100.0).round() as u64;
    // 9.999 rounds up into the next whole unit
    let (whole, cents) = if cents == 100 { (whole + 1, 0) } else { (whole, cents) };
    format!("${}.{:02}", group_thousands(whole), cents)
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

impl CryptoData {
    pub fn to_markdown(&self) -> String {
        if self.top_cryptos.is_empty() {
            return "# Cryptocurrency Update\n\n_No cryptocurrency data available._".to_string();
        }

        let mut report = vec![
            "# Cryptocurrency Market Highlights".to_string(),
            "| Rank | Name (Symbol) | Price (USD) | 24h Change | 7d Change | Market Cap |".to_string(),
            "|---|---|---|---|---|---|".to_string(),
        ];
        for coin in &self.top_cryptos {
            let rank = coin
                .rank
                .map(|r| r.to_string())
                .unwrap_or_else(|| "N/A".into());
            let market_cap = coin
                .market_cap
                .map(format_market_cap)
                .unwrap_or_else(|| "N/A".into());
            report.push(format!(
                "| {} | {} ({}) | {} | {} | {} | {} |",
                rank,
                coin.name,
                coin.symbol,
                format_price(coin.latest_price),
                format_change(coin.daily_change_pct),
                format_change(coin.weekly_change_pct),
                market_cap
            ));
        }
        report.join("\n")
    }
}

/// Keeps the first `top_n` coins that are not stablecoins and carry a symbol, name and price.
pub fn select_top_coins(coins: Vec<MarketCoin>, top_n: usize, exclude_stablecoins: bool) -> Vec<CryptoQuote> {
    let mut selected = Vec::with_capacity(top_n);
    for coin in coins {
        if selected.len() >= top_n {
            break;
        }

        let symbol = coin.symbol.clone().unwrap_or_default().to_lowercase();
        if exclude_stablecoins && STABLECOIN_SYMBOLS.contains(&symbol.as_str()) {
            tracing::debug!("Skipping stablecoin: {}", symbol);
            continue;
        }

        let (Some(name), Some(price)) = (coin.name.clone(), coin.current_price) else {
            tracing::warn!("Incomplete data for coin: {:?}, skipping", coin.id);
            continue;
        };
        if symbol.is_empty() || name.is_empty() {
            tracing::warn!("Incomplete data for coin: {:?}, skipping", coin.id);
            continue;
        }

        selected.push(CryptoQuote {
            id: coin.id.unwrap_or_default(),
            symbol: symbol.to_uppercase(),
            name,
            latest_price: price,
            market_cap: coin.market_cap,
            daily_change_pct: coin.price_change_percentage_24h,
            weekly_change_pct: coin.price_change_percentage_7d_in_currency,
            rank: coin.market_cap_rank,
        });
    }

    if selected.len() < top_n {
        tracing::warn!(
            "Could only fetch {} non-stablecoin cryptos (requested {})",
            selected.len(),
            top_n
        );
    }

    selected
}

pub struct CoinGeckoSource {
    api_base: String,
    api_key: Option<String>,
    top_n: usize,
    exclude_stablecoins: bool,
}

impl CoinGeckoSource {
    pub fn new() -> Self {
        Self::with_api_base(COINGECKO_API_BASE, Config::get().coingecko_api_key.clone())
    }

    pub fn with_api_base(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            top_n: DEFAULT_TOP_CRYPTOS,
            exclude_stablecoins: true,
        }
    }

    pub async fn get_markets(&self, per_page: usize) -> Result<Vec<MarketCoin>> {
        let url = format!("{}/api/v3/coins/markets", self.api_base);
        let mut request = get_http_client()
            .get(&url)
            .header("accept", "application/json")
            .query(&[
                ("vs_currency", USD_CURRENCY.to_string()),
                ("order", "market_cap_desc".to_string()),
                ("per_page", per_page.to_string()),
                ("page", "1".to_string()),
                ("sparkline", "false".to_string()),
                ("price_change_percentage", "24h,7d".to_string()),
            ]);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", api_key);
        }

        let coins = request
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<MarketCoin>>()
            .await?;
        Ok(coins)
    }
}

#[async_trait]
impl DataSource for CoinGeckoSource {
    type Output = CryptoData;

    fn name(&self) -> &str {
        "Cryptocurrency Data"
    }

    async fn fetch(&self) -> Result<CryptoData> {
        // Ask for a few extra rows so filtering stablecoins still leaves top_n.
        let coins = self.get_markets(self.top_n + 10).await?;
        let top_cryptos = select_top_coins(coins, self.top_n, self.exclude_stablecoins);
        if top_cryptos.is_empty() {
            tracing::warn!("No crypto data could be fetched");
        }
        Ok(CryptoData { top_cryptos })
    }
}
