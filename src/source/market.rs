use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::cmp::Ordering;

use crate::client::get_http_client;
use crate::constant::*;

use super::{change_arrow, date_range, pct_change, DataSource, Measured};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Daily closes and volumes of one ticker, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PriceHistory {
    pub symbol: String,
    pub timestamps: Vec<i64>,
    pub closes: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl PriceHistory {
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    fn daily_change_pct(&self) -> Option<f64> {
        let n = self.len();
        if n < 2 {
            return None;
        }
        pct_change(self.closes[n - 1], self.closes[n - 2])
    }

    // First row of the window stands in for "a week ago" once there are enough rows.
    fn weekly_change_pct(&self) -> Option<f64> {
        let n = self.len();
        if n <= 5 {
            return None;
        }
        pct_change(self.closes[n - 1], self.closes[0])
    }

    /// Sample standard deviation of daily returns, in percent.
    fn volatility(&self) -> Option<f64> {
        let returns: Vec<f64> = self
            .closes
            .windows(2)
            .filter_map(|w| pct_change(w[1], w[0]).map(|p| p / 100.0))
            .collect();
        if returns.len() < 2 {
            return None;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        Some(var.sqrt() * 100.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSummary {
    pub symbol: String,
    pub latest_close: f64,
    pub daily_change_pct: Option<f64>,
    pub weekly_change_pct: Option<f64>,
    pub volatility: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMetrics {
    pub symbol: String,
    pub latest_close: f64,
    pub daily_change_pct: Option<f64>,
    pub weekly_change_pct: Option<f64>,
    pub latest_volume: Option<f64>,
    pub volume_change_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StockPerformance {
    /// Sorted by daily change, best first.
    pub all_stocks: Vec<StockMetrics>,
    pub top_gainers: Vec<StockMetrics>,
    pub top_losers: Vec<StockMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarketData {
    pub market_summary: Vec<IndexSummary>,
    pub stock_performance: StockPerformance,
}

impl Measured for MarketData {
    fn item_count(&self) -> usize {
        self.market_summary.len() + self.stock_performance.all_stocks.len()
    }
}

impl MarketData {
    pub fn index(&self, symbol: &str) -> Option<&IndexSummary> {
        self.market_summary.iter().find(|s| s.symbol == symbol)
    }

    pub fn to_markdown(&self) -> String {
        if self.market_summary.is_empty() && self.stock_performance.all_stocks.is_empty() {
            return "No stock market data available to report.".to_string();
        }

        let mut report = vec!["# Market Summary".to_string()];
        if self.market_summary.is_empty() {
            report.push("No market summary data available.".into());
            report.push(String::new());
        }
        for summary in &self.market_summary {
            report.push(format!("## {}", index_name(&summary.symbol)));
            report.push(format!("- Current: {:.2}", summary.latest_close));
            match summary.daily_change_pct {
                Some(change) => report.push(format!(
                    "- Daily Change: {} {:.2}%",
                    change_arrow(change),
                    change.abs()
                )),
                None => report.push("- Daily Change: N/A".into()),
            }
            match summary.weekly_change_pct {
                Some(change) => report.push(format!("- Weekly Change: {:.2}%", change)),
                None => report.push("- Weekly Change: N/A".into()),
            }
            report.push(String::new());
        }

        let performance = &self.stock_performance;
        if performance.all_stocks.is_empty() {
            report.push("# Stock Performance".into());
            report.push("No stock performance data available.".into());
            report.push(String::new());
            return report.join("\n");
        }

        report.push("# Top Performing Stocks".into());
        for stock in &performance.top_gainers {
            report.push(format!("## {}", stock.symbol));
            report.push(format!("- Current: ${:.2}", stock.latest_close));
            match stock.daily_change_pct {
                Some(change) => report.push(format!("- Daily Change: ↑ {:.2}%", change)),
                None => report.push("- Daily Change: N/A".into()),
            }
            report.push(String::new());
        }

        report.push("# Underperforming Stocks".into());
        let mut losers = performance.top_losers.clone();
        losers.sort_by(|a, b| cmp_change(a.daily_change_pct, b.daily_change_pct, f64::INFINITY));
        for stock in &losers {
            report.push(format!("## {}", stock.symbol));
            report.push(format!("- Current: ${:.2}", stock.latest_close));
            match stock.daily_change_pct {
                Some(change) => report.push(format!("- Daily Change: ↓ {:.2}%", change.abs())),
                None => report.push("- Daily Change: N/A".into()),
            }
            report.push(String::new());
        }

        report.join("\n")
    }
}

pub fn index_name(symbol: &str) -> &str {
    match symbol {
        "^GSPC" => "S&P 500",
        "^DJI" => "Dow Jones Industrial Average",
        "^IXIC" => "NASDAQ Composite",
        "^RUT" => "Russell 2000",
        "^VIX" => "CBOE Volatility Index",
        "^FTSE" => "FTSE 100",
        "^N225" => "Nikkei 225",
        other => other,
    }
}

fn cmp_change(a: Option<f64>, b: Option<f64>, missing: f64) -> Ordering {
    a.unwrap_or(missing)
        .partial_cmp(&b.unwrap_or(missing))
        .unwrap_or(Ordering::Equal)
}

pub fn summarize_index(history: &PriceHistory) -> Option<IndexSummary> {
    let latest_close = *history.closes.last()?;
    Some(IndexSummary {
        symbol: history.symbol.clone(),
        latest_close,
        daily_change_pct: history.daily_change_pct(),
        weekly_change_pct: history.weekly_change_pct(),
        volatility: history.volatility(),
    })
}

pub fn stock_performance(histories: &[PriceHistory]) -> StockPerformance {
    let mut all_stocks: Vec<StockMetrics> = histories
        .iter()
        .filter_map(|history| {
            let latest_close = *history.closes.last()?;
            let n = history.volumes.len();
            let latest_volume = history.volumes.last().copied();
            let volume_change_pct = if n >= 2 {
                pct_change(history.volumes[n - 1], history.volumes[n - 2])
            } else {
                None
            };
            Some(StockMetrics {
                symbol: history.symbol.clone(),
                latest_close,
                daily_change_pct: history.daily_change_pct(),
                weekly_change_pct: history.weekly_change_pct(),
                latest_volume,
                volume_change_pct,
            })
        })
        .collect();

    if all_stocks.is_empty() {
        return StockPerformance::default();
    }

    all_stocks.sort_by(|a, b| cmp_change(b.daily_change_pct, a.daily_change_pct, f64::NEG_INFINITY));

    let top_gainers = all_stocks.iter().take(3).cloned().collect();
    let top_losers = all_stocks[all_stocks.len().saturating_sub(3)..].to_vec();

    StockPerformance {
        all_stocks,
        top_gainers,
        top_losers,
    }
}

pub struct StockMarketSource {
    api_base: String,
    indices: Vec<String>,
    stocks: Vec<String>,
    days: i64,
}

impl StockMarketSource {
    pub fn new() -> Self {
        Self::with_api_base(YAHOO_CHART_API_BASE)
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            indices: DEFAULT_INDICES.iter().map(|s| s.to_string()).collect(),
            stocks: DEFAULT_STOCKS.iter().map(|s| s.to_string()).collect(),
            days: MARKET_LOOKBACK_DAYS,
        }
    }

    #[cfg(test)]
    pub fn with_symbols(mut self, indices: &[&str], stocks: &[&str]) -> Self {
        self.indices = indices.iter().map(|s| s.to_string()).collect();
        self.stocks = stocks.iter().map(|s| s.to_string()).collect();
        self
    }

    pub async fn get_history(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PriceHistory> {
        let url = format!("{}/v8/finance/chart/{}", self.api_base, symbol);
        let response = get_http_client()
            .get(&url)
            .query(&[
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<ChartResponse>()
            .await?;

        if let Some(error) = response.chart.error.filter(|e| !e.is_null()) {
            anyhow::bail!("chart API error for {}: {}", symbol, error);
        }

        let result = response
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or(anyhow::anyhow!("No chart data for {}", symbol))?;
        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or(anyhow::anyhow!("No quote data for {}", symbol))?;

        let mut history = PriceHistory {
            symbol: symbol.to_string(),
            ..Default::default()
        };
        for (i, close) in quote.close.iter().enumerate() {
            // Rows without a close are holidays or the still-open session.
            let Some(close) = close else { continue };
            history.closes.push(*close);
            history
                .volumes
                .push(quote.volume.get(i).copied().flatten().unwrap_or(0.0));
            history
                .timestamps
                .push(result.timestamp.get(i).copied().unwrap_or_default());
        }

        Ok(history)
    }

    async fn fetch_histories(&self, symbols: &[String]) -> Vec<PriceHistory> {
        let (start, end) = date_range(self.days);
        let mut histories = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            tracing::debug!("Fetching price history for {}", symbol);
            match self.get_history(symbol, start, end).await {
                Ok(history) if !history.is_empty() => histories.push(history),
                Ok(_) => tracing::warn!("No data returned for ticker {}", symbol),
                Err(e) => tracing::error!("Error fetching data for ticker {}: {}", symbol, e),
            }
        }
        histories
    }
}

#[async_trait]
impl DataSource for StockMarketSource {
    type Output = MarketData;

    fn name(&self) -> &str {
        "Stock Market Data"
    }

    async fn fetch(&self) -> Result<MarketData> {
        let index_histories = self.fetch_histories(&self.indices).await;
        let stock_histories = self.fetch_histories(&self.stocks).await;

        if index_histories.is_empty() && stock_histories.is_empty() {
            anyhow::bail!("no ticker returned any data");
        }

        Ok(MarketData {
            market_summary: index_histories.iter().filter_map(summarize_index).collect(),
            stock_performance: stock_performance(&stock_histories),
        })
    }
}
