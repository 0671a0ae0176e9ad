use chrono::NaiveDate;

use crate::source::crypto::CryptoData;
use crate::source::economy::{EconomicData, IndicatorReading};
use crate::source::market::{index_name, IndexSummary, MarketData, StockMetrics};
use crate::source::news::NewsData;

/// Indicators quoted in the outlook prompt.
const KEY_INDICATORS: [&str; 4] = ["GDP", "Unemployment Rate", "CPI", "Fed Funds Rate"];
const OUTLOOK_HEADLINES: usize = 5;

/// Whatever the sources managed to fetch for this issue.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub date: NaiveDate,
    pub market: Option<&'a MarketData>,
    pub economy: Option<&'a EconomicData>,
    pub crypto: Option<&'a CryptoData>,
    pub news: Option<&'a NewsData>,
}

pub trait SectionTemplate {
    fn generate_prompt(&self, ctx: &PromptContext) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Introduction,
    MarketAnalysis,
    EconomicAnalysis,
    CryptoAnalysis,
    Outlook,
}

impl SectionType {
    pub fn heading(&self) -> &'static str {
        match self {
            SectionType::Introduction => "Introduction",
            SectionType::MarketAnalysis => "Market Analysis",
            SectionType::EconomicAnalysis => "Economic Analysis",
            SectionType::CryptoAnalysis => "Crypto Analysis",
            SectionType::Outlook => "Market Outlook",
        }
    }

    pub fn build(&self, ctx: &PromptContext) -> String {
        match self {
            SectionType::Introduction => IntroductionTemplate.generate_prompt(ctx),
            SectionType::MarketAnalysis => MarketAnalysisTemplate.generate_prompt(ctx),
            SectionType::EconomicAnalysis => EconomicAnalysisTemplate.generate_prompt(ctx),
            SectionType::CryptoAnalysis => CryptoAnalysisTemplate.generate_prompt(ctx),
            SectionType::Outlook => OutlookTemplate.generate_prompt(ctx),
        }
    }
}

fn direction(change: f64) -> &'static str {
    if change > 0.0 {
        "up"
    } else {
        "down"
    }
}

/// `<close>, up 1.23% this week` for the introduction's headline indices.
pub fn headline_index_text(summary: Option<&IndexSummary>) -> String {
    match summary {
        None => "data not available".to_string(),
        Some(s) => match s.daily_change_pct {
            Some(change) if change != 0.0 => format!(
                "{:.2}, {} {:.2}% this week",
                s.latest_close,
                direction(change),
                change.abs()
            ),
            _ => "data incomplete".to_string(),
        },
    }
}

pub fn index_lines(market: Option<&MarketData>) -> String {
    let Some(market) = market else {
        return String::new();
    };
    market
        .market_summary
        .iter()
        .map(|s| {
            let change = match s.daily_change_pct {
                Some(c) => format!("{} {:.2}%", direction(c), c.abs()),
                None => "unchanged".to_string(),
            };
            format!("- {}: {:.2}, {}\n", index_name(&s.symbol), s.latest_close, change)
        })
        .collect()
}

fn mover_lines(stocks: &[StockMetrics], gaining: bool) -> String {
    stocks
        .iter()
        .map(|s| match s.daily_change_pct {
            Some(c) if c != 0.0 && gaining => {
                format!("- {}: ${:.2}, up {:.2}%\n", s.symbol, s.latest_close, c)
            }
            Some(c) if c != 0.0 => {
                format!("- {}: ${:.2}, down {:.2}%\n", s.symbol, s.latest_close, c.abs())
            }
            _ => format!("- {}: data incomplete\n", s.symbol),
        })
        .collect()
}

fn indicator_line(reading: &IndicatorReading, with_date: bool) -> String {
    let change = reading
        .change_pct
        .map(|c| format!(", {} {:.2}%", direction(c), c.abs()))
        .unwrap_or_default();
    if with_date {
        format!(
            "- {}: {}{} (as of {})\n",
            reading.name,
            reading.value_str(),
            change,
            reading.latest_date
        )
    } else {
        format!("- {}: {}{}\n", reading.name, reading.value_str(), change)
    }
}

#[derive(Debug)]
pub struct IntroductionTemplate;

impl SectionTemplate for IntroductionTemplate {
    fn generate_prompt(&self, ctx: &PromptContext) -> String {
        let index = |symbol: &str| headline_index_text(ctx.market.and_then(|m| m.index(symbol)));
        format!(
            r#"You are a professional financial analyst writing the introduction to a weekly newsletter for investors.
Today is {date}.

Key market indicators:
- S&P 500: {sp500}
- Dow Jones: {dow}
- NASDAQ: {nasdaq}

Write a professional, insightful introduction (2-3 paragraphs) for this week's financial newsletter.
Focus on the overall market sentiment and key themes for investors to watch.
Use a professional, confident tone that would be appropriate for sophisticated investors.
Do not include specific numbers in your response, just provide a high-level overview."#,
            date = ctx.date.format("%B %d, %Y"),
            sp500 = index("^GSPC"),
            dow = index("^DJI"),
            nasdaq = index("^IXIC"),
        )
    }
}

#[derive(Debug)]
pub struct MarketAnalysisTemplate;

impl SectionTemplate for MarketAnalysisTemplate {
    fn generate_prompt(&self, ctx: &PromptContext) -> String {
        let (gainers, losers) = match ctx.market {
            Some(m) => (
                mover_lines(&m.stock_performance.top_gainers, true),
                mover_lines(&m.stock_performance.top_losers, false),
            ),
            None => (String::new(), String::new()),
        };
        format!(
            r#"You are a professional financial analyst providing market analysis for a weekly investor newsletter.

Market data:
{market}
Top performing stocks:
{gainers}
Underperforming stocks:
{losers}
Based on this data, write a detailed market analysis (3-4 paragraphs) that explains:
1. The overall market performance and key trends
2. Sector-specific insights
3. What might be driving the performance of top gainers and losers
4. Technical indicators or patterns worth noting

Use a professional, analytical tone. Provide specific insights that would be valuable to investors."#,
            market = index_lines(ctx.market),
        )
    }
}

#[derive(Debug)]
pub struct EconomicAnalysisTemplate;

impl SectionTemplate for EconomicAnalysisTemplate {
    fn generate_prompt(&self, ctx: &PromptContext) -> String {
        let indicators: String = ctx
            .economy
            .map(|e| {
                e.economic_summary
                    .iter()
                    .map(|r| indicator_line(r, true))
                    .collect()
            })
            .unwrap_or_default();
        format!(
            r#"You are a professional economist providing analysis for a weekly investor newsletter.

Economic indicators:
{indicators}
Based on these indicators, write a detailed economic analysis (3-4 paragraphs) that explains:
1. The current state of the economy
2. Trends in inflation, employment, and growth
3. Potential implications for monetary policy
4. How these economic conditions might affect different market sectors

Use a professional, analytical tone. Provide specific insights that would be valuable to investors."#
        )
    }
}

#[derive(Debug)]
pub struct CryptoAnalysisTemplate;

impl SectionTemplate for CryptoAnalysisTemplate {
    fn generate_prompt(&self, ctx: &PromptContext) -> String {
        let pct = |c: Option<f64>| {
            c.map(|c| format!("{:+.2}%", c))
                .unwrap_or_else(|| "n/a".to_string())
        };
        let coins: String = ctx
            .crypto
            .map(|c| {
                c.top_cryptos
                    .iter()
                    .map(|q| {
                        format!(
                            "- {} ({}): ${:.2}, 24h {}, 7d {}\n",
                            q.name,
                            q.symbol,
                            q.latest_price,
                            pct(q.daily_change_pct),
                            pct(q.weekly_change_pct)
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        format!(
            r#"You are a professional digital asset analyst writing for a weekly investor newsletter.

Largest cryptocurrencies by market cap (stablecoins excluded):
{coins}
Write a concise analysis (2 paragraphs) of the cryptocurrency market this week that covers:
1. Overall direction and relative strength among the largest assets
2. Notable outliers and what might explain them

Use a professional, measured tone and remind readers that digital assets are highly volatile."#
        )
    }
}

#[derive(Debug)]
pub struct OutlookTemplate;

impl SectionTemplate for OutlookTemplate {
    fn generate_prompt(&self, ctx: &PromptContext) -> String {
        let economic: String = ctx
            .economy
            .map(|e| {
                KEY_INDICATORS
                    .iter()
                    .filter_map(|name| e.get(name))
                    .map(|r| indicator_line(r, false))
                    .collect()
            })
            .unwrap_or_default();
        let headlines: String = ctx
            .news
            .map(|n| {
                n.all_headlines
                    .iter()
                    .take(OUTLOOK_HEADLINES)
                    .map(|h| format!("- {}\n", h.headline))
                    .collect()
            })
            .unwrap_or_default();
        format!(
            r#"You are a professional financial strategist providing a forward-looking outlook for a weekly investor newsletter.

Market data:
{market}
Economic indicators:
{economic}
Recent headlines:
{headlines}
Based on this information, write a comprehensive outlook (3-4 paragraphs) that:
1. Synthesizes the market and economic data to provide a forward-looking perspective
2. Identifies key risks and opportunities for investors in the coming weeks
3. Suggests potential investment strategies or sectors to watch
4. Considers how recent news might impact market sentiment

Use a professional, strategic tone. Provide specific, actionable insights that would be valuable to investors."#,
            market = index_lines(ctx.market),
        )
    }
}
