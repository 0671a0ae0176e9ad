pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

pub const YAHOO_CHART_API_BASE: &str = "https://query1.finance.yahoo.com";
pub const FRED_API_BASE: &str = "https://api.stlouisfed.org";
pub const ALPHA_VANTAGE_API_BASE: &str = "https://www.alphavantage.co";
pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com";
pub const SENDGRID_API_BASE: &str = "https://api.sendgrid.com";

pub const USD_CURRENCY: &str = "usd";

pub const DEFAULT_INDICES: [&str; 7] = ["^GSPC", "^DJI", "^IXIC", "^RUT", "^VIX", "^FTSE", "^N225"];
pub const DEFAULT_STOCKS: [&str; 10] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "META", "TSLA", "NVDA", "JPM", "V", "WMT",
];
pub const MARKET_LOOKBACK_DAYS: i64 = 30;

pub const FRED_INDICATORS: [(&str, &str); 10] = [
    ("GDP", "GDP"),
    ("UNRATE", "Unemployment Rate"),
    ("CPIAUCSL", "CPI"),
    ("FEDFUNDS", "Fed Funds Rate"),
    ("T10Y2Y", "Yield Curve"),
    ("PAYEMS", "Nonfarm Payrolls"),
    ("HOUST", "Housing Starts"),
    ("RSAFS", "Retail Sales"),
    ("INDPRO", "Industrial Production"),
    ("M2SL", "M2 Money Supply"),
];
pub const ECONOMY_LOOKBACK_DAYS: i64 = 365;

// (function, interval, display name)
pub const ALPHA_VANTAGE_INDICATORS: [(&str, Option<&str>, &str); 5] = [
    ("REAL_GDP", Some("quarterly"), "Real GDP (Alpha Vantage)"),
    ("CPI", Some("monthly"), "CPI (Alpha Vantage)"),
    ("UNEMPLOYMENT", None, "Unemployment (Alpha Vantage)"),
    ("RETAIL_SALES", None, "Retail Sales (Alpha Vantage)"),
    ("NONFARM_PAYROLL", None, "Nonfarm Payroll (Alpha Vantage)"),
];

pub const STABLECOIN_SYMBOLS: [&str; 12] = [
    "usdt", "usdc", "busd", "dai", "tusd", "usdp", "ust", "frax", "lusd", "fei", "gusd", "usdd",
];
pub const DEFAULT_TOP_CRYPTOS: usize = 10;

pub const DEFAULT_NEWS_FEEDS: [(&str, &str); 3] = [
    ("Yahoo Finance", "https://finance.yahoo.com/news/rssindex"),
    (
        "CNBC",
        "https://search.cnbc.com/rs/search/combinedcms/view.xml?partnerId=wrss01&id=10000664",
    ),
    (
        "MarketWatch",
        "https://feeds.content.dowjones.io/public/rss/mw_topstories",
    ),
];
pub const DEFAULT_MAX_HEADLINES: usize = 10;

pub const EMAIL_BATCH_SIZE: usize = 100;
