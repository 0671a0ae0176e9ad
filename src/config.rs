use serde::{Deserialize, Serialize};

use std::str::FromStr;
use std::sync::OnceLock;

use crate::constant::*;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // OpenAI configuration
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub openai_model: String,
    pub openai_temperature: f32,

    // Azure OpenAI configuration, takes precedence when endpoint and key are set
    pub azure_openai_api_key: Option<String>,
    pub azure_openai_endpoint: Option<String>,
    pub azure_openai_api_version: String,
    pub azure_openai_chat_model: Option<String>,

    // Data API configuration
    pub alpha_vantage_api_key: Option<String>,
    pub fred_api_key: Option<String>,
    pub coingecko_api_key: Option<String>,

    // Email configuration
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_api_base: String,
    pub email_sender: Option<String>,
    pub email_sender_name: String,

    // Newsletter configuration
    pub newsletter_title: String,
    pub newsletter_frequency: String,
    pub newsletter_send_day: String,
    pub newsletter_send_time: String,

    // News feeds as (name, url)
    pub news_feeds: Vec<(String, String)>,

    // Storage
    pub subscribers_file: String,
    pub output_dir: String,
    pub log_dir: String,
    pub log_level: String,
}

impl Config {
    pub fn get() -> &'static Config {
        static INSTANCE: OnceLock<Config> = OnceLock::new();
        INSTANCE.get_or_init(Config::from_env)
    }

    pub fn from_env() -> Config {
        let openai_api_key = non_empty_var("OPENAI_API_KEY");
        let openai_api_base = non_empty_var("OPENAI_API_BASE");
        let openai_model =
            non_empty_var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.into());
        let openai_temperature = parse_var("OPENAI_TEMPERATURE", DEFAULT_TEMPERATURE);

        let azure_openai_api_key = non_empty_var("AZURE_OPENAI_API_KEY");
        let azure_openai_endpoint = non_empty_var("AZURE_OPENAI_ENDPOINT");
        let azure_openai_api_version = non_empty_var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|| "2023-05-15".into());
        let azure_openai_chat_model = non_empty_var("AZURE_OPENAI_CHAT_MODEL");

        let alpha_vantage_api_key = non_empty_var("ALPHA_VANTAGE_API_KEY");
        let fred_api_key = non_empty_var("FRED_API_KEY");
        let coingecko_api_key = non_empty_var("COINGECKO_API_KEY");

        let sendgrid_api_key = non_empty_var("SENDGRID_API_KEY");
        let sendgrid_api_base =
            non_empty_var("SENDGRID_API_BASE").unwrap_or_else(|| SENDGRID_API_BASE.into());
        let email_sender = non_empty_var("EMAIL_SENDER");
        let email_sender_name =
            non_empty_var("EMAIL_SENDER_NAME").unwrap_or_else(|| "Financial Newsletter".into());

        let newsletter_title =
            non_empty_var("NEWSLETTER_TITLE").unwrap_or_else(|| "Weekly Financial Insights".into());
        let newsletter_frequency = non_empty_var("NEWSLETTER_FREQUENCY")
            .unwrap_or_else(|| "weekly".into())
            .to_lowercase();
        let newsletter_send_day = non_empty_var("NEWSLETTER_SEND_DAY")
            .unwrap_or_else(|| "monday".into())
            .to_lowercase();
        let newsletter_send_time =
            non_empty_var("NEWSLETTER_SEND_TIME").unwrap_or_else(|| "08:00".into());

        let news_feeds = non_empty_var("NEWS_FEED_URLS")
            .map(|feeds| parse_feed_list(&feeds))
            .unwrap_or_else(|| {
                DEFAULT_NEWS_FEEDS
                    .iter()
                    .map(|(name, url)| (name.to_string(), url.to_string()))
                    .collect()
            });

        let subscribers_file =
            non_empty_var("SUBSCRIBERS_FILE").unwrap_or_else(|| "config/subscribers.json".into());
        let output_dir =
            non_empty_var("NEWSLETTER_OUTPUT_DIR").unwrap_or_else(|| "newsletters".into());
        let log_dir = non_empty_var("LOG_DIR").unwrap_or_else(|| "logs".into());
        let log_level = non_empty_var("LOG_LEVEL")
            .unwrap_or_else(|| "info".into())
            .to_lowercase();

        Config {
            openai_api_key,
            openai_api_base,
            openai_model,
            openai_temperature,
            azure_openai_api_key,
            azure_openai_endpoint,
            azure_openai_api_version,
            azure_openai_chat_model,
            alpha_vantage_api_key,
            fred_api_key,
            coingecko_api_key,
            sendgrid_api_key,
            sendgrid_api_base,
            email_sender,
            email_sender_name,
            newsletter_title,
            newsletter_frequency,
            newsletter_send_day,
            newsletter_send_time,
            news_feeds,
            subscribers_file,
            output_dir,
            log_dir,
            log_level,
        }
    }

    pub fn use_azure(&self) -> bool {
        self.azure_openai_endpoint.is_some() && self.azure_openai_api_key.is_some()
    }

    pub fn has_llm(&self) -> bool {
        self.use_azure() || self.openai_api_key.is_some()
    }

    pub fn has_email(&self) -> bool {
        self.sendgrid_api_key.is_some() && self.email_sender.is_some()
    }

    /// Logs the configuration gaps that will make a run fail later on.
    pub fn warn_missing(&self) {
        if !self.has_llm() {
            tracing::warn!("Language model API key is missing. Newsletter generation may fail.");
        }
        if !self.has_email() {
            tracing::warn!("Email configuration is incomplete. Newsletter distribution may fail.");
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    parse_or_default(key, non_empty_var(key), default)
}

/// Parses `raw`, warning and returning `default` when it is malformed.
fn parse_or_default<T: FromStr + Copy + std::fmt::Display>(
    key: &str,
    raw: Option<String>,
    default: T,
) -> T {
    match raw {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{} has invalid value {:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}

/// Parses `name=url` pairs separated by commas. A bare url is named after its host.
pub fn parse_feed_list(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, url)) if !entry.starts_with("http") => {
                (name.trim().to_string(), url.trim().to_string())
            }
            _ => {
                let host = reqwest::Url::parse(entry)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| entry.to_string());
                (host, entry.to_string())
            }
        })
        .collect()
}
