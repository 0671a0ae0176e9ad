use std::{sync::OnceLock, time::Duration};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("marketletter/", env!("CARGO_PKG_VERSION"));

pub fn get_http_client() -> &'static reqwest::Client {
    static INSTANCE: OnceLock<reqwest::Client> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            })
    })
}
