pub mod crypto;
pub mod economy;
pub mod market;
pub mod news;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// A third-party provider the newsletter pulls data from.
#[async_trait]
pub trait DataSource: Send + Sync {
    type Output: Measured + Send;

    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Self::Output>;

    /// Runs `fetch` with the attempt/success/error logging every source shares.
    async fn fetch_logged(&self) -> Result<Self::Output> {
        tracing::info!("Fetching data from {}", self.name());
        match self.fetch().await {
            Ok(output) => {
                tracing::info!(
                    "Successfully fetched {} items from {}",
                    output.item_count(),
                    self.name()
                );
                Ok(output)
            }
            Err(e) => {
                tracing::error!("Error fetching data from {}: {}", self.name(), e);
                Err(e)
            }
        }
    }
}

pub trait Measured {
    fn item_count(&self) -> usize;
}

/// `(start, end)` covering the last `days` days up to now.
pub fn date_range(days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = Utc::now();
    (end - Duration::days(days), end)
}

/// Arrow used in reports: up, down or flat.
pub fn change_arrow(change: f64) -> &'static str {
    if change > 0.0 {
        "↑"
    } else if change < 0.0 {
        "↓"
    } else {
        "→"
    }
}

/// Percentage change from `previous` to `latest`, `None` when `previous` is zero.
pub fn pct_change(latest: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 || !previous.is_finite() || !latest.is_finite() {
        return None;
    }
    Some((latest - previous) / previous * 100.0)
}
