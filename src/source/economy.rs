use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::get_http_client;
use crate::config::Config;
use crate::constant::*;

use super::{change_arrow, date_range, pct_change, DataSource, Measured};

#[derive(Debug, Deserialize)]
struct FredResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageResponse {
    data: Option<Vec<Observation>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
    pub date: String,
    pub value: String,
}

impl Observation {
    // FRED uses "." for a missing observation.
    fn parsed(&self) -> Option<(String, f64)> {
        self.value
            .trim()
            .parse::<f64>()
            .ok()
            .map(|v| (self.date.clone(), v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorReading {
    pub name: String,
    pub latest_value: f64,
    pub latest_date: String,
    pub change: Option<f64>,
    pub change_pct: Option<f64>,
}

impl IndicatorReading {
    /// Builds a reading from observations ordered oldest first.
    pub fn from_series(name: &str, observations: &[Observation]) -> Option<Self> {
        let values: Vec<(String, f64)> = observations.iter().filter_map(Observation::parsed).collect();
        let (latest_date, latest_value) = values.last()?.clone();
        let previous = values.len().checked_sub(2).map(|i| values[i].1);
        Some(Self {
            name: name.to_string(),
            latest_value,
            latest_date,
            change: previous.map(|p| latest_value - p),
            change_pct: previous.and_then(|p| pct_change(latest_value, p)),
        })
    }

    pub fn is_percentage(&self) -> bool {
        self.name.contains("Rate") || self.name.contains("Unemployment")
    }

    pub fn value_str(&self) -> String {
        if self.is_percentage() {
            format!("{:.2}%", self.latest_value)
        } else {
            format!("{:.2}", self.latest_value)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EconomicData {
    pub economic_summary: Vec<IndicatorReading>,
}

impl Measured for EconomicData {
    fn item_count(&self) -> usize {
        self.economic_summary.len()
    }
}

const CATEGORIES: [(&str, &[&str]); 7] = [
    (
        "Growth",
        &["GDP", "Real GDP (Alpha Vantage)", "Industrial Production"],
    ),
    (
        "Employment",
        &[
            "Unemployment Rate",
            "Unemployment (Alpha Vantage)",
            "Nonfarm Payrolls",
            "Nonfarm Payroll (Alpha Vantage)",
        ],
    ),
    ("Inflation", &["CPI", "CPI (Alpha Vantage)"]),
    ("Interest Rates", &["Fed Funds Rate", "Yield Curve"]),
    ("Consumer", &["Retail Sales", "Retail Sales (Alpha Vantage)"]),
    ("Housing", &["Housing Starts"]),
    ("Money Supply", &["M2 Money Supply"]),
];

impl EconomicData {
    pub fn get(&self, name: &str) -> Option<&IndicatorReading> {
        self.economic_summary.iter().find(|r| r.name == name)
    }

    pub fn to_markdown(&self) -> String {
        let mut report = vec!["# Economic Indicators".to_string()];

        for (category, names) in CATEGORIES {
            let readings: Vec<&IndicatorReading> =
                names.iter().filter_map(|name| self.get(name)).collect();
            if readings.is_empty() {
                continue;
            }
            report.push(format!("## {category}"));
            for reading in readings {
                let change = match reading.change_pct {
                    Some(pct) => format!("{} {:.2}%", change_arrow(pct), pct.abs()),
                    None => "N/A".to_string(),
                };
                report.push(format!("### {}", reading.name));
                report.push(format!(
                    "- Current: {} (as of {})",
                    reading.value_str(),
                    reading.latest_date
                ));
                report.push(format!("- Change: {change}"));
                report.push(String::new());
            }
        }

        if self.economic_summary.is_empty() {
            report.push("No economic indicator data available.".into());
            report.push(String::new());
        }

        report.join("\n")
    }
}

pub struct EconomicIndicatorsSource {
    fred_api_base: String,
    alpha_vantage_api_base: String,
    fred_api_key: Option<String>,
    alpha_vantage_api_key: Option<String>,
    days: i64,
}

impl EconomicIndicatorsSource {
    pub fn new() -> Self {
        let config = Config::get();
        Self {
            fred_api_base: FRED_API_BASE.to_string(),
            alpha_vantage_api_base: ALPHA_VANTAGE_API_BASE.to_string(),
            fred_api_key: config.fred_api_key.clone(),
            alpha_vantage_api_key: config.alpha_vantage_api_key.clone(),
            days: ECONOMY_LOOKBACK_DAYS,
        }
    }

    #[cfg(test)]
    pub fn with_endpoints(
        fred_api_base: impl Into<String>,
        fred_api_key: Option<String>,
        alpha_vantage_api_base: impl Into<String>,
        alpha_vantage_api_key: Option<String>,
    ) -> Self {
        Self {
            fred_api_base: fred_api_base.into(),
            alpha_vantage_api_base: alpha_vantage_api_base.into(),
            fred_api_key,
            alpha_vantage_api_key,
            days: ECONOMY_LOOKBACK_DAYS,
        }
    }

    pub async fn get_fred_series(&self, api_key: &str, series_id: &str) -> Result<Vec<Observation>> {
        let (start, end) = date_range(self.days);
        let observation_start = start.format("%Y-%m-%d").to_string();
        let observation_end = end.format("%Y-%m-%d").to_string();
        let url = format!("{}/fred/series/observations", self.fred_api_base);
        let response = get_http_client()
            .get(&url)
            .query(&[
                ("series_id", series_id),
                ("api_key", api_key),
                ("file_type", "json"),
                ("observation_start", observation_start.as_str()),
                ("observation_end", observation_end.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<FredResponse>()
            .await?;
        Ok(response.observations)
    }

    /// Alpha Vantage returns the newest observation first; the result is oldest first.
    pub async fn get_alpha_vantage_series(
        &self,
        api_key: &str,
        function: &str,
        interval: Option<&str>,
    ) -> Result<Vec<Observation>> {
        let url = format!("{}/query", self.alpha_vantage_api_base);
        let mut params = vec![
            ("function", function),
            ("apikey", api_key),
            ("datatype", "json"),
        ];
        if let Some(interval) = interval {
            params.push(("interval", interval));
        }

        let response = get_http_client()
            .get(&url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json::<AlphaVantageResponse>()
            .await?;

        let mut data = response
            .data
            .ok_or(anyhow::anyhow!("No data returned for {}", function))?;
        data.reverse();
        Ok(data)
    }

    async fn fred_readings(&self) -> Vec<IndicatorReading> {
        let Some(api_key) = self.fred_api_key.as_deref() else {
            tracing::warn!("FRED API key is missing. Skipping FRED data.");
            return vec![];
        };

        let mut readings = vec![];
        for (code, name) in FRED_INDICATORS {
            match self.get_fred_series(api_key, code).await {
                Ok(observations) => match IndicatorReading::from_series(name, &observations) {
                    Some(reading) => readings.push(reading),
                    None => tracing::warn!("No data returned for FRED indicator {}", code),
                },
                Err(e) => tracing::error!("Error fetching data for FRED indicator {}: {}", code, e),
            }
        }
        readings
    }

    async fn alpha_vantage_readings(&self) -> Vec<IndicatorReading> {
        let Some(api_key) = self.alpha_vantage_api_key.as_deref() else {
            tracing::warn!("Alpha Vantage API key is missing. Skipping Alpha Vantage data.");
            return vec![];
        };

        let mut readings = vec![];
        for (function, interval, name) in ALPHA_VANTAGE_INDICATORS {
            match self.get_alpha_vantage_series(api_key, function, interval).await {
                Ok(observations) => match IndicatorReading::from_series(name, &observations) {
                    Some(reading) => readings.push(reading),
                    None => tracing::warn!(
                        "No data returned for Alpha Vantage indicator {}",
                        function
                    ),
                },
                Err(e) => tracing::error!(
                    "Error fetching Alpha Vantage data for {}: {}",
                    function,
                    e
                ),
            }
        }
        readings
    }
}

#[async_trait]
impl DataSource for EconomicIndicatorsSource {
    type Output = EconomicData;

    fn name(&self) -> &str {
        "Economic Indicators"
    }

    async fn fetch(&self) -> Result<EconomicData> {
        let mut economic_summary = self.fred_readings().await;
        economic_summary.extend(self.alpha_vantage_readings().await);
        Ok(EconomicData { economic_summary })
    }
}

#[cfg(test)]
mod economy_tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn obs(date: &str, value: &str) -> Observation {
        Observation {
            date: date.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_reading_skips_missing_values() {
        let series = vec![
            obs("2024-01-01", "4.0"),
            obs("2024-02-01", "5.0"),
            obs("2024-03-01", "."),
        ];
        let reading = IndicatorReading::from_series("Unemployment Rate", &series).unwrap();
        assert_eq!(reading.latest_value, 5.0);
        assert_eq!(reading.latest_date, "2024-02-01");
        assert_eq!(reading.change, Some(1.0));
        assert_eq!(reading.change_pct, Some(25.0));
        assert_eq!(reading.value_str(), "5.00%");
    }

    #[test]
    fn test_reading_single_observation() {
        let reading = IndicatorReading::from_series("GDP", &[obs("2024-01-01", "27000")]).unwrap();
        assert_eq!(reading.change, None);
        assert_eq!(reading.change_pct, None);
        assert_eq!(reading.value_str(), "27000.00");
        assert!(IndicatorReading::from_series("GDP", &[obs("2024-01-01", ".")]).is_none());
    }

    #[test]
    fn test_markdown_groups_by_category() {
        let data = EconomicData {
            economic_summary: vec![
                IndicatorReading::from_series("CPI", &[obs("d1", "300"), obs("d2", "303")]).unwrap(),
                IndicatorReading::from_series("GDP", &[obs("d1", "100"), obs("d2", "99")]).unwrap(),
            ],
        };
        let md = data.to_markdown();
        assert!(md.starts_with("# Economic Indicators"));
        assert!(md.find("## Growth").unwrap() < md.find("## Inflation").unwrap());
        assert!(md.contains("- Current: 303.00 (as of d2)"));
        assert!(md.contains("- Change: ↑ 1.00%"));
        assert!(md.contains("- Change: ↓ 1.00%"));
        assert!(!md.contains("## Housing"));
    }

    #[tokio::test]
    async fn test_fetch_without_keys_is_empty() {
        let source = EconomicIndicatorsSource::with_endpoints("http://127.0.0.1:9", None, "http://127.0.0.1:9", None);
        let data = source.fetch().await.unwrap();
        assert!(data.economic_summary.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_from_both_providers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fred/series/observations"))
            .and(query_param("series_id", "UNRATE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "observations": [
                    {"date": "2024-01-01", "value": "3.7"},
                    {"date": "2024-02-01", "value": "3.9"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fred/series/observations"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", "REAL_GDP"))
            .and(query_param("interval", "quarterly"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Real Gross Domestic Product",
                "data": [
                    {"date": "2024-04-01", "value": "110"},
                    {"date": "2024-01-01", "value": "100"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Information": "rate limited"
            })))
            .mount(&server)
            .await;

        let source = EconomicIndicatorsSource::with_endpoints(
            server.uri(),
            Some("fred-key".into()),
            server.uri(),
            Some("av-key".into()),
        );
        let data = source.fetch().await.unwrap();

        assert_eq!(data.economic_summary.len(), 2);
        let unrate = data.get("Unemployment Rate").unwrap();
        assert_eq!(unrate.latest_value, 3.9);
        let gdp = data.get("Real GDP (Alpha Vantage)").unwrap();
        assert_eq!(gdp.latest_value, 110.0);
        assert_eq!(gdp.latest_date, "2024-04-01");
        assert_eq!(gdp.change_pct, Some(10.0));
    }
}
