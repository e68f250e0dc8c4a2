use crate::config::{env_or, Settings};
use crate::domain::currency::CurrencyCode;
use crate::domain::money::round_cents_f64;
use crate::retry;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://open.er-api.com/v6";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RETRIES: u32 = 3;

#[async_trait::async_trait]
pub trait RateProvider: Send + Sync {
    /// Units of `to` per one unit of `from`.
    async fn rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<f64>;
}

#[derive(Debug, Clone, Deserialize)]
struct LatestRatesResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default, alias = "base")]
    base_code: Option<String>,
    #[serde(default, alias = "conversion_rates")]
    rates: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct HttpRateProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retries: u32,
}

impl HttpRateProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .fx_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(env_or(
                "FX_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )))
            .build()
            .context("failed to build exchange-rate http client")?;

        Ok(Self {
            http,
            base_url,
            api_key: settings.fx_api_key.clone(),
            retries: env_or("FX_RETRIES", DEFAULT_RETRIES),
        })
    }

    fn url(&self, from: &CurrencyCode) -> String {
        format!("{}/latest/{}", self.base_url.trim_end_matches('/'), from)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {api_key}"))?,
            );
        }
        Ok(headers)
    }

    async fn fetch_once(&self, from: &CurrencyCode) -> Result<LatestRatesResponse> {
        let res = self
            .http
            .get(self.url(from))
            .headers(self.headers()?)
            .send()
            .await
            .context("exchange-rate request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read exchange-rate response")?;
        if !status.is_success() {
            anyhow::bail!("exchange-rate HTTP {status}: {text}");
        }

        parse_latest(&text, from)
    }
}

fn parse_latest(text: &str, from: &CurrencyCode) -> Result<LatestRatesResponse> {
    let parsed = serde_json::from_str::<LatestRatesResponse>(text)
        .with_context(|| format!("exchange-rate response is not valid JSON: {text}"))?;

    if let Some(result) = parsed.result.as_deref() {
        anyhow::ensure!(
            result.eq_ignore_ascii_case("success"),
            "exchange-rate provider returned result={result}"
        );
    }
    if let Some(base) = parsed.base_code.as_deref() {
        anyhow::ensure!(
            base.eq_ignore_ascii_case(from.as_str()),
            "exchange-rate base mismatch: expected {from}, got {base}"
        );
    }
    Ok(parsed)
}

fn pick_rate(resp: &LatestRatesResponse, from: &CurrencyCode, to: &CurrencyCode) -> Result<f64> {
    let rate = resp
        .rates
        .get(to.as_str())
        .copied()
        .with_context(|| format!("no exchange rate for {from}->{to}"))?;
    anyhow::ensure!(
        rate.is_finite() && rate > 0.0,
        "invalid exchange rate for {from}->{to}: {rate}"
    );
    Ok(rate)
}

#[async_trait::async_trait]
impl RateProvider for HttpRateProvider {
    async fn rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<f64> {
        if from == to {
            return Ok(1.0);
        }

        let resp = retry::with_backoff("exchange_rate", self.retries, || self.fetch_once(from)).await?;
        pick_rate(&resp, from, to)
    }
}

/// Memoises rates for the lifetime of the wrapper (one job run).
pub struct CachedRateProvider {
    inner: Arc<dyn RateProvider>,
    cache: tokio::sync::Mutex<HashMap<(CurrencyCode, CurrencyCode), f64>>,
}

impl CachedRateProvider {
    pub fn new(inner: Arc<dyn RateProvider>) -> Self {
        Self {
            inner,
            cache: tokio::sync::Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl RateProvider for CachedRateProvider {
    async fn rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<f64> {
        let key = (from.clone(), to.clone());
        let mut cache = self.cache.lock().await;
        if let Some(rate) = cache.get(&key) {
            return Ok(*rate);
        }

        let rate = self.inner.rate(from, to).await?;
        cache.insert(key, rate);
        Ok(rate)
    }
}

/// Converts `price` from one currency to another, rounded to cents.
pub async fn convert_price(
    rates: &dyn RateProvider,
    price: f64,
    from: &CurrencyCode,
    to: &CurrencyCode,
) -> Result<f64> {
    anyhow::ensure!(
        price.is_finite() && price >= 0.0,
        "cannot convert invalid price {price}"
    );
    if from == to {
        return Ok(round_cents_f64(price));
    }

    let rate = rates.rate(from, to).await?;
    Ok(round_cents_f64(price * rate))
}

/// Fixed rate table for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    rates: HashMap<(CurrencyCode, CurrencyCode), f64>,
}

impl StaticRates {
    pub fn with_rate(mut self, from: &str, to: &str, rate: f64) -> Result<Self> {
        let from = CurrencyCode::parse(from)?;
        let to = CurrencyCode::parse(to)?;
        self.rates.insert((from, to), rate);
        Ok(self)
    }
}

#[async_trait::async_trait]
impl RateProvider for StaticRates {
    async fn rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<f64> {
        if from == to {
            return Ok(1.0);
        }
        self.rates
            .get(&(from.clone(), to.clone()))
            .copied()
            .with_context(|| format!("no exchange rate for {from}->{to}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::parse(s).unwrap()
    }

    #[test]
    fn parses_open_er_api_shape() {
        let text = r#"{"result":"success","base_code":"EUR","rates":{"USD":1.0825,"EUR":1}}"#;
        let resp = parse_latest(text, &code("EUR")).unwrap();
        assert_eq!(pick_rate(&resp, &code("EUR"), &code("USD")).unwrap(), 1.0825);
        assert!(pick_rate(&resp, &code("EUR"), &code("JPY")).is_err());
    }

    #[test]
    fn rejects_error_results_and_base_mismatch() {
        let err = r#"{"result":"error","error-type":"unsupported-code"}"#;
        assert!(parse_latest(err, &code("EUR")).is_err());

        let wrong_base = r#"{"result":"success","base_code":"GBP","rates":{"USD":1.2}}"#;
        assert!(parse_latest(wrong_base, &code("EUR")).is_err());
    }

    #[tokio::test]
    async fn convert_price_rounds_to_cents() {
        let rates = StaticRates::default().with_rate("EUR", "USD", 1.0825).unwrap();
        let out = convert_price(&rates, 19.99, &code("EUR"), &code("USD"))
            .await
            .unwrap();
        assert_eq!(out, 21.64);

        let same = convert_price(&rates, 5.005, &code("USD"), &code("USD"))
            .await
            .unwrap();
        assert_eq!(same, 5.01);

        assert!(convert_price(&rates, 1.0, &code("GBP"), &code("USD")).await.is_err());
        assert!(convert_price(&rates, -1.0, &code("EUR"), &code("USD")).await.is_err());
    }

    struct CountingRates(AtomicU32);

    #[async_trait::async_trait]
    impl RateProvider for CountingRates {
        async fn rate(&self, _from: &CurrencyCode, _to: &CurrencyCode) -> Result<f64> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(2.0)
        }
    }

    #[tokio::test]
    async fn cached_provider_fetches_each_pair_once() {
        let inner = Arc::new(CountingRates(AtomicU32::new(0)));
        let cached = CachedRateProvider::new(inner.clone());

        for _ in 0..3 {
            assert_eq!(cached.rate(&code("EUR"), &code("USD")).await.unwrap(), 2.0);
        }
        cached.rate(&code("GBP"), &code("USD")).await.unwrap();

        assert_eq!(inner.0.load(Ordering::SeqCst), 2);
    }
}
