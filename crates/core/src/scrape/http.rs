use crate::config::{env_or, Settings};
use crate::retry;
use crate::scrape::html::ProductExtractor;
use crate::scrape::{ProductScraper, ScrapedProduct};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Url;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_RETRIES: u32 = 2;
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct HttpScraper {
    http: reqwest::Client,
    extractor: ProductExtractor,
    retries: u32,
}

impl HttpScraper {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let user_agent = settings
            .scrape_user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent).context("invalid SCRAPE_USER_AGENT")?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.8"));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(env_or(
                "SCRAPE_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )))
            .default_headers(headers)
            .build()
            .context("failed to build scraper http client")?;

        Ok(Self {
            http,
            extractor: ProductExtractor::new()?,
            retries: env_or("SCRAPE_RETRIES", DEFAULT_RETRIES),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<(Url, String)> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("product page request failed: {url}"))?;

        let status = res.status();
        let final_url = res.url().clone();
        if !status.is_success() {
            anyhow::bail!("product page HTTP {status}: {url}");
        }

        let body = res
            .text()
            .await
            .context("failed to read product page body")?;
        Ok((final_url, body))
    }
}

#[async_trait::async_trait]
impl ProductScraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedProduct> {
        let (final_url, body) =
            retry::with_backoff("scrape", self.retries, || self.fetch_once(url)).await?;

        let product = self
            .extractor
            .extract(&body, &final_url)
            .with_context(|| format!("could not extract product from {final_url}"))?;

        tracing::debug!(
            %final_url,
            name = %product.name,
            price = ?product.price,
            currency = ?product.currency,
            "scraped product page"
        );
        Ok(product)
    }
}
