pub mod html;
pub mod http;

use crate::domain::currency::CurrencyCode;
use serde::{Deserialize, Serialize};

/// What a product page yields. Price and currency are optional because many
/// shops only expose them to scripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedProduct {
    pub name: String,
    pub price: Option<f64>,
    pub currency: Option<CurrencyCode>,
    pub image_url: Option<String>,
}

#[async_trait::async_trait]
pub trait ProductScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> anyhow::Result<ScrapedProduct>;
}
