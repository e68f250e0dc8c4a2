//! Price tracking shared by the API and the worker: base-currency conversion
//! and the single-item price check.

use crate::domain::currency::CurrencyCode;
use crate::domain::error::ValidationError;
use crate::domain::item::{Item, ItemPatch, PriceHistoryEntry};
use crate::fx::{convert_price, RateProvider};
use crate::scrape::ProductScraper;
use crate::storage::ItemStore;
use anyhow::Context;
use chrono::{DateTime, Utc};

/// Prices closer than half a cent count as unchanged.
const PRICE_EPSILON: f64 = 0.005;

/// Converts a price into the base currency; failures are logged and yield `None`
/// so suggestions fall back to same-currency pricing.
pub async fn base_price_for(
    rates: &dyn RateProvider,
    price: f64,
    currency: &CurrencyCode,
    base_currency: &CurrencyCode,
) -> Option<f64> {
    match convert_price(rates, price, currency, base_currency).await {
        Ok(converted) => Some(converted),
        Err(e) => {
            tracing::warn!(
                %currency,
                %base_currency,
                error = %e,
                "price conversion failed; leaving base price empty"
            );
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceCheckOutcome {
    pub item: Item,
    pub previous_price: f64,
    pub changed: bool,
}

/// Scrapes `item`'s page, stores the new price (and a history entry) when it
/// moved, refreshes the base-currency figure and stamps `last_checked_at`.
pub async fn check_item(
    store: &dyn ItemStore,
    scraper: &dyn ProductScraper,
    rates: &dyn RateProvider,
    item: &Item,
    base_currency: &CurrencyCode,
    now: DateTime<Utc>,
) -> anyhow::Result<PriceCheckOutcome> {
    let url = item.url.as_deref().ok_or(ValidationError::MissingUrl)?;
    let scraped = scraper.scrape(url).await?;
    let price = scraped
        .price
        .with_context(|| format!("no price found on {url}"))?;
    let currency = scraped.currency.unwrap_or_else(|| item.currency.clone());

    let changed =
        (price - item.current_price).abs() >= PRICE_EPSILON || currency != item.currency;

    let converted = base_price_for(rates, price, &currency, base_currency).await;
    // Keep a stale conversion rather than none when the price itself did not move.
    let price_in_base_currency = match converted {
        Some(v) => Some(Some(v)),
        None if changed => Some(None),
        None => None,
    };

    let mut patch = ItemPatch {
        price_in_base_currency,
        last_checked_at: Some(now),
        ..Default::default()
    };
    if changed {
        patch.current_price = Some(price);
        patch.currency = Some(currency);
    }
    if item.image_url.is_none() && scraped.image_url.is_some() {
        patch.image_url = Some(scraped.image_url);
    }

    let updated = store
        .update_item(&item.id, patch)
        .await?
        .with_context(|| format!("item disappeared during price check (id={})", item.id))?;

    if changed {
        store
            .record_price(PriceHistoryEntry::observed(&updated, now))
            .await?;
        tracing::info!(
            item_id = %updated.id,
            previous = item.current_price,
            current = updated.current_price,
            currency = %updated.currency,
            "price changed"
        );
    }

    Ok(PriceCheckOutcome {
        item: updated,
        previous_price: item.current_price,
        changed,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub converted: usize,
    pub failed: usize,
}

/// Recomputes `price_in_base_currency` for every item. Failed conversions clear
/// the stored figure since it may be in a previous base currency.
pub async fn convert_all(
    store: &dyn ItemStore,
    rates: &dyn RateProvider,
    base_currency: &CurrencyCode,
) -> anyhow::Result<ConversionSummary> {
    let mut summary = ConversionSummary::default();
    for item in store.list_items().await? {
        let converted = base_price_for(rates, item.current_price, &item.currency, base_currency).await;
        if converted.is_some() {
            summary.converted += 1;
        } else {
            summary.failed += 1;
        }

        if converted == item.price_in_base_currency {
            continue;
        }
        store
            .update_item(
                &item.id,
                ItemPatch {
                    price_in_base_currency: Some(converted),
                    ..Default::default()
                },
            )
            .await?;
    }

    tracing::info!(
        %base_currency,
        converted = summary.converted,
        failed = summary.failed,
        "base prices refreshed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::fixtures::item;
    use crate::fx::StaticRates;
    use crate::scrape::ScrapedProduct;
    use crate::storage::memory::MemoryItemStore;
    use chrono::TimeZone;

    struct FixedScraper(ScrapedProduct);

    #[async_trait::async_trait]
    impl ProductScraper for FixedScraper {
        async fn scrape(&self, _url: &str) -> anyhow::Result<ScrapedProduct> {
            Ok(self.0.clone())
        }
    }

    fn tracked(id: &str, price: f64) -> Item {
        let mut i = item(id, 3, price);
        i.url = Some(format!("https://shop.example/{id}"));
        i
    }

    fn eur() -> CurrencyCode {
        CurrencyCode::parse("EUR").unwrap()
    }

    #[tokio::test]
    async fn price_drop_updates_item_and_history() {
        let store = MemoryItemStore::with_items(vec![tracked("a", 100.0)]);
        let scraper = FixedScraper(ScrapedProduct {
            name: "A".to_string(),
            price: Some(80.0),
            currency: None,
            image_url: Some("https://shop.example/a.jpg".to_string()),
        });
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let original = store.get_item("a").await.unwrap().unwrap();

        let out = check_item(
            &store,
            &scraper,
            &StaticRates::default(),
            &original,
            &CurrencyCode::usd(),
            now,
        )
        .await
        .unwrap();

        assert!(out.changed);
        assert_eq!(out.previous_price, 100.0);
        assert_eq!(out.item.current_price, 80.0);
        assert_eq!(out.item.original_price, 100.0);
        assert_eq!(out.item.price_in_base_currency, Some(80.0));
        assert_eq!(out.item.last_checked_at, Some(now));
        assert_eq!(out.item.image_url.as_deref(), Some("https://shop.example/a.jpg"));

        let history = store.price_history("a").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, 80.0);
    }

    #[tokio::test]
    async fn unchanged_price_keeps_stale_conversion_when_rates_fail() {
        let mut foreign = tracked("b", 50.0);
        foreign.currency = eur();
        foreign.price_in_base_currency = Some(54.0);
        let store = MemoryItemStore::with_items(vec![foreign.clone()]);
        let scraper = FixedScraper(ScrapedProduct {
            name: "B".to_string(),
            price: Some(50.0),
            currency: Some(eur()),
            image_url: None,
        });

        let out = check_item(
            &store,
            &scraper,
            &StaticRates::default(),
            &foreign,
            &CurrencyCode::usd(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(!out.changed);
        assert_eq!(out.item.price_in_base_currency, Some(54.0));
        assert!(store.price_history("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_url_or_price_is_an_error() {
        let store = MemoryItemStore::with_items(vec![item("c", 3, 10.0)]);
        let scraper = FixedScraper(ScrapedProduct {
            name: "C".to_string(),
            ..Default::default()
        });
        let rates = StaticRates::default();
        let usd = CurrencyCode::usd();

        let no_url = item("c", 3, 10.0);
        let err = check_item(&store, &scraper, &rates, &no_url, &usd, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::MissingUrl)
        );

        let with_url = tracked("c", 10.0);
        assert!(check_item(&store, &scraper, &rates, &with_url, &usd, Utc::now())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn convert_all_uses_rates_and_clears_failures() {
        let mut euro = item("eur", 3, 10.0);
        euro.currency = eur();
        euro.price_in_base_currency = None;
        let mut yen = item("jpy", 3, 1000.0);
        yen.currency = CurrencyCode::parse("JPY").unwrap();
        yen.price_in_base_currency = Some(6.5);
        let store = MemoryItemStore::with_items(vec![euro, yen, item("usd", 3, 5.0)]);
        let rates = StaticRates::default().with_rate("EUR", "USD", 1.1).unwrap();

        let summary = convert_all(&store, &rates, &CurrencyCode::usd()).await.unwrap();
        assert_eq!(summary, ConversionSummary { converted: 2, failed: 1 });

        let items = store.list_items().await.unwrap();
        assert_eq!(items[0].price_in_base_currency, Some(11.0));
        assert_eq!(items[1].price_in_base_currency, None);
        assert_eq!(items[2].price_in_base_currency, Some(5.0));
    }
}
