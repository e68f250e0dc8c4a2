use chrono::Utc;
use std::time::Duration;
use wishlist_core::config::env_or;
use wishlist_core::domain::item::Item;
use wishlist_core::fx::RateProvider;
use wishlist_core::scrape::ProductScraper;
use wishlist_core::storage::ItemStore;
use wishlist_core::tracking;

pub const DEFAULT_DELAY_MS: u64 = 2_000;

#[derive(Debug, Clone)]
pub struct PriceCheckOptions {
    /// Pause between product pages so shops are not hammered.
    pub delay: Duration,

    /// Stop after this many items (useful for smoke runs).
    pub limit: Option<usize>,

    /// Scrape and log, but leave the store untouched.
    pub dry_run: bool,
}

impl Default for PriceCheckOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            limit: None,
            dry_run: false,
        }
    }
}

impl PriceCheckOptions {
    /// CLI flag wins, then the stored user setting, then `PRICE_CHECK_DELAY_MS`.
    pub fn resolve_delay(cli_ms: Option<u64>, stored_ms: Option<u64>) -> Duration {
        let ms = cli_ms
            .or(stored_ms)
            .unwrap_or_else(|| env_or("PRICE_CHECK_DELAY_MS", DEFAULT_DELAY_MS));
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceCheckSummary {
    pub checked: usize,
    pub changed: usize,
    pub failed: usize,
    pub skipped: usize,
}

fn is_trackable(item: &Item) -> bool {
    !item.is_purchased && item.url.is_some()
}

/// Walks every unpurchased item with a URL, one at a time. A failing item is
/// logged and counted; it never aborts the run.
pub async fn run_price_check(
    store: &dyn ItemStore,
    scraper: &dyn ProductScraper,
    rates: &dyn RateProvider,
    opts: &PriceCheckOptions,
) -> anyhow::Result<PriceCheckSummary> {
    let settings = store.get_settings().await?;
    let items = store.list_items().await?;

    let mut summary = PriceCheckSummary::default();
    let (trackable, rest): (Vec<Item>, Vec<Item>) = items.into_iter().partition(is_trackable);
    summary.skipped = rest.len();

    let take = opts.limit.unwrap_or(usize::MAX);
    // Items past the limit are reported as skipped.
    summary.skipped += trackable.len().saturating_sub(take);
    for (i, item) in trackable.iter().take(take).enumerate() {
        if i > 0 && !opts.delay.is_zero() {
            tokio::time::sleep(opts.delay).await;
        }

        if opts.dry_run {
            let Some(url) = item.url.as_deref() else {
                continue;
            };
            match scraper.scrape(url).await {
                Ok(product) => {
                    summary.checked += 1;
                    tracing::info!(
                        item_id = %item.id,
                        stored = item.current_price,
                        scraped = ?product.price,
                        dry_run = true,
                        "price check"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(item_id = %item.id, error = %format!("{e:#}"), "price check failed");
                }
            }
            continue;
        }

        match tracking::check_item(
            store,
            scraper,
            rates,
            item,
            &settings.base_currency,
            Utc::now(),
        )
        .await
        {
            Ok(outcome) => {
                summary.checked += 1;
                if outcome.changed {
                    summary.changed += 1;
                }
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(item_id = %item.id, error = %format!("{e:#}"), "price check failed");
            }
        }
    }

    tracing::info!(
        checked = summary.checked,
        changed = summary.changed,
        failed = summary.failed,
        skipped = summary.skipped,
        dry_run = opts.dry_run,
        "price check finished"
    );
    Ok(summary)
}
