use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wishlist_core::config::Settings;
use wishlist_core::fx::{CachedRateProvider, HttpRateProvider, RateProvider};
use wishlist_core::scrape::http::HttpScraper;
use wishlist_core::storage::items::PgItemStore;
use wishlist_core::storage::lock::{self, Job};
use wishlist_core::storage::ItemStore;
use wishlist_core::tracking;

mod price_check;

use price_check::PriceCheckOptions;

#[derive(Debug, Parser)]
#[command(name = "wishlist_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Re-scrape every unpurchased item that has a URL and record price changes.
    CheckPrices {
        /// Scrape and log, but do not write to the database.
        #[arg(long)]
        dry_run: bool,

        /// Pause between items in milliseconds. Defaults to the stored setting, then
        /// PRICE_CHECK_DELAY_MS.
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Check at most this many items.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Recompute every item's price in the current base currency.
    ConvertPrices {
        #[arg(long)]
        dry_run: bool,
    },
}

impl Command {
    fn job(&self) -> Job {
        match self {
            Command::CheckPrices { .. } => Job::PriceCheck,
            Command::ConvertPrices { .. } => Job::ConvertPrices,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&settings, args.command).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(settings: &Settings, command: Command) -> anyhow::Result<()> {
    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    wishlist_core::storage::migrate(&pool).await?;

    let job = command.job();
    let Some(job_lock) = lock::try_acquire_job_lock(&pool, job).await? else {
        tracing::warn!(job = job.as_str(), "job lock not acquired; another run in progress");
        return Ok(());
    };

    let store = PgItemStore::new(pool.clone());
    let rates = CachedRateProvider::new(Arc::new(HttpRateProvider::from_settings(settings)?));

    let result = match command {
        Command::CheckPrices {
            dry_run,
            delay_ms,
            limit,
        } => {
            let scraper = HttpScraper::from_settings(settings)?;
            let stored = store.get_settings().await?;
            let opts = PriceCheckOptions {
                delay: PriceCheckOptions::resolve_delay(delay_ms, stored.price_check_delay_ms),
                limit,
                dry_run,
            };
            tracing::info!(
                delay_ms = opts.delay.as_millis() as u64,
                limit = ?opts.limit,
                dry_run,
                "starting price check"
            );
            price_check::run_price_check(&store, &scraper, &rates, &opts)
                .await
                .map(|_| ())
        }
        Command::ConvertPrices { dry_run } => convert_prices(&store, &rates, dry_run).await,
    };

    if let Err(e) = job_lock.release().await {
        tracing::warn!(job = job.as_str(), error = %e, "job lock release failed");
    }
    result
}

async fn convert_prices(
    store: &dyn ItemStore,
    rates: &dyn RateProvider,
    dry_run: bool,
) -> anyhow::Result<()> {
    let base_currency = store.get_settings().await?.base_currency;

    if dry_run {
        for item in store.list_items().await? {
            let converted =
                tracking::base_price_for(rates, item.current_price, &item.currency, &base_currency)
                    .await;
            tracing::info!(
                item_id = %item.id,
                price = item.current_price,
                currency = %item.currency,
                stored = ?item.price_in_base_currency,
                converted = ?converted,
                %base_currency,
                dry_run = true,
                "base price"
            );
        }
        return Ok(());
    }

    tracking::convert_all(store, rates, &base_currency).await?;
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_check_prices_flags() {
        let args = Args::try_parse_from([
            "wishlist_worker",
            "check-prices",
            "--dry-run",
            "--delay-ms",
            "250",
            "--limit",
            "3",
        ])
        .unwrap();
        match args.command {
            Command::CheckPrices {
                dry_run,
                delay_ms,
                limit,
            } => {
                assert!(dry_run);
                assert_eq!(delay_ms, Some(250));
                assert_eq!(limit, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn convert_prices_maps_to_its_own_lock() {
        let args = Args::try_parse_from(["wishlist_worker", "convert-prices"]).unwrap();
        assert_eq!(args.command.job(), Job::ConvertPrices);
        assert!(Args::try_parse_from(["wishlist_worker"]).is_err());
    }
}
