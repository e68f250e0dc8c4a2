pub mod items;
pub mod lock;
pub mod memory;

use crate::domain::item::{Item, ItemPatch, NewItem, PriceHistoryEntry};
use crate::domain::settings::{SettingsPatch, UserSettings};
use anyhow::Context;

/// Persistence seam for items, price history and user settings.
#[async_trait::async_trait]
pub trait ItemStore: Send + Sync {
    async fn list_items(&self) -> anyhow::Result<Vec<Item>>;

    async fn get_item(&self, id: &str) -> anyhow::Result<Option<Item>>;

    async fn add_item(&self, item: NewItem) -> anyhow::Result<Item>;

    /// Returns `None` when no item has this id.
    async fn update_item(&self, id: &str, patch: ItemPatch) -> anyhow::Result<Option<Item>>;

    /// Returns whether an item was removed.
    async fn delete_item(&self, id: &str) -> anyhow::Result<bool>;

    async fn get_settings(&self) -> anyhow::Result<UserSettings>;

    async fn set_settings(&self, patch: SettingsPatch) -> anyhow::Result<UserSettings>;

    async fn record_price(&self, entry: PriceHistoryEntry) -> anyhow::Result<()>;

    /// Oldest first.
    async fn price_history(&self, item_id: &str) -> anyhow::Result<Vec<PriceHistoryEntry>>;
}

pub fn new_item_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
