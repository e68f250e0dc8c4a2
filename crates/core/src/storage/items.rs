use crate::domain::currency::CurrencyCode;
use crate::domain::error::ValidationError;
use crate::domain::item::{Item, ItemPatch, NewItem, PriceHistoryEntry, Priority};
use crate::domain::settings::{SettingsPatch, UserSettings};
use crate::storage::{new_item_id, ItemStore};
use anyhow::Context;
use chrono::{DateTime, Utc};

const ITEM_COLUMNS: &str = "id, name, url, image_url, notes, priority, is_purchased, \
     current_price, original_price, currency, price_in_base_currency, \
     created_at, updated_at, last_checked_at";

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: String,
    name: String,
    url: Option<String>,
    image_url: Option<String>,
    notes: Option<String>,
    priority: i16,
    is_purchased: bool,
    current_price: f64,
    original_price: f64,
    currency: String,
    price_in_base_currency: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_checked_at: Option<DateTime<Utc>>,
}

impl TryFrom<ItemRow> for Item {
    type Error = ValidationError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Item {
            priority: Priority::new(i64::from(row.priority))?,
            currency: CurrencyCode::parse(&row.currency)?,
            id: row.id,
            name: row.name,
            url: row.url,
            image_url: row.image_url,
            notes: row.notes,
            is_purchased: row.is_purchased,
            current_price: row.current_price,
            original_price: row.original_price,
            price_in_base_currency: row.price_in_base_currency,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_checked_at: row.last_checked_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgItemStore {
    pool: sqlx::PgPool,
}

impl PgItemStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ItemStore for PgItemStore {
    async fn list_items(&self) -> anyhow::Result<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at ASC, id ASC"
        ))
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .context("select items failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match Item::try_from(row) {
                Ok(item) => out.push(item),
                Err(e) => tracing::warn!(%id, error = %e, "skipping malformed item row"),
            }
        }
        Ok(out)
    }

    async fn get_item(&self, id: &str) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select item failed (id={id})"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        match Item::try_from(row) {
            Ok(item) => Ok(Some(item)),
            Err(e) => {
                tracing::warn!(%id, error = %e, "item row is malformed; treating as missing");
                Ok(None)
            }
        }
    }

    async fn add_item(&self, item: NewItem) -> anyhow::Result<Item> {
        let item = item.into_item(new_item_id(), Utc::now());

        sqlx::query(
            "INSERT INTO items (id, name, url, image_url, notes, priority, is_purchased, \
               current_price, original_price, currency, price_in_base_currency, \
               created_at, updated_at, last_checked_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.url)
        .bind(&item.image_url)
        .bind(&item.notes)
        .bind(i16::from(item.priority.get()))
        .bind(item.is_purchased)
        .bind(item.current_price)
        .bind(item.original_price)
        .bind(item.currency.as_str())
        .bind(item.price_in_base_currency)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.last_checked_at)
        .execute(&self.pool)
        .await
        .context("insert items failed")?;

        Ok(item)
    }

    async fn update_item(&self, id: &str, patch: ItemPatch) -> anyhow::Result<Option<Item>> {
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("select item for update failed (id={id})"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut item = Item::try_from(row)
            .with_context(|| format!("item row is malformed (id={id})"))?;
        patch.apply(&mut item, Utc::now());

        sqlx::query(
            "UPDATE items SET name = $2, url = $3, image_url = $4, notes = $5, priority = $6, \
               is_purchased = $7, current_price = $8, currency = $9, \
               price_in_base_currency = $10, updated_at = $11, last_checked_at = $12 \
             WHERE id = $1",
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.url)
        .bind(&item.image_url)
        .bind(&item.notes)
        .bind(i16::from(item.priority.get()))
        .bind(item.is_purchased)
        .bind(item.current_price)
        .bind(item.currency.as_str())
        .bind(item.price_in_base_currency)
        .bind(item.updated_at)
        .bind(item.last_checked_at)
        .execute(&mut *tx)
        .await
        .context("update items failed")?;

        tx.commit().await.context("commit transaction failed")?;
        Ok(Some(item))
    }

    async fn delete_item(&self, id: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete item failed (id={id})"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn get_settings(&self) -> anyhow::Result<UserSettings> {
        let row = sqlx::query_as::<_, (String, Option<i64>)>(
            "SELECT base_currency, price_check_delay_ms FROM user_settings WHERE id = 1",
        )
        .persistent(false)
        .fetch_optional(&self.pool)
        .await
        .context("select user_settings failed")?;

        let Some((base_currency, delay_ms)) = row else {
            return Ok(UserSettings::default());
        };

        let base_currency = CurrencyCode::parse(&base_currency).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "stored base currency is invalid; using default");
            CurrencyCode::default()
        });

        Ok(UserSettings {
            base_currency,
            price_check_delay_ms: delay_ms.and_then(|d| u64::try_from(d).ok()),
        })
    }

    async fn set_settings(&self, patch: SettingsPatch) -> anyhow::Result<UserSettings> {
        let mut settings = self.get_settings().await?;
        patch.apply(&mut settings);

        let delay_ms = settings
            .price_check_delay_ms
            .map(i64::try_from)
            .transpose()
            .context("price_check_delay_ms out of range")?;

        sqlx::query(
            "INSERT INTO user_settings (id, base_currency, price_check_delay_ms, updated_at) \
             VALUES (1, $1, $2, now()) \
             ON CONFLICT (id) DO UPDATE \
               SET base_currency = EXCLUDED.base_currency, \
                   price_check_delay_ms = EXCLUDED.price_check_delay_ms, \
                   updated_at = EXCLUDED.updated_at",
        )
        .bind(settings.base_currency.as_str())
        .bind(delay_ms)
        .execute(&self.pool)
        .await
        .context("upsert user_settings failed")?;

        Ok(settings)
    }

    async fn record_price(&self, entry: PriceHistoryEntry) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO price_history (item_id, price, currency, checked_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .persistent(false)
        .bind(&entry.item_id)
        .bind(entry.price)
        .bind(entry.currency.as_str())
        .bind(entry.checked_at)
        .execute(&self.pool)
        .await
        .context("insert price_history failed")?;
        Ok(())
    }

    async fn price_history(&self, item_id: &str) -> anyhow::Result<Vec<PriceHistoryEntry>> {
        let rows = sqlx::query_as::<_, (f64, String, DateTime<Utc>)>(
            "SELECT price, currency, checked_at FROM price_history \
             WHERE item_id = $1 \
             ORDER BY checked_at ASC, id ASC",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select price_history failed (item_id={item_id})"))?;

        let mut out = Vec::with_capacity(rows.len());
        for (price, currency, checked_at) in rows {
            let Ok(currency) = CurrencyCode::parse(&currency) else {
                tracing::warn!(%item_id, %currency, "skipping price history row with bad currency");
                continue;
            };
            out.push(PriceHistoryEntry {
                item_id: item_id.to_string(),
                price,
                currency,
                checked_at,
            });
        }
        Ok(out)
    }
}
