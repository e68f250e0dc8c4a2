use crate::domain::item::{Item, ItemPatch, NewItem, PriceHistoryEntry};
use crate::domain::settings::{SettingsPatch, UserSettings};
use crate::storage::{new_item_id, ItemStore};
use chrono::Utc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    items: Vec<Item>,
    settings: UserSettings,
    history: Vec<PriceHistoryEntry>,
}

/// Process-local store. Keeps insertion order, like the Postgres store's `created_at` order.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    state: Mutex<State>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            state: Mutex::new(State {
                items,
                ..State::default()
            }),
        }
    }
}

#[async_trait::async_trait]
impl ItemStore for MemoryItemStore {
    async fn list_items(&self) -> anyhow::Result<Vec<Item>> {
        Ok(self.state.lock().await.items.clone())
    }

    async fn get_item(&self, id: &str) -> anyhow::Result<Option<Item>> {
        let state = self.state.lock().await;
        Ok(state.items.iter().find(|i| i.id == id).cloned())
    }

    async fn add_item(&self, item: NewItem) -> anyhow::Result<Item> {
        let item = item.into_item(new_item_id(), Utc::now());
        self.state.lock().await.items.push(item.clone());
        Ok(item)
    }

    async fn update_item(&self, id: &str, patch: ItemPatch) -> anyhow::Result<Option<Item>> {
        let mut state = self.state.lock().await;
        let Some(item) = state.items.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        patch.apply(item, Utc::now());
        Ok(Some(item.clone()))
    }

    async fn delete_item(&self, id: &str) -> anyhow::Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.items.len();
        state.items.retain(|i| i.id != id);
        let removed = state.items.len() != before;
        if removed {
            state.history.retain(|h| h.item_id != id);
        }
        Ok(removed)
    }

    async fn get_settings(&self) -> anyhow::Result<UserSettings> {
        Ok(self.state.lock().await.settings.clone())
    }

    async fn set_settings(&self, patch: SettingsPatch) -> anyhow::Result<UserSettings> {
        let mut state = self.state.lock().await;
        patch.apply(&mut state.settings);
        Ok(state.settings.clone())
    }

    async fn record_price(&self, entry: PriceHistoryEntry) -> anyhow::Result<()> {
        self.state.lock().await.history.push(entry);
        Ok(())
    }

    async fn price_history(&self, item_id: &str) -> anyhow::Result<Vec<PriceHistoryEntry>> {
        let state = self.state.lock().await;
        let mut out: Vec<PriceHistoryEntry> = state
            .history
            .iter()
            .filter(|h| h.item_id == item_id)
            .cloned()
            .collect();
        out.sort_by_key(|h| h.checked_at);
        Ok(out)
    }
}
