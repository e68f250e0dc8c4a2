use crate::domain::item::Item;
use serde::Deserialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Purchased,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Created,
    Priority,
    Price,
    Name,
    PriceChange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter and sort options for the item grid (`GET /items` query string).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemQuery {
    pub status: StatusFilter,
    pub min_priority: Option<u8>,
    pub search: Option<String>,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl ItemQuery {
    pub fn apply(&self, items: Vec<Item>) -> Vec<Item> {
        let needle = self
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut out: Vec<Item> = items
            .into_iter()
            .filter(|item| match self.status {
                StatusFilter::All => true,
                StatusFilter::Active => !item.is_purchased,
                StatusFilter::Purchased => item.is_purchased,
            })
            .filter(|item| {
                self.min_priority
                    .map_or(true, |min| item.priority.get() >= min)
            })
            .filter(|item| match &needle {
                Some(needle) => matches_search(item, needle),
                None => true,
            })
            .collect();

        // Stable sort so equal keys keep store order.
        out.sort_by(|a, b| {
            let ord = compare(self.sort, a, b);
            match self.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        out
    }
}

fn matches_search(item: &Item, needle: &str) -> bool {
    item.name.to_lowercase().contains(needle)
        || item
            .notes
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains(needle))
}

fn compare(key: SortKey, a: &Item, b: &Item) -> Ordering {
    match key {
        SortKey::Created => a.created_at.cmp(&b.created_at),
        SortKey::Priority => a.priority.cmp(&b.priority),
        SortKey::Price => comparable_price(a).total_cmp(&comparable_price(b)),
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::PriceChange => a.price_change().total_cmp(&b.price_change()),
    }
}

// Mixed currencies compare on the converted figure when one exists.
fn comparable_price(item: &Item) -> f64 {
    item.price_in_base_currency.unwrap_or(item.current_price)
}
