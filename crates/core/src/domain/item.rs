use crate::domain::currency::CurrencyCode;
use crate::domain::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User-assigned importance, 1 (lowest) to 5 (highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::PriorityOutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(3)
    }
}

impl TryFrom<i64> for Priority {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for i64 {
    fn from(value: Priority) -> Self {
        i64::from(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub priority: Priority,
    pub is_purchased: bool,
    pub current_price: f64,
    pub original_price: f64,
    pub currency: CurrencyCode,
    /// Converted by the exchange-rate refresh; `None` when unknown or the conversion failed.
    pub price_in_base_currency: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn price_change(&self) -> f64 {
        self.current_price - self.original_price
    }

    pub fn price_change_pct(&self) -> Option<f64> {
        if self.original_price > 0.0 {
            Some(self.price_change() / self.original_price * 100.0)
        } else {
            None
        }
    }
}

/// A validated item that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub priority: Priority,
    pub is_purchased: bool,
    pub current_price: f64,
    pub currency: CurrencyCode,
    pub price_in_base_currency: Option<f64>,
}

impl NewItem {
    pub fn into_item(self, id: String, now: DateTime<Utc>) -> Item {
        Item {
            id,
            name: self.name,
            url: self.url,
            image_url: self.image_url,
            notes: self.notes,
            priority: self.priority,
            is_purchased: self.is_purchased,
            current_price: self.current_price,
            original_price: self.current_price,
            currency: self.currency,
            price_in_base_currency: self.price_in_base_currency,
            created_at: now,
            updated_at: now,
            last_checked_at: None,
        }
    }
}

/// Partial update. For the nullable columns `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub url: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub is_purchased: Option<bool>,
    pub current_price: Option<f64>,
    pub currency: Option<CurrencyCode>,
    pub price_in_base_currency: Option<Option<f64>>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn touches_price(&self) -> bool {
        self.current_price.is_some() || self.currency.is_some()
    }

    pub fn apply(self, item: &mut Item, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            item.name = name;
        }
        if let Some(url) = self.url {
            item.url = url;
        }
        if let Some(image_url) = self.image_url {
            item.image_url = image_url;
        }
        if let Some(notes) = self.notes {
            item.notes = notes;
        }
        if let Some(priority) = self.priority {
            item.priority = priority;
        }
        if let Some(is_purchased) = self.is_purchased {
            item.is_purchased = is_purchased;
        }
        if let Some(price) = self.current_price {
            item.current_price = price;
        }
        if let Some(currency) = self.currency {
            item.currency = currency;
        }
        if let Some(base) = self.price_in_base_currency {
            item.price_in_base_currency = base;
        }
        if let Some(checked_at) = self.last_checked_at {
            item.last_checked_at = Some(checked_at);
        }
        item.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub item_id: String,
    pub price: f64,
    pub currency: CurrencyCode,
    pub checked_at: DateTime<Utc>,
}

impl PriceHistoryEntry {
    pub fn observed(item: &Item, checked_at: DateTime<Utc>) -> Self {
        Self {
            item_id: item.id.clone(),
            price: item.current_price,
            currency: item.currency.clone(),
            checked_at,
        }
    }
}
