use crate::domain::currency::CurrencyCode;
use crate::domain::error::ValidationError;
use crate::domain::item::{ItemPatch, NewItem, Priority};
use crate::domain::money::{positive_decimal, representable_price};
use crate::domain::settings::SettingsPatch;
use crate::scrape::ScrapedProduct;
use serde::Deserialize;
use serde_json::Value;

/// Body of `POST /items`. Either manual fields, a product URL, or both
/// (manual fields win over scraped ones).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateItemRequest {
    pub url: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub priority: Option<i64>,
    pub current_price: Option<f64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub is_purchased: bool,
}

impl CreateItemRequest {
    pub fn validated_url(&self) -> Result<Option<String>, ValidationError> {
        normalize_url(self.url.as_deref())
    }

    pub fn needs_scrape(&self) -> bool {
        let has_url = trimmed(self.url.as_deref()).is_some();
        let has_name = trimmed(self.name.as_deref()).is_some();
        has_url && (!has_name || self.current_price.is_none())
    }

    pub fn validate_and_into_new_item(
        self,
        scraped: Option<ScrapedProduct>,
        default_currency: &CurrencyCode,
    ) -> Result<NewItem, ValidationError> {
        let url = self.validated_url()?;
        let scraped = scraped.unwrap_or_default();

        let name = trimmed(self.name.as_deref())
            .or_else(|| trimmed(Some(scraped.name.as_str())))
            .ok_or(ValidationError::EmptyName)?;

        let current_price = self
            .current_price
            .or(scraped.price)
            .ok_or(ValidationError::MissingPrice)?;
        validate_price(current_price)?;

        let currency = match trimmed(self.currency.as_deref()) {
            Some(code) => CurrencyCode::parse(&code)?,
            None => scraped.currency.unwrap_or_else(|| default_currency.clone()),
        };

        let priority = match self.priority {
            Some(p) => Priority::new(p)?,
            None => Priority::default(),
        };

        Ok(NewItem {
            name,
            url,
            image_url: trimmed(self.image_url.as_deref()).or(scraped.image_url),
            notes: trimmed(self.notes.as_deref()),
            priority,
            is_purchased: self.is_purchased,
            current_price,
            currency,
            price_in_base_currency: None,
        })
    }
}

/// Body of `PATCH /items/:id`. Empty strings clear the optional text fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub priority: Option<i64>,
    pub is_purchased: Option<bool>,
    pub current_price: Option<f64>,
    pub currency: Option<String>,
}

impl UpdateItemRequest {
    pub fn validate_and_into_patch(self) -> Result<ItemPatch, ValidationError> {
        let name = match self.name {
            Some(name) => Some(trimmed(Some(name.as_str())).ok_or(ValidationError::EmptyName)?),
            None => None,
        };

        let url = match self.url {
            Some(url) => Some(normalize_url(Some(url.as_str()))?),
            None => None,
        };

        if let Some(price) = self.current_price {
            validate_price(price)?;
        }

        Ok(ItemPatch {
            name,
            url,
            image_url: self.image_url.map(|s| trimmed(Some(s.as_str()))),
            notes: self.notes.map(|s| trimmed(Some(s.as_str()))),
            priority: self.priority.map(Priority::new).transpose()?,
            is_purchased: self.is_purchased,
            current_price: self.current_price,
            currency: self
                .currency
                .as_deref()
                .map(CurrencyCode::parse)
                .transpose()?,
            price_in_base_currency: None,
            last_checked_at: None,
        })
    }
}

/// Body of `POST /budget/suggestions`. Budget is accepted as a number or a
/// numeric string, the way HTML forms submit it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuggestionRequest {
    pub budget: Option<Value>,
    pub currency: Option<String>,
}

impl SuggestionRequest {
    pub fn validate(&self) -> Result<(f64, CurrencyCode), ValidationError> {
        let budget = match &self.budget {
            None | Some(Value::Null) => return Err(ValidationError::MissingBudget),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };

        let budget = budget
            .filter(|b| positive_decimal(*b).is_some())
            .ok_or_else(|| {
                ValidationError::InvalidBudget(
                    self.budget
                        .as_ref()
                        .map(Value::to_string)
                        .unwrap_or_default(),
                )
            })?;

        let currency = trimmed(self.currency.as_deref()).ok_or(ValidationError::MissingCurrency)?;
        Ok((budget, CurrencyCode::parse(&currency)?))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsRequest {
    pub base_currency: Option<String>,
    pub price_check_delay_ms: Option<u64>,
}

impl SettingsRequest {
    pub fn validate_and_into_patch(self) -> Result<SettingsPatch, ValidationError> {
        Ok(SettingsPatch {
            base_currency: self
                .base_currency
                .as_deref()
                .map(CurrencyCode::parse)
                .transpose()?,
            price_check_delay_ms: self.price_check_delay_ms.map(Some),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
}

impl ScrapeRequest {
    pub fn validated_url(&self) -> Result<String, ValidationError> {
        normalize_url(Some(self.url.as_str()))?
            .ok_or_else(|| ValidationError::InvalidUrl(self.url.clone()))
    }
}

fn trimmed(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn validate_price(price: f64) -> Result<(), ValidationError> {
    if price.is_finite() && price >= 0.0 && representable_price(price) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPrice(price))
    }
}

fn normalize_url(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = trimmed(raw) else {
        return Ok(None);
    };

    let parsed =
        reqwest::Url::parse(&raw).map_err(|_| ValidationError::InvalidUrl(raw.clone()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(Some(parsed.to_string())),
        _ => Err(ValidationError::InvalidUrl(raw)),
    }
}
