use crate::domain::currency::CurrencyCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub base_currency: CurrencyCode,
    /// Overrides `PRICE_CHECK_DELAY_MS` for the scheduled price check.
    pub price_check_delay_ms: Option<u64>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            base_currency: CurrencyCode::usd(),
            price_check_delay_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub base_currency: Option<CurrencyCode>,
    pub price_check_delay_ms: Option<Option<u64>>,
}

impl SettingsPatch {
    pub fn apply(self, settings: &mut UserSettings) {
        if let Some(base_currency) = self.base_currency {
            settings.base_currency = base_currency;
        }
        if let Some(delay) = self.price_check_delay_ms {
            settings.price_check_delay_ms = delay;
        }
    }
}
