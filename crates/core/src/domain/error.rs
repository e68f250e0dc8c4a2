use thiserror::Error;

/// Rejections raised while turning caller input into domain values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("priority must be between 1 and 5 (got {0})")]
    PriorityOutOfRange(i64),

    #[error("currency is required")]
    MissingCurrency,

    #[error("unknown currency code: {0}")]
    UnknownCurrency(String),

    #[error("budget is required")]
    MissingBudget,

    #[error("budget must be a positive number (got {0})")]
    InvalidBudget(String),

    #[error("price must be a non-negative number (got {0})")]
    InvalidPrice(f64),

    #[error("price is required when it cannot be scraped")]
    MissingPrice,

    #[error("name must be non-empty")]
    EmptyName,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("item has no url to check")]
    MissingUrl,

    #[error("budget currency {requested} does not match the wishlist base currency {base}")]
    CurrencyMismatch { requested: String, base: String },
}
