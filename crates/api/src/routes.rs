use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;
use wishlist_core::budget::{self, Suggestion};
use wishlist_core::domain::contract::{
    CreateItemRequest, ScrapeRequest, SettingsRequest, SuggestionRequest, UpdateItemRequest,
};
use wishlist_core::domain::error::ValidationError;
use wishlist_core::domain::item::{Item, PriceHistoryEntry};
use wishlist_core::domain::query::ItemQuery;
use wishlist_core::domain::settings::UserSettings;
use wishlist_core::fx::RateProvider;
use wishlist_core::scrape::{ProductScraper, ScrapedProduct};
use wishlist_core::storage::ItemStore;
use wishlist_core::tracking;

/// Collaborators are built once in `main` and shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Option<Arc<dyn ItemStore>>,
    pub scraper: Arc<dyn ProductScraper>,
    pub rates: Arc<dyn RateProvider>,
}

impl AppState {
    fn store(&self) -> Result<&dyn ItemStore, ApiError> {
        self.store.as_deref().ok_or(ApiError::Unavailable)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/:id",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route("/items/:id/refresh", post(refresh_item))
        .route("/items/:id/history", get(item_history))
        .route("/settings", get(get_settings).patch(update_settings))
        .route("/scrape", post(scrape_preview))
        .route("/budget/suggestions", post(budget_suggestions))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let items = state.store()?.list_items().await?;
    Ok(Json(query.apply(items)))
}

async fn create_item(
    State(state): State<AppState>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let store = state.store()?;
    let url = req.validated_url()?;

    let scraped = match url.as_deref() {
        Some(url) if req.needs_scrape() => {
            Some(state.scraper.scrape(url).await.map_err(ApiError::Upstream)?)
        }
        _ => None,
    };

    let settings = store.get_settings().await?;
    let mut new_item = req.validate_and_into_new_item(scraped, &settings.base_currency)?;
    new_item.price_in_base_currency = tracking::base_price_for(
        state.rates.as_ref(),
        new_item.current_price,
        &new_item.currency,
        &settings.base_currency,
    )
    .await;

    let item = store.add_item(new_item).await?;
    record_history(store, PriceHistoryEntry::observed(&item, item.created_at)).await;

    tracing::info!(item_id = %item.id, name = %item.name, "item added");
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Item>, ApiError> {
    let item = state
        .store()?
        .get_item(&id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(item))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<Item>, ApiError> {
    let mut patch = req.validate_and_into_patch()?;
    let store = state.store()?;
    let existing = store.get_item(&id).await?.ok_or(ApiError::NotFound)?;
    if patch.is_empty() {
        return Ok(Json(existing));
    }

    let price_moved = patch
        .current_price
        .is_some_and(|p| (p - existing.current_price).abs() >= 0.005)
        || patch
            .currency
            .as_ref()
            .is_some_and(|c| *c != existing.currency);

    if patch.touches_price() {
        let settings = store.get_settings().await?;
        let price = patch.current_price.unwrap_or(existing.current_price);
        let currency = patch
            .currency
            .clone()
            .unwrap_or_else(|| existing.currency.clone());
        patch.price_in_base_currency = Some(
            tracking::base_price_for(
                state.rates.as_ref(),
                price,
                &currency,
                &settings.base_currency,
            )
            .await,
        );
    }

    let item = store
        .update_item(&id, patch)
        .await?
        .ok_or(ApiError::NotFound)?;

    if price_moved {
        record_history(store, PriceHistoryEntry::observed(&item, item.updated_at)).await;
    }

    Ok(Json(item))
}

/// The item write has already succeeded, so a failed history append is only logged.
async fn record_history(store: &dyn ItemStore, entry: PriceHistoryEntry) {
    let item_id = entry.item_id.clone();
    if let Err(e) = store.record_price(entry).await {
        sentry_anyhow::capture_anyhow(&e);
        tracing::warn!(%item_id, error = %format!("{e:#}"), "price history append failed");
    }
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store()?.delete_item(&id).await? {
        tracing::info!(item_id = %id, "item deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    item: Item,
    previous_price: f64,
    changed: bool,
}

async fn refresh_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let store = state.store()?;
    let item = store.get_item(&id).await?.ok_or(ApiError::NotFound)?;
    if item.url.is_none() {
        return Err(ValidationError::MissingUrl.into());
    }

    let settings = store.get_settings().await?;
    let outcome = tracking::check_item(
        store,
        state.scraper.as_ref(),
        state.rates.as_ref(),
        &item,
        &settings.base_currency,
        Utc::now(),
    )
    .await
    .map_err(ApiError::Upstream)?;

    Ok(Json(RefreshResponse {
        item: outcome.item,
        previous_price: outcome.previous_price,
        changed: outcome.changed,
    }))
}

async fn item_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PriceHistoryEntry>>, ApiError> {
    let store = state.store()?;
    if store.get_item(&id).await?.is_none() {
        return Err(ApiError::NotFound);
    }
    Ok(Json(store.price_history(&id).await?))
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<UserSettings>, ApiError> {
    Ok(Json(state.store()?.get_settings().await?))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(req): Json<SettingsRequest>,
) -> Result<Json<UserSettings>, ApiError> {
    let patch = req.validate_and_into_patch()?;
    let store = state.store()?;

    let before = store.get_settings().await?;
    let after = store.set_settings(patch).await?;

    if after.base_currency != before.base_currency {
        tracing::info!(
            from = %before.base_currency,
            to = %after.base_currency,
            "base currency changed; converting prices"
        );
        tracking::convert_all(store, state.rates.as_ref(), &after.base_currency).await?;
    }

    Ok(Json(after))
}

async fn scrape_preview(
    State(state): State<AppState>,
    Json(req): Json<ScrapeRequest>,
) -> Result<Json<ScrapedProduct>, ApiError> {
    let url = req.validated_url()?;
    let product = state
        .scraper
        .scrape(&url)
        .await
        .map_err(ApiError::Upstream)?;
    Ok(Json(product))
}

#[derive(Debug, Serialize)]
struct SuggestionsResponse {
    suggestions: Vec<Suggestion>,
}

async fn budget_suggestions(
    State(state): State<AppState>,
    Json(req): Json<SuggestionRequest>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let (budget, currency) = req.validate()?;
    let store = state.store()?;

    // Converted prices are stored in the wishlist base currency only.
    let base_currency = store.get_settings().await?.base_currency;
    if currency != base_currency {
        return Err(ValidationError::CurrencyMismatch {
            requested: currency.to_string(),
            base: base_currency.to_string(),
        }
        .into());
    }

    let items = store.list_items().await?;

    let suggestions = budget::suggest(&items, budget, &currency);
    tracing::info!(
        budget,
        %currency,
        items = items.len(),
        suggestions = suggestions.len(),
        "budget suggestions computed"
    );

    Ok(Json(SuggestionsResponse { suggestions }))
}
