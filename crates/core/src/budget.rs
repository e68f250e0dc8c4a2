//! Budget suggestions: given a wishlist and a budget, propose up to three
//! distinct purchase plans, each produced by a different greedy heuristic.
//!
//! The engine is pure. Items it cannot price in the base currency are
//! skipped rather than reported as errors.

use crate::domain::currency::CurrencyCode;
use crate::domain::item::Item;
use crate::domain::money::{positive_decimal, round_cents};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Most wanted first, whatever it leaves room for.
    HighPriority,
    /// Cheapest first, maximising item count.
    MostItems,
    /// Highest priority per unit of price first.
    BestValue,
}

impl Strategy {
    /// Evaluation order; also the tie-break order when strategies agree.
    pub const ALL: [Strategy; 3] = [
        Strategy::HighPriority,
        Strategy::MostItems,
        Strategy::BestValue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::HighPriority => "high-priority",
            Strategy::MostItems => "most-items",
            Strategy::BestValue => "best-value",
        }
    }

    fn order(self, candidates: &mut [Candidate<'_>]) {
        // `sort_by` is stable: ties keep input order.
        match self {
            Strategy::HighPriority => {
                candidates.sort_by(|a, b| b.item.priority.cmp(&a.item.priority))
            }
            Strategy::MostItems => candidates.sort_by(|a, b| a.price.cmp(&b.price)),
            Strategy::BestValue => {
                candidates.sort_by(|a, b| b.value_ratio().cmp(&a.value_ratio()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub strategy: Strategy,
    /// In selection order.
    pub items: Vec<Item>,
    pub total_cost: f64,
    pub priority_score: u32,
    pub remaining: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    item: &'a Item,
    price: Decimal,
}

impl Candidate<'_> {
    fn value_ratio(&self) -> Decimal {
        Decimal::from(self.item.priority.get())
            .checked_div(self.price)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Resolves the price of `item` in `base_currency`.
///
/// The converted figure wins when it is a positive finite number. Otherwise an
/// item already priced in the base currency falls back to its own price, so a
/// failed conversion does not hide it. Anything else has no price.
pub fn effective_price(item: &Item, base_currency: &CurrencyCode) -> Option<Decimal> {
    if let Some(converted) = item.price_in_base_currency.and_then(positive_decimal) {
        return Some(converted);
    }

    if item.currency == *base_currency {
        return positive_decimal(item.current_price);
    }

    None
}

pub fn suggest(items: &[Item], budget: f64, base_currency: &CurrencyCode) -> Vec<Suggestion> {
    let Some(budget) = positive_decimal(budget) else {
        return Vec::new();
    };

    let eligible: Vec<Candidate<'_>> = items
        .iter()
        .filter(|item| !item.is_purchased)
        .filter_map(|item| {
            effective_price(item, base_currency).map(|price| Candidate { item, price })
        })
        .filter(|c| c.price <= budget)
        .collect();

    if eligible.is_empty() {
        return Vec::new();
    }

    let mut kept_sets: Vec<BTreeSet<&str>> = Vec::with_capacity(Strategy::ALL.len());
    let mut out = Vec::with_capacity(Strategy::ALL.len());

    for strategy in Strategy::ALL {
        let mut ordered = eligible.clone();
        strategy.order(&mut ordered);

        let selection = greedy_fill(&ordered, budget);
        if selection.is_empty() {
            continue;
        }

        let ids: BTreeSet<&str> = selection.iter().map(|c| c.item.id.as_str()).collect();
        if kept_sets.contains(&ids) {
            continue;
        }
        kept_sets.push(ids);

        out.push(build_suggestion(strategy, &selection, budget));
    }

    out
}

fn greedy_fill<'a>(ordered: &[Candidate<'a>], budget: Decimal) -> Vec<Candidate<'a>> {
    let mut remaining = budget;
    let mut picked = Vec::new();
    for candidate in ordered {
        if candidate.price <= remaining {
            remaining -= candidate.price;
            picked.push(*candidate);
        }
    }
    picked
}

fn build_suggestion(strategy: Strategy, selection: &[Candidate<'_>], budget: Decimal) -> Suggestion {
    // Sum exactly, round once.
    let total: Decimal = selection.iter().map(|c| c.price).sum();
    let priority_score = selection
        .iter()
        .map(|c| u32::from(c.item.priority.get()))
        .sum();

    Suggestion {
        strategy,
        items: selection.iter().map(|c| c.item.clone()).collect(),
        total_cost: round_cents(total),
        priority_score,
        remaining: round_cents(budget - total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::fixtures::item;

    fn usd() -> CurrencyCode {
        CurrencyCode::usd()
    }

    fn ids(s: &Suggestion) -> Vec<&str> {
        s.items.iter().map(|i| i.id.as_str()).collect()
    }

    fn scenario_one() -> Vec<Item> {
        vec![item("A", 5, 90.0), item("B", 4, 40.0), item("C", 3, 40.0)]
    }

    #[test]
    fn empty_input_yields_no_suggestions() {
        assert!(suggest(&[], 100.0, &usd()).is_empty());
    }

    #[test]
    fn purchased_items_are_never_suggested() {
        let mut items = scenario_one();
        for i in &mut items {
            i.is_purchased = true;
        }
        assert!(suggest(&items, 100.0, &usd()).is_empty());
    }

    #[test]
    fn items_over_budget_are_excluded() {
        let items = vec![item("a", 5, 120.0), item("b", 1, 100.01)];
        assert!(suggest(&items, 100.0, &usd()).is_empty());
    }

    #[test]
    fn exact_budget_fit_is_included() {
        let items = vec![item("a", 2, 100.0)];
        let out = suggest(&items, 100.0, &usd());
        assert_eq!(out.len(), 1);
        assert_eq!(ids(&out[0]), vec!["a"]);
        assert_eq!(out[0].total_cost, 100.0);
        assert_eq!(out[0].remaining, 0.0);
    }

    #[test]
    fn most_items_takes_exact_fit_with_zero_remaining() {
        let items = vec![item("exact", 1, 100.0), item("over", 5, 100.5)];
        let budget = Decimal::from(100);
        let mut candidates: Vec<Candidate<'_>> = items
            .iter()
            .filter_map(|i| effective_price(i, &usd()).map(|price| Candidate { item: i, price }))
            .filter(|c| c.price <= budget)
            .collect();
        Strategy::MostItems.order(&mut candidates);

        let selection = greedy_fill(&candidates, budget);
        let s = build_suggestion(Strategy::MostItems, &selection, budget);
        assert_eq!(ids(&s), vec!["exact"]);
        assert_eq!(s.total_cost, 100.0);
        assert_eq!(s.remaining, 0.0);
    }

    #[test]
    fn same_currency_fallback_when_conversion_missing() {
        let mut usd_item = item("usd", 3, 50.0);
        usd_item.price_in_base_currency = None;

        let mut eur_item = item("eur", 5, 10.0);
        eur_item.currency = CurrencyCode::parse("EUR").unwrap();
        eur_item.price_in_base_currency = None;

        assert_eq!(effective_price(&usd_item, &usd()), Some(Decimal::from(50)));
        assert_eq!(effective_price(&eur_item, &usd()), None);

        let out = suggest(&[usd_item, eur_item], 100.0, &usd());
        assert_eq!(out.len(), 1);
        assert_eq!(ids(&out[0]), vec!["usd"]);
        assert_eq!(out[0].total_cost, 50.0);
    }

    #[test]
    fn invalid_converted_price_falls_back_or_excludes() {
        let mut nan = item("nan", 3, 75.0);
        nan.price_in_base_currency = Some(f64::NAN);
        assert_eq!(effective_price(&nan, &usd()), Some(Decimal::from(75)));

        let mut negative = item("neg", 3, 75.0);
        negative.currency = CurrencyCode::parse("EUR").unwrap();
        negative.price_in_base_currency = Some(-3.0);
        assert_eq!(effective_price(&negative, &usd()), None);

        let mut free = item("free", 3, 0.0);
        free.price_in_base_currency = Some(0.0);
        assert_eq!(effective_price(&free, &usd()), None);
    }

    #[test]
    fn prices_outside_decimal_range_are_unpriceable() {
        // Below Decimal's 28-digit scale a positive price collapses to zero.
        let dust = item("dust", 3, 1e-29);
        assert_eq!(effective_price(&dust, &usd()), None);
        assert!(suggest(&[dust], 1.0, &usd()).is_empty());

        let mut huge = item("huge", 3, 50.0);
        huge.price_in_base_currency = Some(1e29);
        assert_eq!(effective_price(&huge, &usd()), Some(Decimal::from(50)));
    }

    #[test]
    fn converted_price_takes_precedence() {
        let mut gbp = item("gbp", 4, 40.0);
        gbp.currency = CurrencyCode::parse("GBP").unwrap();
        gbp.price_in_base_currency = Some(50.5);

        let out = suggest(&[gbp], 60.0, &usd());
        assert_eq!(out[0].total_cost, 50.5);
        assert_eq!(out[0].remaining, 9.5);
    }

    #[test]
    fn high_priority_item_blocks_cheaper_combinations() {
        let out = suggest(&scenario_one(), 100.0, &usd());
        let high = &out[0];
        assert_eq!(high.strategy, Strategy::HighPriority);
        assert_eq!(ids(high), vec!["A"]);
        assert_eq!(high.total_cost, 90.0);
        assert_eq!(high.remaining, 10.0);
        assert_eq!(high.priority_score, 5);
    }

    #[test]
    fn converging_strategies_are_deduplicated_in_fixed_order() {
        let out = suggest(&scenario_one(), 100.0, &usd());
        // best-value picks {B, C} too and is dropped.
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].strategy, Strategy::HighPriority);
        assert_eq!(out[1].strategy, Strategy::MostItems);
        assert_eq!(ids(&out[1]), vec!["B", "C"]);
        assert_eq!(out[1].total_cost, 80.0);
        assert_eq!(out[1].remaining, 20.0);
        assert_eq!(out[1].priority_score, 7);
    }

    #[test]
    fn dedup_ignores_selection_order() {
        // most-items picks [b, a] (price order); best-value picks [a, b] (ratio order).
        // high-priority picks [c] alone.
        let items = vec![item("a", 4, 20.0), item("b", 1, 10.0), item("c", 5, 95.0)];
        let out = suggest(&items, 100.0, &usd());
        let strategies: Vec<Strategy> = out.iter().map(|s| s.strategy).collect();
        assert_eq!(strategies, vec![Strategy::HighPriority, Strategy::MostItems]);
        assert_eq!(ids(&out[1]), vec!["b", "a"]);
    }

    #[test]
    fn single_item_converges_to_one_suggestion() {
        let out = suggest(&[item("solo", 2, 50.0)], 100.0, &usd());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].strategy, Strategy::HighPriority);
        assert_eq!(out[0].remaining, 50.0);
    }

    #[test]
    fn all_three_strategies_can_disagree() {
        // high-priority: [p5]; most-items: [c1, c2, c3]; best-value: [v, c1, c2]
        let items = vec![
            item("p5", 5, 80.0),
            item("v", 4, 30.0),
            item("c1", 1, 25.0),
            item("c2", 1, 25.0),
            item("c3", 1, 26.0),
        ];
        let out = suggest(&items, 100.0, &usd());
        assert_eq!(out.len(), 3);
        assert_eq!(ids(&out[0]), vec!["p5"]);
        assert_eq!(ids(&out[1]), vec!["c1", "c2", "c3"]);
        assert_eq!(ids(&out[2]), vec!["v", "c1", "c2"]);
        assert_eq!(out[2].strategy, Strategy::BestValue);
    }

    #[test]
    fn sub_cent_prices_sum_without_float_drift() {
        let items = vec![item("x", 3, 0.01), item("y", 3, 0.02)];
        let out = suggest(&items, 0.05, &usd());
        assert!(out.iter().any(|s| s.items.len() == 2));
        assert_eq!(out[0].total_cost, 0.03);
        assert_eq!(out[0].remaining, 0.02);

        // 0.1 + 0.2 must fit a 0.3 budget exactly.
        let items = vec![item("p", 3, 0.1), item("q", 3, 0.2)];
        let out = suggest(&items, 0.3, &usd());
        assert_eq!(out[0].items.len(), 2);
        assert_eq!(out[0].remaining, 0.0);
    }

    #[test]
    fn totals_are_consistent_with_budget_and_items() {
        let items = vec![
            item("a", 5, 19.99),
            item("b", 2, 5.55),
            item("c", 4, 33.333),
            item("d", 1, 0.005),
            item("e", 3, 12.345),
        ];
        let budget = 57.77;
        for s in suggest(&items, budget, &usd()) {
            assert!((s.total_cost + s.remaining - budget).abs() <= 0.01, "{s:?}");
            assert!(s.remaining >= 0.0);

            let sum: f64 = s.items.iter().map(|i| i.current_price).sum();
            assert!((s.total_cost - sum).abs() <= 0.005 + 1e-9, "{s:?}");

            let score: u32 = s.items.iter().map(|i| u32::from(i.priority.get())).sum();
            assert_eq!(s.priority_score, score);
        }
    }

    #[test]
    fn ties_keep_input_order_and_output_is_deterministic() {
        let items = vec![item("first", 3, 10.0), item("second", 3, 10.0), item("third", 3, 10.0)];
        let a = suggest(&items, 20.0, &usd());
        let b = suggest(&items, 20.0, &usd());
        assert_eq!(ids(&a[0]), vec!["first", "second"]);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn non_positive_budget_yields_nothing() {
        assert!(suggest(&scenario_one(), 0.0, &usd()).is_empty());
        assert!(suggest(&scenario_one(), f64::NAN, &usd()).is_empty());
    }

    #[test]
    fn strategy_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Strategy::HighPriority).unwrap(),
            "\"high-priority\""
        );
        assert_eq!(Strategy::BestValue.as_str(), "best-value");
    }
}
