//! # Delivery Fee Resolver
//!
//! Decides whether a shopping list ships free and, if not, what blocks it.
//!
//! ## Rule Resolution (per item)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   product rule? ──yes──► use it                                         │
//! │        │no                                                              │
//! │   category rule? ──yes──► use it   (quantity = whole category in list)  │
//! │        │no                                                              │
//! │   parent category rule? ──yes──► use it                                 │
//! │        │no                                                              │
//! │   no rule ──► eligible                                                  │
//! │                                                                         │
//! │   rule without min quantity      ──► never eligible                     │
//! │   rule with min N, current ≥ N   ──► eligible                           │
//! │   rule with min N, current < N   ──► blocked, tip {current, required}   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only eligible amounts count toward the free-shipping threshold.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::money::Money;
use crate::pricing;
use crate::types::{DeliveryFeeExclusion, DeliveryFeeSetting, ExclusionTarget, ShoppingListItem};

/// Where a product sits in the category tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProductPlacement {
    pub category_id: Option<i64>,
    pub parent_category_id: Option<i64>,
}

/// Tells the customer which rule keeps an item out of free shipping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingTip {
    pub item_type: ExclusionTarget,
    pub target_id: i64,
    pub target_name: String,
    /// `None` for unconditional rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_quantity: Option<i64>,
    pub current_quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
}

/// Result of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryFeeSummary {
    pub base_fee: Money,
    pub free_shipping_threshold: Money,
    pub eligible_amount: Money,
    pub ineligible_amount: Money,
    pub total_amount: Money,
    pub delivery_fee: Money,
    pub is_free_shipping: bool,
    pub short_of_amount: Money,
    pub tips: Vec<BlockingTip>,
    pub eligible_quantity: i64,
    pub ineligible_quantity: i64,
    pub total_quantity: i64,
    pub blocked_item_ids: Vec<i64>,
}

/// Exclusion rules indexed by target.
#[derive(Debug, Default)]
struct RuleBook<'a> {
    products: HashMap<i64, &'a DeliveryFeeExclusion>,
    categories: HashMap<i64, &'a DeliveryFeeExclusion>,
}

impl<'a> RuleBook<'a> {
    fn new(exclusions: &'a [DeliveryFeeExclusion]) -> Self {
        let mut book = RuleBook::default();
        for rule in exclusions {
            let index = match rule.item_type {
                ExclusionTarget::Product => &mut book.products,
                ExclusionTarget::Category => &mut book.categories,
            };
            index.insert(rule.target_id, rule);
        }
        book
    }

    fn pick(&self, product_id: i64, placement: ProductPlacement) -> Option<&'a DeliveryFeeExclusion> {
        self.products
            .get(&product_id)
            .or_else(|| placement.category_id.and_then(|id| self.categories.get(&id)))
            .or_else(|| {
                placement
                    .parent_category_id
                    .and_then(|id| self.categories.get(&id))
            })
            .copied()
    }
}

enum Verdict {
    Eligible,
    Blocked { current: i64, required: Option<i64> },
}

fn evaluate(
    rule: Option<&DeliveryFeeExclusion>,
    item_quantity: i64,
    category_quantities: &HashMap<i64, i64>,
) -> Verdict {
    let Some(rule) = rule else {
        return Verdict::Eligible;
    };
    let current = match rule.item_type {
        ExclusionTarget::Product => item_quantity,
        ExclusionTarget::Category => category_quantities.get(&rule.target_id).copied().unwrap_or(0),
    };
    match rule.min_quantity_for_free {
        None => Verdict::Blocked {
            current,
            required: None,
        },
        Some(required) if current >= required => Verdict::Eligible,
        Some(required) => Verdict::Blocked {
            current,
            required: Some(required),
        },
    }
}

/// Quantity per category in the list, counting each item toward both its
/// category and that category's parent.
fn aggregate_category_quantities(
    items: &[ShoppingListItem],
    placements: &HashMap<i64, ProductPlacement>,
) -> HashMap<i64, i64> {
    let mut totals = HashMap::new();
    for item in items {
        let placement = placements.get(&item.product_id).copied().unwrap_or_default();
        for id in [placement.category_id, placement.parent_category_id]
            .into_iter()
            .flatten()
        {
            *totals.entry(id).or_insert(0) += item.quantity;
        }
    }
    totals
}

fn tip_for(rule: &DeliveryFeeExclusion, current: i64, required: Option<i64>, item: &ShoppingListItem) -> BlockingTip {
    let (product_id, product_name, category_id) = match rule.item_type {
        ExclusionTarget::Product => (Some(item.product_id), Some(item.product_name.clone()), None),
        ExclusionTarget::Category => (None, None, Some(rule.target_id)),
    };
    BlockingTip {
        item_type: rule.item_type,
        target_id: rule.target_id,
        target_name: rule.target_name.clone(),
        required_quantity: required,
        current_quantity: current,
        product_id,
        product_name,
        category_id,
    }
}

/// Computes the delivery-fee summary of a shopping list.
///
/// `placements` maps product id to its category and parent; products missing
/// from it can only match product rules.
pub fn resolve(
    items: &[ShoppingListItem],
    setting: DeliveryFeeSetting,
    exclusions: &[DeliveryFeeExclusion],
    placements: &HashMap<i64, ProductPlacement>,
) -> DeliveryFeeSummary {
    let mut summary = DeliveryFeeSummary {
        base_fee: setting.base_fee,
        free_shipping_threshold: setting.free_shipping_threshold,
        ..Default::default()
    };

    let rules = RuleBook::new(exclusions);
    let category_quantities = aggregate_category_quantities(items, placements);
    let mut tipped: HashSet<(ExclusionTarget, i64)> = HashSet::new();
    let mut blocked: HashSet<i64> = HashSet::new();

    for item in items {
        let amount = pricing::line_amount(&item.spec_snapshot, item.quantity);
        summary.total_amount += amount;
        summary.total_quantity += item.quantity;

        let placement = placements.get(&item.product_id).copied().unwrap_or_default();
        let rule = rules.pick(item.product_id, placement);

        match evaluate(rule, item.quantity, &category_quantities) {
            Verdict::Eligible => {
                summary.eligible_amount += amount;
                summary.eligible_quantity += item.quantity;
            }
            Verdict::Blocked { current, required } => {
                summary.ineligible_amount += amount;
                summary.ineligible_quantity += item.quantity;
                if blocked.insert(item.id) {
                    summary.blocked_item_ids.push(item.id);
                }
                if let Some(rule) = rule {
                    if tipped.insert((rule.item_type, rule.target_id)) {
                        summary.tips.push(tip_for(rule, current, required, item));
                    }
                }
            }
        }
    }

    decide_fee(&mut summary);
    summary
}

fn decide_fee(summary: &mut DeliveryFeeSummary) {
    let threshold = summary.free_shipping_threshold;
    summary.delivery_fee = summary.base_fee;

    if threshold.is_positive() && summary.eligible_amount >= threshold {
        summary.delivery_fee = Money::zero();
        summary.is_free_shipping = true;
    } else if threshold.is_zero() && summary.base_fee.is_zero() {
        summary.delivery_fee = Money::zero();
        summary.is_free_shipping = true;
    } else {
        summary.is_free_shipping = summary.delivery_fee.is_zero();
        if threshold.is_positive() {
            summary.short_of_amount = (threshold - summary.eligible_amount).non_negative();
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
