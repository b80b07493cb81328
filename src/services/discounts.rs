use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::coupon::{self, DiscountType, TierDiscountKind};

/// One line of the cart under evaluation. Supplied by the caller from a
/// live cart or order-under-construction; never persisted here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartItem {
    pub product_id: Uuid,
    pub category_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub is_discounted: bool,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Cart items plus the derived totals the rule checks run against.
#[derive(Clone, Debug)]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub cart_value: Decimal,
    pub cart_item_count: i32,
}

impl CartSnapshot {
    /// `cart_item_count` counts cart lines, not units; per-unit rules such
    /// as the category minimum sum quantities themselves.
    pub fn from_items(items: Vec<CartItem>) -> Self {
        let cart_value = items.iter().map(CartItem::line_total).sum();
        let cart_item_count = items.len() as i32;
        Self {
            items,
            cart_value,
            cart_item_count,
        }
    }

    /// Like `from_items`, but callers that only know aggregate figures (a
    /// cart total computed elsewhere) may supply them directly.
    pub fn with_overrides(
        items: Vec<CartItem>,
        cart_value: Option<Decimal>,
        cart_item_count: Option<i32>,
    ) -> Self {
        let mut snapshot = Self::from_items(items);
        if let Some(value) = cart_value {
            snapshot.cart_value = value;
        }
        if let Some(count) = cart_item_count {
            snapshot.cart_item_count = count;
        }
        snapshot
    }
}

/// Whether the coupon covers this item. A coupon with no product or
/// category list covers everything.
pub fn is_applicable_to_item(coupon: &coupon::Model, item: &CartItem) -> bool {
    let products = coupon.applicable_product_ids();
    let categories = coupon.applicable_category_ids();
    if products.is_empty() && categories.is_empty() {
        return true;
    }
    products.contains(&item.product_id)
        || item
            .category_id
            .map_or(false, |category| categories.contains(&category))
}

/// Whether any cart item falls in the coupon's exclusion lists. Callers
/// must refuse to apply the coupon when this is true; the calculator
/// itself does not re-check.
pub fn has_excluded_items(coupon: &coupon::Model, items: &[CartItem]) -> bool {
    let products = coupon.excluded_product_ids();
    let categories = coupon.excluded_category_ids();
    if products.is_empty() && categories.is_empty() {
        return false;
    }
    items.iter().any(|item| {
        products.contains(&item.product_id)
            || item
                .category_id
                .map_or(false, |category| categories.contains(&category))
    })
}

/// Whether the coupon may be combined with already-discounted cart items.
pub fn validate_discount_combinations(coupon: &coupon::Model, items: &[CartItem]) -> bool {
    if coupon.applies_to_discounted_items || coupon.combinable_with_discounts {
        return true;
    }
    !items.iter().any(|item| item.is_discounted)
}

fn applicable_total(coupon: &coupon::Model, items: &[CartItem]) -> Decimal {
    items
        .iter()
        .filter(|item| is_applicable_to_item(coupon, item))
        .map(CartItem::line_total)
        .sum()
}

/// Raw discount amount for the cart. Pure arithmetic over already-loaded
/// data; clamping against the order total is the applier's job.
pub fn calculate_discount(coupon: &coupon::Model, items: &[CartItem]) -> Decimal {
    match coupon.discount_type {
        DiscountType::Percentage => {
            applicable_total(coupon, items) * coupon.discount_value / Decimal::ONE_HUNDRED
        }
        DiscountType::Fixed => coupon.discount_value,
        DiscountType::BuyXGetY => buy_x_get_y_discount(coupon, items),
        DiscountType::Tiered => tiered_discount(coupon, items),
    }
}

/// For every `buy_x_count + get_y_count` applicable units in the cart,
/// `get_y_count` of them are free, charged at the cheapest applicable
/// unit price.
fn buy_x_get_y_discount(coupon: &coupon::Model, items: &[CartItem]) -> Decimal {
    let (buy_x, get_y) = match (coupon.buy_x_count, coupon.get_y_count) {
        (Some(x), Some(y)) if x > 0 && y > 0 => (x, y),
        _ => return Decimal::ZERO,
    };

    let applicable: Vec<&CartItem> = items
        .iter()
        .filter(|item| is_applicable_to_item(coupon, item))
        .collect();

    let units: i32 = applicable.iter().map(|item| item.quantity).sum();
    let free_units = units / (buy_x + get_y) * get_y;
    if free_units == 0 {
        return Decimal::ZERO;
    }

    let cheapest = applicable
        .iter()
        .map(|item| item.unit_price)
        .min()
        .unwrap_or(Decimal::ZERO);

    cheapest * Decimal::from(free_units)
}

/// Walk the ladder sorted ascending by threshold and keep the last tier
/// the applicable total qualifies for.
fn tiered_discount(coupon: &coupon::Model, items: &[CartItem]) -> Decimal {
    let mut tiers = coupon.discount_tiers();
    if tiers.is_empty() {
        return Decimal::ZERO;
    }
    tiers.sort_by(|a, b| a.min_amount.cmp(&b.min_amount));

    let total = applicable_total(coupon, items);
    let selected = tiers.iter().rev().find(|tier| tier.min_amount <= total);

    match selected {
        Some(tier) => match tier.kind {
            TierDiscountKind::Percentage => total * tier.value / Decimal::ONE_HUNDRED,
            TierDiscountKind::Fixed => tier.value,
        },
        None => Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn percentage_coupon(value: Decimal) -> coupon::Model {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: "TEST".into(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: value,
            valid_from: now - Duration::days(1),
            valid_until: None,
            max_uses: None,
            max_uses_per_customer: 1,
            current_uses: 0,
            min_order_value: Decimal::ZERO,
            min_order_items: 1,
            is_active: true,
            is_one_time_use: false,
            applies_to_discounted_items: true,
            applicable_products: None,
            excluded_products: None,
            applicable_categories: None,
            excluded_categories: None,
            buy_x_count: None,
            get_y_count: None,
            customer_tier: coupon::CustomerTier::All,
            min_customer_orders: None,
            max_customer_orders: None,
            min_customer_spent: None,
            min_category_items: None,
            combinable_with_discounts: true,
            combinable_with_coupons: false,
            usage_interval_days: None,
            time_restrictions: None,
            seasonal_restrictions: None,
            tiered_discounts: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(price: Decimal, quantity: i32) -> CartItem {
        CartItem {
            product_id: Uuid::new_v4(),
            category_id: None,
            quantity,
            unit_price: price,
            is_discounted: false,
        }
    }

    #[test]
    fn percentage_discount_on_full_cart() {
        let coupon = percentage_coupon(dec!(15));
        let items = vec![item(dec!(60), 1), item(dec!(20), 2)];
        assert_eq!(calculate_discount(&coupon, &items), dec!(15.00));
    }

    #[test]
    fn fixed_discount_is_not_clamped_here() {
        let mut coupon = percentage_coupon(dec!(25));
        coupon.discount_type = DiscountType::Fixed;
        let items = vec![item(dec!(10), 1)];
        assert_eq!(calculate_discount(&coupon, &items), dec!(25));
    }

    #[test]
    fn percentage_only_counts_applicable_items() {
        let mut coupon = percentage_coupon(dec!(10));
        let covered = item(dec!(50), 2);
        let other = item(dec!(999), 1);
        coupon.applicable_products = Some(json!([covered.product_id]));
        let items = vec![covered, other];
        assert_eq!(calculate_discount(&coupon, &items), dec!(10.00));
    }

    #[test]
    fn category_listing_makes_an_item_applicable() {
        let mut coupon = percentage_coupon(dec!(10));
        let category = Uuid::new_v4();
        coupon.applicable_categories = Some(json!([category]));
        let mut covered = item(dec!(30), 1);
        covered.category_id = Some(category);
        let uncovered = item(dec!(30), 1);
        assert!(is_applicable_to_item(&coupon, &covered));
        assert!(!is_applicable_to_item(&coupon, &uncovered));
    }

    #[test]
    fn tiered_selects_highest_qualifying_threshold() {
        let mut coupon = percentage_coupon(Decimal::ZERO);
        coupon.discount_type = DiscountType::Tiered;
        coupon.tiered_discounts = Some(json!([
            { "min_amount": "0", "type": "fixed", "value": "0" },
            { "min_amount": "50", "type": "percentage", "value": "10" },
            { "min_amount": "200", "type": "percentage", "value": "20" },
        ]));
        let items = vec![item(dec!(150), 1)];
        assert_eq!(calculate_discount(&coupon, &items), dec!(15.00));
    }

    #[test]
    fn tiered_handles_unsorted_ladders() {
        let mut coupon = percentage_coupon(Decimal::ZERO);
        coupon.discount_type = DiscountType::Tiered;
        coupon.tiered_discounts = Some(json!([
            { "min_amount": "200", "type": "fixed", "value": "50" },
            { "min_amount": "50", "type": "fixed", "value": "5" },
        ]));
        let items = vec![item(dec!(250), 1)];
        assert_eq!(calculate_discount(&coupon, &items), dec!(50));
    }

    #[test]
    fn tiered_below_every_threshold_gives_nothing() {
        let mut coupon = percentage_coupon(Decimal::ZERO);
        coupon.discount_type = DiscountType::Tiered;
        coupon.tiered_discounts = Some(json!([
            { "min_amount": "50", "type": "percentage", "value": "10" },
        ]));
        let items = vec![item(dec!(30), 1)];
        assert_eq!(calculate_discount(&coupon, &items), Decimal::ZERO);
    }

    #[test]
    fn tiered_with_missing_or_malformed_ladder_gives_nothing() {
        let mut coupon = percentage_coupon(Decimal::ZERO);
        coupon.discount_type = DiscountType::Tiered;
        let items = vec![item(dec!(500), 1)];
        assert_eq!(calculate_discount(&coupon, &items), Decimal::ZERO);

        coupon.tiered_discounts = Some(json!({ "oops": true }));
        assert_eq!(calculate_discount(&coupon, &items), Decimal::ZERO);
    }

    #[test]
    fn buy_two_get_one_free() {
        let mut coupon = percentage_coupon(Decimal::ZERO);
        coupon.discount_type = DiscountType::BuyXGetY;
        coupon.buy_x_count = Some(2);
        coupon.get_y_count = Some(1);
        let items = vec![item(dec!(10), 6)];
        assert_eq!(calculate_discount(&coupon, &items), dec!(20));
    }

    #[test]
    fn buy_x_get_y_prices_free_units_at_the_cheapest_line() {
        let mut coupon = percentage_coupon(Decimal::ZERO);
        coupon.discount_type = DiscountType::BuyXGetY;
        coupon.buy_x_count = Some(2);
        coupon.get_y_count = Some(1);
        let items = vec![item(dec!(30), 2), item(dec!(4), 1)];
        assert_eq!(calculate_discount(&coupon, &items), dec!(4));
    }

    #[test]
    fn buy_x_get_y_without_counts_gives_nothing() {
        let mut coupon = percentage_coupon(Decimal::ZERO);
        coupon.discount_type = DiscountType::BuyXGetY;
        let items = vec![item(dec!(10), 10)];
        assert_eq!(calculate_discount(&coupon, &items), Decimal::ZERO);
    }

    #[test]
    fn excluded_product_or_category_is_detected() {
        let mut coupon = percentage_coupon(dec!(10));
        let banned_product = item(dec!(10), 1);
        let category = Uuid::new_v4();
        coupon.excluded_products = Some(json!([banned_product.product_id]));
        coupon.excluded_categories = Some(json!([category]));

        assert!(has_excluded_items(&coupon, &[banned_product]));

        let mut banned_by_category = item(dec!(10), 1);
        banned_by_category.category_id = Some(category);
        assert!(has_excluded_items(&coupon, &[banned_by_category]));

        assert!(!has_excluded_items(&coupon, &[item(dec!(10), 1)]));
    }

    #[test]
    fn non_combinable_coupon_rejects_discounted_items() {
        let mut coupon = percentage_coupon(dec!(10));
        coupon.applies_to_discounted_items = false;
        coupon.combinable_with_discounts = false;
        let mut discounted = item(dec!(10), 1);
        discounted.is_discounted = true;

        assert!(!validate_discount_combinations(&coupon, &[discounted.clone()]));

        coupon.applies_to_discounted_items = true;
        assert!(validate_discount_combinations(&coupon, &[discounted]));
    }

    #[test]
    fn snapshot_derives_totals_from_items() {
        let snapshot = CartSnapshot::from_items(vec![item(dec!(12.50), 2), item(dec!(5), 3)]);
        assert_eq!(snapshot.cart_value, dec!(40.00));
        assert_eq!(snapshot.cart_item_count, 2);
    }

    #[test]
    fn snapshot_overrides_replace_derived_figures() {
        let snapshot =
            CartSnapshot::with_overrides(vec![item(dec!(10), 1)], Some(dec!(75)), Some(4));
        assert_eq!(snapshot.cart_value, dec!(75));
        assert_eq!(snapshot.cart_item_count, 4);
    }
}
