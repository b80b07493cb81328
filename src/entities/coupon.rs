use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
    #[sea_orm(string_value = "buy_x_get_y")]
    BuyXGetY,
    #[sea_orm(string_value = "tiered")]
    Tiered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
pub enum CustomerTier {
    #[sea_orm(string_value = "all")]
    All,
    #[sea_orm(string_value = "new")]
    New,
    #[sea_orm(string_value = "regular")]
    Regular,
    #[sea_orm(string_value = "vip")]
    Vip,
}

impl CustomerTier {
    /// Uppercase label used in customer-facing rejection messages.
    pub fn label(&self) -> &'static str {
        match self {
            CustomerTier::All => "ALL",
            CustomerTier::New => "NEW",
            CustomerTier::Regular => "REGULAR",
            CustomerTier::Vip => "VIP",
        }
    }
}

/// Lifecycle status derived from the stored fields, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CouponStatus {
    Active,
    Scheduled,
    Expired,
    Depleted,
    Cancelled,
}

/// One rung of a tiered discount ladder. The stored JSON uses `type` for
/// the kind discriminator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DiscountTier {
    pub min_amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TierDiscountKind,
    pub value: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TierDiscountKind {
    Percentage,
    Fixed,
}

/// Day-of-week / hour-of-day windows during which a coupon may be redeemed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeRestrictions {
    /// Lowercase English day names, e.g. "monday". Empty list = every day.
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default)]
    pub hours: Option<HourRange>,
}

/// Inclusive start, exclusive end, both 0-23. The window never wraps past
/// midnight; a coupon valid overnight needs two day entries instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HourRange {
    pub start: u32,
    pub end: u32,
}

/// Calendar windows (months and/or explicit "MM-DD" dates).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SeasonalRestrictions {
    #[serde(default)]
    pub months: Vec<u32>,
    #[serde(default)]
    pub dates: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    #[validate(length(
        min = 1,
        max = 50,
        message = "Coupon code must be between 1 and 50 characters"
    ))]
    pub code: String,

    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub max_uses_per_customer: i32,
    pub current_uses: i32,
    pub min_order_value: Decimal,
    pub min_order_items: i32,
    pub is_active: bool,
    pub is_one_time_use: bool,
    pub applies_to_discounted_items: bool,
    pub applicable_products: Option<Json>,
    pub excluded_products: Option<Json>,
    pub applicable_categories: Option<Json>,
    pub excluded_categories: Option<Json>,
    pub buy_x_count: Option<i32>,
    pub get_y_count: Option<i32>,
    pub customer_tier: CustomerTier,
    pub min_customer_orders: Option<i32>,
    pub max_customer_orders: Option<i32>,
    pub min_customer_spent: Option<Decimal>,
    pub min_category_items: Option<i32>,
    pub combinable_with_discounts: bool,
    pub combinable_with_coupons: bool,
    pub usage_interval_days: Option<i32>,
    pub time_restrictions: Option<Json>,
    pub seasonal_restrictions: Option<Json>,
    pub tiered_discounts: Option<Json>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn parse_id_list(value: &Option<Json>) -> Vec<Uuid> {
    value
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

impl Model {
    pub fn applicable_product_ids(&self) -> Vec<Uuid> {
        parse_id_list(&self.applicable_products)
    }

    pub fn excluded_product_ids(&self) -> Vec<Uuid> {
        parse_id_list(&self.excluded_products)
    }

    pub fn applicable_category_ids(&self) -> Vec<Uuid> {
        parse_id_list(&self.applicable_categories)
    }

    pub fn excluded_category_ids(&self) -> Vec<Uuid> {
        parse_id_list(&self.excluded_categories)
    }

    /// Tier ladder as stored. Malformed or missing config yields an empty
    /// ladder, which the calculator treats as "no discount".
    pub fn discount_tiers(&self) -> Vec<DiscountTier> {
        self.tiered_discounts
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn time_rules(&self) -> Option<TimeRestrictions> {
        self.time_restrictions
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn seasonal_rules(&self) -> Option<SeasonalRestrictions> {
        self.seasonal_restrictions
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.map_or(false, |until| now > until)
    }

    pub fn is_depleted(&self) -> bool {
        self.max_uses.map_or(false, |cap| self.current_uses >= cap)
    }

    /// Uses left under the global cap, `None` when uncapped.
    pub fn remaining_uses(&self) -> Option<i32> {
        self.max_uses.map(|cap| (cap - self.current_uses).max(0))
    }

    /// Derived lifecycle status. Deactivation outranks expiry, expiry
    /// outranks depletion, and a coupon before its window is `scheduled`.
    pub fn status(&self, now: DateTime<Utc>) -> CouponStatus {
        if !self.is_active {
            CouponStatus::Cancelled
        } else if self.is_expired(now) {
            CouponStatus::Expired
        } else if self.is_depleted() {
            CouponStatus::Depleted
        } else if now < self.valid_from {
            CouponStatus::Scheduled
        } else {
            CouponStatus::Active
        }
    }

    /// Whether evaluation needs a customer id. Coupons without any
    /// per-customer rule may be evaluated anonymously.
    pub fn has_per_customer_restrictions(&self) -> bool {
        self.customer_tier != CustomerTier::All
            || self.is_one_time_use
            || self.min_customer_orders.is_some()
            || self.max_customer_orders.is_some()
            || self.min_customer_spent.is_some()
            || self.usage_interval_days.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_usage::Entity")]
    CouponUsage,
    #[sea_orm(has_many = "super::coupon_validation_attempt::Entity")]
    CouponValidationAttempt,
}

impl Related<super::coupon_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CouponUsage.def()
    }
}

impl Related<super::coupon_validation_attempt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CouponValidationAttempt.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        // Codes are matched case-insensitively by storing them normalized.
        if let ActiveValue::Set(code) = &self.code {
            let normalized = code.trim().to_uppercase();
            if normalized != *code {
                self.code = ActiveValue::Set(normalized);
            }
        }
        Ok(self)
    }
}
