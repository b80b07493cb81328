use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::SharedClock,
    entities::coupon::{
        self, CouponStatus, CustomerTier, DiscountType, DiscountTier, Entity as CouponEntity,
        Model as CouponModel, SeasonalRestrictions, TimeRestrictions,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::coupon_audit::CouponAuditService,
    services::coupon_usage::{CouponUsageService, CustomerUsage},
    services::customer_history::{CustomerStats, SharedCustomerHistory},
    services::discounts::{self, CartSnapshot},
};

static COUPON_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("coupon code pattern is valid")
});

/// Outcome of one eligibility evaluation. Rule failures are verdicts with a
/// customer-facing reason, never errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Verdict {
    pub valid: bool,
    pub reason: Option<String>,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Per-customer inputs the rule checks need, loaded up front so evaluation
/// itself performs no I/O.
#[derive(Clone, Copy, Debug, Default)]
pub struct CustomerContext {
    pub stats: CustomerStats,
    pub usage: CustomerUsage,
}

/// Runs the rule chain in its fixed order; the first failure wins and its
/// reason is the verdict. `customer` is `None` only for coupons without
/// per-customer restrictions; the service guards that invariant.
pub fn evaluate_coupon(
    coupon: &CouponModel,
    cart: &CartSnapshot,
    customer: Option<&CustomerContext>,
    now: DateTime<Utc>,
) -> Verdict {
    if !coupon.is_active {
        return Verdict::fail("Coupon is not active");
    }
    if coupon.is_expired(now) {
        return Verdict::fail("Coupon has expired");
    }
    if coupon.is_depleted() {
        return Verdict::fail("Coupon usage limit reached");
    }
    if cart.cart_value < coupon.min_order_value {
        return Verdict::fail(format!(
            "Order value (${}) is below minimum required (${})",
            cart.cart_value, coupon.min_order_value
        ));
    }
    if cart.cart_item_count < coupon.min_order_items {
        return Verdict::fail(format!(
            "Cart has fewer items ({}) than required ({})",
            cart.cart_item_count, coupon.min_order_items
        ));
    }
    if coupon.customer_tier != CustomerTier::All {
        let satisfied = customer.map_or(false, |ctx| {
            ctx.stats.satisfies_tier(coupon.customer_tier)
        });
        if !satisfied {
            return Verdict::fail(format!(
                "User does not meet {} customer requirements",
                coupon.customer_tier.label()
            ));
        }
    }
    if let Some(reason) = category_minimum_failure(coupon, cart) {
        return Verdict::fail(reason);
    }
    if let Some(reason) = extended_restriction_failure(coupon, cart, customer, now) {
        return Verdict::fail(reason);
    }
    Verdict::pass()
}

fn category_minimum_failure(coupon: &CouponModel, cart: &CartSnapshot) -> Option<String> {
    let min_items = coupon.min_category_items?;
    let categories = coupon.applicable_category_ids();
    if categories.is_empty() {
        return None;
    }

    let in_category: i32 = cart
        .items
        .iter()
        .filter(|item| {
            item.category_id
                .map_or(false, |category| categories.contains(&category))
        })
        .map(|item| item.quantity)
        .sum();

    (in_category < min_items).then(|| "Category-specific requirements not met".to_string())
}

// Restrictions beyond the core chain. Each applies only when configured on
// the coupon, so a plain coupon passes straight through.
fn extended_restriction_failure(
    coupon: &CouponModel,
    cart: &CartSnapshot,
    customer: Option<&CustomerContext>,
    now: DateTime<Utc>,
) -> Option<String> {
    if let Some(ctx) = customer {
        if order_history_fails(coupon, &ctx.stats) {
            return Some("Order history requirements not met".to_string());
        }

        let per_customer_cap = if coupon.is_one_time_use {
            1
        } else {
            coupon.max_uses_per_customer
        };
        if per_customer_cap > 0 && ctx.usage.count >= per_customer_cap as u64 {
            return Some("Coupon usage limit reached for this customer".to_string());
        }

        if let Some(interval) = coupon.usage_interval_days {
            if let Some(last_used) = ctx.usage.last_used_at {
                if (now - last_used).num_days() < interval as i64 {
                    return Some(format!(
                        "Coupon can only be used once every {} days",
                        interval
                    ));
                }
            }
        }
    }

    if let Some(rules) = coupon.time_rules() {
        if !time_restrictions_pass(&rules, now) {
            return Some("Coupon is not valid at this time".to_string());
        }
    }

    if let Some(rules) = coupon.seasonal_rules() {
        if !seasonal_restrictions_pass(&rules, now) {
            return Some("Coupon is not valid during this period".to_string());
        }
    }

    if !discounts::validate_discount_combinations(coupon, &cart.items) {
        return Some("Coupon cannot be combined with discounted items".to_string());
    }

    None
}

fn order_history_fails(coupon: &CouponModel, stats: &CustomerStats) -> bool {
    if let Some(min) = coupon.min_customer_orders {
        if stats.delivered_order_count < min as u64 {
            return true;
        }
    }
    if let Some(max) = coupon.max_customer_orders {
        if stats.delivered_order_count > max as u64 {
            return true;
        }
    }
    if let Some(min_spent) = coupon.min_customer_spent {
        if stats.total_spent < min_spent {
            return true;
        }
    }
    false
}

fn time_restrictions_pass(rules: &TimeRestrictions, now: DateTime<Utc>) -> bool {
    if !rules.days.is_empty() {
        let today = weekday_name(now.weekday());
        if !rules.days.iter().any(|day| day.to_lowercase() == today) {
            return false;
        }
    }
    if let Some(hours) = &rules.hours {
        let hour = now.hour();
        if !(hours.start <= hour && hour < hours.end) {
            return false;
        }
    }
    true
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn seasonal_restrictions_pass(rules: &SeasonalRestrictions, now: DateTime<Utc>) -> bool {
    if !rules.months.is_empty() && !rules.months.contains(&now.month()) {
        return false;
    }
    if !rules.dates.is_empty() {
        let today = now.format("%m-%d").to_string();
        if !rules.dates.contains(&today) {
            return false;
        }
    }
    true
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Payload for creating a coupon. Collections left empty mean "no
/// restriction" and are stored as NULL.
#[derive(Clone, Debug, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateCouponRequest {
    #[validate(
        length(min = 1, max = 50, message = "Coupon code must be between 1 and 50 characters"),
        regex(
            path = "COUPON_CODE_RE",
            message = "Coupon code may only contain letters, digits, dashes and underscores"
        )
    )]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    #[serde(default = "default_max_uses_per_customer")]
    pub max_uses_per_customer: i32,
    #[serde(default)]
    pub min_order_value: Decimal,
    #[serde(default = "default_min_order_items")]
    pub min_order_items: i32,
    #[serde(default)]
    pub is_one_time_use: bool,
    #[serde(default)]
    pub applies_to_discounted_items: bool,
    #[serde(default)]
    pub applicable_products: Vec<Uuid>,
    #[serde(default)]
    pub excluded_products: Vec<Uuid>,
    #[serde(default)]
    pub applicable_categories: Vec<Uuid>,
    #[serde(default)]
    pub excluded_categories: Vec<Uuid>,
    pub buy_x_count: Option<i32>,
    pub get_y_count: Option<i32>,
    #[serde(default = "default_customer_tier")]
    pub customer_tier: CustomerTier,
    pub min_customer_orders: Option<i32>,
    pub max_customer_orders: Option<i32>,
    pub min_customer_spent: Option<Decimal>,
    pub min_category_items: Option<i32>,
    #[serde(default)]
    pub combinable_with_discounts: bool,
    #[serde(default)]
    pub combinable_with_coupons: bool,
    pub usage_interval_days: Option<i32>,
    pub time_restrictions: Option<TimeRestrictions>,
    pub seasonal_restrictions: Option<SeasonalRestrictions>,
    pub tiered_discounts: Option<Vec<DiscountTier>>,
}

fn default_max_uses_per_customer() -> i32 {
    1
}

fn default_min_order_items() -> i32 {
    1
}

fn default_customer_tier() -> CustomerTier {
    CustomerTier::All
}

/// Status/type filter for coupon listings, plus an optional code search.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CouponFilter {
    pub status: Option<CouponStatus>,
    pub discount_type: Option<DiscountType>,
    pub search: Option<String>,
}

/// Outcome of an apply call. `applied == false` carries the rejection
/// reason; nothing was committed in that case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApplyOutcome {
    pub applied: bool,
    pub reason: Option<String>,
    pub discount_amount: Decimal,
    pub remaining_uses: Option<i32>,
}

impl ApplyOutcome {
    fn rejected(reason: Option<String>) -> Self {
        Self {
            applied: false,
            reason,
            discount_amount: Decimal::ZERO,
            remaining_uses: None,
        }
    }
}

/// Coupon management plus the validate/apply orchestration. Evaluation
/// itself is the pure `evaluate_coupon`; this service loads its inputs,
/// records the audit row and hands commits to the usage ledger.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    clock: SharedClock,
    history: SharedCustomerHistory,
    usage: CouponUsageService,
    audit: CouponAuditService,
    event_sender: Option<Arc<EventSender>>,
}

impl CouponService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        clock: SharedClock,
        history: SharedCustomerHistory,
        usage: CouponUsageService,
        audit: CouponAuditService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            clock,
            history,
            usage,
            audit,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_coupon(
        &self,
        request: CreateCouponRequest,
    ) -> Result<CouponModel, ServiceError> {
        request.validate()?;

        if request.discount_value < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Discount value cannot be negative".to_string(),
            ));
        }

        let now = self.clock.now();
        let valid_from = request.valid_from.unwrap_or(now);
        if let Some(valid_until) = request.valid_until {
            if valid_until <= valid_from {
                return Err(ServiceError::ValidationError(
                    "valid_until must be after valid_from".to_string(),
                ));
            }
        }

        let code = normalize_code(&request.code);
        let db = &*self.db;

        let existing = CouponEntity::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Coupon code '{}' already exists",
                code
            )));
        }

        let coupon_id = Uuid::new_v4();
        let model = coupon::ActiveModel {
            id: Set(coupon_id),
            code: Set(code),
            description: Set(request.description),
            discount_type: Set(request.discount_type),
            discount_value: Set(request.discount_value),
            valid_from: Set(valid_from),
            valid_until: Set(request.valid_until),
            max_uses: Set(request.max_uses),
            max_uses_per_customer: Set(request.max_uses_per_customer),
            current_uses: Set(0),
            min_order_value: Set(request.min_order_value),
            min_order_items: Set(request.min_order_items),
            is_active: Set(true),
            is_one_time_use: Set(request.is_one_time_use),
            applies_to_discounted_items: Set(request.applies_to_discounted_items),
            applicable_products: Set(id_list_json(&request.applicable_products)),
            excluded_products: Set(id_list_json(&request.excluded_products)),
            applicable_categories: Set(id_list_json(&request.applicable_categories)),
            excluded_categories: Set(id_list_json(&request.excluded_categories)),
            buy_x_count: Set(request.buy_x_count),
            get_y_count: Set(request.get_y_count),
            customer_tier: Set(request.customer_tier),
            min_customer_orders: Set(request.min_customer_orders),
            max_customer_orders: Set(request.max_customer_orders),
            min_customer_spent: Set(request.min_customer_spent),
            min_category_items: Set(request.min_category_items),
            combinable_with_discounts: Set(request.combinable_with_discounts),
            combinable_with_coupons: Set(request.combinable_with_coupons),
            usage_interval_days: Set(request.usage_interval_days),
            time_restrictions: Set(request.time_restrictions.map(|rules| json!(rules))),
            seasonal_restrictions: Set(request.seasonal_restrictions.map(|rules| json!(rules))),
            tiered_discounts: Set(request.tiered_discounts.map(|tiers| json!(tiers))),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(db).await.map_err(|e| {
            error!(error = %e, "Failed to create coupon");
            ServiceError::DatabaseError(e)
        })?;

        info!(coupon_id = %created.id, code = %created.code, "Coupon created");
        self.emit(Event::CouponCreated(created.id)).await;

        Ok(created)
    }

    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn get_coupon(&self, coupon_id: Uuid) -> Result<CouponModel, ServiceError> {
        let db = &*self.db;
        CouponEntity::find_by_id(coupon_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))
    }

    #[instrument(skip(self), fields(code = %code))]
    pub async fn get_coupon_by_code(&self, code: &str) -> Result<CouponModel, ServiceError> {
        let normalized = normalize_code(code);
        let db = &*self.db;
        CouponEntity::find()
            .filter(coupon::Column::Code.eq(normalized.clone()))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Coupon with code '{}' not found", normalized))
            })
    }

    /// Paginated listing, newest first. The status filter matches the
    /// derived lifecycle status with its usual precedence.
    #[instrument(skip(self))]
    pub async fn list_coupons(
        &self,
        filter: CouponFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<CouponModel>, u64), ServiceError> {
        let db = &*self.db;

        let mut query = CouponEntity::find();
        if let Some(status) = filter.status {
            query = query.filter(status_condition(status, self.clock.now()));
        }
        if let Some(discount_type) = filter.discount_type {
            query = query.filter(coupon::Column::DiscountType.eq(discount_type));
        }
        if let Some(term) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
        {
            query = query.filter(coupon::Column::Code.contains(term.to_uppercase()));
        }

        let paginator = query
            .order_by_desc(coupon::Column::CreatedAt)
            .paginate(db, per_page.max(1));

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let coupons = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((coupons, total))
    }

    /// Soft-deactivates a coupon. Idempotent.
    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn deactivate_coupon(&self, coupon_id: Uuid) -> Result<CouponModel, ServiceError> {
        let coupon = self.get_coupon(coupon_id).await?;
        if !coupon.is_active {
            return Ok(coupon);
        }

        let db = &*self.db;
        let version = coupon.version;
        let mut active: coupon::ActiveModel = coupon.into();
        active.is_active = Set(false);
        active.updated_at = Set(self.clock.now());
        active.version = Set(version + 1);

        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, coupon_id = %coupon_id, "Failed to deactivate coupon");
            ServiceError::DatabaseError(e)
        })?;

        info!(coupon_id = %coupon_id, code = %updated.code, "Coupon deactivated");
        Ok(updated)
    }

    /// Full evaluation pipeline: resolve the code, load customer inputs,
    /// run the rule chain, append the audit row, emit the event.
    #[instrument(skip(self, cart), fields(code = %code, cart_value = %cart.cart_value))]
    pub async fn validate_coupon(
        &self,
        code: &str,
        customer_id: Option<Uuid>,
        cart: &CartSnapshot,
    ) -> Result<Verdict, ServiceError> {
        let (_, verdict) = self.evaluate_and_audit(code, customer_id, cart).await?;
        Ok(verdict)
    }

    /// Evaluation plus redemption. Rule failures and exclusion-list hits
    /// come back as a rejected outcome; only a fully valid coupon reaches
    /// the ledger. Replaying an apply for an already-redeemed order returns
    /// the prior result without touching the caps or the audit trail.
    #[instrument(skip(self, cart), fields(code = %code, customer_id = %customer_id))]
    pub async fn apply_coupon(
        &self,
        code: &str,
        customer_id: Uuid,
        order_id: Option<Uuid>,
        cart: &CartSnapshot,
    ) -> Result<ApplyOutcome, ServiceError> {
        if let Some(order_id) = order_id {
            let coupon = self.get_coupon_by_code(code).await?;
            if self.usage.order_usage(coupon.id, order_id).await?.is_some() {
                let raw = discounts::calculate_discount(&coupon, &cart.items);
                let discount_amount = raw.round_dp(2).min(cart.cart_value);
                info!(
                    coupon_id = %coupon.id,
                    order_id = %order_id,
                    "Apply replayed for an already-redeemed order"
                );
                return Ok(ApplyOutcome {
                    applied: true,
                    reason: None,
                    discount_amount,
                    remaining_uses: coupon.remaining_uses(),
                });
            }
        }

        let (coupon, verdict) = self
            .evaluate_and_audit(code, Some(customer_id), cart)
            .await?;

        if !verdict.valid {
            return Ok(ApplyOutcome::rejected(verdict.reason));
        }

        if discounts::has_excluded_items(&coupon, &cart.items) {
            return Ok(ApplyOutcome::rejected(Some(
                "Cart contains items excluded from this coupon".to_string(),
            )));
        }

        let raw = discounts::calculate_discount(&coupon, &cart.items);
        let discount_amount = raw.round_dp(2).min(cart.cart_value);

        let committed = self
            .usage
            .commit_usage(coupon.id, customer_id, order_id)
            .await?;
        counter!("coupons.redemptions", 1);

        info!(
            coupon_id = %coupon.id,
            discount_amount = %discount_amount,
            "Coupon applied"
        );
        self.emit(Event::CouponApplied {
            coupon_id: coupon.id,
            customer_id,
            order_id,
            discount_amount,
        })
        .await;

        Ok(ApplyOutcome {
            applied: true,
            reason: None,
            discount_amount,
            remaining_uses: committed.remaining_uses(),
        })
    }

    async fn evaluate_and_audit(
        &self,
        code: &str,
        customer_id: Option<Uuid>,
        cart: &CartSnapshot,
    ) -> Result<(CouponModel, Verdict), ServiceError> {
        let coupon = self.get_coupon_by_code(code).await?;
        let now = self.clock.now();

        if customer_id.is_none() && coupon.has_per_customer_restrictions() {
            self.audit
                .record_attempt(
                    coupon.id,
                    None,
                    false,
                    Some("Customer required for this coupon".to_string()),
                    cart.cart_value,
                    cart.cart_item_count,
                )
                .await?;
            return Err(ServiceError::InvalidInput(format!(
                "Coupon '{}' requires a customer",
                coupon.code
            )));
        }

        let customer = match customer_id {
            Some(id) => Some(CustomerContext {
                stats: self.history.stats(id).await?,
                usage: self.usage.customer_usage(coupon.id, id).await?,
            }),
            None => None,
        };

        let verdict = evaluate_coupon(&coupon, cart, customer.as_ref(), now);
        if verdict.valid {
            counter!("coupons.validations.accepted", 1);
        } else {
            counter!("coupons.validations.rejected", 1);
        }

        self.audit
            .record_attempt(
                coupon.id,
                customer_id,
                verdict.valid,
                verdict.reason.clone(),
                cart.cart_value,
                cart.cart_item_count,
            )
            .await?;

        self.emit(Event::CouponValidated {
            coupon_id: coupon.id,
            customer_id,
            valid: verdict.valid,
        })
        .await;

        Ok((coupon, verdict))
    }

    /// Filters a candidate set down to customers who match the coupon's
    /// tier rule and still have redemptions left.
    #[instrument(skip(self, candidates), fields(coupon_id = %coupon_id, candidates = candidates.len()))]
    pub async fn eligible_customers(
        &self,
        coupon_id: Uuid,
        candidates: &[Uuid],
    ) -> Result<Vec<Uuid>, ServiceError> {
        let coupon = self.get_coupon(coupon_id).await?;
        let mut eligible = Vec::new();

        for &candidate in candidates {
            let stats = self.history.stats(candidate).await?;
            if !stats.satisfies_tier(coupon.customer_tier) {
                continue;
            }
            if coupon.max_uses_per_customer > 0 {
                let usage = self.usage.customer_usage(coupon_id, candidate).await?;
                if usage.count >= coupon.max_uses_per_customer as u64 {
                    continue;
                }
            }
            eligible.push(candidate);
        }

        Ok(eligible)
    }

    /// Soft-deactivates coupons whose expiry lies further back than the
    /// grace period. Invoked by the external job runner.
    #[instrument(skip(self))]
    pub async fn deactivate_expired(&self, grace_days: i64) -> Result<u64, ServiceError> {
        let now = self.clock.now();
        let cutoff = now - Duration::days(grace_days.max(0));
        let db = &*self.db;

        let result = CouponEntity::update_many()
            .col_expr(coupon::Column::IsActive, Expr::value(false))
            .col_expr(
                coupon::Column::Version,
                Expr::col(coupon::Column::Version).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::ValidUntil.is_not_null())
            .filter(coupon::Column::ValidUntil.lt(cutoff))
            .exec(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected > 0 {
            info!(
                count = result.rows_affected,
                "Deactivated coupons expired past the grace period"
            );
            self.emit(Event::CouponsDeactivated {
                count: result.rows_affected,
            })
            .await;
        }

        Ok(result.rows_affected)
    }

    /// Active coupons whose expiry falls inside the notification window,
    /// soonest first. Emits one `CouponExpiringSoon` per match.
    #[instrument(skip(self))]
    pub async fn find_expiring_soon(
        &self,
        window_days: i64,
    ) -> Result<Vec<CouponModel>, ServiceError> {
        let now = self.clock.now();
        let horizon = now + Duration::days(window_days.max(0));
        let db = &*self.db;

        let coupons = CouponEntity::find()
            .filter(coupon::Column::IsActive.eq(true))
            .filter(coupon::Column::ValidUntil.is_not_null())
            .filter(coupon::Column::ValidUntil.gt(now))
            .filter(coupon::Column::ValidUntil.lte(horizon))
            .order_by_asc(coupon::Column::ValidUntil)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        for coupon in &coupons {
            if let Some(valid_until) = coupon.valid_until {
                self.emit(Event::CouponExpiringSoon {
                    coupon_id: coupon.id,
                    code: coupon.code.clone(),
                    days_left: (valid_until - now).num_days(),
                })
                .await;
            }
        }

        Ok(coupons)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send coupon event");
            }
        }
    }
}

fn id_list_json(ids: &[Uuid]) -> Option<serde_json::Value> {
    (!ids.is_empty()).then(|| json!(ids))
}

/// Derived-status filter expressed over the stored columns, honoring the
/// same precedence as `Model::status`.
fn status_condition(status: CouponStatus, now: DateTime<Utc>) -> Condition {
    let not_expired = Condition::any()
        .add(coupon::Column::ValidUntil.is_null())
        .add(coupon::Column::ValidUntil.gte(now));
    let not_depleted = Condition::any()
        .add(coupon::Column::MaxUses.is_null())
        .add(Expr::col(coupon::Column::CurrentUses).lt(Expr::col(coupon::Column::MaxUses)));

    match status {
        CouponStatus::Cancelled => Condition::all().add(coupon::Column::IsActive.eq(false)),
        CouponStatus::Expired => Condition::all()
            .add(coupon::Column::IsActive.eq(true))
            .add(coupon::Column::ValidUntil.is_not_null())
            .add(coupon::Column::ValidUntil.lt(now)),
        CouponStatus::Depleted => Condition::all()
            .add(coupon::Column::IsActive.eq(true))
            .add(not_expired)
            .add(coupon::Column::MaxUses.is_not_null())
            .add(Expr::col(coupon::Column::CurrentUses).gte(Expr::col(coupon::Column::MaxUses))),
        CouponStatus::Scheduled => Condition::all()
            .add(coupon::Column::IsActive.eq(true))
            .add(not_expired)
            .add(not_depleted)
            .add(coupon::Column::ValidFrom.gt(now)),
        CouponStatus::Active => Condition::all()
            .add(coupon::Column::IsActive.eq(true))
            .add(not_expired)
            .add(not_depleted)
            .add(coupon::Column::ValidFrom.lte(now)),
    }
}
