//! End-to-end tests for the coupon surface: create, validate, apply,
//! audit trail, lifecycle filters and expiry listing.

mod common;

use std::str::FromStr;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use common::{response_json, MockCustomerHistory, TestApp};
use promo_api::clock::FixedClock;
use promo_api::services::customer_history::CustomerStats;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

fn cart_items(quantity: i32, unit_price: &str) -> Value {
    json!([{
        "product_id": Uuid::new_v4(),
        "category_id": null,
        "quantity": quantity,
        "unit_price": unit_price,
        "is_discounted": false
    }])
}

fn decimal_field(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal serialized as string")).expect("valid decimal")
}

#[tokio::test]
async fn create_validate_apply_round_trip() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    // Create: the stored code is upper-cased.
    let create = app
        .request(
            Method::POST,
            "/api/v1/coupons",
            Some(json!({
                "code": "save10",
                "description": "Ten percent off",
                "discount_type": "percentage",
                "discount_value": "10",
                "min_order_value": "50",
                "max_uses": 100,
                "max_uses_per_customer": 5
            })),
        )
        .await;
    assert_eq!(create.status(), StatusCode::CREATED);
    let created = response_json(create).await;
    assert_eq!(created["data"]["code"], "SAVE10");
    assert_eq!(created["data"]["status"], "active");
    assert_eq!(created["data"]["remaining_uses"], 100);
    let coupon_id = created["data"]["id"].as_str().expect("coupon id").to_string();

    // Same code again is a conflict.
    let duplicate = app
        .request(
            Method::POST,
            "/api/v1/coupons",
            Some(json!({
                "code": "SAVE10",
                "discount_type": "fixed",
                "discount_value": "5"
            })),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    // Validation failure names the offending figures.
    let too_small = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({
                "code": " save10 ",
                "customer_id": customer_id,
                "items": cart_items(1, "30.00")
            })),
        )
        .await;
    assert_eq!(too_small.status(), StatusCode::OK);
    let verdict = response_json(too_small).await;
    assert_eq!(verdict["data"]["valid"], false);
    let reason = verdict["data"]["reason"].as_str().expect("reason");
    assert!(reason.contains("below minimum"), "got reason: {reason}");

    // A qualifying cart passes; lookup trims and upper-cases the code.
    let ok = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({
                "code": " save10 ",
                "customer_id": customer_id,
                "items": cart_items(2, "30.00")
            })),
        )
        .await;
    let verdict = response_json(ok).await;
    assert_eq!(verdict["data"]["valid"], true);
    assert!(verdict["data"]["reason"].is_null());

    // Apply computes 10% of the 60.00 cart and burns one use.
    let order_id = Uuid::new_v4();
    let apply = app
        .request(
            Method::POST,
            "/api/v1/coupons/apply",
            Some(json!({
                "code": "SAVE10",
                "customer_id": customer_id,
                "order_id": order_id,
                "items": cart_items(2, "30.00")
            })),
        )
        .await;
    assert_eq!(apply.status(), StatusCode::OK);
    let outcome = response_json(apply).await;
    assert_eq!(outcome["data"]["applied"], true);
    assert_eq!(decimal_field(&outcome["data"]["discount_amount"]), dec!(6));
    assert_eq!(outcome["data"]["remaining_uses"], 99);

    // Replaying the same order does not burn a second use.
    let replay = app
        .request(
            Method::POST,
            "/api/v1/coupons/apply",
            Some(json!({
                "code": "SAVE10",
                "customer_id": customer_id,
                "order_id": order_id,
                "items": cart_items(2, "30.00")
            })),
        )
        .await;
    let outcome = response_json(replay).await;
    assert_eq!(outcome["data"]["applied"], true);
    assert_eq!(decimal_field(&outcome["data"]["discount_amount"]), dec!(6));

    let usages = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/coupons/{coupon_id}/usages"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(usages["data"]["total"], 1);
    assert_eq!(
        usages["data"]["items"][0]["order_id"],
        json!(order_id.to_string())
    );

    // Two validations and one committed apply were audited; the replay
    // never re-evaluated.
    let attempts = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/coupons/{coupon_id}/attempts"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(attempts["data"]["total"], 3);
    let failures: Vec<&Value> = attempts["data"]["items"]
        .as_array()
        .expect("attempt rows")
        .iter()
        .filter(|attempt| attempt["is_valid"] == false)
        .collect();
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn lookup_deactivate_and_filters() {
    let app = TestApp::new().await;

    let created = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons",
            Some(json!({
                "code": "SPRING-SALE",
                "discount_type": "fixed",
                "discount_value": "15",
                "min_order_value": "0"
            })),
        )
        .await,
    )
    .await;
    let coupon_id = created["data"]["id"].as_str().expect("coupon id").to_string();

    // Code lookup is case-insensitive.
    let by_code = app
        .request(Method::GET, "/api/v1/coupons/code/spring-sale", None)
        .await;
    assert_eq!(by_code.status(), StatusCode::OK);
    let found = response_json(by_code).await;
    assert_eq!(found["data"]["id"].as_str(), Some(coupon_id.as_str()));

    // Deactivation is a soft cancel and flips the derived status.
    let deactivated = response_json(
        app.request(
            Method::POST,
            &format!("/api/v1/coupons/{coupon_id}/deactivate"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(deactivated["data"]["status"], "cancelled");
    assert_eq!(deactivated["data"]["is_active"], false);

    // The rule chain reports the inactive flag first.
    let verdict = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "SPRING-SALE", "items": cart_items(1, "10.00") })),
        )
        .await,
    )
    .await;
    assert_eq!(verdict["data"]["valid"], false);
    assert_eq!(verdict["data"]["reason"], "Coupon is not active");

    // Status filter sees it under cancelled, not under active.
    let cancelled = response_json(
        app.request(Method::GET, "/api/v1/coupons?status=cancelled", None)
            .await,
    )
    .await;
    assert_eq!(cancelled["data"]["total"], 1);

    let active = response_json(
        app.request(Method::GET, "/api/v1/coupons?status=active", None)
            .await,
    )
    .await;
    assert_eq!(active["data"]["total"], 0);

    // Search matches against the normalized code.
    let searched = response_json(
        app.request(Method::GET, "/api/v1/coupons?search=spring", None)
            .await,
    )
    .await;
    assert_eq!(searched["data"]["total"], 1);
}

#[tokio::test]
async fn malformed_and_unknown_coupons_are_rejected() {
    let app = TestApp::new().await;

    // Codes with spaces never reach the table.
    let bad_code = app
        .request(
            Method::POST,
            "/api/v1/coupons",
            Some(json!({
                "code": "has space",
                "discount_type": "fixed",
                "discount_value": "5"
            })),
        )
        .await;
    assert_eq!(bad_code.status(), StatusCode::BAD_REQUEST);

    // Negative discount values are rejected before insert.
    let negative = app
        .request(
            Method::POST,
            "/api/v1/coupons",
            Some(json!({
                "code": "NEGATIVE",
                "discount_type": "fixed",
                "discount_value": "-5"
            })),
        )
        .await;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

    // Unknown codes are a 404, for validation and application alike.
    let unknown = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "NOPE", "items": cart_items(1, "10.00") })),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let unknown_id = Uuid::new_v4();
    let usages = app
        .request(
            Method::GET,
            &format!("/api/v1/coupons/{unknown_id}/usages"),
            None,
        )
        .await;
    assert_eq!(usages.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn vip_tier_rules_consult_customer_history() {
    // Five orders and $400 of spend is short of VIP on both axes.
    let mut below = MockCustomerHistory::new();
    below.expect_stats().returning(|_| {
        Ok(CustomerStats {
            delivered_order_count: 5,
            total_spent: dec!(400),
        })
    });
    let app = TestApp::with_history(Arc::new(below)).await;

    app.request(
        Method::POST,
        "/api/v1/coupons",
        Some(json!({
            "code": "VIP20",
            "discount_type": "percentage",
            "discount_value": "20",
            "min_order_value": "0",
            "customer_tier": "vip"
        })),
    )
    .await;

    let verdict = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({
                "code": "VIP20",
                "customer_id": Uuid::new_v4(),
                "items": cart_items(1, "80.00")
            })),
        )
        .await,
    )
    .await;
    assert_eq!(verdict["data"]["valid"], false);
    let reason = verdict["data"]["reason"].as_str().expect("reason");
    assert!(reason.contains("VIP"), "got reason: {reason}");

    // Tier-gated coupons cannot be evaluated anonymously.
    let anonymous = app
        .request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "VIP20", "items": cart_items(1, "80.00") })),
        )
        .await;
    assert_eq!(anonymous.status(), StatusCode::BAD_REQUEST);

    // A qualified customer passes the same gate.
    let mut qualified = MockCustomerHistory::new();
    qualified.expect_stats().returning(|_| {
        Ok(CustomerStats {
            delivered_order_count: 12,
            total_spent: dec!(2000),
        })
    });
    let app = TestApp::with_history(Arc::new(qualified)).await;

    app.request(
        Method::POST,
        "/api/v1/coupons",
        Some(json!({
            "code": "VIP20",
            "discount_type": "percentage",
            "discount_value": "20",
            "min_order_value": "0",
            "customer_tier": "vip"
        })),
    )
    .await;

    let verdict = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({
                "code": "VIP20",
                "customer_id": Uuid::new_v4(),
                "items": cart_items(1, "80.00")
            })),
        )
        .await,
    )
    .await;
    assert_eq!(verdict["data"]["valid"], true);
}

#[tokio::test]
async fn regular_tier_reads_delivered_orders_from_the_database() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    app.seed_delivered_orders(customer_id, 3, dec!(50)).await;

    app.request(
        Method::POST,
        "/api/v1/coupons",
        Some(json!({
            "code": "LOYAL5",
            "discount_type": "fixed",
            "discount_value": "5",
            "min_order_value": "0",
            "customer_tier": "regular"
        })),
    )
    .await;

    let verdict = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({
                "code": "LOYAL5",
                "customer_id": customer_id,
                "items": cart_items(1, "20.00")
            })),
        )
        .await,
    )
    .await;
    assert_eq!(verdict["data"]["valid"], true);

    // A stranger with no delivered orders does not qualify.
    let verdict = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({
                "code": "LOYAL5",
                "customer_id": Uuid::new_v4(),
                "items": cart_items(1, "20.00")
            })),
        )
        .await,
    )
    .await;
    assert_eq!(verdict["data"]["valid"], false);
}

#[tokio::test]
async fn eligible_customer_filter_honours_tier_and_remaining_uses() {
    let app = TestApp::new().await;
    let qualified = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let spent = Uuid::new_v4();
    app.seed_delivered_orders(qualified, 3, dec!(40)).await;
    app.seed_delivered_orders(spent, 3, dec!(40)).await;

    let created = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons",
            Some(json!({
                "code": "LOYALTY10",
                "discount_type": "percentage",
                "discount_value": "10",
                "min_order_value": "0",
                "customer_tier": "regular"
            })),
        )
        .await,
    )
    .await;
    let coupon_id = created["data"]["id"]
        .as_str()
        .and_then(|id| Uuid::from_str(id).ok())
        .expect("coupon id");

    // Burn the single per-customer use for one qualified customer.
    app.request(
        Method::POST,
        "/api/v1/coupons/apply",
        Some(json!({
            "code": "LOYALTY10",
            "customer_id": spent,
            "order_id": Uuid::new_v4(),
            "items": cart_items(1, "30.00")
        })),
    )
    .await;

    let eligible = app
        .state
        .services
        .coupons
        .eligible_customers(coupon_id, &[qualified, stranger, spent])
        .await
        .expect("eligibility filter");
    assert_eq!(eligible, vec![qualified]);
}

#[tokio::test]
async fn one_time_use_caps_a_customer_at_a_single_redemption() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    app.request(
        Method::POST,
        "/api/v1/coupons",
        Some(json!({
            "code": "ONCE",
            "discount_type": "fixed",
            "discount_value": "5",
            "min_order_value": "0",
            "is_one_time_use": true,
            "max_uses_per_customer": 5
        })),
    )
    .await;

    let first = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons/apply",
            Some(json!({
                "code": "ONCE",
                "customer_id": customer_id,
                "order_id": Uuid::new_v4(),
                "items": cart_items(1, "25.00")
            })),
        )
        .await,
    )
    .await;
    assert_eq!(first["data"]["applied"], true);

    // One-time-use wins over the larger per-customer cap.
    let second = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons/apply",
            Some(json!({
                "code": "ONCE",
                "customer_id": customer_id,
                "order_id": Uuid::new_v4(),
                "items": cart_items(1, "25.00")
            })),
        )
        .await,
    )
    .await;
    assert_eq!(second["data"]["applied"], false);
    assert_eq!(
        second["data"]["reason"],
        "Coupon usage limit reached for this customer"
    );
}

#[tokio::test]
async fn time_windows_gate_redemption_by_day_and_hour() {
    // Monday 2024-03-04, 10:00 UTC.
    let monday_morning = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
    let app = TestApp::with_clock(Arc::new(FixedClock(monday_morning))).await;

    app.request(
        Method::POST,
        "/api/v1/coupons",
        Some(json!({
            "code": "WEEKDAY",
            "discount_type": "fixed",
            "discount_value": "5",
            "min_order_value": "0",
            "valid_from": "2024-01-01T00:00:00Z",
            "time_restrictions": { "days": ["monday"], "hours": { "start": 9, "end": 17 } }
        })),
    )
    .await;
    app.request(
        Method::POST,
        "/api/v1/coupons",
        Some(json!({
            "code": "SUNDAY",
            "discount_type": "fixed",
            "discount_value": "5",
            "min_order_value": "0",
            "valid_from": "2024-01-01T00:00:00Z",
            "time_restrictions": { "days": ["sunday"] }
        })),
    )
    .await;

    let verdict = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "WEEKDAY", "items": cart_items(1, "10.00") })),
        )
        .await,
    )
    .await;
    assert_eq!(verdict["data"]["valid"], true);

    let verdict = response_json(
        app.request(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "SUNDAY", "items": cart_items(1, "10.00") })),
        )
        .await,
    )
    .await;
    assert_eq!(verdict["data"]["valid"], false);
    assert_eq!(verdict["data"]["reason"], "Coupon is not valid at this time");
}

#[tokio::test]
async fn expiring_listing_honours_the_window() {
    let app = TestApp::new().await;
    let soon = Utc::now() + Duration::days(3);
    let later = Utc::now() + Duration::days(45);

    for (code, until) in [("SOON", soon), ("LATER", later)] {
        app.request(
            Method::POST,
            "/api/v1/coupons",
            Some(json!({
                "code": code,
                "discount_type": "fixed",
                "discount_value": "5",
                "min_order_value": "0",
                "valid_until": until.to_rfc3339()
            })),
        )
        .await;
    }

    // Default window is seven days.
    let expiring = response_json(
        app.request(Method::GET, "/api/v1/coupons/expiring", None)
            .await,
    )
    .await;
    let codes: Vec<&str> = expiring["data"]
        .as_array()
        .expect("expiring list")
        .iter()
        .filter_map(|coupon| coupon["code"].as_str())
        .collect();
    assert_eq!(codes, vec!["SOON"]);

    // A one-day window excludes both.
    let expiring = response_json(
        app.request(Method::GET, "/api/v1/coupons/expiring?days=1", None)
            .await,
    )
    .await;
    assert_eq!(expiring["data"].as_array().expect("expiring list").len(), 0);

    // A wide window picks up both, soonest first.
    let expiring = response_json(
        app.request(Method::GET, "/api/v1/coupons/expiring?days=60", None)
            .await,
    )
    .await;
    let codes: Vec<&str> = expiring["data"]
        .as_array()
        .expect("expiring list")
        .iter()
        .filter_map(|coupon| coupon["code"].as_str())
        .collect();
    assert_eq!(codes, vec!["SOON", "LATER"]);
}
