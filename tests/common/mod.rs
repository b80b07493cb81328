use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use promo_api::{
    clock::{self, SharedClock},
    config::AppConfig,
    db,
    entities::order::{self, Model as OrderModel, OrderStatus, PaymentStatus},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::customer_history::{CustomerHistoryProvider, CustomerStats, SharedCustomerHistory},
    AppState,
};

#[allow(dead_code)]
mockall::mock! {
    pub CustomerHistory {}

    #[async_trait::async_trait]
    impl CustomerHistoryProvider for CustomerHistory {
        async fn stats(&self, customer_id: Uuid) -> Result<CustomerStats, ServiceError>;
    }
}

/// Helper harness for spinning up an application state backed by a fresh
/// SQLite database per instance.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::build(clock::system_clock(), None).await
    }

    /// Same as `new`, but with the wall clock pinned.
    #[allow(dead_code)]
    pub async fn with_clock(clock: SharedClock) -> Self {
        Self::build(clock, None).await
    }

    /// Same as `new`, but with customer purchase history stubbed out so tier
    /// rules can be tested without seeding delivered orders.
    #[allow(dead_code)]
    pub async fn with_history(history: SharedCustomerHistory) -> Self {
        Self::build(clock::system_clock(), Some(history)).await
    }

    async fn build(clock: SharedClock, history: Option<SharedCustomerHistory>) -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir for test database");
        let db_path = db_dir.path().join("promo_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        // SQLite permits one writer at a time; a single pooled connection
        // keeps concurrent tests from tripping over busy errors.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = match history {
            Some(history) => AppServices::with_history(
                db_arc.clone(),
                clock.clone(),
                history,
                Some(event_sender.clone()),
            ),
            None => AppServices::new(db_arc.clone(), clock.clone(), Some(event_sender.clone())),
        };

        let state = AppState {
            db: db_arc,
            config: cfg,
            clock,
            event_sender: Some(event_sender),
            services,
        };

        let router = Router::new()
            .nest("/api/v1", promo_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Send a JSON request against the router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Insert an order directly, bypassing the HTTP surface.
    #[allow(dead_code)]
    pub async fn seed_order(
        &self,
        customer_id: Uuid,
        status: OrderStatus,
        payment_status: PaymentStatus,
    ) -> OrderModel {
        self.seed_order_with_total(customer_id, status, payment_status, dec!(59.00))
            .await
    }

    #[allow(dead_code)]
    pub async fn seed_order_with_total(
        &self,
        customer_id: Uuid,
        status: OrderStatus,
        payment_status: PaymentStatus,
        total: Decimal,
    ) -> OrderModel {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let row = order::ActiveModel {
            id: Set(id),
            order_number: Set(format!("ORD-{}", &id.simple().to_string()[..8])),
            customer_id: Set(customer_id),
            status: Set(status),
            payment_status: Set(payment_status),
            subtotal: Set(total),
            tax: Set(Decimal::ZERO),
            delivery_fee: Set(Decimal::ZERO),
            discount_amount: Set(Decimal::ZERO),
            total: Set(total),
            applied_coupon_id: Set(None),
            delivery_method: Set(Some("courier".to_string())),
            delivery_address: Set(None),
            processing_started_at: Set(None),
            ready_at: Set(None),
            shipped_at: Set(None),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            refunded_at: Set(None),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        row.insert(&*self.state.db).await.expect("seed order")
    }

    /// Seed `count` delivered, paid orders so the real history provider
    /// reports them as purchase history.
    #[allow(dead_code)]
    pub async fn seed_delivered_orders(&self, customer_id: Uuid, count: usize, total_each: Decimal) {
        for _ in 0..count {
            self.seed_order_with_total(
                customer_id,
                OrderStatus::Delivered,
                PaymentStatus::Paid,
                total_each,
            )
            .await;
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Decode a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes")
        .to_vec();
    serde_json::from_slice(&bytes).expect("json response")
}
