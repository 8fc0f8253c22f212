#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, IntoActiveModel, Set};
use serde_json::Value;
use stock_ledger_api::{
    auth::ADMIN_ROLE,
    build_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        order, order_item, product, product_variant, purchase_order, purchase_order_line,
        sea_orm_active_enums::{
            FulfillmentStatus, MovementSource, MovementType, OrderStatus, PaymentStatus,
            PurchaseOrderStatus,
        },
    },
    events::{self, EventSender},
    services::{
        ledger::{LedgerWriter, NewMovement},
        stock::{StockProjector, StockTarget},
    },
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_the_stock_ledger_suite_32chars";

/// Application state backed by a private SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub user_id: Uuid,
    token: String,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: Option<TempDir>,
}

impl TestApp {
    /// In-memory database behind a single connection.
    pub async fn new() -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "test".to_string(),
        );
        let pool = db::establish_connection_with_config(&DbConfig::in_memory())
            .await
            .expect("failed to create test database");
        Self::with_pool(pool, cfg, None).await
    }

    /// WAL-mode database file behind several connections, so transactions
    /// really overlap. The retry budget is large enough to outlast a writer
    /// that holds the lock for a few hundred milliseconds.
    pub async fn with_shared_database() -> Self {
        let dir = tempfile::tempdir().expect("create database dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("ledger.db").display()
        );
        let mut cfg = AppConfig::new(url.clone(), TEST_JWT_SECRET.to_string(), "test".to_string());
        cfg.transition_max_retries = 40;

        let pool = db::establish_connection_with_config(&DbConfig {
            url,
            max_connections: 4,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to open test database file");
        pool.execute_unprepared("PRAGMA journal_mode=WAL")
            .await
            .expect("enable WAL");
        Self::with_pool(pool, cfg, Some(dir)).await
    }

    async fn with_pool(pool: db::DbPool, cfg: AppConfig, db_dir: Option<TempDir>) -> Self {
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, Arc::new(event_sender));
        let user_id = Uuid::new_v4();
        let token = state
            .auth
            .issue_token(user_id, &[ADMIN_ROLE])
            .expect("issue admin token");

        Self {
            router: build_router(state.clone()),
            state,
            user_id,
            token,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_for(&self, user_id: Uuid, roles: &[&str]) -> String {
        self.state
            .auth
            .issue_token(user_id, roles)
            .expect("issue token")
    }

    pub fn db(&self) -> &db::DbPool {
        &self.state.db
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        self.request_with_headers(method, uri, body, token, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

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

    /// Convenience helper for admin requests.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    pub async fn seed_product(&self, sku: &str, initial_stock: i32) -> product::Model {
        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(self.user_id),
            name: Set(format!("Product {}", sku)),
            sku: Set(sku.to_string()),
            stock: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed product");

        self.seed_stock(StockTarget::Product(product.id), initial_stock)
            .await;
        product::Entity::find_by_id(product.id)
            .one(self.db())
            .await
            .expect("reload product")
            .expect("product exists")
    }

    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        sku: &str,
        initial_stock: i32,
    ) -> product_variant::Model {
        let now = Utc::now();
        let variant = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            sku: Set(sku.to_string()),
            name: Set(format!("Variant {}", sku)),
            stock: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed variant");

        self.seed_stock(StockTarget::Variant(variant.id), initial_stock)
            .await;
        product_variant::Entity::find_by_id(variant.id)
            .one(self.db())
            .await
            .expect("reload variant")
            .expect("variant exists")
    }

    /// Opening stock goes through the ledger so counters and ledger agree.
    async fn seed_stock(&self, target: StockTarget, qty: i32) {
        if qty == 0 {
            return;
        }
        let movement = NewMovement::new(
            target,
            MovementType::Adjust,
            MovementSource::Manual,
            qty,
            self.user_id,
        )
        .with_note(Some("opening stock".to_string()));
        LedgerWriter::post(self.db(), movement)
            .await
            .expect("seed opening stock");
    }

    pub async fn stock_of(&self, target: StockTarget) -> i64 {
        StockProjector::current_stock(self.db(), target)
            .await
            .expect("read stock")
    }

    /// A PENDING, paid order with one item per `(product, variant, qty)`.
    pub async fn seed_order(
        &self,
        lines: &[(Uuid, Option<Uuid>, i32)],
    ) -> (order::Model, Vec<order_item::Model>) {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let subtotal: i64 = lines.iter().map(|(_, _, qty)| i64::from(*qty) * 1_000).sum();
        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(self.user_id),
            order_number: Set(format!("SO-{}", &order_id.simple().to_string()[..8])),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Paid),
            fulfillment_status: Set(FulfillmentStatus::Unfulfilled),
            subtotal_cents: Set(subtotal),
            shipping_cents: Set(0),
            tax_cents: Set(0),
            total_cents: Set(subtotal),
            currency: Set("USD".to_string()),
            cancelled_at: Set(None),
            returned_at: Set(None),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed order");

        let mut items = Vec::with_capacity(lines.len());
        for (position, (product_id, variant_id, qty)) in lines.iter().enumerate() {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(*product_id),
                variant_id: Set(*variant_id),
                sku: Set(format!("SKU-{}", position)),
                name: Set(format!("Item {}", position)),
                unit_price_cents: Set(1_000),
                qty: Set(*qty),
                qty_reserved: Set(0),
                qty_shipped: Set(0),
                qty_returned: Set(0),
                position: Set(position as i32),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(self.db())
            .await
            .expect("seed order item");
            items.push(item);
        }

        (order, items)
    }

    /// Ships `qty` units of an item the way the shipping flow would: an OUT
    /// movement plus the counter, and the order moves to `status`.
    pub async fn ship(&self, item: &order_item::Model, qty: i32, status: OrderStatus) -> order_item::Model {
        let movement = NewMovement::new(
            StockTarget::resolve(item.product_id, item.variant_id),
            MovementType::Out,
            MovementSource::Order,
            -qty,
            self.user_id,
        )
        .with_order_item(item.id);
        LedgerWriter::post(self.db(), movement)
            .await
            .expect("post shipment movement");

        let shipped = item.qty_shipped + qty;
        let mut active = item.clone().into_active_model();
        active.qty_shipped = Set(shipped);
        let item = active.update(self.db()).await.expect("update shipped qty");

        let order = order::Entity::find_by_id(item.order_id)
            .one(self.db())
            .await
            .expect("load order")
            .expect("order exists");
        let mut active = order.into_active_model();
        active.status = Set(status);
        active.update(self.db()).await.expect("update order status");

        item
    }

    /// A DRAFT purchase order with one line per `(product, variant, qty)`.
    pub async fn seed_purchase_order(
        &self,
        lines: &[(Uuid, Option<Uuid>, i32)],
    ) -> (purchase_order::Model, Vec<purchase_order_line::Model>) {
        let now = Utc::now();
        let po_id = Uuid::new_v4();
        let purchase_order = purchase_order::ActiveModel {
            id: Set(po_id),
            user_id: Set(self.user_id),
            po_number: Set(format!("PO-{}", &po_id.simple().to_string()[..8])),
            supplier_name: Set(Some("Acme Supply".to_string())),
            status: Set(PurchaseOrderStatus::Draft),
            approved_at: Set(None),
            received_at: Set(None),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed purchase order");

        let mut po_lines = Vec::with_capacity(lines.len());
        for (position, (product_id, variant_id, qty)) in lines.iter().enumerate() {
            let line = purchase_order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(po_id),
                product_id: Set(*product_id),
                variant_id: Set(*variant_id),
                qty_ordered: Set(*qty),
                qty_received: Set(0),
                unit_cost_cents: Set(450),
                position: Set(position as i32),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(self.db())
            .await
            .expect("seed purchase order line");
            po_lines.push(line);
        }

        (purchase_order, po_lines)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
