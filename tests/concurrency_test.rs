mod common;

use assert_matches::assert_matches;
use common::TestApp;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use std::time::Duration;
use stock_ledger_api::{
    commands::purchaseorders::ReceiveLine,
    entities::{
        sea_orm_active_enums::{MovementType, OrderStatus, PurchaseOrderStatus},
        stock_movement,
    },
    errors::ServiceError,
    metrics::TRANSITION_RETRIES,
    repositories::{OrderRepository, PurchaseOrderRepository},
    services::{idempotency::IdempotencyKey, stock::StockTarget},
};
use uuid::Uuid;

/// How long a competing writer keeps its transaction open.
const HOLD: Duration = Duration::from_millis(150);

async fn movements_of(app: &TestApp, order_item_id: Uuid, movement_type: MovementType) -> usize {
    stock_movement::Entity::find()
        .filter(stock_movement::Column::OrderItemId.eq(order_item_id))
        .filter(stock_movement::Column::Type.eq(movement_type))
        .all(app.db())
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn stale_order_version_is_a_concurrent_modification() {
    let app = TestApp::new().await;
    let product = app.seed_product("LOCK", 1).await;
    let (order, _) = app.seed_order(&[(product.id, None, 1)]).await;

    let bumped = OrderRepository::bump_version(app.db(), order.id, order.version)
        .await
        .unwrap();
    assert_eq!(bumped, order.version + 1);

    let stale = OrderRepository::bump_version(app.db(), order.id, order.version).await;
    assert_matches!(stale, Err(ServiceError::ConcurrentModification(id)) if id == order.id);
}

#[tokio::test]
async fn stale_purchase_order_version_is_a_concurrent_modification() {
    let app = TestApp::new().await;
    let product = app.seed_product("HINGE", 0).await;
    let (po, _) = app.seed_purchase_order(&[(product.id, None, 1)]).await;

    PurchaseOrderRepository::bump_version(app.db(), po.id, po.version)
        .await
        .unwrap();
    let stale = PurchaseOrderRepository::bump_version(app.db(), po.id, po.version).await;

    assert_matches!(stale, Err(ServiceError::ConcurrentModification(_)));
}

#[tokio::test]
async fn confirm_that_loses_a_write_race_is_rerun_from_scratch() {
    let app = TestApp::with_shared_database().await;
    let product = app.seed_product("LATCH", 3).await;
    let (order, items) = app.seed_order(&[(product.id, None, 3)]).await;
    let retries_before = TRANSITION_RETRIES.get();

    // Another writer claims the order and keeps its transaction open while
    // the confirm reads the old version.
    let competitor = app.db().begin().await.unwrap();
    OrderRepository::bump_version(&competitor, order.id, order.version)
        .await
        .unwrap();

    let orders = app.state.services.orders.clone();
    let user_id = app.user_id;
    let confirm = tokio::spawn(async move { orders.confirm(user_id, order.id, None).await });
    tokio::time::sleep(HOLD).await;
    competitor.commit().await.unwrap();

    let confirmed = confirm.await.unwrap().unwrap();
    assert!(confirmed.applied);
    assert_eq!(confirmed.order.status, OrderStatus::Confirmed);
    assert_eq!(confirmed.order.version, order.version + 2);
    assert_eq!(confirmed.items[0].qty_reserved, 3);
    assert!(TRANSITION_RETRIES.get() > retries_before);
    assert_eq!(movements_of(&app, items[0].id, MovementType::Reserve).await, 1);
}

#[tokio::test]
async fn receive_that_loses_a_write_race_books_stock_once() {
    let app = TestApp::with_shared_database().await;
    let product = app.seed_product("SPRING", 0).await;
    let (po, lines) = app.seed_purchase_order(&[(product.id, None, 10)]).await;
    let service = app.state.services.purchase_orders.clone();
    let approved = service.approve(app.user_id, po.id).await.unwrap();
    let retries_before = TRANSITION_RETRIES.get();

    let competitor = app.db().begin().await.unwrap();
    PurchaseOrderRepository::bump_version(&competitor, po.id, approved.purchase_order.version)
        .await
        .unwrap();

    let receiver = service.clone();
    let user_id = app.user_id;
    let line = ReceiveLine { po_line_id: lines[0].id, qty: 6 };
    let receive = tokio::spawn(async move {
        receiver
            .receive(user_id, po.id, vec![line], None, IdempotencyKey::parse(Some("grn-1")))
            .await
    });
    tokio::time::sleep(HOLD).await;
    competitor.commit().await.unwrap();

    let outcome = receive.await.unwrap().unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.purchase_order.status, PurchaseOrderStatus::Partial);
    assert_eq!(outcome.purchase_order.version, approved.purchase_order.version + 2);
    assert_eq!(outcome.lines[0].qty_received, 6);
    assert!(TRANSITION_RETRIES.get() > retries_before);
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 6);
}

#[tokio::test]
async fn racing_confirms_reserve_each_item_once() {
    let app = TestApp::with_shared_database().await;
    let product = app.seed_product("KEY", 2).await;
    let (order, items) = app.seed_order(&[(product.id, None, 2)]).await;
    let user_id = app.user_id;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let orders = app.state.services.orders.clone();
            tokio::spawn(async move { orders.confirm(user_id, order.id, None).await })
        })
        .collect();
    let mut applied = 0;
    for handle in handles {
        let transition = handle.await.unwrap().unwrap();
        assert_eq!(transition.order.status, OrderStatus::Confirmed);
        applied += usize::from(transition.applied);
    }

    assert_eq!(applied, 1);
    let (current, current_items) = app
        .state
        .services
        .orders
        .get_order(user_id, order.id)
        .await
        .unwrap();
    assert_eq!(current.version, order.version + 1);
    assert_eq!(current_items[0].qty_reserved, 2);
    assert_eq!(movements_of(&app, items[0].id, MovementType::Reserve).await, 1);
}

#[tokio::test]
async fn racing_receives_with_one_key_book_stock_once() {
    let app = TestApp::with_shared_database().await;
    let product = app.seed_product("COIL", 0).await;
    let (po, lines) = app.seed_purchase_order(&[(product.id, None, 10)]).await;
    let service = app.state.services.purchase_orders.clone();
    service.approve(app.user_id, po.id).await.unwrap();
    let user_id = app.user_id;
    let line = ReceiveLine { po_line_id: lines[0].id, qty: 6 };

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let receiver = service.clone();
            tokio::spawn(async move {
                receiver
                    .receive(user_id, po.id, vec![line], None, IdempotencyKey::parse(Some("grn-7")))
                    .await
            })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| o.applied).count(), 1);
    assert!(outcomes.iter().all(|o| o.receipt.id == outcomes[0].receipt.id));
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 6);
}
