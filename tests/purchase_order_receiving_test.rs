mod common;

use assert_matches::assert_matches;
use common::TestApp;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use stock_ledger_api::{
    commands::purchaseorders::ReceiveLine,
    entities::{
        sea_orm_active_enums::{MovementSource, MovementType, PurchaseOrderStatus},
        stock_movement,
    },
    errors::ServiceError,
    services::{idempotency::IdempotencyKey, stock::StockTarget},
};
use uuid::Uuid;

fn line(po_line_id: Uuid, qty: i32) -> ReceiveLine {
    ReceiveLine { po_line_id, qty }
}

#[tokio::test]
async fn approve_moves_draft_to_approved_once() {
    let app = TestApp::new().await;
    let product = app.seed_product("BOLT", 0).await;
    let (po, _) = app.seed_purchase_order(&[(product.id, None, 10)]).await;
    let service = &app.state.services.purchase_orders;

    let approved = service.approve(app.user_id, po.id).await.unwrap();
    assert!(approved.applied);
    assert_eq!(approved.purchase_order.status, PurchaseOrderStatus::Approved);
    assert!(approved.purchase_order.approved_at.is_some());

    let again = service.approve(app.user_id, po.id).await.unwrap();
    assert!(!again.applied);
    assert_eq!(again.purchase_order.version, approved.purchase_order.version);
}

#[tokio::test]
async fn approve_requires_lines() {
    let app = TestApp::new().await;
    let (po, _) = app.seed_purchase_order(&[]).await;

    let result = app.state.services.purchase_orders.approve(app.user_id, po.id).await;

    assert_matches!(result, Err(ServiceError::PurchaseOrderLinesRequired(id)) if id == po.id);
}

#[tokio::test]
async fn draft_purchase_orders_cannot_be_received() {
    let app = TestApp::new().await;
    let product = app.seed_product("NUT", 0).await;
    let (po, lines) = app.seed_purchase_order(&[(product.id, None, 5)]).await;

    let result = app
        .state
        .services
        .purchase_orders
        .receive(app.user_id, po.id, vec![line(lines[0].id, 5)], None, None)
        .await;

    assert_matches!(result, Err(ServiceError::InvalidTransition { action: "receive", .. }));
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 0);
}

#[tokio::test]
async fn receiving_in_two_parts_books_stock_and_completes_the_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("WASHER", 0).await;
    let (po, lines) = app.seed_purchase_order(&[(product.id, None, 50)]).await;
    let service = &app.state.services.purchase_orders;
    service.approve(app.user_id, po.id).await.unwrap();

    let first = service
        .receive(app.user_id, po.id, vec![line(lines[0].id, 20)], None, None)
        .await
        .unwrap();
    assert!(first.applied);
    assert_eq!(first.purchase_order.status, PurchaseOrderStatus::Partial);
    assert!(first.purchase_order.received_at.is_none());
    assert_eq!(first.lines[0].qty_received, 20);
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].qty, 20);
    assert_eq!(first.items[0].unit_cost_cents, lines[0].unit_cost_cents);
    assert_eq!(first.receipt.reference.as_deref(), Some(po.po_number.as_str()));
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 20);

    let second = service
        .receive(
            app.user_id,
            po.id,
            vec![line(lines[0].id, 30)],
            Some("second pallet".to_string()),
            None,
        )
        .await
        .unwrap();
    assert_eq!(second.purchase_order.status, PurchaseOrderStatus::Received);
    assert!(second.purchase_order.received_at.is_some());
    assert_ne!(second.receipt.id, first.receipt.id);
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 50);

    let receipts: Vec<stock_movement::Model> = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(product.id))
        .filter(stock_movement::Column::Source.eq(MovementSource::Receipt))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(receipts.len(), 2);
    assert!(receipts.iter().all(|m| m.r#type == MovementType::In));
    assert!(receipts.iter().all(|m| m.receipt_item_id.is_some()));
}

#[tokio::test]
async fn over_receipt_is_accepted_and_variant_stock_is_used() {
    let app = TestApp::new().await;
    let product = app.seed_product("SCREW", 0).await;
    let variant = app.seed_variant(product.id, "SCREW-M4", 0).await;
    let (po, lines) = app
        .seed_purchase_order(&[(product.id, Some(variant.id), 10)])
        .await;
    let service = &app.state.services.purchase_orders;
    service.approve(app.user_id, po.id).await.unwrap();

    let outcome = service
        .receive(
            app.user_id,
            po.id,
            vec![line(lines[0].id, 8), line(lines[0].id, 4)],
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.items.len(), 1);
    assert_eq!(outcome.lines[0].qty_received, 12);
    assert_eq!(outcome.purchase_order.status, PurchaseOrderStatus::Received);
    assert_eq!(app.stock_of(StockTarget::Variant(variant.id)).await, 12);
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 0);
}

#[tokio::test]
async fn replayed_receive_returns_the_original_receipt() {
    let app = TestApp::new().await;
    let product = app.seed_product("RIVET", 0).await;
    let (po, lines) = app.seed_purchase_order(&[(product.id, None, 10)]).await;
    let service = &app.state.services.purchase_orders;
    service.approve(app.user_id, po.id).await.unwrap();
    let key = IdempotencyKey::parse(Some("grn-0042"));

    let first = service
        .receive(app.user_id, po.id, vec![line(lines[0].id, 4)], None, key.clone())
        .await
        .unwrap();
    let replay = service
        .receive(app.user_id, po.id, vec![line(lines[0].id, 4)], None, key)
        .await
        .unwrap();

    assert!(first.applied);
    assert!(!replay.applied);
    assert_eq!(replay.receipt.id, first.receipt.id);
    assert_eq!(replay.lines[0].qty_received, 4);
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 4);
}

#[tokio::test]
async fn unknown_lines_are_rejected_without_side_effects() {
    let app = TestApp::new().await;
    let product = app.seed_product("PIN", 0).await;
    let (po, lines) = app.seed_purchase_order(&[(product.id, None, 10)]).await;
    let service = &app.state.services.purchase_orders;
    service.approve(app.user_id, po.id).await.unwrap();
    let stranger = Uuid::new_v4();

    let result = service
        .receive(
            app.user_id,
            po.id,
            vec![line(lines[0].id, 2), line(stranger, 1)],
            None,
            None,
        )
        .await;

    assert_matches!(result, Err(ServiceError::PurchaseOrderLineNotFound(id)) if id == stranger);
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 0);
}

#[tokio::test]
async fn receipts_that_would_overflow_the_received_count_are_rejected() {
    use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};

    let app = TestApp::new().await;
    let product = app.seed_product("GASKET", 0).await;
    let (po, lines) = app.seed_purchase_order(&[(product.id, None, 10)]).await;
    let service = &app.state.services.purchase_orders;
    service.approve(app.user_id, po.id).await.unwrap();

    let oversized = service
        .receive(app.user_id, po.id, vec![line(lines[0].id, i32::MAX)], None, None)
        .await;
    assert_matches!(oversized, Err(ServiceError::InvalidQuantity(_)));

    let mut active = lines[0].clone().into_active_model();
    active.qty_received = Set(i32::MAX - 5);
    active.update(app.db()).await.unwrap();

    let result = service
        .receive(app.user_id, po.id, vec![line(lines[0].id, 10)], None, None)
        .await;

    assert_matches!(result, Err(ServiceError::InvalidQuantity(_)));
    let (current, current_lines) = service.get_purchase_order(app.user_id, po.id).await.unwrap();
    assert_eq!(current_lines[0].qty_received, i32::MAX - 5);
    assert_eq!(current.status, PurchaseOrderStatus::Approved);
    assert_eq!(current.version, 1);
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 0);
    let receipts = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(product.id))
        .filter(stock_movement::Column::Type.eq(MovementType::In))
        .all(app.db())
        .await
        .unwrap();
    assert!(receipts.is_empty());
}
