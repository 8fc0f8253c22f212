mod common;

use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use common::TestApp;
use stock_ledger_api::{
    commands::stock::{AdjustStockCommand, VoidMovementCommand},
    entities::sea_orm_active_enums::{MovementSource, MovementType, OrderStatus},
    errors::ServiceError,
    services::{
        idempotency::IdempotencyKey,
        stock::StockTarget,
        stock_movements::{audit_ledger, MovementFilter},
    },
};
use std::collections::HashSet;
use uuid::Uuid;

fn adjust(app: &TestApp, product_id: Uuid, variant_id: Option<Uuid>, qty_delta: i32) -> AdjustStockCommand {
    AdjustStockCommand {
        user_id: app.user_id,
        product_id,
        variant_id,
        qty_delta,
        reference: None,
        note: None,
        occurred_at: None,
        idempotency_key: None,
    }
}

fn void(app: &TestApp, movement_id: Uuid, key: Option<&str>) -> VoidMovementCommand {
    VoidMovementCommand {
        movement_id,
        user_id: app.user_id,
        note: Some("entered twice".to_string()),
        idempotency_key: IdempotencyKey::parse(key),
    }
}

#[tokio::test]
async fn adjustments_move_stock_in_both_directions() {
    let app = TestApp::new().await;
    let product = app.seed_product("LAMP", 5).await;
    let service = &app.state.services.stock_movements;

    let up = service.adjust(adjust(&app, product.id, None, 7)).await.unwrap();
    let down = service.adjust(adjust(&app, product.id, None, -3)).await.unwrap();

    assert_eq!(up.movement.r#type, MovementType::Adjust);
    assert_eq!(up.movement.source, MovementSource::Manual);
    assert_eq!(down.movement.qty_delta, -3);
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 9);
}

#[tokio::test]
async fn zero_adjustment_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("DESK", 1).await;

    let result = app
        .state
        .services
        .stock_movements
        .adjust(adjust(&app, product.id, None, 0))
        .await;

    assert_matches!(result, Err(ServiceError::InvalidQuantity(_)));
}

#[tokio::test]
async fn adjustments_require_an_owned_product_and_matching_variant() {
    let app = TestApp::new().await;
    let product = app.seed_product("CHAIR", 1).await;
    let other = app.seed_product("TABLE", 1).await;
    let foreign_variant = app.seed_variant(other.id, "TABLE-OAK", 1).await;
    let service = &app.state.services.stock_movements;

    let mismatched = service
        .adjust(adjust(&app, product.id, Some(foreign_variant.id), 1))
        .await;
    assert_matches!(mismatched, Err(ServiceError::NotFound(_)));

    let mut foreign_user = adjust(&app, product.id, None, 1);
    foreign_user.user_id = Uuid::new_v4();
    assert_matches!(service.adjust(foreign_user).await, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn keyed_adjustment_is_written_once() {
    let app = TestApp::new().await;
    let product = app.seed_product("SHELF", 0).await;
    let service = &app.state.services.stock_movements;
    let mut command = adjust(&app, product.id, None, 4);
    command.idempotency_key = IdempotencyKey::parse(Some("count-2024-03"));

    let first = service.adjust(command.clone()).await.unwrap();
    let replay = service.adjust(command).await.unwrap();

    assert!(!first.already_applied);
    assert!(replay.already_applied);
    assert_eq!(replay.movement.id, first.movement.id);
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 4);
}

#[tokio::test]
async fn void_reverses_a_movement_exactly_once() {
    let app = TestApp::new().await;
    let product = app.seed_product("RUG", 0).await;
    let variant = app.seed_variant(product.id, "RUG-BLUE", 2).await;
    let service = &app.state.services.stock_movements;
    let original = service
        .adjust(adjust(&app, product.id, Some(variant.id), 5))
        .await
        .unwrap()
        .movement;

    let voided = service.void(void(&app, original.id, Some("void-1"))).await.unwrap();
    assert_eq!(voided.movement.r#type, MovementType::Void);
    assert_eq!(voided.movement.qty_delta, -5);
    assert_eq!(voided.movement.voided_movement_id, Some(original.id));
    assert_eq!(voided.movement.variant_id, Some(variant.id));
    assert_eq!(app.stock_of(StockTarget::Variant(variant.id)).await, 2);

    let replay = service.void(void(&app, original.id, Some("void-1"))).await.unwrap();
    assert!(replay.already_applied);
    assert_eq!(replay.movement.id, voided.movement.id);

    let second = service.void(void(&app, original.id, None)).await;
    assert_matches!(second, Err(ServiceError::VoidNotAllowed(id, _)) if id == original.id);

    let void_of_void = service.void(void(&app, voided.movement.id, None)).await;
    assert_matches!(void_of_void, Err(ServiceError::VoidNotAllowed(..)));
    assert_eq!(app.stock_of(StockTarget::Variant(variant.id)).await, 2);
}

#[tokio::test]
async fn reservation_intents_cannot_be_voided() {
    let app = TestApp::new().await;
    let product = app.seed_product("VASE", 3).await;
    let (order, _) = app.seed_order(&[(product.id, None, 1)]).await;
    app.state.services.orders.confirm(app.user_id, order.id, None).await.unwrap();

    let page = app
        .state
        .services
        .stock_movements
        .list(
            app.user_id,
            MovementFilter {
                movement_type: Some(MovementType::Reserve),
                ..MovementFilter::default()
            },
            None,
            10,
        )
        .await
        .unwrap();
    assert_eq!(page.data.len(), 1);

    let result = app
        .state
        .services
        .stock_movements
        .void(void(&app, page.data[0].id, None))
        .await;
    assert_matches!(result, Err(ServiceError::VoidNotAllowed(..)));
}

#[tokio::test]
async fn voiding_a_shipment_leaves_item_counters_alone() {
    let app = TestApp::new().await;
    let product = app.seed_product("CLOCK", 5).await;
    let (order, items) = app.seed_order(&[(product.id, None, 2)]).await;
    app.state.services.orders.confirm(app.user_id, order.id, None).await.unwrap();
    app.ship(&items[0], 2, OrderStatus::Delivering).await;

    let page = app
        .state
        .services
        .stock_movements
        .list(
            app.user_id,
            MovementFilter {
                movement_type: Some(MovementType::Out),
                ..MovementFilter::default()
            },
            None,
            10,
        )
        .await
        .unwrap();
    app.state
        .services
        .stock_movements
        .void(void(&app, page.data[0].id, None))
        .await
        .unwrap();

    let (_, items) = app.state.services.orders.get_order(app.user_id, order.id).await.unwrap();
    assert_eq!(items[0].qty_shipped, 2);
    assert_eq!(app.stock_of(StockTarget::Product(product.id)).await, 5);
}

#[tokio::test]
async fn verify_and_audit_agree_with_the_counters() {
    let app = TestApp::new().await;
    let product = app.seed_product("FRAME", 12).await;
    let variant = app.seed_variant(product.id, "FRAME-A4", 3).await;
    let service = &app.state.services.stock_movements;
    service.adjust(adjust(&app, product.id, Some(variant.id), -1)).await.unwrap();

    let check = service.verify(app.user_id, product.id, Some(variant.id)).await.unwrap();
    assert_eq!(check.target, StockTarget::Variant(variant.id));
    assert_eq!(check.stock, 2);
    assert_eq!(check.ledger_sum, 2);
    assert!(check.consistent);

    let audit = audit_ledger(app.db()).await.unwrap();
    assert_eq!(audit.len(), 2);
    assert!(audit.iter().all(|c| c.consistent));
}

#[tokio::test]
async fn audit_detects_counters_written_behind_the_ledger() {
    use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};

    let app = TestApp::new().await;
    let product = app.seed_product("KETTLE", 4).await;
    let mut active = product.clone().into_active_model();
    active.stock = Set(40);
    active.update(app.db()).await.unwrap();

    let check = app
        .state
        .services
        .stock_movements
        .verify(app.user_id, product.id, None)
        .await
        .unwrap();

    assert_eq!(check.stock, 40);
    assert_eq!(check.ledger_sum, 4);
    assert!(!check.consistent);
}

#[tokio::test]
async fn cursor_pages_walk_the_feed_newest_first_without_gaps() {
    let app = TestApp::new().await;
    let product = app.seed_product("CANDLE", 0).await;
    let service = &app.state.services.stock_movements;
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

    // Two movements share every timestamp so the id tiebreak is exercised.
    let mut expected = Vec::new();
    for i in 0..7i64 {
        let mut command = adjust(&app, product.id, None, 1);
        command.occurred_at = Some(base + Duration::hours(i / 2));
        expected.push(service.adjust(command).await.unwrap().movement.id);
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = service
            .list(app.user_id, MovementFilter::default(), cursor.as_deref(), 3)
            .await
            .unwrap();
        pages += 1;
        assert!(page.data.len() <= 3);
        seen.extend(page.data.iter().map(|m| m.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(seen.len(), 7);
    let unique: HashSet<Uuid> = seen.iter().copied().collect();
    assert_eq!(unique, expected.iter().copied().collect());

    let first_page = service
        .list(app.user_id, MovementFilter::default(), None, 7)
        .await
        .unwrap();
    assert!(first_page.next_cursor.is_none());
    for pair in first_page.data.windows(2) {
        assert!(
            (pair[0].occurred_at, pair[0].created_at, pair[0].id)
                >= (pair[1].occurred_at, pair[1].created_at, pair[1].id)
        );
    }
}

#[tokio::test]
async fn feed_filters_by_window_type_and_owner() {
    let app = TestApp::new().await;
    let product = app.seed_product("PLATE", 0).await;
    let service = &app.state.services.stock_movements;
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    for day in 0..5i64 {
        let mut command = adjust(&app, product.id, None, 2);
        command.occurred_at = Some(base + Duration::days(day));
        service.adjust(command).await.unwrap();
    }

    let window = service
        .list(
            app.user_id,
            MovementFilter {
                product_id: Some(product.id),
                from: Some(base + Duration::days(1)),
                to: Some(base + Duration::days(3)),
                ..MovementFilter::default()
            },
            None,
            50,
        )
        .await
        .unwrap();
    assert_eq!(window.data.len(), 3);

    let returns = service
        .list(
            app.user_id,
            MovementFilter {
                movement_type: Some(MovementType::ReturnIn),
                ..MovementFilter::default()
            },
            None,
            50,
        )
        .await
        .unwrap();
    assert!(returns.data.is_empty());

    let stranger = service
        .list(Uuid::new_v4(), MovementFilter::default(), None, 50)
        .await
        .unwrap();
    assert!(stranger.data.is_empty());
}

#[tokio::test]
async fn malformed_cursor_is_rejected() {
    let app = TestApp::new().await;

    let result = app
        .state
        .services
        .stock_movements
        .list(app.user_id, MovementFilter::default(), Some("%%%"), 10)
        .await;

    assert_matches!(result, Err(ServiceError::InvalidCursor));
}

#[tokio::test]
async fn adjustments_beyond_the_counter_range_are_rejected() {
    use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};

    let app = TestApp::new().await;
    let product = app.seed_product("CRATE", 2).await;
    let service = &app.state.services.stock_movements;

    let oversized = service.adjust(adjust(&app, product.id, None, i32::MAX)).await;
    assert_matches!(oversized, Err(ServiceError::InvalidQuantity(_)));
    let undersized = service.adjust(adjust(&app, product.id, None, i32::MIN)).await;
    assert_matches!(undersized, Err(ServiceError::InvalidQuantity(_)));

    let mut active = product.clone().into_active_model();
    active.stock = Set(i32::MAX - 5);
    active.update(app.db()).await.unwrap();

    let overflow = service.adjust(adjust(&app, product.id, None, 10)).await;

    assert_matches!(overflow, Err(ServiceError::InvalidQuantity(_)));
    assert_eq!(
        app.stock_of(StockTarget::Product(product.id)).await,
        i64::from(i32::MAX - 5)
    );
    let check = service.verify(app.user_id, product.id, None).await.unwrap();
    assert_eq!(check.ledger_sum, 2);

    let within_range = service.adjust(adjust(&app, product.id, None, 5)).await.unwrap();
    assert!(!within_range.already_applied);
    assert_eq!(
        app.stock_of(StockTarget::Product(product.id)).await,
        i64::from(i32::MAX)
    );
}
