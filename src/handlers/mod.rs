pub mod common;
pub mod health;
pub mod orders;
pub mod purchase_orders;
pub mod stock_movements;

use crate::{
    db::DbPool,
    events::EventSender,
    middleware_helpers::RetryConfig,
    services::{
        orders::OrderService, purchase_orders::PurchaseOrderService,
        stock_movements::StockMovementService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub stock_movements: Arc<StockMovementService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, retry: RetryConfig) -> Self {
        Self {
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                retry.clone(),
            )),
            purchase_orders: Arc::new(PurchaseOrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                retry.clone(),
            )),
            stock_movements: Arc::new(StockMovementService::new(db_pool, event_sender, retry)),
        }
    }
}
