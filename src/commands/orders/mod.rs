use crate::entities::{order, order_item};

pub mod cancel_order_command;
pub mod confirm_order_command;
pub mod return_order_command;

pub use cancel_order_command::CancelOrderCommand;
pub use confirm_order_command::ConfirmOrderCommand;
pub use return_order_command::{ReturnOrderCommand, ReturnRequestItem};

/// State of an order after a transition. `applied` is false when the
/// transition was an idempotent no-op and nothing was written.
#[derive(Debug, Clone)]
pub struct OrderTransition {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub applied: bool,
}
