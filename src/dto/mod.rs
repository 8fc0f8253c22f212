//! Wire types. Everything is camelCase on the wire.

pub mod orders;
pub mod purchase_orders;
pub mod stock_movements;

pub use orders::*;
pub use purchase_orders::*;
pub use stock_movements::*;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Body of transitions that carry nothing but an optional idempotency key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    #[validate(length(max = 512))]
    pub idempotency_key: Option<String>,
}
