pub mod request_id;
pub mod retry;

pub use request_id::request_id_middleware;
pub use retry::{with_retry, ConcurrencyRetryPolicy, RetryConfig};
