pub mod security_headers;
pub mod tracing;

pub use security_headers::security_headers_middleware;
pub use tracing::{trace_requests_middleware, TRACE_ID_HEADER};
