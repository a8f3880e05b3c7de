//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, one hub per request)
//! 2. Request ID (span and response header per request)
//! 3. `TraceLayer` (request tracing)
//! 4. Session layer (tower-sessions with an in-memory store)
//!
//! Handlers reach their device through the [`Device`] extractor.

pub mod device;
pub mod request_id;
pub mod session;

pub use device::Device;
pub use request_id::{RequestId, request_id_middleware};
pub use session::{create_session_layer, session_keys};
