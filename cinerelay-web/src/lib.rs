//! Cinerelay Web - HTTP gateway surface
//!
//! Routes `/stream` and `/download` through the source resolver and stream
//! proxy, forwards `/api/*` metadata lookups, and maps every failure that
//! happens before the first body byte onto a JSON error response.

pub mod handlers;
pub mod server;

// Re-export main types
pub use handlers::ApiError;
pub use server::{AppState, router, run_server};
