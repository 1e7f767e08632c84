//! HTTP handlers
//!
//! The webhook trigger plus the health check and the 404 fallback.

pub mod health;
pub mod not_found;
pub mod webhook;

// Re-export handlers
pub use health::health;
pub use not_found::not_found;
pub use webhook::handle_webhook;
