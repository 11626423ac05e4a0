//! Sample message-driven beans.

pub mod order_audit;

pub use order_audit::*;
