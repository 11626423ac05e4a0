//! # MDB Sample
//!
//! An order-audit service built on [`mdb_runtime`].
//!
//! ## Core Components
//!
//! - **[model]**: [`TextMessage`](model::TextMessage), the payload on the queues.
//! - **[listener]**: the `jakarta.jms.MessageListener` interface and its typed endpoint facade.
//! - **[adapter]**: an in-memory queue resource adapter with concurrent delivery sessions.
//! - **[beans]**: [`OrderAuditBean`](beans::OrderAuditBean), the message-driven bean.
//! - **[lifecycle]**: [`MessagingSystem`](lifecycle::MessagingSystem), startup and shutdown.
//!
//! ## Testing
//!
//! See [`mdb_runtime::mock`] for utilities to test beans without a real adapter.

pub mod adapter;
pub mod beans;
pub mod lifecycle;
pub mod listener;
pub mod model;
