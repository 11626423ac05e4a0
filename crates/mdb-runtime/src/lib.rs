//! # MDB Runtime
//!
//! This crate hosts **message-driven beans** (MDBs): pooled, stateless message handlers
//! that a resource adapter feeds with inbound messages. The runtime sits between the two
//! and owns everything the adapter and the bean should not have to care about:
//! instance lifecycle, transaction demarcation, interceptors, and fault classification.
//!
//! ## Architecture Overview
//!
//! ```text
//!  ResourceAdapter ──activation──▶ EndpointFactory ──create──▶ EndpointHandler
//!                                                                │  before_delivery
//!                                                                │  deliver ──▶ interceptors ──▶ bean
//!                                                                │  after_delivery
//!                                                                ▼  release
//!                                   MdbContainer ◀── TransactionPolicy / InstancePool
//! ```
//!
//! 1. **Deployment layer** ([`BeanDeployment`], [`MdbContainer`]) - what a bean is, and
//!    binding it to an adapter
//! 2. **Delivery layer** ([`EndpointFactory`], [`EndpointHandler`]) - the per-message
//!    state machine the adapter drives
//! 3. **Resource layer** ([`InstancePool`], [`TransactionPolicy`]) - instances and
//!    transactions scoped to one delivery
//!
//! ## Delivery Protocol
//!
//! An adapter may drive an endpoint in one of two ways:
//!
//! | Style | Calls | Transaction scope |
//! |-------|-------|-------------------|
//! | Explicit | `before_delivery`, `deliver`, `after_delivery` | the bracket |
//! | Implicit | `deliver` alone | the single call |
//!
//! Mixing them up is reported as [`MdbError::IllegalState`]; the handler never panics
//! on a misbehaving adapter. Releasing an endpoint always returns its instance to the
//! pool (or destroys it if a system exception made it suspect) and completes any
//! transaction left open.
//!
//! ```rust,ignore
//! let factory = container.endpoint_factory(&DeploymentId::from("OrderAudit"))?;
//! let mut endpoint = factory.create_endpoint_with_timeout(None, Duration::from_secs(5)).await?;
//!
//! endpoint.before_delivery(&method).await?;
//! let reply = endpoint.deliver(&method, message).await;
//! endpoint.after_delivery()?;
//! endpoint.release();
//! ```
//!
//! ## Transactions
//!
//! Each business method resolves to a [`TransactionType`]. The runtime never keeps an
//! ambient "current transaction": callers that already run in one pass its
//! [`TransactionId`] explicitly (see [`MdbContainer::invoke_in_transaction`]).
//! [`LocalTransactionManager`] is an in-process manager suitable for tests and for
//! adapters without two-phase commit.
//!
//! ## Faults
//!
//! Bean failures are [`BeanException`]s. The deployment decides whether a fault is an
//! *application* exception (reported as-is, optionally rolling back) or a *system*
//! exception (transaction rolled back, instance discarded). See [`exception`].
//!
//! ## Testing
//!
//! The [`mock`] module provides a recording transaction manager, a resource adapter that
//! hands its endpoint factories to the test, and scriptable beans and interceptors.
//!
//! ## Tracing
//!
//! All components log through `tracing`; see [`setup_tracing`] and the field reference
//! in the tracing module.

pub mod adapter;
pub mod bean;
pub mod config;
pub mod container;
pub mod context;
pub mod deployment;
pub mod endpoint;
pub mod error;
pub mod eviction;
pub mod exception;
pub mod factory;
pub mod injection;
pub mod listener;
pub mod local_tx;
pub mod mock;
pub mod pool;
pub mod tracing;
pub mod transaction;

// Re-export core types for convenience
pub use adapter::{ActivationSpec, ResourceAdapter};
pub use bean::{Interceptor, Invocation, MessageDrivenBean};
pub use config::{ConfigError, ContainerConfig};
pub use container::{MdbContainer, MdbContainerBuilder};
pub use context::MessageDrivenContext;
pub use deployment::{BeanDeployment, BeanDeploymentBuilder, DeploymentId};
pub use endpoint::{DeliveryState, EndpointHandler};
pub use error::{LookupError, MdbError, ResourceError, TransactionError};
pub use eviction::EvictionTask;
pub use exception::{BeanException, ExceptionKind, ExceptionType};
pub use factory::EndpointFactory;
pub use injection::{Bindings, InjectionSource, Resource};
pub use listener::{MessageListener, Method};
pub use local_tx::LocalTransactionManager;
pub use pool::{InstanceId, InstancePool, InstanceStats};
pub use crate::tracing::setup_tracing;
pub use transaction::{
    TransactionId, TransactionManager, TransactionPolicy, TransactionStatus, TransactionType, UserTransaction,
    XaResource,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
