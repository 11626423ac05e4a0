//! # System Lifecycle & Orchestration
//!
//! [`MessagingSystem`] wires the sample together: one in-memory queue adapter, one
//! [`MdbContainer`] bound to [`TextMessageListener`], and the order audit bean deployed
//! on the `orders` queue.
//!
//! ## Startup
//!
//! 1. **Adapter** - create the [`QueueResourceAdapter`] (queues exist lazily)
//! 2. **Container** - build it with a [`LocalTransactionManager`] and an injection
//!    source holding the shared [`AuditLog`]
//! 3. **Deploy** - the container configures a [`QueueActivationSpec`] from the
//!    deployment's activation properties and activates the endpoint, which starts the
//!    adapter's delivery sessions
//! 4. **Reaper** - idle instances are evicted in the background when
//!    `MDB_IDLE_TIMEOUT_MS` is set
//!
//! ## Graceful Shutdown
//!
//! [`MessagingSystem::shutdown`] stops the reaper, then undeploys everything. Undeploy
//! deactivates each endpoint first, so in-flight deliveries finish before pooled
//! instances are destroyed.
//!
//! ```rust,ignore
//! let system = MessagingSystem::start(ContainerConfig::from_env()?).await?;
//! system.send(TextMessage::new(ORDERS_QUEUE, "order:A-1:1250"));
//! system.audit_log().wait_for(1, Duration::from_secs(1)).await;
//! system.shutdown().await;
//! ```

use crate::adapter::{QueueActivationSpec, QueueResourceAdapter};
use crate::beans::{AuditLog, OrderAuditBean, AUDIT_LOG_NAME, ORDER_AUDIT_BEAN};
use crate::listener::TextMessageListener;
use crate::model::TextMessage;
use mdb_runtime::{
    BeanDeployment, Bindings, ConfigError, ContainerConfig, DeploymentId, EvictionTask, LocalTransactionManager,
    MdbContainer, MdbError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const ORDERS_QUEUE: &str = "orders";
pub const ORDER_AUDIT: &str = "OrderAudit";

/// Failed redeliveries before a message is dead-lettered.
const MAX_REDELIVERIES: u32 = 2;
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mdb(#[from] MdbError),
}

pub struct MessagingSystem {
    pub container: Arc<MdbContainer<TextMessageListener>>,
    pub adapter: Arc<QueueResourceAdapter>,
    audit_log: AuditLog,
    eviction: Option<EvictionTask>,
}

impl MessagingSystem {
    /// Builds the container and deploys the order audit bean with `sessions` concurrent
    /// delivery sessions.
    pub async fn start(config: ContainerConfig) -> Result<Self, SystemError> {
        Self::start_with_sessions(config, 2).await
    }

    pub async fn start_with_sessions(config: ContainerConfig, sessions: usize) -> Result<Self, SystemError> {
        let adapter = Arc::new(QueueResourceAdapter::new(MAX_REDELIVERIES, ENDPOINT_TIMEOUT));
        let audit_log = AuditLog::default();

        let container = MdbContainer::<TextMessageListener>::builder()
            .config(config)
            .resource_adapter(adapter.clone())
            .transaction_manager(Arc::new(LocalTransactionManager::new()))
            .activation_spec(|| Box::new(QueueActivationSpec::default()))
            .injection_source(Arc::new(Bindings::new().bind(AUDIT_LOG_NAME, audit_log.clone())))
            .build()?;

        container
            .deploy(
                BeanDeployment::builder(ORDER_AUDIT, ORDER_AUDIT_BEAN, OrderAuditBean::factory())
                    .activation_property("destination", ORDERS_QUEUE)
                    .activation_property("destinationType", "jakarta.jms.Queue")
                    .activation_property("maxSessions", sessions.to_string())
                    .inject(AUDIT_LOG_NAME, "log")
                    .build(),
            )
            .await?;

        let eviction = container.start_eviction();
        info!(container_id = %container.container_id(), "messaging system started");

        Ok(Self {
            container,
            adapter,
            audit_log,
            eviction,
        })
    }

    pub fn send(&self, message: TextMessage) {
        self.adapter.send(message);
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    pub fn order_audit_id(&self) -> DeploymentId {
        DeploymentId::from(ORDER_AUDIT)
    }

    pub async fn shutdown(self) {
        if let Some(eviction) = self.eviction {
            eviction.shutdown().await;
        }
        self.container.shutdown().await;
        info!(
            delivered = self.adapter.delivered(),
            dead_letters = self.adapter.dead_letters().len(),
            "messaging system stopped"
        );
    }
}
