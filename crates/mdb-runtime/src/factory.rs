//! The resource-adapter-facing endpoint factory.

use crate::container::MdbContainer;
use crate::deployment::{BeanDeployment, DeploymentId};
use crate::endpoint::EndpointHandler;
use crate::error::MdbError;
use crate::listener::{MessageListener, Method};
use crate::pool::InstancePool;
use crate::transaction::{TransactionType, XaResource};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const MIN_RETRY_BACKOFF: Duration = Duration::from_millis(1);

/// Produces [`EndpointHandler`]s for one deployment.
///
/// Holds only a weak reference to the container, so an adapter that keeps factories
/// around does not keep a shut-down container alive.
pub struct EndpointFactory<L: MessageListener> {
    container: Weak<MdbContainer<L>>,
    deployment: Arc<BeanDeployment<L>>,
    pool: Arc<InstancePool<L>>,
    retry_backoff: Duration,
}

impl<L: MessageListener> EndpointFactory<L> {
    pub(crate) fn new(
        container: Weak<MdbContainer<L>>,
        deployment: Arc<BeanDeployment<L>>,
        pool: Arc<InstancePool<L>>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            container,
            deployment,
            pool,
            retry_backoff,
        }
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        self.deployment.id()
    }

    /// Creates an endpoint. Fails with [`MdbError::Unavailable`] once the container is
    /// gone or the deployment has been undeployed.
    pub fn create_endpoint(&self, xa_resource: Option<Arc<dyn XaResource>>) -> Result<EndpointHandler<L>, MdbError> {
        let container = self
            .container
            .upgrade()
            .ok_or_else(|| MdbError::unavailable("Container has been shut down", None))?;
        if !container.is_deployed(self.deployment.id()) {
            return Err(MdbError::unavailable(
                format!("{} is not deployed", self.deployment.id()),
                None,
            ));
        }
        Ok(EndpointHandler::new(
            container,
            self.deployment.clone(),
            self.pool.clone(),
            xa_resource,
        ))
    }

    /// Retries [`create_endpoint`](Self::create_endpoint) until `timeout` elapses.
    ///
    /// A zero timeout makes a single attempt and returns its error. Otherwise failures
    /// are swallowed, attempts are spaced by the configured backoff (never sleeping past
    /// the deadline), and [`MdbError::EndpointTimeout`] is returned once the deadline
    /// passes.
    pub async fn create_endpoint_with_timeout(
        &self,
        xa_resource: Option<Arc<dyn XaResource>>,
        timeout: Duration,
    ) -> Result<EndpointHandler<L>, MdbError> {
        if timeout.is_zero() {
            return self.create_endpoint(xa_resource);
        }

        let deadline = Instant::now() + timeout;
        let backoff = self.retry_backoff.max(MIN_RETRY_BACKOFF);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.create_endpoint(xa_resource.clone()) {
                Ok(endpoint) => return Ok(endpoint),
                Err(e) => debug!(deployment_id = %self.deployment.id(), attempts, error = %e, "endpoint creation failed"),
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(backoff.min(deadline - now)).await;
        }
        Err(MdbError::EndpointTimeout(timeout))
    }

    /// True when `method` runs in a container-managed `Required` transaction, meaning
    /// the adapter should supply an XA resource to enlist.
    pub fn is_delivery_transacted(&self, method: &Method) -> bool {
        self.deployment.transaction_type(method) == TransactionType::Required
    }
}

impl<L: MessageListener> fmt::Debug for EndpointFactory<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointFactory")
            .field("deployment_id", self.deployment.id())
            .field("retry_backoff", &self.retry_backoff)
            .finish_non_exhaustive()
    }
}
