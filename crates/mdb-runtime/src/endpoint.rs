//! # Endpoint Handler: the Delivery State Machine
//!
//! A resource adapter drives each endpoint through a fixed callback protocol:
//!
//! ```text
//!            before_delivery            deliver               after_delivery
//!   NONE ─────────────────▶ BEFORE_CALLED ─────▶ METHOD_CALLED ──────────────▶ NONE
//!    │                                     └───▶ SYSTEM_EXCEPTION ───────────▶ NONE
//!    │  deliver (implicit before/after)                          (instance discarded)
//!    └──────────────────────────────────────────────────────────────────────▶ NONE
//!
//!   any state ── release ──▶ RELEASED (terminal)
//! ```
//!
//! The transition function [`DeliveryState::on`] is total: every state and event pair
//! either yields a [`Transition`] or an [`IllegalTransition`], and an illegal event never
//! changes the state.
//!
//! ## Compatibility path
//!
//! Adapters may skip `before_delivery`/`after_delivery` and call the business method
//! directly. From `NONE` the handler then performs both implicitly around that single
//! call and returns to `NONE`.
//!
//! ## Surfacing faults
//!
//! Bean faults are unwrapped from container wrappers before they reach the adapter.
//! Unchecked faults and faults the business method declares pass through as
//! [`MdbError::Bean`]; anything else is wrapped as [`MdbError::EjbException`].

use crate::container::MdbContainer;
use crate::context::CallContext;
use crate::deployment::{BeanDeployment, DeploymentId};
use crate::error::MdbError;
use crate::exception::is_valid_exception;
use crate::listener::{MessageListener, Method};
use crate::pool::{Instance, InstanceId, InstancePool};
use crate::transaction::XaResource;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    None,
    BeforeCalled,
    MethodCalled,
    SystemException,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEvent {
    BeforeDelivery,
    Deliver,
    AfterDelivery,
    Release,
}

/// What the handler should do for an accepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Proceed,
    /// Business call from `NONE`: wrap it in implicit before/after delivery.
    ImplicitBeforeAfter,
    /// Nothing to do (second `release`).
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct IllegalTransition(pub &'static str);

impl From<IllegalTransition> for MdbError {
    fn from(e: IllegalTransition) -> Self {
        MdbError::IllegalState(e.0.to_string())
    }
}

impl DeliveryState {
    pub fn on(self, event: DeliveryEvent) -> Result<Transition, IllegalTransition> {
        use DeliveryEvent as E;
        use DeliveryState as S;

        match (self, event) {
            (S::Released, E::Release) => Ok(Transition::Ignore),
            (S::Released, _) => Err(IllegalTransition("Endpoint has been released")),
            (_, E::Release) => Ok(Transition::Proceed),

            (S::None, E::BeforeDelivery) => Ok(Transition::Proceed),
            (S::BeforeCalled, E::BeforeDelivery) => Err(IllegalTransition(
                "beforeDelivery can not be called again until message is delivered and afterDelivery is called",
            )),
            (S::MethodCalled | S::SystemException, E::BeforeDelivery) => Err(IllegalTransition(
                "The last message delivery must be completed with an afterDeliver before beforeDeliver can be called again",
            )),

            (S::None, E::Deliver) => Ok(Transition::ImplicitBeforeAfter),
            (S::BeforeCalled, E::Deliver) => Ok(Transition::Proceed),
            (S::MethodCalled | S::SystemException, E::Deliver) => Err(IllegalTransition(
                "The last message delivery must be completed with an afterDeliver before another message can be delivered",
            )),

            (S::None, E::AfterDelivery) => Err(IllegalTransition(
                "afterDelivery may only be called if message delivery began with a beforeDelivery call",
            )),
            (S::BeforeCalled | S::MethodCalled | S::SystemException, E::AfterDelivery) => {
                Ok(Transition::Proceed)
            }
        }
    }
}

/// One message endpoint handed to a resource adapter.
///
/// Not shareable: the adapter drives each endpoint from one task at a time.
pub struct EndpointHandler<L: MessageListener> {
    container: Arc<MdbContainer<L>>,
    deployment: Arc<BeanDeployment<L>>,
    pool: Arc<InstancePool<L>>,
    xa_resource: Option<Arc<dyn XaResource>>,
    state: DeliveryState,
    instance: Option<Instance<L>>,
    call: Option<CallContext>,
}

impl<L: MessageListener> EndpointHandler<L> {
    pub(crate) fn new(
        container: Arc<MdbContainer<L>>,
        deployment: Arc<BeanDeployment<L>>,
        pool: Arc<InstancePool<L>>,
        xa_resource: Option<Arc<dyn XaResource>>,
    ) -> Self {
        Self {
            container,
            deployment,
            pool,
            xa_resource,
            state: DeliveryState::None,
            instance: None,
            call: None,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        self.deployment.id()
    }

    /// The instance currently checked out for delivery, if any.
    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance.as_ref().map(Instance::id)
    }

    /// Starts a delivery of `method`.
    ///
    /// On failure the state stays `NONE` and the cause is wrapped in
    /// [`MdbError::ApplicationServerInternal`].
    pub async fn before_delivery(&mut self, method: &Method) -> Result<(), MdbError> {
        self.state.on(DeliveryEvent::BeforeDelivery)?;
        self.begin(method).await.map_err(|e| {
            error!(
                deployment_id = %self.deployment.id(),
                method = %method,
                error = %e,
                root_cause = %e.root_cause(),
                "beforeDelivery failed"
            );
            MdbError::internal(e)
        })?;
        self.state = DeliveryState::BeforeCalled;
        Ok(())
    }

    async fn begin(&mut self, method: &Method) -> Result<(), MdbError> {
        let instance = self.pool.acquire().await?;
        match self
            .container
            .before_delivery(&self.deployment, method, self.xa_resource.as_deref(), None)
        {
            Ok(call) => {
                self.instance = Some(instance);
                self.call = Some(call);
                Ok(())
            }
            Err(e) => {
                self.pool.pool_instance(instance);
                Err(e)
            }
        }
    }

    /// Delivers one message to the bean.
    pub async fn deliver(&mut self, method: &Method, message: L::Message) -> Result<L::Reply, MdbError> {
        let implicit = self.state.on(DeliveryEvent::Deliver)? == Transition::ImplicitBeforeAfter;
        if implicit {
            debug!(deployment_id = %self.deployment.id(), method = %method, "implicit beforeDelivery");
            self.begin(method).await.map_err(MdbError::ejb_exception)?;
            self.state = DeliveryState::BeforeCalled;
        }

        let mut result = self.invoke(method, message).await;

        if implicit {
            if let Err(e) = self.after_delivery() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result.map_err(|e| surface(method, e))
    }

    async fn invoke(&mut self, method: &Method, message: L::Message) -> Result<L::Reply, MdbError> {
        let (Some(instance), Some(call)) = (self.instance.as_mut(), self.call.as_mut()) else {
            return Err(MdbError::illegal_state("No bean instance is associated with this endpoint"));
        };
        if !call.method().same_signature(method) {
            return Err(MdbError::illegal_state(
                "Delivery method specified in beforeDelivery is not the delivery method called",
            ));
        }

        let result = self
            .container
            .invoke_instance(&self.deployment, instance, call, method, message)
            .await;
        self.state = match &result {
            Err(e) if e.is_system() => DeliveryState::SystemException,
            _ => DeliveryState::MethodCalled,
        };
        result
    }

    /// Completes the current delivery.
    ///
    /// The state returns to `NONE` even when completing the transaction fails. After a
    /// system fault the instance is discarded rather than pooled.
    pub fn after_delivery(&mut self) -> Result<(), MdbError> {
        self.state.on(DeliveryEvent::AfterDelivery)?;

        let mut discard = self.state == DeliveryState::SystemException;
        let result = match self.call.take() {
            Some(mut call) => {
                let result = self.container.after_delivery(&mut call);
                discard |= call.discard_instance();
                result
            }
            None => Ok(()),
        };

        if let Some(instance) = self.instance.take() {
            if discard {
                self.pool.discard_instance(instance);
            } else {
                self.pool.pool_instance(instance);
            }
        }
        self.state = DeliveryState::None;

        result.map_err(|e| {
            error!(
                deployment_id = %self.deployment.id(),
                error = %e,
                root_cause = %e.root_cause(),
                "afterDelivery failed"
            );
            MdbError::internal(e)
        })
    }

    /// Releases the endpoint. Safe to call more than once.
    pub fn release(&mut self) {
        if !matches!(self.state.on(DeliveryEvent::Release), Ok(Transition::Proceed)) {
            return;
        }
        let suspect = self.state == DeliveryState::SystemException;
        if self.call.is_some() {
            warn!(
                deployment_id = %self.deployment.id(),
                state = ?self.state,
                "endpoint released with a delivery in progress"
            );
        }
        self.state = DeliveryState::Released;
        self.container
            .release_delivery(&self.pool, self.call.take(), self.instance.take(), suspect);
    }
}

impl<L: MessageListener> fmt::Debug for EndpointHandler<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointHandler")
            .field("deployment_id", self.deployment.id())
            .field("state", &self.state)
            .field("instance_id", &self.instance_id())
            .finish_non_exhaustive()
    }
}

impl<L: MessageListener> Drop for EndpointHandler<L> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Unwraps the bean fault behind `error` and applies the validity filter.
fn surface(method: &Method, error: MdbError) -> MdbError {
    if matches!(error, MdbError::IllegalState(_)) {
        return error;
    }
    let Some(bean) = error.bean_exception().cloned() else {
        return error;
    };
    if is_valid_exception(method, &bean) {
        MdbError::Bean(bean)
    } else {
        MdbError::ejb_exception(error)
    }
}
