//! # Resource Adapter Boundary
//!
//! The container activates each deployment's endpoint on a [`ResourceAdapter`], handing
//! it an [`EndpointFactory`] and a configured [`ActivationSpec`]. From then on the adapter
//! owns delivery: it creates endpoints from the factory, drives them from its own
//! tasks, and stops when the container deactivates it.
//!
//! Activation specs are configured without reflection. Each activation property is
//! offered to [`ActivationSpec::set_property`], which reports whether the activation spec has a
//! setter for it.

use crate::error::ResourceError;
use crate::factory::EndpointFactory;
use crate::listener::MessageListener;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait ResourceAdapter<L: MessageListener>: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Starts delivering to the endpoint produced by `factory`.
    async fn endpoint_activation(
        &self,
        factory: Arc<EndpointFactory<L>>,
        spec: Arc<dyn ActivationSpec>,
    ) -> Result<(), ResourceError>;

    /// Stops delivering to `factory`'s endpoint. In-flight deliveries may complete.
    async fn endpoint_deactivation(&self, factory: Arc<EndpointFactory<L>>, spec: Arc<dyn ActivationSpec>);
}

/// Adapter-specific activation configuration.
pub trait ActivationSpec: Send + Sync + fmt::Debug + 'static {
    /// Applies one property. `Ok(false)` means there is no such property.
    fn set_property(&mut self, name: &str, value: &str) -> Result<bool, ResourceError>;

    fn validate(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn set_resource_adapter(&mut self, _name: &str) {}

    /// For adapters to recover their concrete spec type.
    fn as_any(&self) -> &dyn Any;
}

pub type ActivationSpecFactory = Arc<dyn Fn() -> Box<dyn ActivationSpec> + Send + Sync>;
