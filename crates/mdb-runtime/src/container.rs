//! # MDB Container
//!
//! The container binds deployments to one message listener interface and one resource
//! adapter. It owns the deployment registry and routes every delivery through the
//! deployment's instance pool and a fresh transaction policy.
//!
//! ## Deployment lifecycle
//!
//! | Step | On failure |
//! |------|------------|
//! | Check listener interface | rejected, registry untouched, adapter never called |
//! | Check method interceptor bindings | rejected, registry untouched |
//! | Configure activation spec | rejected, registry untouched |
//! | Register pool and endpoint factory | rejected if the id is taken |
//! | Fill the pool to `PoolMin` | logged, pool left short |
//! | Activate endpoint (if active on startup) | entry removed and pool closed, [`MdbError::Deployment`] |
//!
//! A half-activated deployment is never visible: activation failure removes the
//! registry entry before the error is returned.
//!
//! ## Example
//!
//! ```rust,ignore
//! let container = MdbContainer::<TextMessageListener>::builder()
//!     .config(ContainerConfig::from_env()?)
//!     .resource_adapter(adapter)
//!     .transaction_manager(Arc::new(LocalTransactionManager::new()))
//!     .activation_spec(|| Box::new(QueueActivationSpec::default()))
//!     .build()?;
//!
//! container.deploy(deployment).await?;
//! ```

use crate::adapter::{ActivationSpec, ActivationSpecFactory, ResourceAdapter};
use crate::config::{ConfigError, ContainerConfig};
use crate::context::CallContext;
use crate::deployment::{BeanDeployment, DeploymentId};
use crate::error::{MdbError, ResourceError};
use crate::exception::ExceptionType;
use crate::factory::EndpointFactory;
use crate::injection::InjectionSource;
use crate::listener::{MessageListener, Method};
use crate::pool::{Instance, InstancePool, InstanceStats};
use crate::transaction::{TransactionId, TransactionManager, TransactionPolicy, XaResource};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Activation properties consumed by the container itself or by the adapter's own
/// destination handling. They never count as unknown.
const IGNORED_ACTIVATION_PROPERTIES: [&str; 8] = [
    "destination",
    "destinationType",
    "destinationLookup",
    "connectionFactoryLookup",
    "beanClass",
    "MdbActiveOnStartup",
    "MdbJMXControl",
    "DeliveryActive",
];

struct DeploymentEntry<L: MessageListener> {
    deployment: Arc<BeanDeployment<L>>,
    pool: Arc<InstancePool<L>>,
    factory: Arc<EndpointFactory<L>>,
    activation_spec: Arc<dyn ActivationSpec>,
    delivery_active: AtomicBool,
}

pub struct MdbContainer<L: MessageListener> {
    config: ContainerConfig,
    message_listener_interface: String,
    resource_adapter: Arc<dyn ResourceAdapter<L>>,
    transaction_manager: Arc<dyn TransactionManager>,
    activation_spec_factory: ActivationSpecFactory,
    injection_source: Option<Arc<dyn InjectionSource>>,
    deployments: DashMap<DeploymentId, Arc<DeploymentEntry<L>>>,
}

impl<L: MessageListener> MdbContainer<L> {
    pub fn builder() -> MdbContainerBuilder<L> {
        MdbContainerBuilder {
            config: ContainerConfig::default(),
            resource_adapter: None,
            transaction_manager: None,
            activation_spec_factory: None,
            injection_source: None,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.config.container_id
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn message_listener_interface(&self) -> &str {
        &self.message_listener_interface
    }

    pub fn transaction_manager(&self) -> &Arc<dyn TransactionManager> {
        &self.transaction_manager
    }

    fn entry(&self, id: &DeploymentId) -> Result<Arc<DeploymentEntry<L>>, MdbError> {
        self.deployments
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| MdbError::UnknownDeployment(id.clone()))
    }

    pub fn is_deployed(&self, id: &DeploymentId) -> bool {
        self.deployments.contains_key(id)
    }

    pub fn deployment_ids(&self) -> Vec<DeploymentId> {
        self.deployments.iter().map(|e| e.key().clone()).collect()
    }

    // ---------------------------------------------------------------
    // Deploy / undeploy
    // ---------------------------------------------------------------

    pub async fn deploy(self: &Arc<Self>, deployment: BeanDeployment<L>) -> Result<(), MdbError> {
        let id = deployment.id().clone();

        if deployment.message_listener_interface() != self.message_listener_interface {
            return Err(MdbError::deployment(
                format!(
                    "{id} implements {} but container {} only supports {}",
                    deployment.message_listener_interface(),
                    self.config.container_id,
                    self.message_listener_interface
                ),
                None,
            ));
        }
        if let Some((method, class_name)) = deployment.undeclared_interceptors().first() {
            return Err(MdbError::deployment(
                format!("{id} binds undeclared interceptor {class_name} to {method}"),
                None,
            ));
        }
        if self.is_deployed(&id) {
            return Err(MdbError::deployment(format!("{id} is already deployed"), None));
        }

        let activation_spec = self.create_activation_spec(&deployment)?;
        let limit = self.config.instance_limit_for(&deployment);
        let deployment = Arc::new(deployment);
        let pool = Arc::new(InstancePool::new(
            deployment.clone(),
            self.injection_source.clone(),
            limit,
        ));
        let factory = Arc::new(EndpointFactory::new(
            Arc::downgrade(self),
            deployment.clone(),
            pool.clone(),
            self.config.endpoint_retry_backoff(),
        ));
        let entry = Arc::new(DeploymentEntry {
            deployment,
            pool,
            factory,
            activation_spec,
            delivery_active: AtomicBool::new(false),
        });

        match self.deployments.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(MdbError::deployment(format!("{id} is already deployed"), None));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry.clone());
            }
        }

        let filled = entry.pool.fill().await;

        if entry.deployment.active_on_startup() {
            if let Err(e) = self.activate(&entry).await {
                self.deployments.remove(&id);
                entry.pool.close().await;
                return Err(MdbError::deployment(
                    format!("Failed to activate endpoint for {id}"),
                    Some(Box::new(e)),
                ));
            }
        }

        info!(
            container_id = %self.config.container_id,
            deployment_id = %id,
            instance_limit = ?limit,
            filled,
            delivery_active = entry.delivery_active.load(Ordering::SeqCst),
            "deployed"
        );
        Ok(())
    }

    fn create_activation_spec(&self, deployment: &BeanDeployment<L>) -> Result<Arc<dyn ActivationSpec>, MdbError> {
        let id = deployment.id();
        let invalid = |e: ResourceError| MdbError::deployment(format!("Invalid activation spec for {id}"), Some(Box::new(e)));

        let mut spec = (self.activation_spec_factory)();
        let mut unknown = Vec::new();
        for (name, value) in deployment.activation_properties() {
            let applied = spec.set_property(name, value).map_err(invalid)?;
            if !applied && !IGNORED_ACTIVATION_PROPERTIES.contains(&name.as_str()) {
                unknown.push(name.as_str());
            }
        }
        spec.set_property("beanClass", deployment.bean_class()).map_err(invalid)?;

        if !unknown.is_empty() {
            let names = unknown.join(", ");
            if self.config.fail_on_unknown_activation_spec {
                return Err(MdbError::deployment(
                    format!("Unknown activation spec properties for {id}: {names}"),
                    None,
                ));
            }
            warn!(deployment_id = %id, properties = %names, "ignoring unknown activation spec properties");
        }

        spec.validate().map_err(invalid)?;
        spec.set_resource_adapter(self.resource_adapter.name());
        Ok(Arc::from(spec))
    }

    /// Deactivates the endpoint, forgets the deployment, and closes its pool. Instances
    /// still checked out are destroyed when they are handed back.
    pub async fn undeploy(&self, id: &DeploymentId) -> Result<(), MdbError> {
        let entry = self.entry(id)?;
        self.deactivate(&entry).await;
        self.deployments.remove(id);
        let freed = entry.pool.close().await;
        info!(
            container_id = %self.config.container_id,
            deployment_id = %id,
            freed,
            "undeployed"
        );
        Ok(())
    }

    /// Undeploys everything.
    pub async fn shutdown(&self) {
        for id in self.deployment_ids() {
            if let Err(e) = self.undeploy(&id).await {
                warn!(deployment_id = %id, error = %e, "undeploy during shutdown failed");
            }
        }
    }

    // ---------------------------------------------------------------
    // Delivery control and monitoring
    // ---------------------------------------------------------------

    async fn activate(&self, entry: &DeploymentEntry<L>) -> Result<(), MdbError> {
        if entry
            .delivery_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let result = self
            .resource_adapter
            .endpoint_activation(entry.factory.clone(), entry.activation_spec.clone())
            .await;
        if let Err(e) = result {
            entry.delivery_active.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        info!(deployment_id = %entry.deployment.id(), adapter = self.resource_adapter.name(), "endpoint activated");
        Ok(())
    }

    async fn deactivate(&self, entry: &DeploymentEntry<L>) {
        if entry
            .delivery_active
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.resource_adapter
            .endpoint_deactivation(entry.factory.clone(), entry.activation_spec.clone())
            .await;
        info!(deployment_id = %entry.deployment.id(), adapter = self.resource_adapter.name(), "endpoint deactivated");
    }

    pub async fn start_delivery(&self, id: &DeploymentId) -> Result<(), MdbError> {
        let entry = self.entry(id)?;
        self.activate(&entry).await
    }

    pub async fn stop_delivery(&self, id: &DeploymentId) -> Result<(), MdbError> {
        let entry = self.entry(id)?;
        self.deactivate(&entry).await;
        Ok(())
    }

    pub fn is_delivery_active(&self, id: &DeploymentId) -> Result<bool, MdbError> {
        Ok(self.entry(id)?.delivery_active.load(Ordering::SeqCst))
    }

    pub fn instance_stats(&self, id: &DeploymentId) -> Result<InstanceStats, MdbError> {
        Ok(self.entry(id)?.pool.stats())
    }

    pub fn endpoint_factory(&self, id: &DeploymentId) -> Result<Arc<EndpointFactory<L>>, MdbError> {
        Ok(self.entry(id)?.factory.clone())
    }

    /// Frees idle instances older than the configured idle timeout, and instances past
    /// their deployment's `MaxAge`, in every pool.
    pub async fn evict_idle(&self) -> usize {
        let timeout = self.config.idle_timeout();
        let pools: Vec<_> = self.deployments.iter().map(|e| e.pool.clone()).collect();
        let mut evicted = 0;
        for pool in pools {
            evicted += pool.evict_idle(timeout).await;
        }
        evicted
    }

    // ---------------------------------------------------------------
    // Delivery
    // ---------------------------------------------------------------

    /// Prepares the transaction for one delivery of `method`.
    ///
    /// When the policy began a new transaction, `xa_resource` is enlisted in it. If
    /// enlistment fails the transaction is rolled back before the error is returned.
    pub(crate) fn before_delivery(
        &self,
        deployment: &BeanDeployment<L>,
        method: &Method,
        xa_resource: Option<&dyn XaResource>,
        caller: Option<TransactionId>,
    ) -> Result<CallContext, MdbError> {
        let kind = deployment.transaction_type(method);
        let mut policy = TransactionPolicy::before_invoke(kind, self.transaction_manager.clone(), caller)?;

        if let Some(resource) = xa_resource.filter(|_| policy.is_new_transaction()) {
            if let Err(e) = policy.enlist_resource(resource) {
                policy.set_rollback_only();
                if let Err(cleanup) = policy.after_invoke() {
                    debug!(error = %cleanup, "rollback after failed enlistment reported an error");
                }
                return Err(e);
            }
        }

        debug!(deployment_id = %deployment.id(), method = %method, transaction_type = ?kind, "delivery prepared");
        Ok(CallContext::new(
            deployment.id().clone(),
            method.clone(),
            policy,
            self.transaction_manager.clone(),
        ))
    }

    /// Runs the interceptor chain and the bean, classifying any bean fault.
    pub(crate) async fn invoke_instance(
        &self,
        deployment: &BeanDeployment<L>,
        instance: &mut Instance<L>,
        call: &mut CallContext,
        method: &Method,
        message: L::Message,
    ) -> Result<L::Reply, MdbError> {
        let interceptors = deployment.interceptors_for(method);
        let ctx = call.bean_context();
        let fault = match instance.invoke(&interceptors, method, message, &ctx).await {
            Ok(reply) => return Ok(reply),
            Err(fault) => fault,
        };

        debug!(
            deployment_id = %deployment.id(),
            instance_id = %instance.id(),
            method = %method,
            error = %fault,
            "business method failed"
        );
        Err(match deployment.exception_type(&fault) {
            ExceptionType::System => {
                let mut discard = call.discard_instance();
                let error = call.policy().handle_system_exception(fault, &mut discard);
                *call.discard_flag() = discard;
                error
            }
            ExceptionType::Application { rollback } => call.policy().handle_application_exception(fault, rollback),
        })
    }

    /// Completes the transaction of one delivery.
    pub(crate) fn after_delivery(&self, call: &mut CallContext) -> Result<(), MdbError> {
        let result = call.policy_mut().after_invoke();
        if let Err(e) = &result {
            if e.is_system() {
                *call.discard_flag() = true;
            }
        }
        result
    }

    /// Final cleanup for a released endpoint. Never fails: errors are logged.
    pub(crate) fn release_delivery(
        &self,
        pool: &Arc<InstancePool<L>>,
        call: Option<CallContext>,
        instance: Option<Instance<L>>,
        suspect: bool,
    ) {
        let mut discard = suspect;
        if let Some(mut call) = call {
            if let Err(e) = call.policy_mut().after_invoke() {
                warn!(
                    deployment_id = %call.deployment_id(),
                    error = %e,
                    "error while releasing message endpoint"
                );
            }
            discard |= call.discard_instance();
        }
        if let Some(instance) = instance {
            if discard {
                pool.discard_instance(instance);
            } else {
                pool.pool_instance(instance);
            }
        }
    }

    /// Delivers one message without a resource adapter.
    ///
    /// The call gets a freshly constructed instance that does not count against the
    /// instance limit, so it succeeds even while endpoints hold every slot. The instance
    /// is destroyed afterwards (with `pre_destroy`), or discarded after a system fault.
    pub async fn invoke(&self, id: &DeploymentId, method: &Method, message: L::Message) -> Result<L::Reply, MdbError> {
        self.invoke_in_transaction(id, None, method, message).await
    }

    /// Like [`invoke`](Self::invoke), inside the caller's transaction `caller`.
    pub async fn invoke_in_transaction(
        &self,
        id: &DeploymentId,
        caller: Option<TransactionId>,
        method: &Method,
        message: L::Message,
    ) -> Result<L::Reply, MdbError> {
        let entry = self.entry(id)?;
        let mut instance = entry.pool.create_unbounded_instance().await?;
        let mut call = match self.before_delivery(&entry.deployment, method, None, caller) {
            Ok(call) => call,
            Err(e) => {
                entry.pool.free_instance(instance).await;
                return Err(e);
            }
        };

        let result = self
            .invoke_instance(&entry.deployment, &mut instance, &mut call, method, message)
            .await;
        let after = self.after_delivery(&mut call);

        if call.discard_instance() {
            entry.pool.discard_instance(instance);
        } else {
            entry.pool.free_instance(instance).await;
        }

        match (result, after) {
            (Ok(_), Err(e)) => Err(e),
            (result, _) => result,
        }
    }
}

pub struct MdbContainerBuilder<L: MessageListener> {
    config: ContainerConfig,
    resource_adapter: Option<Arc<dyn ResourceAdapter<L>>>,
    transaction_manager: Option<Arc<dyn TransactionManager>>,
    activation_spec_factory: Option<ActivationSpecFactory>,
    injection_source: Option<Arc<dyn InjectionSource>>,
}

impl<L: MessageListener> MdbContainerBuilder<L> {
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resource_adapter(mut self, adapter: Arc<dyn ResourceAdapter<L>>) -> Self {
        self.resource_adapter = Some(adapter);
        self
    }

    pub fn transaction_manager(mut self, manager: Arc<dyn TransactionManager>) -> Self {
        self.transaction_manager = Some(manager);
        self
    }

    pub fn activation_spec<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ActivationSpec> + Send + Sync + 'static,
    {
        self.activation_spec_factory = Some(Arc::new(factory));
        self
    }

    pub fn injection_source(mut self, source: Arc<dyn InjectionSource>) -> Self {
        self.injection_source = Some(source);
        self
    }

    pub fn build(self) -> Result<Arc<MdbContainer<L>>, ConfigError> {
        let message_listener_interface = self
            .config
            .message_listener_interface
            .clone()
            .unwrap_or_else(|| L::INTERFACE.to_string());
        Ok(Arc::new(MdbContainer {
            message_listener_interface,
            resource_adapter: self.resource_adapter.ok_or(ConfigError::Missing("resource_adapter"))?,
            transaction_manager: self
                .transaction_manager
                .ok_or(ConfigError::Missing("transaction_manager"))?,
            activation_spec_factory: self
                .activation_spec_factory
                .ok_or(ConfigError::Missing("activation_spec"))?,
            injection_source: self.injection_source,
            deployments: DashMap::new(),
            config: self.config,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{BeanRecorder, MockListener, MockResourceAdapter, MockTransactionManager, PropertySpec};

    fn container(adapter: &Arc<MockResourceAdapter<MockListener>>, config: ContainerConfig) -> Arc<MdbContainer<MockListener>> {
        MdbContainer::builder()
            .config(config)
            .resource_adapter(adapter.clone())
            .transaction_manager(Arc::new(MockTransactionManager::new()))
            .activation_spec(PropertySpec::factory(&["maxSessions"]))
            .build()
            .unwrap()
    }

    fn deployment(id: &str, recorder: &BeanRecorder) -> crate::deployment::BeanDeploymentBuilder<MockListener> {
        BeanDeployment::builder(id, "org.example.AuditBean", recorder.factory())
    }

    #[test]
    fn test_builder_reports_missing_collaborators() {
        let result = MdbContainer::<MockListener>::builder().build();
        assert!(matches!(result, Err(ConfigError::Missing("resource_adapter"))));
    }

    #[tokio::test]
    async fn test_deploy_activates_and_undeploy_deactivates() {
        let adapter = Arc::new(MockResourceAdapter::new());
        let container = container(&adapter, ContainerConfig::default());
        let recorder = BeanRecorder::default();
        let id = DeploymentId::from("AuditBean");

        container
            .deploy(deployment("AuditBean", &recorder).activation_property("maxSessions", "2").build())
            .await
            .unwrap();
        assert!(container.is_delivery_active(&id).unwrap());
        assert_eq!(adapter.activations(), vec![id.clone()]);
        let spec = adapter.spec(&id).unwrap();
        assert_eq!(spec.get("maxSessions"), Some("2"));
        assert_eq!(spec.get("beanClass"), Some("org.example.AuditBean"));
        assert_eq!(spec.resource_adapter(), Some(adapter.name()));

        container.undeploy(&id).await.unwrap();
        assert_eq!(adapter.deactivations(), vec![id.clone()]);
        assert!(!container.is_deployed(&id));
        assert!(matches!(container.undeploy(&id).await, Err(MdbError::UnknownDeployment(_))));
    }

    #[tokio::test]
    async fn test_duplicate_deployment_is_rejected() {
        let adapter = Arc::new(MockResourceAdapter::new());
        let container = container(&adapter, ContainerConfig::default());
        let recorder = BeanRecorder::default();

        container.deploy(deployment("AuditBean", &recorder).build()).await.unwrap();
        let err = container.deploy(deployment("AuditBean", &recorder).build()).await.unwrap_err();
        assert!(matches!(err, MdbError::Deployment { .. }));
        assert_eq!(adapter.activations().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_activation_properties_fail_or_warn_per_config() {
        let adapter = Arc::new(MockResourceAdapter::new());
        let strict = container(&adapter, ContainerConfig::default());
        let recorder = BeanRecorder::default();

        let err = strict
            .deploy(
                deployment("AuditBean", &recorder)
                    .activation_property("destination", "orders")
                    .activation_property("acknowledgeMode", "Auto-acknowledge")
                    .build(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("acknowledgeMode"));
        assert!(!strict.is_deployed(&DeploymentId::from("AuditBean")));

        let lenient = container(
            &adapter,
            ContainerConfig {
                fail_on_unknown_activation_spec: false,
                ..ContainerConfig::default()
            },
        );
        lenient
            .deploy(
                deployment("AuditBean", &recorder)
                    .activation_property("acknowledgeMode", "Auto-acknowledge")
                    .build(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_inactive_on_startup_can_be_started_later() {
        let adapter = Arc::new(MockResourceAdapter::new());
        let container = container(&adapter, ContainerConfig::default());
        let recorder = BeanRecorder::default();
        let id = DeploymentId::from("AuditBean");

        container
            .deploy(deployment("AuditBean", &recorder).activation_property("MdbActiveOnStartup", "false").build())
            .await
            .unwrap();
        assert!(!container.is_delivery_active(&id).unwrap());
        assert!(adapter.activations().is_empty());

        container.start_delivery(&id).await.unwrap();
        container.start_delivery(&id).await.unwrap();
        assert_eq!(adapter.activations().len(), 1);

        container.stop_delivery(&id).await.unwrap();
        container.stop_delivery(&id).await.unwrap();
        assert_eq!(adapter.deactivations().len(), 1);
        assert!(!container.is_delivery_active(&id).unwrap());
    }

    #[tokio::test]
    async fn test_direct_invoke_destroys_after_success_and_discards_after_system_fault() {
        let adapter = Arc::new(MockResourceAdapter::new());
        let container = container(&adapter, ContainerConfig::default());
        let recorder = BeanRecorder::default();
        let id = DeploymentId::from("AuditBean");
        let method = Method::new("onMessage");
        container.deploy(deployment("AuditBean", &recorder).build()).await.unwrap();

        let reply = container.invoke(&id, &method, "hello".to_string()).await.unwrap();
        assert_eq!(reply, "1:hello");
        let stats = container.instance_stats(&id).unwrap();
        assert_eq!((stats.live, stats.idle), (0, 0));
        assert_eq!(recorder.destroyed(), 1);

        recorder.push(crate::mock::Outcome::Fail(crate::exception::BeanException::runtime(
            "IllegalStateException",
            "corrupt",
        )));
        let err = container.invoke(&id, &method, "boom".to_string()).await.unwrap_err();
        assert!(err.is_system());

        let stats = container.instance_stats(&id).unwrap();
        assert_eq!((stats.live, stats.idle), (0, 0));
        assert_eq!(recorder.created(), 2);
        assert_eq!(recorder.destroyed(), 1);
    }

    #[tokio::test]
    async fn test_direct_invoke_is_not_bound_by_instance_limit() {
        let adapter = Arc::new(MockResourceAdapter::new());
        let container = container(&adapter, ContainerConfig::default());
        let recorder = BeanRecorder::default();
        let id = DeploymentId::from("AuditBean");
        let method = Method::new("onMessage");
        container
            .deploy(deployment("AuditBean", &recorder).property("InstanceLimit", "1").build())
            .await
            .unwrap();

        let mut endpoint = container.endpoint_factory(&id).unwrap().create_endpoint(None).unwrap();
        endpoint.before_delivery(&method).await.unwrap();

        assert_eq!(container.invoke(&id, &method, "direct".to_string()).await.unwrap(), "2:direct");
        assert_eq!(container.instance_stats(&id).unwrap().live, 1);

        endpoint.after_delivery().unwrap();
        assert_eq!(container.instance_stats(&id).unwrap().idle, 1);
    }

    #[tokio::test]
    async fn test_undeclared_interceptor_binding_fails_deployment() {
        let adapter = Arc::new(MockResourceAdapter::new());
        let container = container(&adapter, ContainerConfig::default());
        let recorder = BeanRecorder::default();

        let err = container
            .deploy(deployment("AuditBean", &recorder).method_interceptors("onMessage", ["Trail"]).build())
            .await
            .unwrap_err();

        assert!(matches!(err, MdbError::Deployment { ref message, .. } if message.contains("Trail")));
        assert!(!container.is_deployed(&DeploymentId::from("AuditBean")));
        assert!(adapter.activations().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_fills_pool_min_and_undeploy_destroys_it() {
        let adapter = Arc::new(MockResourceAdapter::new());
        let container = container(&adapter, ContainerConfig::default());
        let recorder = BeanRecorder::default();
        let id = DeploymentId::from("AuditBean");

        container
            .deploy(deployment("AuditBean", &recorder).property("PoolMin", "2").build())
            .await
            .unwrap();
        let stats = container.instance_stats(&id).unwrap();
        assert_eq!((stats.live, stats.idle, stats.min), (2, 2, 2));

        container.undeploy(&id).await.unwrap();
        assert_eq!(recorder.destroyed(), 2);
    }

    #[tokio::test]
    async fn test_failed_activation_destroys_filled_instances() {
        let adapter = Arc::new(MockResourceAdapter::new());
        let container = container(&adapter, ContainerConfig::default());
        let recorder = BeanRecorder::default();
        adapter.fail_activation(true);

        let result = container
            .deploy(deployment("AuditBean", &recorder).property("PoolMin", "2").build())
            .await;

        assert!(result.is_err());
        assert_eq!(recorder.created(), 2);
        assert_eq!(recorder.destroyed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle_uses_configured_timeout() {
        let adapter = Arc::new(MockResourceAdapter::new());
        let config = ContainerConfig {
            idle_timeout_ms: 1_000,
            ..ContainerConfig::default()
        };
        let container = container(&adapter, config);
        let recorder = BeanRecorder::default();
        let id = DeploymentId::from("AuditBean");
        container.deploy(deployment("AuditBean", &recorder).build()).await.unwrap();
        let mut endpoint = container.endpoint_factory(&id).unwrap().create_endpoint(None).unwrap();
        endpoint.deliver(&Method::new("onMessage"), "m".to_string()).await.unwrap();
        assert_eq!(container.instance_stats(&id).unwrap().idle, 1);

        assert_eq!(container.evict_idle().await, 0);
        tokio::time::advance(std::time::Duration::from_millis(1_500)).await;
        assert_eq!(container.evict_idle().await, 1);
        assert_eq!(recorder.destroyed(), 1);
    }
}
