//! # Mocks & Testing Guide
//!
//! In-memory collaborators for exercising the container without a real messaging
//! provider or transaction manager. Everything here records what happened so tests can
//! assert on the exact sequence of callbacks.
//!
//! | Mock | Stands in for | Records |
//! |------|---------------|---------|
//! | [`MockListener`] | a listener interface | n/a (`String` in, `String` out) |
//! | [`MockTransactionManager`] | the transaction manager | [`TxEvent`]s, injectable failures |
//! | [`MockResourceAdapter`] | a resource adapter | activations, deactivations, factories, specs |
//! | [`PropertySpec`] | an activation spec | every property it was offered |
//! | [`ScriptedBean`] / [`BeanRecorder`] | bean code | lifecycle calls, scripted outcomes |
//! | [`RecordingInterceptor`] | an interceptor | around-invoke and lifecycle order |
//!
//! ## Driving a delivery by hand
//!
//! The mock adapter never delivers on its own. Tests play the adapter's part by taking
//! the factory it was activated with:
//!
//! ```rust,ignore
//! let recorder = BeanRecorder::default();
//! container.deploy(BeanDeployment::builder("Audit", "AuditBean", recorder.factory()).build()).await?;
//!
//! let factory = adapter.factory(&DeploymentId::from("Audit")).unwrap();
//! let mut endpoint = factory.create_endpoint(None)?;
//! endpoint.before_delivery(&method).await?;
//! let reply = endpoint.deliver(&method, "hello".to_string()).await?;
//! endpoint.after_delivery()?;
//! ```
//!
//! ## Scripting bean outcomes
//!
//! Each [`Outcome`] pushed onto a [`BeanRecorder`] is consumed by the next `on_message`
//! call of any bean built from that recorder. With an empty script the bean echoes
//! `"{serial}:{message}"`, where `serial` is the construction order of the instance,
//! which makes instance reuse visible in replies.

use crate::adapter::{ActivationSpec, ResourceAdapter};
use crate::bean::{Interceptor, Invocation, MessageDrivenBean};
use crate::context::MessageDrivenContext;
use crate::deployment::DeploymentId;
use crate::error::{ResourceError, TransactionError};
use crate::exception::BeanException;
use crate::factory::EndpointFactory;
use crate::injection::Resource;
use crate::listener::{MessageListener, Method};
use crate::local_tx::LocalTransactionManager;
use crate::lock;
use crate::transaction::{TransactionId, TransactionManager, TransactionStatus, XaResource};
use async_trait::async_trait;
use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A listener interface carrying `String` messages and replies.
#[derive(Debug)]
pub struct MockListener;

impl MessageListener for MockListener {
    const INTERFACE: &'static str = "test.MockListener";
    type Message = String;
    type Reply = String;
}

// ---------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    Begin(TransactionId),
    Commit(TransactionId),
    Rollback(TransactionId),
    SetRollbackOnly(TransactionId),
    Suspend(TransactionId),
    Resume(TransactionId),
    Enlist(TransactionId, String),
}

/// A [`LocalTransactionManager`] that records every successful call.
#[derive(Debug, Default)]
pub struct MockTransactionManager {
    inner: LocalTransactionManager,
    events: Mutex<Vec<TxEvent>>,
    fail_begin: AtomicBool,
    fail_enlist: AtomicBool,
}

impl MockTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TxEvent> {
        lock(&self.events).clone()
    }

    pub fn active_count(&self) -> usize {
        self.inner.active_count()
    }

    pub fn fail_begin(&self, fail: bool) {
        self.fail_begin.store(fail, Ordering::SeqCst);
    }

    pub fn fail_enlist(&self, fail: bool) {
        self.fail_enlist.store(fail, Ordering::SeqCst);
    }

    fn record<T>(&self, result: Result<T, TransactionError>, event: TxEvent) -> Result<T, TransactionError> {
        if result.is_ok() {
            lock(&self.events).push(event);
        }
        result
    }
}

impl TransactionManager for MockTransactionManager {
    fn begin(&self) -> Result<TransactionId, TransactionError> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(TransactionError::Manager("scripted begin failure".to_string()));
        }
        let tx = self.inner.begin()?;
        lock(&self.events).push(TxEvent::Begin(tx));
        Ok(tx)
    }

    fn commit(&self, tx: TransactionId) -> Result<(), TransactionError> {
        self.record(self.inner.commit(tx), TxEvent::Commit(tx))
    }

    fn rollback(&self, tx: TransactionId) -> Result<(), TransactionError> {
        self.record(self.inner.rollback(tx), TxEvent::Rollback(tx))
    }

    fn set_rollback_only(&self, tx: TransactionId) -> Result<(), TransactionError> {
        self.record(self.inner.set_rollback_only(tx), TxEvent::SetRollbackOnly(tx))
    }

    fn status(&self, tx: TransactionId) -> TransactionStatus {
        self.inner.status(tx)
    }

    fn suspend(&self, tx: TransactionId) -> Result<(), TransactionError> {
        self.record(self.inner.suspend(tx), TxEvent::Suspend(tx))
    }

    fn resume(&self, tx: TransactionId) -> Result<(), TransactionError> {
        self.record(self.inner.resume(tx), TxEvent::Resume(tx))
    }

    fn enlist(&self, tx: TransactionId, resource: &dyn XaResource) -> Result<(), TransactionError> {
        if self.fail_enlist.load(Ordering::SeqCst) {
            return Err(TransactionError::Enlist {
                resource: resource.resource_name().to_string(),
                reason: "scripted enlist failure".to_string(),
            });
        }
        let event = TxEvent::Enlist(tx, resource.resource_name().to_string());
        self.record(self.inner.enlist(tx, resource), event)
    }
}

#[derive(Debug, Clone)]
pub struct MockXaResource {
    name: String,
}

impl MockXaResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl XaResource for MockXaResource {
    fn resource_name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------
// Resource adapter and activation spec
// ---------------------------------------------------------------

pub struct MockResourceAdapter<L: MessageListener> {
    activations: Mutex<Vec<DeploymentId>>,
    deactivations: Mutex<Vec<DeploymentId>>,
    factories: Mutex<HashMap<DeploymentId, Arc<EndpointFactory<L>>>>,
    specs: Mutex<HashMap<DeploymentId, Arc<dyn ActivationSpec>>>,
    fail_activation: AtomicBool,
}

impl<L: MessageListener> MockResourceAdapter<L> {
    pub fn new() -> Self {
        Self {
            activations: Mutex::new(Vec::new()),
            deactivations: Mutex::new(Vec::new()),
            factories: Mutex::new(HashMap::new()),
            specs: Mutex::new(HashMap::new()),
            fail_activation: AtomicBool::new(false),
        }
    }

    pub fn fail_activation(&self, fail: bool) {
        self.fail_activation.store(fail, Ordering::SeqCst);
    }

    pub fn activations(&self) -> Vec<DeploymentId> {
        lock(&self.activations).clone()
    }

    pub fn deactivations(&self) -> Vec<DeploymentId> {
        lock(&self.deactivations).clone()
    }

    /// The factory of a currently active endpoint.
    pub fn factory(&self, id: &DeploymentId) -> Option<Arc<EndpointFactory<L>>> {
        lock(&self.factories).get(id).cloned()
    }

    /// The spec the deployment was last activated with, if it was a [`PropertySpec`].
    pub fn spec(&self, id: &DeploymentId) -> Option<PropertySpec> {
        lock(&self.specs)
            .get(id)
            .and_then(|spec| spec.as_any().downcast_ref::<PropertySpec>().cloned())
    }
}

impl<L: MessageListener> Default for MockResourceAdapter<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<L: MessageListener> ResourceAdapter<L> for MockResourceAdapter<L> {
    fn name(&self) -> &str {
        "MockResourceAdapter"
    }

    async fn endpoint_activation(
        &self,
        factory: Arc<EndpointFactory<L>>,
        spec: Arc<dyn ActivationSpec>,
    ) -> Result<(), ResourceError> {
        if self.fail_activation.load(Ordering::SeqCst) {
            return Err(ResourceError::Activation("scripted activation failure".to_string()));
        }
        let id = factory.deployment_id().clone();
        lock(&self.activations).push(id.clone());
        lock(&self.specs).insert(id.clone(), spec);
        lock(&self.factories).insert(id, factory);
        Ok(())
    }

    async fn endpoint_deactivation(&self, factory: Arc<EndpointFactory<L>>, _spec: Arc<dyn ActivationSpec>) {
        let id = factory.deployment_id().clone();
        lock(&self.factories).remove(&id);
        lock(&self.deactivations).push(id);
    }
}

/// An activation spec that accepts a fixed set of property names and remembers every
/// property it was offered, accepted or not.
#[derive(Debug, Clone, Default)]
pub struct PropertySpec {
    supported: Vec<String>,
    properties: BTreeMap<String, String>,
    resource_adapter: Option<String>,
}

impl PropertySpec {
    pub fn factory(supported: &[&str]) -> impl Fn() -> Box<dyn ActivationSpec> + Send + Sync + 'static {
        let supported: Vec<String> = supported.iter().map(|s| s.to_string()).collect();
        move || -> Box<dyn ActivationSpec> {
            Box::new(PropertySpec {
                supported: supported.clone(),
                ..PropertySpec::default()
            })
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn resource_adapter(&self) -> Option<&str> {
        self.resource_adapter.as_deref()
    }
}

impl ActivationSpec for PropertySpec {
    fn set_property(&mut self, name: &str, value: &str) -> Result<bool, ResourceError> {
        self.properties.insert(name.to_string(), value.to_string());
        Ok(self.supported.iter().any(|s| s == name))
    }

    /// `maxSessions`, when given, must be a positive integer.
    fn validate(&self) -> Result<(), ResourceError> {
        match self.get("maxSessions").map(str::parse::<u32>) {
            Some(Ok(0)) | Some(Err(_)) => Err(ResourceError::Validation(
                "maxSessions must be a positive integer".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn set_resource_adapter(&mut self, name: &str) {
        self.resource_adapter = Some(name.to_string());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------
// Beans and interceptors
// ---------------------------------------------------------------

/// What the next `on_message` call does.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Reply `"{serial}:{message}"`.
    Echo,
    Reply(String),
    Fail(BeanException),
    /// Mark the container transaction rollback-only, then echo.
    MarkRollback,
    /// Begin a bean-managed transaction and return without completing it.
    LeaveTransactionOpen,
}

#[derive(Debug, Default)]
struct RecorderState {
    script: Mutex<VecDeque<Outcome>>,
    created: AtomicUsize,
    delivered: AtomicUsize,
    destroyed: AtomicUsize,
    fail_construction: AtomicBool,
    lifecycle: Mutex<Vec<&'static str>>,
    injected: Mutex<Vec<String>>,
}

/// Shared script and counters for every [`ScriptedBean`] built from it.
#[derive(Debug, Clone, Default)]
pub struct BeanRecorder {
    state: Arc<RecorderState>,
}

impl BeanRecorder {
    pub fn push(&self, outcome: Outcome) {
        lock(&self.state.script).push_back(outcome);
    }

    /// Makes `post_construct` of subsequently constructed beans fail.
    pub fn fail_construction(&self, fail: bool) {
        self.state.fail_construction.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> usize {
        self.state.delivered.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    pub fn lifecycle(&self) -> Vec<&'static str> {
        lock(&self.state.lifecycle).clone()
    }

    pub fn injected(&self) -> Vec<String> {
        lock(&self.state.injected).clone()
    }

    /// A bean factory for [`BeanDeployment::builder`](crate::BeanDeployment::builder).
    pub fn factory(&self) -> impl Fn() -> Result<ScriptedBean, BeanException> + Send + Sync + 'static {
        let recorder = self.clone();
        move || {
            let serial = recorder.state.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ScriptedBean {
                serial,
                recorder: recorder.clone(),
            })
        }
    }

    fn record(&self, step: &'static str) {
        lock(&self.state.lifecycle).push(step);
    }

    fn next_outcome(&self) -> Outcome {
        lock(&self.state.script).pop_front().unwrap_or(Outcome::Echo)
    }
}

#[derive(Debug)]
pub struct ScriptedBean {
    serial: usize,
    recorder: BeanRecorder,
}

impl ScriptedBean {
    pub fn serial(&self) -> usize {
        self.serial
    }
}

#[async_trait]
impl MessageDrivenBean<MockListener> for ScriptedBean {
    fn inject(&mut self, target: &str, _value: Resource) -> Result<(), BeanException> {
        lock(&self.recorder.state.injected).push(target.to_string());
        Ok(())
    }

    async fn post_construct(&mut self) -> Result<(), BeanException> {
        if self.recorder.state.fail_construction.load(Ordering::SeqCst) {
            return Err(BeanException::runtime("BeanCreationException", "scripted construction failure"));
        }
        self.recorder.record("post_construct");
        Ok(())
    }

    async fn ejb_create(&mut self) -> Result<(), BeanException> {
        self.recorder.record("ejb_create");
        Ok(())
    }

    async fn on_message(
        &mut self,
        _method: &Method,
        message: String,
        ctx: &MessageDrivenContext,
    ) -> Result<String, BeanException> {
        self.recorder.state.delivered.fetch_add(1, Ordering::SeqCst);
        let echo = format!("{}:{}", self.serial, message);
        match self.recorder.next_outcome() {
            Outcome::Echo => Ok(echo),
            Outcome::Reply(reply) => Ok(reply),
            Outcome::Fail(fault) => Err(fault),
            Outcome::MarkRollback => {
                ctx.set_rollback_only()?;
                Ok(echo)
            }
            Outcome::LeaveTransactionOpen => {
                ctx.user_transaction()?.begin()?;
                Ok(echo)
            }
        }
    }

    async fn pre_destroy(&mut self) -> Result<(), BeanException> {
        self.recorder.record("pre_destroy");
        self.recorder.state.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub type InterceptorLog = Arc<Mutex<Vec<String>>>;

/// Logs `"{name}:before"` / `"{name}:after"` around each call plus its lifecycle calls.
#[derive(Debug)]
pub struct RecordingInterceptor {
    name: String,
    log: InterceptorLog,
}

impl RecordingInterceptor {
    pub fn factory(
        name: &str,
        log: &InterceptorLog,
    ) -> impl Fn() -> Result<RecordingInterceptor, BeanException> + Send + Sync + 'static {
        let name = name.to_string();
        let log = log.clone();
        move || {
            Ok(RecordingInterceptor {
                name: name.clone(),
                log: log.clone(),
            })
        }
    }

    fn record(&self, step: &str) {
        lock(&self.log).push(format!("{}:{}", self.name, step));
    }
}

#[async_trait]
impl Interceptor<MockListener> for RecordingInterceptor {
    async fn around_invoke(
        &self,
        invocation: Invocation<'_, MockListener>,
        message: String,
    ) -> Result<String, BeanException> {
        self.record("before");
        let result = invocation.proceed(message).await;
        self.record("after");
        result
    }

    async fn post_construct(&self) -> Result<(), BeanException> {
        self.record("post_construct");
        Ok(())
    }

    async fn pre_destroy(&self) -> Result<(), BeanException> {
        self.record("pre_destroy");
        Ok(())
    }
}
