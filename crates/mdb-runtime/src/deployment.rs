//! # Deployment Descriptor
//!
//! A [`BeanDeployment`] is everything the container knows about one message-driven
//! bean: which listener interface it implements, how to configure its activation spec,
//! how each method is demarcated, which exceptions are application exceptions, what
//! to inject, and which interceptors wrap it.
//!
//! ```rust,ignore
//! let deployment = BeanDeployment::<TextMessageListener>::builder("OrderAudit", "OrderAuditBean", || {
//!         Ok(OrderAuditBean::default())
//!     })
//!     .activation_property("destination", "orders")
//!     .activation_property("maxSessions", "4")
//!     .property("InstanceLimit", "4")
//!     .application_exception("DuplicateOrderException", true)
//!     .interceptor("AuditTrail", || Ok(AuditTrail::default()))
//!     .build();
//! ```

use crate::bean::{Interceptor, MessageDrivenBean};
use crate::exception::{ApplicationExceptions, BeanException, ExceptionType};
use crate::listener::{MessageListener, Method};
use crate::transaction::TransactionType;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeploymentId(String);

impl DeploymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeploymentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeploymentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

pub type BeanFactory<L> =
    Arc<dyn Fn() -> Result<Box<dyn MessageDrivenBean<L>>, BeanException> + Send + Sync>;

pub type InterceptorFactory<L> =
    Arc<dyn Fn() -> Result<Arc<dyn Interceptor<L>>, BeanException> + Send + Sync>;

/// A declared interceptor class and how to construct it.
pub struct InterceptorDefinition<L: MessageListener> {
    class_name: String,
    factory: InterceptorFactory<L>,
}

impl<L: MessageListener> InterceptorDefinition<L> {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub(crate) fn construct(&self) -> Result<Arc<dyn Interceptor<L>>, BeanException> {
        (self.factory)()
    }
}

/// Resolve `name` from the injection source and hand it to the bean's `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub name: String,
    pub target: String,
}

const ACTIVE_ON_STARTUP: &str = "MdbActiveOnStartup";
const DELIVERY_ACTIVE: &str = "DeliveryActive";
const INSTANCE_LIMIT: &str = "InstanceLimit";
const POOL_MIN: &str = "PoolMin";
const MAX_AGE: &str = "MaxAge";
const MAX_AGE_OFFSET: &str = "MaxAgeOffset";

pub struct BeanDeployment<L: MessageListener> {
    id: DeploymentId,
    bean_class: String,
    message_listener_interface: String,
    activation_properties: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
    bean_managed: bool,
    default_transaction: TransactionType,
    method_transactions: HashMap<String, TransactionType>,
    application_exceptions: ApplicationExceptions,
    injections: Vec<Injection>,
    interceptors: Vec<InterceptorDefinition<L>>,
    method_interceptors: HashMap<String, Vec<String>>,
    factory: BeanFactory<L>,
}

impl<L: MessageListener> BeanDeployment<L> {
    pub fn builder<B, F>(
        id: impl Into<DeploymentId>,
        bean_class: impl Into<String>,
        factory: F,
    ) -> BeanDeploymentBuilder<L>
    where
        B: MessageDrivenBean<L>,
        F: Fn() -> Result<B, BeanException> + Send + Sync + 'static,
    {
        let factory: BeanFactory<L> =
            Arc::new(move || factory().map(|bean| Box::new(bean) as Box<dyn MessageDrivenBean<L>>));
        BeanDeploymentBuilder {
            deployment: BeanDeployment {
                id: id.into(),
                bean_class: bean_class.into(),
                message_listener_interface: L::INTERFACE.to_string(),
                activation_properties: BTreeMap::new(),
                properties: BTreeMap::new(),
                bean_managed: false,
                default_transaction: TransactionType::Required,
                method_transactions: HashMap::new(),
                application_exceptions: ApplicationExceptions::default(),
                injections: Vec::new(),
                interceptors: Vec::new(),
                method_interceptors: HashMap::new(),
                factory,
            },
        }
    }

    pub fn id(&self) -> &DeploymentId {
        &self.id
    }

    pub fn bean_class(&self) -> &str {
        &self.bean_class
    }

    pub fn message_listener_interface(&self) -> &str {
        &self.message_listener_interface
    }

    pub fn activation_properties(&self) -> &BTreeMap<String, String> {
        &self.activation_properties
    }

    /// Bean property lookup. Keys are matched case-insensitively.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_bean_managed(&self) -> bool {
        self.bean_managed
    }

    pub fn transaction_type(&self, method: &Method) -> TransactionType {
        if self.bean_managed {
            return TransactionType::BeanManaged;
        }
        self.method_transactions
            .get(method.name())
            .copied()
            .unwrap_or(self.default_transaction)
    }

    pub fn exception_type(&self, exception: &BeanException) -> ExceptionType {
        self.application_exceptions.classify(exception)
    }

    pub fn injections(&self) -> &[Injection] {
        &self.injections
    }

    pub fn interceptors(&self) -> &[InterceptorDefinition<L>] {
        &self.interceptors
    }

    /// Interceptor class names bound to `method`, outermost first. Methods without an
    /// explicit binding use every declared interceptor in declaration order.
    pub fn interceptors_for(&self, method: &Method) -> Vec<&str> {
        match self.method_interceptors.get(method.name()) {
            Some(names) => names.iter().map(String::as_str).collect(),
            None => self.interceptors.iter().map(|i| i.class_name()).collect(),
        }
    }

    pub(crate) fn create_bean(&self) -> Result<Box<dyn MessageDrivenBean<L>>, BeanException> {
        (self.factory)()
    }

    /// Whether the endpoint is activated at deploy time. `MdbActiveOnStartup` wins over
    /// `DeliveryActive`; both default to `true`.
    pub fn active_on_startup(&self) -> bool {
        self.activation_properties
            .get(ACTIVE_ON_STARTUP)
            .or_else(|| self.activation_properties.get(DELIVERY_ACTIVE))
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(true)
    }

    /// The `InstanceLimit` bean property, when present and numeric.
    pub fn instance_limit(&self) -> Option<i32> {
        self.property(INSTANCE_LIMIT)?.trim().parse().ok()
    }

    /// Instances created at deploy time and kept through idle eviction (`PoolMin`, default 0).
    pub fn pool_min(&self) -> usize {
        self.property(POOL_MIN)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// `MaxAge` in milliseconds. Absent or `0` means instances never age out.
    pub fn max_age(&self) -> Option<Duration> {
        self.property(MAX_AGE)?
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn max_age_offset(&self) -> f64 {
        self.property(MAX_AGE_OFFSET)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(-1.0)
    }

    /// Method interceptor bindings that name a class no `interceptor` declares, as
    /// `(method, class name)` pairs sorted by method.
    pub fn undeclared_interceptors(&self) -> Vec<(&str, &str)> {
        let mut undeclared: Vec<(&str, &str)> = self
            .method_interceptors
            .iter()
            .flat_map(|(method, names)| names.iter().map(move |name| (method.as_str(), name.as_str())))
            .filter(|(_, name)| !self.interceptors.iter().any(|i| i.class_name() == *name))
            .collect();
        undeclared.sort_unstable();
        undeclared
    }
}

impl<L: MessageListener> fmt::Debug for BeanDeployment<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDeployment")
            .field("id", &self.id)
            .field("bean_class", &self.bean_class)
            .field("message_listener_interface", &self.message_listener_interface)
            .field("activation_properties", &self.activation_properties)
            .field("bean_managed", &self.bean_managed)
            .field("interceptors", &self.interceptors.iter().map(|i| i.class_name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

pub struct BeanDeploymentBuilder<L: MessageListener> {
    deployment: BeanDeployment<L>,
}

impl<L: MessageListener> BeanDeploymentBuilder<L> {
    /// Overrides the listener interface the bean claims to implement.
    pub fn message_listener_interface(mut self, interface: impl Into<String>) -> Self {
        self.deployment.message_listener_interface = interface.into();
        self
    }

    pub fn activation_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.deployment.activation_properties.insert(name.into(), value.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.deployment.properties.insert(name.into(), value.into());
        self
    }

    pub fn bean_managed(mut self) -> Self {
        self.deployment.bean_managed = true;
        self
    }

    pub fn default_transaction(mut self, kind: TransactionType) -> Self {
        self.deployment.default_transaction = kind;
        self
    }

    pub fn method_transaction(mut self, method: impl Into<String>, kind: TransactionType) -> Self {
        self.deployment.method_transactions.insert(method.into(), kind);
        self
    }

    pub fn application_exception(mut self, type_name: impl Into<String>, rollback: bool) -> Self {
        self.deployment.application_exceptions.register(type_name, rollback);
        self
    }

    pub fn inject(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.deployment.injections.push(Injection {
            name: name.into(),
            target: target.into(),
        });
        self
    }

    pub fn interceptor<I, F>(mut self, class_name: impl Into<String>, factory: F) -> Self
    where
        I: Interceptor<L>,
        F: Fn() -> Result<I, BeanException> + Send + Sync + 'static,
    {
        let factory: InterceptorFactory<L> =
            Arc::new(move || factory().map(|i| Arc::new(i) as Arc<dyn Interceptor<L>>));
        self.deployment.interceptors.push(InterceptorDefinition {
            class_name: class_name.into(),
            factory,
        });
        self
    }

    /// Binds an explicit interceptor list (by class name) to one method.
    pub fn method_interceptors<I, S>(mut self, method: impl Into<String>, class_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deployment
            .method_interceptors
            .insert(method.into(), class_names.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> BeanDeployment<L> {
        self.deployment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{BeanRecorder, MockListener, RecordingInterceptor};

    fn builder() -> BeanDeploymentBuilder<MockListener> {
        BeanDeployment::builder("AuditBean", "org.example.AuditBean", BeanRecorder::default().factory())
    }

    #[test]
    fn test_defaults_follow_listener_and_container_managed_required() {
        let deployment = builder().build();
        let method = Method::new("onMessage");

        assert_eq!(deployment.message_listener_interface(), MockListener::INTERFACE);
        assert_eq!(deployment.transaction_type(&method), TransactionType::Required);
        assert!(deployment.active_on_startup());
        assert_eq!(deployment.instance_limit(), None);
        assert_eq!(deployment.pool_min(), 0);
    }

    #[test]
    fn test_method_attributes_override_default_unless_bean_managed() {
        let cmt = builder()
            .method_transaction("onMessage", TransactionType::NotSupported)
            .build();
        assert_eq!(cmt.transaction_type(&Method::new("onMessage")), TransactionType::NotSupported);
        assert_eq!(cmt.transaction_type(&Method::new("onOther")), TransactionType::Required);

        let bmt = builder()
            .bean_managed()
            .method_transaction("onMessage", TransactionType::Required)
            .build();
        assert_eq!(bmt.transaction_type(&Method::new("onMessage")), TransactionType::BeanManaged);
    }

    #[test]
    fn test_active_on_startup_prefers_mdb_property() {
        let deployment = builder()
            .activation_property("DeliveryActive", "true")
            .activation_property("MdbActiveOnStartup", "false")
            .build();
        assert!(!deployment.active_on_startup());

        let deployment = builder().activation_property("DeliveryActive", "FALSE").build();
        assert!(!deployment.active_on_startup());
    }

    #[test]
    fn test_properties_are_case_insensitive() {
        let deployment = builder().property("instancelimit", "3").build();
        assert_eq!(deployment.property("InstanceLimit"), Some("3"));
        assert_eq!(deployment.instance_limit(), Some(3));
    }

    #[test]
    fn test_interceptor_binding_defaults_to_declaration_order() {
        let log = Default::default();
        let deployment = builder()
            .interceptor("Outer", RecordingInterceptor::factory("Outer", &log))
            .interceptor("Inner", RecordingInterceptor::factory("Inner", &log))
            .method_interceptors("onAudit", ["Inner"])
            .build();

        assert_eq!(deployment.interceptors_for(&Method::new("onMessage")), vec!["Outer", "Inner"]);
        assert_eq!(deployment.interceptors_for(&Method::new("onAudit")), vec!["Inner"]);
        assert!(deployment.undeclared_interceptors().is_empty());
    }

    #[test]
    fn test_undeclared_interceptor_bindings_are_reported() {
        let log = Default::default();
        let deployment = builder()
            .method_interceptors("onAudit", ["Trail", "Missing"])
            .method_interceptors("onMessage", ["Ghost"])
            .interceptor("Trail", RecordingInterceptor::factory("Trail", &log))
            .build();

        assert_eq!(
            deployment.undeclared_interceptors(),
            vec![("onAudit", "Missing"), ("onMessage", "Ghost")]
        );
    }

    #[test]
    fn test_pool_sizing_properties() {
        let deployment = builder()
            .property("poolmin", "2")
            .property("MaxAge", "5000")
            .property("MaxAgeOffset", "1.5")
            .build();
        assert_eq!(deployment.pool_min(), 2);
        assert_eq!(deployment.max_age(), Some(Duration::from_millis(5000)));
        assert_eq!(deployment.max_age_offset(), 1.5);

        let defaults = builder().property("MaxAge", "0").build();
        assert_eq!(defaults.pool_min(), 0);
        assert_eq!(defaults.max_age(), None);
        assert_eq!(defaults.max_age_offset(), -1.0);
    }
}
