//! # Runtime Errors
//!
//! This module defines the error taxonomy shared by every layer of the delivery runtime.
//! By centralizing error definitions, the endpoint handler, the container, and the
//! resource adapter all speak the same language when a delivery fails.
//!
//! | Fault | Variant | Effect |
//! |-------|---------|--------|
//! | Sequencing | [`MdbError::IllegalState`] | Delivery attempt rejected, state untouched |
//! | System | [`MdbError::System`] | Instance discarded, transaction rolled back |
//! | Application | [`MdbError::Application`] | Instance reused, optional rollback |
//! | Construction | [`MdbError::Unavailable`] | Adapter should back off and retry |
//! | Activation | [`MdbError::Deployment`] | Deployment rolled back atomically |

use crate::deployment::DeploymentId;
use crate::exception::BeanException;
use std::error::Error;
use std::time::Duration;

/// Boxed error used as the preserved cause of wrapped faults.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Errors that can occur while deploying beans or delivering messages.
#[derive(Debug, thiserror::Error)]
pub enum MdbError {
    /// A callback arrived out of sequence (e.g. `after_delivery` twice).
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A system-level fault. The instance involved must not be pooled again.
    #[error("System exception: {message}")]
    System {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    /// A fault that belongs to the bean's business contract.
    #[error("Application exception: {0}")]
    Application(#[source] BeanException),

    /// A bean fault surfaced unchanged to the resource adapter.
    #[error(transparent)]
    Bean(BeanException),

    /// A fault the business method did not declare, wrapped at the endpoint boundary.
    #[error("EJB exception: {message}")]
    EjbException {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    /// No bean instance could be produced.
    #[error("Unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    /// The container failed while preparing or completing a delivery.
    #[error("Application server internal error: {message}")]
    ApplicationServerInternal {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("Deployment failed: {message}")]
    Deployment {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("Unable to create a message endpoint within {0:?}")]
    EndpointTimeout(Duration),

    #[error("Unknown deployment: {0}")]
    UnknownDeployment(DeploymentId),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl MdbError {
    pub fn illegal_state(message: impl Into<String>) -> Self {
        MdbError::IllegalState(message.into())
    }

    pub fn system(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        MdbError::System {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn unavailable(message: impl Into<String>, cause: Option<BoxError>) -> Self {
        MdbError::Unavailable {
            message: message.into(),
            cause,
        }
    }

    pub fn deployment(message: impl Into<String>, cause: Option<BoxError>) -> Self {
        MdbError::Deployment {
            message: message.into(),
            cause,
        }
    }

    /// Wraps a container failure for the resource adapter, keeping the original as cause.
    pub fn internal(cause: MdbError) -> Self {
        MdbError::ApplicationServerInternal {
            message: cause.to_string(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Wraps a fault in the generic bean exception type.
    pub fn ejb_exception(cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        MdbError::EjbException {
            message: cause.to_string(),
            cause: Some(cause),
        }
    }

    /// True for faults after which the bean instance is no longer trustworthy.
    pub fn is_system(&self) -> bool {
        matches!(self, MdbError::System { .. })
    }

    /// The exception the bean itself raised, looking through container wrappers.
    ///
    /// This is the first bean-level exception, not the deepest cause: a declared
    /// checked exception that wraps a runtime fault is still the declared exception.
    pub fn bean_exception(&self) -> Option<&BeanException> {
        match self {
            MdbError::Bean(e) | MdbError::Application(e) => Some(e),
            MdbError::System { cause, .. }
            | MdbError::ApplicationServerInternal { cause, .. }
            | MdbError::EjbException { cause, .. }
            | MdbError::Unavailable { cause, .. } => cause.as_deref().and_then(bean_exception_in),
            _ => None,
        }
    }

    /// The deepest error in the `source()` chain, used for logging.
    pub fn root_cause(&self) -> &(dyn Error + 'static) {
        let mut current: &(dyn Error + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }
}

fn bean_exception_in<'a>(cause: &'a (dyn Error + Send + Sync + 'static)) -> Option<&'a BeanException> {
    if let Some(bean) = cause.downcast_ref::<BeanException>() {
        return Some(bean);
    }
    cause
        .downcast_ref::<MdbError>()
        .and_then(MdbError::bean_exception)
}

/// Errors reported by the transaction manager boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransactionError {
    #[error("Transaction {0} is not active")]
    NotActive(u64),
    #[error("Transaction {0} was rolled back")]
    RolledBack(u64),
    #[error("No transaction is associated with the caller")]
    NoTransaction,
    #[error("A transaction is required but none is active")]
    TransactionRequired,
    #[error("A transaction is active but none is allowed")]
    TransactionNotAllowed,
    #[error("Unable to enlist resource {resource}: {reason}")]
    Enlist { resource: String, reason: String },
    #[error("Transaction manager error: {0}")]
    Manager(String),
}

/// Errors reported by the resource adapter and activation spec boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResourceError {
    #[error("Endpoint activation failed: {0}")]
    Activation(String),
    #[error("Invalid activation property {name}: {reason}")]
    InvalidProperty { name: String, reason: String },
    #[error("Activation spec validation failed: {0}")]
    Validation(String),
    #[error("Resource adapter error: {0}")]
    Adapter(String),
}

/// Errors raised while resolving an injection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("Name not found: {0}")]
    NameNotFound(String),
    #[error("Lookup of {name} failed: {reason}")]
    Failed { name: String, reason: String },
}
