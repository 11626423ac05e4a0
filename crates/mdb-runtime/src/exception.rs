//! # Bean Exceptions and Classification
//!
//! Bean code reports failures as [`BeanException`] values. The container classifies
//! each one exactly once, at the point where the deployment's application-exception
//! registry is known, into an [`ExceptionType`]:
//!
//! - **Application**: a checked exception, or any exception the deployment registered
//!   as an application exception. The instance stays poolable.
//! - **System**: everything else (runtime faults, errors, dispatch failures). The
//!   instance is discarded and the transaction is rolled back.
//!
//! Getting this wrong is expensive in both directions: a needless "system" verdict
//! destroys a healthy instance, a wrong "application" verdict lets a corrupted one
//! back into the pool.

use crate::error::TransactionError;
use crate::listener::Method;
use std::collections::HashMap;

/// The broad family an exception belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// Part of a method's declared contract.
    Checked,
    /// Unchecked runtime fault.
    Runtime,
    /// Serious error the bean cannot recover from.
    Error,
    /// Dispatch-level failure: argument mismatch, inaccessible target.
    Dispatch,
}

impl ExceptionKind {
    pub fn is_unchecked(self) -> bool {
        !matches!(self, ExceptionKind::Checked)
    }
}

/// A fault raised by bean or interceptor code.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{type_name}: {message}")]
pub struct BeanException {
    kind: ExceptionKind,
    type_name: String,
    message: String,
    #[source]
    cause: Option<Box<BeanException>>,
}

impl BeanException {
    pub fn new(kind: ExceptionKind, type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn checked(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Checked, type_name, message)
    }

    pub fn runtime(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Runtime, type_name, message)
    }

    pub fn error(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Error, type_name, message)
    }

    pub fn dispatch(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Dispatch, type_name, message)
    }

    pub fn with_cause(mut self, cause: BeanException) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&BeanException> {
        self.cause.as_deref()
    }

    /// The innermost exception of the cause chain.
    pub fn root_cause(&self) -> &BeanException {
        let mut current = self;
        while let Some(next) = current.cause.as_deref() {
            current = next;
        }
        current
    }
}

impl From<TransactionError> for BeanException {
    fn from(error: TransactionError) -> Self {
        BeanException::runtime("TransactionException", error.to_string())
    }
}

/// How the container reacts to a bean exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionType {
    System,
    Application { rollback: bool },
}

/// Exception type names a deployment treats as application exceptions,
/// mapped to whether they request a rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationExceptions {
    registered: HashMap<String, bool>,
}

impl ApplicationExceptions {
    pub fn register(&mut self, type_name: impl Into<String>, rollback: bool) {
        self.registered.insert(type_name.into(), rollback);
    }

    pub fn get(&self, type_name: &str) -> Option<bool> {
        self.registered.get(type_name).copied()
    }

    /// Classifies `exception`. Registered types win; otherwise checked exceptions are
    /// application exceptions without rollback and everything else is a system fault.
    pub fn classify(&self, exception: &BeanException) -> ExceptionType {
        if let Some(rollback) = self.get(exception.type_name()) {
            return ExceptionType::Application { rollback };
        }
        match exception.kind() {
            ExceptionKind::Checked => ExceptionType::Application { rollback: false },
            ExceptionKind::Runtime | ExceptionKind::Error | ExceptionKind::Dispatch => {
                ExceptionType::System
            }
        }
    }
}

/// Whether `exception` may cross the endpoint boundary unchanged.
///
/// Unchecked faults always may; checked ones only when `method` declares them.
pub fn is_valid_exception(method: &Method, exception: &BeanException) -> bool {
    exception.kind().is_unchecked() || method.declares(exception.type_name())
}
