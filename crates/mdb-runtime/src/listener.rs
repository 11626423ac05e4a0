//! # Message Listener Contracts
//!
//! A message listener interface is the contract between a resource adapter and a bean.
//! Instead of intercepting arbitrary interface methods at runtime, every supported
//! interface is described by a [`MessageListener`] implementation that names the
//! interface and fixes the message and reply types carried across the endpoint.
//!
//! A thin hand-written adapter per interface then maps its named methods onto
//! [`EndpointHandler`](crate::EndpointHandler) calls, passing a [`Method`] descriptor
//! so the container can resolve transaction attributes and validate declared faults.
//!
//! ```rust,ignore
//! struct TextMessageListener;
//!
//! impl MessageListener for TextMessageListener {
//!     const INTERFACE: &'static str = "jakarta.jms.MessageListener";
//!     type Message = TextMessage;
//!     type Reply = ();
//! }
//! ```

use std::fmt;

/// Describes one message listener interface supported by a container.
pub trait MessageListener: Send + Sync + 'static {
    /// Fully qualified interface name. Deployments must name exactly this interface.
    const INTERFACE: &'static str;

    /// Payload delivered to the bean.
    type Message: Send + fmt::Debug + 'static;

    /// Value returned to the adapter (request/reply listeners); `()` otherwise.
    type Reply: Send + fmt::Debug + 'static;
}

/// A business method of a message listener interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    name: String,
    parameter_types: Vec<String>,
    exception_types: Vec<String>,
}

impl Method {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_types: Vec::new(),
            exception_types: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, type_name: impl Into<String>) -> Self {
        self.parameter_types.push(type_name.into());
        self
    }

    /// Adds a checked exception type to the method's declared throws list.
    pub fn throws(mut self, type_name: impl Into<String>) -> Self {
        self.exception_types.push(type_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    pub fn exception_types(&self) -> &[String] {
        &self.exception_types
    }

    pub fn declares(&self, exception_type: &str) -> bool {
        self.exception_types.iter().any(|t| t == exception_type)
    }

    /// Same name and parameter types. Declared exceptions do not take part.
    pub fn same_signature(&self, other: &Method) -> bool {
        self.name == other.name && self.parameter_types == other.parameter_types
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.parameter_types.join(", "))
    }
}
