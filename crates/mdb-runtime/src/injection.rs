//! Name-based resource resolution for bean injection.

use crate::error::LookupError;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A resolved resource handed to a bean's injection target.
pub type Resource = Arc<dyn Any + Send + Sync>;

/// Resolves injection names (JNDI-style `java:comp/env/...` names or plain keys).
pub trait InjectionSource: Send + Sync + fmt::Debug {
    fn lookup(&self, name: &str) -> Result<Resource, LookupError>;
}

/// A fixed set of named resources.
#[derive(Default, Clone)]
pub struct Bindings {
    entries: HashMap<String, Resource>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.entries.insert(name.into(), Arc::new(value));
        self
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl InjectionSource for Bindings {
    fn lookup(&self, name: &str) -> Result<Resource, LookupError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| LookupError::NameNotFound(name.to_string()))
    }
}
