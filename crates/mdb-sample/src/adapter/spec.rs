use mdb_runtime::{ActivationSpec, ResourceError};
use std::any::Any;

pub const QUEUE_DESTINATION_TYPE: &str = "jakarta.jms.Queue";

/// Activation configuration for [`QueueResourceAdapter`](super::QueueResourceAdapter).
///
/// | Property | Default | Meaning |
/// |----------|---------|---------|
/// | `destination` | required | queue to consume |
/// | `destinationType` | `jakarta.jms.Queue` | only queues are supported |
/// | `maxSessions` | 1 | concurrent delivery sessions |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueActivationSpec {
    destination: Option<String>,
    max_sessions: usize,
    bean_class: Option<String>,
    resource_adapter: Option<String>,
}

impl Default for QueueActivationSpec {
    fn default() -> Self {
        Self {
            destination: None,
            max_sessions: 1,
            bean_class: None,
            resource_adapter: None,
        }
    }
}

impl QueueActivationSpec {
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn bean_class(&self) -> Option<&str> {
        self.bean_class.as_deref()
    }

    pub fn resource_adapter(&self) -> Option<&str> {
        self.resource_adapter.as_deref()
    }
}

impl ActivationSpec for QueueActivationSpec {
    fn set_property(&mut self, name: &str, value: &str) -> Result<bool, ResourceError> {
        let invalid = |reason: &str| ResourceError::InvalidProperty {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        match name {
            "destination" => self.destination = Some(value.to_string()),
            "destinationType" => {
                if value != QUEUE_DESTINATION_TYPE {
                    return Err(invalid("only jakarta.jms.Queue destinations are supported"));
                }
            }
            "maxSessions" => {
                self.max_sessions = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("must be a non-negative integer"))?;
            }
            "beanClass" => self.bean_class = Some(value.to_string()),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn validate(&self) -> Result<(), ResourceError> {
        if self.destination.as_deref().map_or(true, str::is_empty) {
            return Err(ResourceError::Validation("destination is required".to_string()));
        }
        if self.max_sessions == 0 {
            return Err(ResourceError::Validation("maxSessions must be at least 1".to_string()));
        }
        Ok(())
    }

    fn set_resource_adapter(&mut self, name: &str) {
        self.resource_adapter = Some(name.to_string());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
