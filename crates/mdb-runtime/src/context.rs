//! Per-delivery context objects.
//!
//! [`CallContext`] is the container's record of one delivery: the method being
//! delivered, its [`TransactionPolicy`], and whether the instance must be discarded.
//! It is created by `before_delivery`, threaded explicitly through the business
//! invocation, and consumed by `after_delivery`.
//!
//! [`MessageDrivenContext`] is the bean's view of the same delivery.

use crate::deployment::DeploymentId;
use crate::exception::BeanException;
use crate::listener::Method;
use crate::transaction::{
    TransactionId, TransactionManager, TransactionPolicy, TransactionStatus, TransactionType,
    UserTransaction,
};
use std::sync::Arc;

#[derive(Debug)]
pub struct CallContext {
    deployment_id: DeploymentId,
    method: Method,
    policy: TransactionPolicy,
    manager: Arc<dyn TransactionManager>,
    discard_instance: bool,
}

impl CallContext {
    pub(crate) fn new(
        deployment_id: DeploymentId,
        method: Method,
        policy: TransactionPolicy,
        manager: Arc<dyn TransactionManager>,
    ) -> Self {
        Self {
            deployment_id,
            method,
            policy,
            manager,
            discard_instance: false,
        }
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        &self.deployment_id
    }

    /// The method passed to `before_delivery`.
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn policy(&self) -> &TransactionPolicy {
        &self.policy
    }

    pub(crate) fn policy_mut(&mut self) -> &mut TransactionPolicy {
        &mut self.policy
    }

    pub fn discard_instance(&self) -> bool {
        self.discard_instance
    }

    pub(crate) fn discard_flag(&mut self) -> &mut bool {
        &mut self.discard_instance
    }

    pub(crate) fn bean_context(&self) -> MessageDrivenContext {
        MessageDrivenContext {
            deployment_id: self.deployment_id.clone(),
            manager: self.manager.clone(),
            transaction_type: self.policy.kind(),
            transaction: self.policy.transaction(),
            user_transaction: self.policy.user_transaction().cloned(),
        }
    }
}

/// Container services available to a bean during a business method.
#[derive(Debug, Clone)]
pub struct MessageDrivenContext {
    deployment_id: DeploymentId,
    manager: Arc<dyn TransactionManager>,
    transaction_type: TransactionType,
    transaction: Option<TransactionId>,
    user_transaction: Option<UserTransaction>,
}

impl MessageDrivenContext {
    pub fn deployment_id(&self) -> &DeploymentId {
        &self.deployment_id
    }

    /// Marks the container-managed transaction for rollback.
    pub fn set_rollback_only(&self) -> Result<(), BeanException> {
        let tx = self.container_transaction("setRollbackOnly")?;
        self.manager.set_rollback_only(tx)?;
        Ok(())
    }

    pub fn get_rollback_only(&self) -> Result<bool, BeanException> {
        let tx = self.container_transaction("getRollbackOnly")?;
        Ok(self.manager.status(tx) == TransactionStatus::MarkedRollback)
    }

    /// The bean-managed transaction handle. Container-managed beans may not use it.
    pub fn user_transaction(&self) -> Result<&UserTransaction, BeanException> {
        self.user_transaction.as_ref().ok_or_else(|| {
            illegal_state("getUserTransaction is not allowed for beans with container-managed transactions")
        })
    }

    fn container_transaction(&self, operation: &str) -> Result<TransactionId, BeanException> {
        if self.transaction_type == TransactionType::BeanManaged {
            return Err(illegal_state(format!(
                "{operation} is not allowed for beans with bean-managed transactions"
            )));
        }
        self.transaction.ok_or_else(|| {
            illegal_state(format!("{operation} requires a transaction but the method runs without one"))
        })
    }
}

fn illegal_state(message: impl Into<String>) -> BeanException {
    BeanException::runtime("IllegalStateException", message)
}
