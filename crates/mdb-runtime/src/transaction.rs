//! # Transaction Policy Dispatch
//!
//! Every business method is bound at deploy time to a [`TransactionType`]. For each
//! delivery the container creates a [`TransactionPolicy`] that prepares the ambient
//! transaction in [`TransactionPolicy::before_invoke`] and completes it in
//! [`TransactionPolicy::after_invoke`].
//!
//! There is no thread-bound "current transaction". The caller's transaction (if any)
//! is passed in explicitly, and the policy carries the transaction it chose for the
//! rest of the delivery.
//!
//! ## Attribute semantics
//!
//! | Attribute | Caller has tx | Caller has none |
//! |-----------|---------------|-----------------|
//! | `Required` | joins it | begins one |
//! | `RequiresNew` | suspends it, begins one | begins one |
//! | `Mandatory` | joins it | `TransactionRequired` |
//! | `Supports` | joins it | runs without |
//! | `NotSupported` | suspends it | runs without |
//! | `Never` | `TransactionNotAllowed` | runs without |
//! | `BeanManaged` | suspends it | bean drives a [`UserTransaction`] |
//!
//! ## Exception handling
//!
//! Faults are classified once (see [`crate::exception`]) and then routed to exactly one
//! of [`TransactionPolicy::handle_system_exception`] or
//! [`TransactionPolicy::handle_application_exception`]. Only the first of these flags
//! the instance for discard.

use crate::error::{MdbError, TransactionError};
use crate::exception::BeanException;
use crate::lock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Identifier of a transaction known to a [`TransactionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    MarkedRollback,
    Committed,
    RolledBack,
    NoTransaction,
}

/// Demarcation attribute bound to a business method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Required,
    RequiresNew,
    Mandatory,
    Supports,
    NotSupported,
    Never,
    BeanManaged,
}

/// A resource the delivery brings along that must join the delivery's transaction.
pub trait XaResource: Send + Sync + fmt::Debug {
    fn resource_name(&self) -> &str;
}

/// The transaction manager the container delegates to.
///
/// Implementations are shared across all deliveries and must do their own locking.
pub trait TransactionManager: Send + Sync + fmt::Debug + 'static {
    fn begin(&self) -> Result<TransactionId, TransactionError>;

    /// Commits `tx`. A transaction marked rollback-only is rolled back instead and
    /// reported as [`TransactionError::RolledBack`].
    fn commit(&self, tx: TransactionId) -> Result<(), TransactionError>;

    fn rollback(&self, tx: TransactionId) -> Result<(), TransactionError>;

    fn set_rollback_only(&self, tx: TransactionId) -> Result<(), TransactionError>;

    fn status(&self, tx: TransactionId) -> TransactionStatus;

    fn suspend(&self, tx: TransactionId) -> Result<(), TransactionError>;

    fn resume(&self, tx: TransactionId) -> Result<(), TransactionError>;

    fn enlist(&self, tx: TransactionId, resource: &dyn XaResource) -> Result<(), TransactionError>;
}

/// Bean-facing handle for bean-managed demarcation.
#[derive(Debug, Clone)]
pub struct UserTransaction {
    manager: Arc<dyn TransactionManager>,
    current: Arc<Mutex<Option<TransactionId>>>,
}

impl UserTransaction {
    pub(crate) fn new(manager: Arc<dyn TransactionManager>) -> Self {
        Self {
            manager,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Begins a transaction. Nested transactions are not supported.
    pub fn begin(&self) -> Result<TransactionId, TransactionError> {
        let mut current = lock(&self.current);
        if let Some(tx) = *current {
            return Err(TransactionError::Manager(format!(
                "{tx} is already active; nested transactions are not supported"
            )));
        }
        let tx = self.manager.begin()?;
        *current = Some(tx);
        Ok(tx)
    }

    pub fn commit(&self) -> Result<(), TransactionError> {
        let tx = lock(&self.current).take().ok_or(TransactionError::NoTransaction)?;
        self.manager.commit(tx)
    }

    pub fn rollback(&self) -> Result<(), TransactionError> {
        let tx = lock(&self.current).take().ok_or(TransactionError::NoTransaction)?;
        self.manager.rollback(tx)
    }

    pub fn set_rollback_only(&self) -> Result<(), TransactionError> {
        let tx = self.current().ok_or(TransactionError::NoTransaction)?;
        self.manager.set_rollback_only(tx)
    }

    pub fn status(&self) -> TransactionStatus {
        match self.current() {
            Some(tx) => self.manager.status(tx),
            None => TransactionStatus::NoTransaction,
        }
    }

    pub(crate) fn current(&self) -> Option<TransactionId> {
        *lock(&self.current)
    }

    fn take(&self) -> Option<TransactionId> {
        lock(&self.current).take()
    }
}

/// Per-delivery transaction state.
#[derive(Debug)]
pub struct TransactionPolicy {
    kind: TransactionType,
    manager: Arc<dyn TransactionManager>,
    current: Option<TransactionId>,
    started: bool,
    suspended: Option<TransactionId>,
    user_transaction: Option<UserTransaction>,
    completed: bool,
}

impl TransactionPolicy {
    /// Prepares the ambient transaction for a delivery.
    ///
    /// `caller` is the transaction the delivery arrived in, if any. When beginning a
    /// new transaction fails, any transaction suspended for it is resumed first.
    pub fn before_invoke(
        kind: TransactionType,
        manager: Arc<dyn TransactionManager>,
        caller: Option<TransactionId>,
    ) -> Result<Self, MdbError> {
        let mut policy = Self {
            kind,
            manager,
            current: None,
            started: false,
            suspended: None,
            user_transaction: None,
            completed: false,
        };

        match (kind, caller) {
            (TransactionType::Required, Some(tx))
            | (TransactionType::Mandatory, Some(tx))
            | (TransactionType::Supports, Some(tx)) => policy.current = Some(tx),
            (TransactionType::Required, None) => policy.begin()?,
            (TransactionType::RequiresNew, caller) => {
                policy.suspend(caller)?;
                if let Err(e) = policy.begin() {
                    policy.resume_suspended();
                    return Err(e);
                }
            }
            (TransactionType::Mandatory, None) => {
                return Err(TransactionError::TransactionRequired.into())
            }
            (TransactionType::Never, Some(_)) => {
                return Err(TransactionError::TransactionNotAllowed.into())
            }
            (TransactionType::Supports, None) | (TransactionType::Never, None) => {}
            (TransactionType::NotSupported, caller) => policy.suspend(caller)?,
            (TransactionType::BeanManaged, caller) => {
                policy.suspend(caller)?;
                policy.user_transaction = Some(UserTransaction::new(policy.manager.clone()));
            }
        }

        debug!(
            kind = ?policy.kind,
            transaction = ?policy.current,
            suspended = ?policy.suspended,
            "transaction policy prepared"
        );
        Ok(policy)
    }

    fn begin(&mut self) -> Result<(), MdbError> {
        let tx = self.manager.begin()?;
        self.current = Some(tx);
        self.started = true;
        Ok(())
    }

    fn suspend(&mut self, caller: Option<TransactionId>) -> Result<(), MdbError> {
        if let Some(tx) = caller {
            self.manager.suspend(tx)?;
            self.suspended = Some(tx);
        }
        Ok(())
    }

    fn resume_suspended(&mut self) -> Option<TransactionError> {
        let tx = self.suspended.take()?;
        match self.manager.resume(tx) {
            Ok(()) => None,
            Err(e) => {
                warn!(transaction = %tx, error = %e, "failed to resume suspended transaction");
                Some(e)
            }
        }
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    /// True when this policy began the transaction it is running in.
    pub fn is_new_transaction(&self) -> bool {
        self.started
    }

    /// The transaction the business method runs in, including one the bean began
    /// through its [`UserTransaction`].
    pub fn transaction(&self) -> Option<TransactionId> {
        match &self.user_transaction {
            Some(ut) => ut.current(),
            None => self.current,
        }
    }

    pub fn user_transaction(&self) -> Option<&UserTransaction> {
        self.user_transaction.as_ref()
    }

    pub fn enlist_resource(&self, resource: &dyn XaResource) -> Result<(), MdbError> {
        let tx = self.current.ok_or(TransactionError::NoTransaction)?;
        self.manager.enlist(tx, resource)?;
        debug!(transaction = %tx, resource = resource.resource_name(), "resource enlisted");
        Ok(())
    }

    pub fn set_rollback_only(&self) {
        if let Some(tx) = self.transaction() {
            if let Err(e) = self.manager.set_rollback_only(tx) {
                warn!(transaction = %tx, error = %e, "failed to mark transaction rollback-only");
            }
        }
    }

    /// Completes the transaction. Calling it again is a no-op.
    ///
    /// A bean-managed transaction still open when the business method returns is
    /// rolled back and reported as a system fault. A suspended caller transaction is
    /// always resumed.
    pub fn after_invoke(&mut self) -> Result<(), MdbError> {
        if self.completed {
            return Ok(());
        }
        self.completed = true;

        let result = self.complete();
        match (self.resume_suspended(), result) {
            (Some(e), Ok(())) => Err(e.into()),
            (_, result) => result,
        }
    }

    fn complete(&mut self) -> Result<(), MdbError> {
        if let Some(ut) = &self.user_transaction {
            if let Some(tx) = ut.take() {
                if let Err(e) = self.manager.rollback(tx) {
                    warn!(transaction = %tx, error = %e, "rollback of abandoned bean-managed transaction failed");
                }
                return Err(MdbError::System {
                    message: format!(
                        "Bean-managed transaction {tx} was not completed before the business method returned"
                    ),
                    cause: None,
                });
            }
            return Ok(());
        }

        let Some(tx) = self.current.filter(|_| self.started) else {
            return Ok(());
        };
        if self.manager.status(tx) == TransactionStatus::MarkedRollback {
            debug!(transaction = %tx, "rolling back transaction marked rollback-only");
            self.manager.rollback(tx)?;
        } else {
            self.manager.commit(tx)?;
            debug!(transaction = %tx, "transaction committed");
        }
        Ok(())
    }

    /// Reacts to a system fault raised by the bean.
    ///
    /// Marks the transaction rollback-only and flags the instance for discard.
    pub fn handle_system_exception(&self, fault: BeanException, discard_instance: &mut bool) -> MdbError {
        self.set_rollback_only();
        *discard_instance = true;
        error!(
            error = %fault,
            root_cause = %fault.root_cause(),
            "system exception thrown by bean; instance will be discarded"
        );
        MdbError::system(fault.to_string(), fault)
    }

    /// Reacts to an application fault. The instance stays poolable.
    pub fn handle_application_exception(&self, fault: BeanException, rollback: bool) -> MdbError {
        if rollback {
            self.set_rollback_only();
        }
        debug!(error = %fault, rollback, "application exception thrown by bean");
        MdbError::Application(fault)
    }
}

impl Drop for TransactionPolicy {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        // Delivery abandoned before completion (cancelled future or early return).
        if let Some(tx) = self.transaction().filter(|_| self.started || self.user_transaction.is_some()) {
            if let Err(e) = self.manager.rollback(tx) {
                warn!(transaction = %tx, error = %e, "rollback of abandoned transaction failed");
            }
        }
        self.resume_suspended();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransactionManager, MockXaResource, TxEvent};

    fn manager() -> Arc<MockTransactionManager> {
        Arc::new(MockTransactionManager::new())
    }

    #[test]
    fn test_required_begins_and_commits() {
        let tm = manager();
        let mut policy = TransactionPolicy::before_invoke(TransactionType::Required, tm.clone(), None).unwrap();
        assert!(policy.is_new_transaction());
        let tx = policy.transaction().unwrap();

        policy.after_invoke().unwrap();
        policy.after_invoke().unwrap();

        assert_eq!(tm.events(), vec![TxEvent::Begin(tx), TxEvent::Commit(tx)]);
        assert_eq!(tm.active_count(), 0);
    }

    #[test]
    fn test_required_joins_caller_without_completing_it() {
        let tm = manager();
        let caller = tm.begin().unwrap();
        let mut policy =
            TransactionPolicy::before_invoke(TransactionType::Required, tm.clone(), Some(caller)).unwrap();
        assert!(!policy.is_new_transaction());
        assert_eq!(policy.transaction(), Some(caller));

        policy.after_invoke().unwrap();
        assert_eq!(tm.status(caller), TransactionStatus::Active);
    }

    #[test]
    fn test_requires_new_suspends_and_resumes_caller() {
        let tm = manager();
        let caller = tm.begin().unwrap();
        let mut policy =
            TransactionPolicy::before_invoke(TransactionType::RequiresNew, tm.clone(), Some(caller)).unwrap();
        let inner = policy.transaction().unwrap();
        assert_ne!(inner, caller);

        policy.after_invoke().unwrap();
        assert_eq!(
            tm.events(),
            vec![
                TxEvent::Begin(caller),
                TxEvent::Suspend(caller),
                TxEvent::Begin(inner),
                TxEvent::Commit(inner),
                TxEvent::Resume(caller),
            ]
        );
    }

    #[test]
    fn test_failed_begin_resumes_suspended_caller() {
        let tm = manager();
        let caller = tm.begin().unwrap();
        tm.fail_begin(true);

        let result = TransactionPolicy::before_invoke(TransactionType::RequiresNew, tm.clone(), Some(caller));
        assert!(matches!(result, Err(MdbError::Transaction(_))));
        assert_eq!(tm.events().last(), Some(&TxEvent::Resume(caller)));
    }

    #[test]
    fn test_mandatory_and_never_check_caller() {
        let tm = manager();
        let err = TransactionPolicy::before_invoke(TransactionType::Mandatory, tm.clone(), None).unwrap_err();
        assert!(matches!(err, MdbError::Transaction(TransactionError::TransactionRequired)));

        let caller = tm.begin().unwrap();
        let err = TransactionPolicy::before_invoke(TransactionType::Never, tm.clone(), Some(caller)).unwrap_err();
        assert!(matches!(err, MdbError::Transaction(TransactionError::TransactionNotAllowed)));
    }

    #[test]
    fn test_not_supported_runs_without_transaction() {
        let tm = manager();
        let mut policy = TransactionPolicy::before_invoke(TransactionType::NotSupported, tm.clone(), None).unwrap();
        assert_eq!(policy.transaction(), None);
        policy.after_invoke().unwrap();
        assert!(tm.events().is_empty());
    }

    #[test]
    fn test_rollback_only_transaction_is_rolled_back() {
        let tm = manager();
        let mut policy = TransactionPolicy::before_invoke(TransactionType::Required, tm.clone(), None).unwrap();
        let tx = policy.transaction().unwrap();
        let mut discard = false;

        let err = policy.handle_system_exception(BeanException::runtime("NullPointerException", "npe"), &mut discard);
        assert!(err.is_system());
        assert!(discard);

        policy.after_invoke().unwrap();
        assert!(tm.events().contains(&TxEvent::Rollback(tx)));
        assert!(!tm.events().contains(&TxEvent::Commit(tx)));
    }

    #[test]
    fn test_application_exception_rolls_back_only_on_request() {
        let tm = manager();
        let policy = TransactionPolicy::before_invoke(TransactionType::Required, tm.clone(), None).unwrap();
        let tx = policy.transaction().unwrap();

        let err = policy.handle_application_exception(BeanException::checked("OrderException", "x"), false);
        assert!(matches!(err, MdbError::Application(_)));
        assert_eq!(tm.status(tx), TransactionStatus::Active);

        policy.handle_application_exception(BeanException::checked("OrderException", "x"), true);
        assert_eq!(tm.status(tx), TransactionStatus::MarkedRollback);
    }

    #[test]
    fn test_abandoned_bean_managed_transaction_is_rolled_back_and_reported() {
        let tm = manager();
        let mut policy = TransactionPolicy::before_invoke(TransactionType::BeanManaged, tm.clone(), None).unwrap();
        let tx = policy.user_transaction().unwrap().begin().unwrap();

        let err = policy.after_invoke().unwrap_err();
        assert!(err.is_system());
        assert_eq!(tm.events(), vec![TxEvent::Begin(tx), TxEvent::Rollback(tx)]);
    }

    #[test]
    fn test_enlist_targets_current_transaction() {
        let tm = manager();
        let mut policy = TransactionPolicy::before_invoke(TransactionType::Required, tm.clone(), None).unwrap();
        let tx = policy.transaction().unwrap();
        policy.enlist_resource(&MockXaResource::new("queue-xa")).unwrap();
        policy.after_invoke().unwrap();

        assert!(tm.events().contains(&TxEvent::Enlist(tx, "queue-xa".to_string())));
    }

    #[test]
    fn test_dropping_unfinished_policy_rolls_back() {
        let tm = manager();
        let policy = TransactionPolicy::before_invoke(TransactionType::Required, tm.clone(), None).unwrap();
        let tx = policy.transaction().unwrap();
        drop(policy);

        assert_eq!(tm.events(), vec![TxEvent::Begin(tx), TxEvent::Rollback(tx)]);
        assert_eq!(tm.active_count(), 0);
    }
}
