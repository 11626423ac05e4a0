//! In-process [`TransactionManager`] for single-node deployments and tests.
//!
//! Transactions are bookkeeping only: there is no two-phase commit and enlisted
//! resources are merely recorded.

use crate::error::TransactionError;
use crate::lock;
use crate::transaction::{TransactionId, TransactionManager, TransactionStatus, XaResource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
struct LocalTransaction {
    status: TransactionStatus,
    suspended: bool,
    resources: Vec<String>,
}

#[derive(Debug, Default)]
pub struct LocalTransactionManager {
    next_id: AtomicU64,
    transactions: Mutex<HashMap<TransactionId, LocalTransaction>>,
}

impl LocalTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions begun and not yet completed.
    pub fn active_count(&self) -> usize {
        lock(&self.transactions).len()
    }

    pub fn enlisted_resources(&self, tx: TransactionId) -> Vec<String> {
        lock(&self.transactions)
            .get(&tx)
            .map(|t| t.resources.clone())
            .unwrap_or_default()
    }
}

impl TransactionManager for LocalTransactionManager {
    fn begin(&self) -> Result<TransactionId, TransactionError> {
        let tx = TransactionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        lock(&self.transactions).insert(
            tx,
            LocalTransaction {
                status: TransactionStatus::Active,
                suspended: false,
                resources: Vec::new(),
            },
        );
        debug!(transaction = %tx, "begin");
        Ok(tx)
    }

    fn commit(&self, tx: TransactionId) -> Result<(), TransactionError> {
        let mut transactions = lock(&self.transactions);
        match transactions.get(&tx).map(|t| t.status) {
            Some(TransactionStatus::Active) => {
                transactions.remove(&tx);
                Ok(())
            }
            Some(TransactionStatus::MarkedRollback) => {
                transactions.remove(&tx);
                Err(TransactionError::RolledBack(tx.value()))
            }
            _ => Err(TransactionError::NotActive(tx.value())),
        }
    }

    fn rollback(&self, tx: TransactionId) -> Result<(), TransactionError> {
        lock(&self.transactions)
            .remove(&tx)
            .map(|_| ())
            .ok_or(TransactionError::NotActive(tx.value()))
    }

    fn set_rollback_only(&self, tx: TransactionId) -> Result<(), TransactionError> {
        let mut transactions = lock(&self.transactions);
        let t = transactions
            .get_mut(&tx)
            .ok_or(TransactionError::NotActive(tx.value()))?;
        t.status = TransactionStatus::MarkedRollback;
        Ok(())
    }

    fn status(&self, tx: TransactionId) -> TransactionStatus {
        lock(&self.transactions)
            .get(&tx)
            .map(|t| t.status)
            .unwrap_or(TransactionStatus::NoTransaction)
    }

    fn suspend(&self, tx: TransactionId) -> Result<(), TransactionError> {
        let mut transactions = lock(&self.transactions);
        match transactions.get_mut(&tx) {
            Some(t) if !t.suspended => {
                t.suspended = true;
                Ok(())
            }
            Some(_) => Err(TransactionError::Manager(format!("{tx} is already suspended"))),
            None => Err(TransactionError::NotActive(tx.value())),
        }
    }

    fn resume(&self, tx: TransactionId) -> Result<(), TransactionError> {
        let mut transactions = lock(&self.transactions);
        match transactions.get_mut(&tx) {
            Some(t) if t.suspended => {
                t.suspended = false;
                Ok(())
            }
            Some(_) => Err(TransactionError::Manager(format!("{tx} is not suspended"))),
            None => Err(TransactionError::NotActive(tx.value())),
        }
    }

    fn enlist(&self, tx: TransactionId, resource: &dyn XaResource) -> Result<(), TransactionError> {
        let mut transactions = lock(&self.transactions);
        let t = transactions
            .get_mut(&tx)
            .ok_or(TransactionError::NotActive(tx.value()))?;
        if t.status == TransactionStatus::MarkedRollback {
            return Err(TransactionError::Enlist {
                resource: resource.resource_name().to_string(),
                reason: format!("{tx} is marked rollback-only"),
            });
        }
        t.resources.push(resource.resource_name().to_string());
        Ok(())
    }
}
