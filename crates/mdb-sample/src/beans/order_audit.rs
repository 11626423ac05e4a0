use crate::listener::TextMessageListener;
use crate::model::{MessageId, TextMessage};
use async_trait::async_trait;
use mdb_runtime::{BeanException, MessageDrivenBean, MessageDrivenContext, Method, Resource};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Injection name the bean expects its audit log under.
pub const AUDIT_LOG_NAME: &str = "java:comp/env/auditLog";
/// Bean class name used in deployments.
pub const ORDER_AUDIT_BEAN: &str = "org.example.OrderAuditBean";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub message_id: MessageId,
    pub order_id: String,
    pub amount_cents: u64,
    /// Serial of the bean instance that handled the message.
    pub handled_by: usize,
}

/// Shared sink the audit bean writes to. Cloning shares the same log.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
    appended: Arc<Notify>,
}

impl AuditLog {
    pub fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        self.appended.notify_waiters();
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until at least `count` entries exist. Returns `false` on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let waiting = async {
            loop {
                let appended = self.appended.notified();
                if self.len() >= count {
                    return;
                }
                appended.await;
            }
        };
        tokio::time::timeout(timeout, waiting).await.is_ok()
    }
}

/// Parses order messages of the form `order:<id>:<amount in cents>` and records them.
///
/// | Body | Outcome |
/// |------|---------|
/// | `order:A-1:1250` | entry recorded |
/// | malformed | `InvalidOrderException` (application fault, instance kept) |
/// | `poison` | `IllegalStateException` (system fault, instance discarded) |
#[derive(Debug)]
pub struct OrderAuditBean {
    serial: usize,
    log: Option<AuditLog>,
}

impl OrderAuditBean {
    pub fn new(serial: usize) -> Self {
        Self { serial, log: None }
    }

    /// A bean factory numbering instances from 1.
    pub fn factory() -> impl Fn() -> Result<OrderAuditBean, BeanException> + Send + Sync + 'static {
        let serial = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        move || Ok(OrderAuditBean::new(serial.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1))
    }

    fn parse(body: &str) -> Result<(String, u64), BeanException> {
        let invalid = || BeanException::checked("InvalidOrderException", format!("malformed order message: {body:?}"));
        let mut parts = body.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("order"), Some(id), Some(amount)) if !id.is_empty() => {
                let amount = amount.trim().parse().map_err(|_| invalid())?;
                Ok((id.to_string(), amount))
            }
            _ => Err(invalid()),
        }
    }
}

#[async_trait]
impl MessageDrivenBean<TextMessageListener> for OrderAuditBean {
    fn inject(&mut self, target: &str, value: Resource) -> Result<(), BeanException> {
        match target {
            "log" => {
                let log = value.downcast_ref::<AuditLog>().ok_or_else(|| {
                    BeanException::runtime("ClassCastException", "auditLog is not an AuditLog")
                })?;
                self.log = Some(log.clone());
                Ok(())
            }
            other => Err(BeanException::runtime(
                "IllegalArgumentException",
                format!("unknown injection target {other}"),
            )),
        }
    }

    async fn post_construct(&mut self) -> Result<(), BeanException> {
        debug!(serial = self.serial, "order audit bean constructed");
        Ok(())
    }

    async fn on_message(
        &mut self,
        _method: &Method,
        message: TextMessage,
        _ctx: &MessageDrivenContext,
    ) -> Result<(), BeanException> {
        if message.body == "poison" {
            return Err(BeanException::runtime(
                "IllegalStateException",
                format!("poison message {}", message.id),
            ));
        }
        let log = self
            .log
            .as_ref()
            .ok_or_else(|| BeanException::runtime("IllegalStateException", "audit log was not injected"))?;
        let (order_id, amount_cents) = Self::parse(&message.body)?;

        info!(message_id = %message.id, order_id = %order_id, amount_cents, serial = self.serial, "order audited");
        log.record(AuditEntry {
            message_id: message.id,
            order_id,
            amount_cents,
            handled_by: self.serial,
        });
        Ok(())
    }

    async fn pre_destroy(&mut self) -> Result<(), BeanException> {
        debug!(serial = self.serial, "order audit bean destroyed");
        Ok(())
    }
}
