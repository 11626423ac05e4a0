//! # In-Memory Queue Resource Adapter
//!
//! [`QueueResourceAdapter`] plays the messaging provider: it owns named in-memory
//! queues and, for every activated endpoint, spawns `maxSessions` delivery sessions
//! that consume the endpoint's destination.
//!
//! ## Session loop
//!
//! Each session is a tokio task:
//!
//! 1. Wait for the next message on the destination, or for deactivation
//! 2. Create an endpoint with [`EndpointFactory::create_endpoint_with_timeout`]
//! 3. Deliver: transacted deliveries use the explicit before/after bracket and enlist a
//!    [`QueueXaResource`]; others use the single-call path
//! 4. Release the endpoint
//! 5. On failure, requeue the message until `max_redeliveries` is exceeded, then move it
//!    to the dead-letter list
//!
//! Deactivation signals every session through a `watch` channel and waits for them.
//! A delivery already in progress completes first.

pub mod spec;

pub use spec::*;

use crate::listener::{on_message_method, TextMessageEndpoint, TextMessageListener};
use crate::model::TextMessage;
use async_trait::async_trait;
use mdb_runtime::{ActivationSpec, DeploymentId, EndpointFactory, MdbError, ResourceAdapter, ResourceError, XaResource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const ADAPTER_NAME: &str = "QueueResourceAdapter";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The XA resource a queue session enlists in transacted deliveries.
#[derive(Debug, Clone)]
pub struct QueueXaResource {
    name: String,
}

impl QueueXaResource {
    pub fn for_queue(queue: &str) -> Self {
        Self {
            name: format!("queue:{queue}"),
        }
    }
}

impl XaResource for QueueXaResource {
    fn resource_name(&self) -> &str {
        &self.name
    }
}

struct Queue {
    sender: mpsc::UnboundedSender<TextMessage>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<TextMessage>>,
}

impl Queue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    async fn next(&self) -> Option<TextMessage> {
        self.receiver.lock().await.recv().await
    }
}

#[derive(Debug)]
struct Shared {
    delivered: AtomicUsize,
    dead_letters: Mutex<Vec<TextMessage>>,
    max_redeliveries: u32,
    endpoint_timeout: Duration,
}

struct Activation {
    shutdown: watch::Sender<bool>,
    sessions: Vec<JoinHandle<()>>,
}

pub struct QueueResourceAdapter {
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    activations: tokio::sync::Mutex<HashMap<DeploymentId, Activation>>,
    shared: Arc<Shared>,
}

impl QueueResourceAdapter {
    /// `max_redeliveries` failed attempts are retried before a message is dead-lettered.
    pub fn new(max_redeliveries: u32, endpoint_timeout: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            activations: tokio::sync::Mutex::new(HashMap::new()),
            shared: Arc::new(Shared {
                delivered: AtomicUsize::new(0),
                dead_letters: Mutex::new(Vec::new()),
                max_redeliveries,
                endpoint_timeout,
            }),
        }
    }

    fn queue(&self, name: &str) -> Arc<Queue> {
        lock(&self.queues)
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Queue::new()))
            .clone()
    }

    /// Enqueues `message` on its destination.
    pub fn send(&self, message: TextMessage) {
        debug!(message_id = %message.id, destination = %message.destination, "message enqueued");
        let queue = self.queue(&message.destination);
        if let Err(e) = queue.sender.send(message) {
            warn!(message_id = %e.0.id, "queue closed, message dropped");
        }
    }

    /// Messages delivered successfully so far.
    pub fn delivered(&self) -> usize {
        self.shared.delivered.load(Ordering::SeqCst)
    }

    pub fn dead_letters(&self) -> Vec<TextMessage> {
        lock(&self.shared.dead_letters).clone()
    }

    pub async fn is_active(&self, id: &DeploymentId) -> bool {
        self.activations.lock().await.contains_key(id)
    }
}

#[async_trait]
impl ResourceAdapter<TextMessageListener> for QueueResourceAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    async fn endpoint_activation(
        &self,
        factory: Arc<EndpointFactory<TextMessageListener>>,
        spec: Arc<dyn ActivationSpec>,
    ) -> Result<(), ResourceError> {
        let spec = spec
            .as_any()
            .downcast_ref::<QueueActivationSpec>()
            .ok_or_else(|| ResourceError::Adapter("expected a QueueActivationSpec".to_string()))?;
        let destination = spec
            .destination()
            .ok_or_else(|| ResourceError::Validation("destination is required".to_string()))?
            .to_string();

        let mut activations = self.activations.lock().await;
        let id = factory.deployment_id().clone();
        if activations.contains_key(&id) {
            return Err(ResourceError::Activation(format!("{id} is already active")));
        }

        let queue = self.queue(&destination);
        let (shutdown, stopped) = watch::channel(false);
        let sessions = (0..spec.max_sessions())
            .map(|number| {
                let session = Session {
                    number,
                    destination: destination.clone(),
                    factory: factory.clone(),
                    queue: queue.clone(),
                    shared: self.shared.clone(),
                };
                tokio::spawn(session.run(stopped.clone()))
            })
            .collect();

        info!(deployment_id = %id, destination = %destination, sessions = spec.max_sessions(), "endpoint activated");
        activations.insert(id, Activation { shutdown, sessions });
        Ok(())
    }

    async fn endpoint_deactivation(
        &self,
        factory: Arc<EndpointFactory<TextMessageListener>>,
        _spec: Arc<dyn ActivationSpec>,
    ) {
        let id = factory.deployment_id();
        let Some(activation) = self.activations.lock().await.remove(id) else {
            warn!(deployment_id = %id, "deactivation of an endpoint that is not active");
            return;
        };
        let _ = activation.shutdown.send(true);
        for session in activation.sessions {
            if let Err(e) = session.await {
                warn!(deployment_id = %id, error = %e, "delivery session ended abnormally");
            }
        }
        info!(deployment_id = %id, "endpoint deactivated");
    }
}

struct Session {
    number: usize,
    destination: String,
    factory: Arc<EndpointFactory<TextMessageListener>>,
    queue: Arc<Queue>,
    shared: Arc<Shared>,
}

impl Session {
    async fn run(self, mut stopped: watch::Receiver<bool>) {
        debug!(deployment_id = %self.factory.deployment_id(), session = self.number, "delivery session started");
        loop {
            let message = tokio::select! {
                biased;
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                    continue;
                }
                message = self.queue.next() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.deliver(message).await;
        }
        debug!(deployment_id = %self.factory.deployment_id(), session = self.number, "delivery session stopped");
    }

    async fn deliver(&self, message: TextMessage) {
        let method = on_message_method();
        let transacted = self.factory.is_delivery_transacted(&method);
        let xa_resource = transacted
            .then(|| Arc::new(QueueXaResource::for_queue(&self.destination)) as Arc<dyn XaResource>);

        let result = match self
            .factory
            .create_endpoint_with_timeout(xa_resource, self.shared.endpoint_timeout)
            .await
        {
            Ok(handler) => {
                let mut endpoint = TextMessageEndpoint::new(handler);
                let result = if transacted {
                    endpoint.on_message_transacted(message.clone()).await
                } else {
                    endpoint.on_message(message.clone()).await
                };
                endpoint.release();
                result
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.shared.delivered.fetch_add(1, Ordering::SeqCst);
                debug!(message_id = %message.id, session = self.number, "message delivered");
            }
            Err(e) => self.redeliver(message, e),
        }
    }

    fn redeliver(&self, mut message: TextMessage, error: MdbError) {
        message.delivery_count += 1;
        if message.delivery_count > self.shared.max_redeliveries {
            warn!(
                message_id = %message.id,
                delivery_count = message.delivery_count,
                error = %error,
                "delivery failed, moving message to the dead-letter list"
            );
            lock(&self.shared.dead_letters).push(message);
            return;
        }
        warn!(message_id = %message.id, delivery_count = message.delivery_count, error = %error, "delivery failed, requeueing");
        if let Err(e) = self.queue.sender.send(message) {
            warn!(message_id = %e.0.id, "queue closed, message dropped");
        }
    }
}
