//! # The Text Message Listener Interface
//!
//! The runtime is generic over a [`MessageListener`]; this module pins it to the one
//! interface the sample supports and puts a small typed facade over the raw
//! [`EndpointHandler`] so the queue adapter never builds [`Method`] descriptors itself.
//!
//! | Runtime concept | Here |
//! |-----------------|------|
//! | Listener interface | [`TextMessageListener`] (`jakarta.jms.MessageListener`) |
//! | Business method | `onMessage(jakarta.jms.Message)`, see [`on_message_method`] |
//! | Endpoint | [`TextMessageEndpoint`] |
//!
//! ## Delivery styles
//!
//! ```rust,ignore
//! // Non-transacted: one call, before/after happen implicitly.
//! endpoint.on_message(message).await?;
//!
//! // Transacted: explicit bracket so the adapter's XA resource joins the transaction.
//! endpoint.on_message_transacted(message).await?;
//! ```

use crate::model::TextMessage;
use mdb_runtime::{DeliveryState, EndpointHandler, MdbError, MessageListener, Method};

#[derive(Debug)]
pub struct TextMessageListener;

impl MessageListener for TextMessageListener {
    const INTERFACE: &'static str = "jakarta.jms.MessageListener";
    type Message = TextMessage;
    type Reply = ();
}

/// `onMessage(jakarta.jms.Message)`. It declares no checked exceptions.
pub fn on_message_method() -> Method {
    Method::new("onMessage").with_parameter("jakarta.jms.Message")
}

/// A message endpoint speaking [`TextMessageListener`].
pub struct TextMessageEndpoint {
    handler: EndpointHandler<TextMessageListener>,
    method: Method,
}

impl TextMessageEndpoint {
    pub fn new(handler: EndpointHandler<TextMessageListener>) -> Self {
        Self {
            handler,
            method: on_message_method(),
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.handler.state()
    }

    /// Delivers without an explicit bracket.
    pub async fn on_message(&mut self, message: TextMessage) -> Result<(), MdbError> {
        self.handler.deliver(&self.method, message).await
    }

    /// Delivers inside `before_delivery`/`after_delivery`. `after_delivery` runs even
    /// when the bean fails; the bean's fault wins over a completion error.
    pub async fn on_message_transacted(&mut self, message: TextMessage) -> Result<(), MdbError> {
        self.handler.before_delivery(&self.method).await?;
        let delivered = self.handler.deliver(&self.method, message).await;
        let completed = self.handler.after_delivery();
        delivered?;
        completed
    }

    pub fn release(mut self) {
        self.handler.release();
    }
}
