//! # Bean and Interceptor Contracts
//!
//! [`MessageDrivenBean`] is where business logic lives. The container owns every
//! instance and calls the lifecycle methods in a fixed order:
//!
//! 1. [`inject`](MessageDrivenBean::inject) for each declared injection
//! 2. interceptor `post_construct`, then [`post_construct`](MessageDrivenBean::post_construct)
//! 3. [`ejb_create`](MessageDrivenBean::ejb_create)
//! 4. any number of [`on_message`](MessageDrivenBean::on_message) calls, one at a time
//! 5. interceptor `pre_destroy`, then [`pre_destroy`](MessageDrivenBean::pre_destroy),
//!    unless the instance is discarded after a system fault
//!
//! ## Interceptors
//!
//! An [`Interceptor`] wraps the business method. Each one receives an [`Invocation`]
//! positioned after itself in the chain and decides whether (and with what message) to
//! [`proceed`](Invocation::proceed):
//!
//! ```rust,ignore
//! #[async_trait]
//! impl Interceptor<TextMessageListener> for Timing {
//!     async fn around_invoke(
//!         &self,
//!         invocation: Invocation<'_, TextMessageListener>,
//!         message: TextMessage,
//!     ) -> Result<(), BeanException> {
//!         let started = Instant::now();
//!         let result = invocation.proceed(message).await;
//!         info!(elapsed = ?started.elapsed(), "delivered");
//!         result
//!     }
//! }
//! ```

use crate::context::MessageDrivenContext;
use crate::exception::BeanException;
use crate::injection::Resource;
use crate::listener::{MessageListener, Method};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[async_trait]
pub trait MessageDrivenBean<L: MessageListener>: Send + 'static {
    /// Receives a resolved injection for `target`.
    fn inject(&mut self, _target: &str, _value: Resource) -> Result<(), BeanException> {
        Ok(())
    }

    async fn post_construct(&mut self) -> Result<(), BeanException> {
        Ok(())
    }

    async fn ejb_create(&mut self) -> Result<(), BeanException> {
        Ok(())
    }

    /// Handles one delivered message.
    async fn on_message(
        &mut self,
        method: &Method,
        message: L::Message,
        ctx: &MessageDrivenContext,
    ) -> Result<L::Reply, BeanException>;

    async fn pre_destroy(&mut self) -> Result<(), BeanException> {
        Ok(())
    }
}

/// Logic that runs around business methods and lifecycle callbacks.
///
/// One interceptor value exists per bean instance, so `&self` state is per instance.
#[async_trait]
pub trait Interceptor<L: MessageListener>: Send + Sync + 'static {
    async fn around_invoke(
        &self,
        invocation: Invocation<'_, L>,
        message: L::Message,
    ) -> Result<L::Reply, BeanException> {
        invocation.proceed(message).await
    }

    async fn post_construct(&self) -> Result<(), BeanException> {
        Ok(())
    }

    async fn pre_destroy(&self) -> Result<(), BeanException> {
        Ok(())
    }
}

/// The remainder of an interceptor chain, ending at the bean.
pub struct Invocation<'a, L: MessageListener> {
    chain: &'a [Arc<dyn Interceptor<L>>],
    bean: &'a mut dyn MessageDrivenBean<L>,
    method: &'a Method,
    context: &'a MessageDrivenContext,
}

impl<'a, L: MessageListener> Invocation<'a, L> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn Interceptor<L>>],
        bean: &'a mut dyn MessageDrivenBean<L>,
        method: &'a Method,
        context: &'a MessageDrivenContext,
    ) -> Self {
        Self {
            chain,
            bean,
            method,
            context,
        }
    }

    pub fn method(&self) -> &Method {
        self.method
    }

    pub fn context(&self) -> &MessageDrivenContext {
        self.context
    }

    /// Calls the next interceptor, or the bean once the chain is exhausted.
    pub fn proceed(self, message: L::Message) -> BoxFuture<'a, Result<L::Reply, BeanException>> {
        Box::pin(async move {
            match self.chain.split_first() {
                Some((next, rest)) => {
                    let invocation = Invocation {
                        chain: rest,
                        bean: self.bean,
                        method: self.method,
                        context: self.context,
                    };
                    next.around_invoke(invocation, message).await
                }
                None => self.bean.on_message(self.method, message, self.context).await,
            }
        })
    }
}
