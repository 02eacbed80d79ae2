//! Method handler registry.
//!
//! Maps declared methods to the code that serves them. The registry is
//! filled at startup and then shared read-only (behind an `Arc`) by every
//! connection task.

use crate::error::{Result, RpcError};
use crate::message::{from_message, to_message, Message};
use crate::method::UnaryMethod;
use crate::schema::{MethodDescriptor, MethodKey, SchemaSet};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Server-side logic bound to one method.
///
/// Handlers are synchronous and run on the blocking pool, one call at a
/// time per connection. Shared state inside a handler needs its own
/// synchronization.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Message) -> Result<Message>;
}

impl<F> Handler for F
where
    F: Fn(Message) -> Result<Message> + Send + Sync + 'static,
{
    fn call(&self, request: Message) -> Result<Message> {
        self(request)
    }
}

/// A method resolved for dispatch.
#[derive(Clone)]
pub struct ResolvedMethod {
    pub descriptor: MethodDescriptor,
    pub handler: Arc<dyn Handler>,
}

impl fmt::Debug for ResolvedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMethod")
            .field("method", &self.descriptor.key())
            .finish_non_exhaustive()
    }
}

/// Handlers keyed by (service, method).
pub struct HandlerRegistry {
    schema: Arc<SchemaSet>,
    handlers: HashMap<MethodKey, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new(schema: Arc<SchemaSet>) -> Self {
        Self {
            schema,
            handlers: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<SchemaSet> {
        &self.schema
    }

    /// Bind a handler to a declared method.
    ///
    /// Fails with `UnknownMethod` if the schema does not declare the method,
    /// and with `Config` if it already has a handler.
    pub fn register<H: Handler>(&mut self, service: &str, method: &str, handler: H) -> Result<()> {
        let key = self.schema.method(service, method)?.key();
        if self.handlers.contains_key(&key) {
            return Err(RpcError::Config {
                message: format!("Handler for {} registered twice", key),
            });
        }
        debug!("Registered handler for {}", key);
        self.handlers.insert(key, Arc::new(handler));
        Ok(())
    }

    /// Bind a typed handler, converting through the declared shapes.
    pub fn register_typed<M, F>(&mut self, handler: F) -> Result<()>
    where
        M: UnaryMethod,
        F: Fn(M::Request) -> Result<M::Response> + Send + Sync + 'static,
    {
        let descriptor = self.schema.method(M::SERVICE, M::METHOD)?.clone();
        self.register(M::SERVICE, M::METHOD, move |request: Message| -> Result<Message> {
            let request: M::Request = from_message(&descriptor.request, &request)?;
            let response = handler(request)?;
            to_message(&descriptor.response, &response)
        })
    }

    /// Resolve a method for dispatch.
    ///
    /// `MethodNotImplemented` means the schema declares the method but no
    /// handler was registered; `UnknownMethod` means the schema does not
    /// declare it at all.
    pub fn lookup(&self, service: &str, method: &str) -> Result<ResolvedMethod> {
        let descriptor = self.schema.method(service, method)?;
        let handler = self
            .handlers
            .get(&descriptor.key())
            .cloned()
            .ok_or_else(|| RpcError::MethodNotImplemented {
                service: service.to_string(),
                method: method.to_string(),
            })?;

        Ok(ResolvedMethod {
            descriptor: descriptor.clone(),
            handler,
        })
    }

    pub fn is_registered(&self, service: &str, method: &str) -> bool {
        self.handlers.contains_key(&MethodKey::new(service, method))
    }

    /// Declared methods that have no handler.
    pub fn unimplemented_methods(&self) -> Vec<MethodKey> {
        self.schema
            .methods()
            .map(MethodDescriptor::key)
            .filter(|key| !self.handlers.contains_key(key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
