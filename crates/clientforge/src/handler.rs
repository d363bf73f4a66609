//! Handler pipeline assembled for each named client
//!
//! A [`HandlerBuilder`] collects an ordered list of [`DelegatingHandler`]s and a
//! primary `reqwest` client configuration. [`HandlerBuilder::build`] produces a
//! [`HandlerChain`] that every [`HttpClient`](crate::HttpClient) of that name
//! sends through:
//!
//! ```text
//! request → handler[0] → handler[1] → ... → handler[n] → reqwest::Client
//! ```
//!
//! The first additional handler is the outermost one.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderName;
use reqwest::{Request, Response};

use crate::error::ClientResult;
use crate::registry::ClientName;

/// A middleware step in a client's handler chain
///
/// Implementations inspect or rewrite the request, call [`Next::run`] to forward
/// it, and may inspect the response on the way back.
#[async_trait]
pub trait DelegatingHandler: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Process `request`, delegating to `next` for the rest of the chain
    async fn send(&self, request: Request, next: Next<'_>) -> ClientResult<Response>;
}

/// Remainder of the handler chain below the current handler
#[derive(Clone, Copy)]
pub struct Next<'a> {
    handlers: &'a [Arc<dyn DelegatingHandler>],
    primary: &'a reqwest::Client,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        handlers: &'a [Arc<dyn DelegatingHandler>],
        primary: &'a reqwest::Client,
    ) -> Self {
        Self { handlers, primary }
    }

    /// Forward `request` to the next handler, or to the transport at the end
    pub async fn run(self, request: Request) -> ClientResult<Response> {
        match self.handlers.split_first() {
            Some((handler, rest)) => handler.send(request, Next::new(rest, self.primary)).await,
            None => Ok(self.primary.execute(request).await?),
        }
    }

    /// Number of handlers still ahead of the transport
    pub fn remaining(&self) -> usize {
        self.handlers.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.handlers.len())
            .finish()
    }
}

/// Built, immutable handler chain shared by all clients of one name
pub struct HandlerChain {
    name: ClientName,
    handlers: Vec<Arc<dyn DelegatingHandler>>,
    primary: reqwest::Client,
}

impl HandlerChain {
    /// Send `request` through every handler and then the transport
    pub async fn send(&self, request: Request) -> ClientResult<Response> {
        Next::new(&self.handlers, &self.primary).run(request).await
    }

    /// Name of the client this chain was built for
    pub fn name(&self) -> &ClientName {
        &self.name
    }

    /// Handler names, outermost first
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("name", &self.name)
            .field("handlers", &self.handler_names())
            .finish()
    }
}

/// Mutable build context for one client name's handler chain
///
/// Handler builder mutators and filters receive `&mut HandlerBuilder` and may add
/// handlers, reconfigure the primary `reqwest` client, or mark headers whose
/// values must not be logged.
pub struct HandlerBuilder {
    name: ClientName,
    primary: reqwest::ClientBuilder,
    additional_handlers: Vec<Arc<dyn DelegatingHandler>>,
    redacted_headers: HashSet<HeaderName>,
}

impl HandlerBuilder {
    /// Create a builder for `name` with a default primary client
    pub fn new(name: ClientName) -> Self {
        Self::with_primary(name, reqwest::Client::builder())
    }

    /// Create a builder for `name` starting from `primary`
    pub fn with_primary(name: ClientName, primary: reqwest::ClientBuilder) -> Self {
        Self {
            name,
            primary,
            additional_handlers: Vec::new(),
            redacted_headers: HashSet::new(),
        }
    }

    /// Name of the client being built
    pub fn name(&self) -> &ClientName {
        &self.name
    }

    /// Reconfigure the primary `reqwest` client
    pub fn configure_primary<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder,
    {
        let primary = std::mem::take(&mut self.primary);
        self.primary = configure(primary);
        self
    }

    /// Append a handler below the ones already registered
    pub fn add_handler(&mut self, handler: Arc<dyn DelegatingHandler>) -> &mut Self {
        self.additional_handlers.push(handler);
        self
    }

    /// Handlers in chain order, outermost first
    pub fn additional_handlers(&self) -> &[Arc<dyn DelegatingHandler>] {
        &self.additional_handlers
    }

    /// Mutable access to the handler list
    pub fn additional_handlers_mut(&mut self) -> &mut Vec<Arc<dyn DelegatingHandler>> {
        &mut self.additional_handlers
    }

    /// Mark `header` as sensitive for logging handlers
    pub fn redact_header(&mut self, header: HeaderName) -> &mut Self {
        self.redacted_headers.insert(header);
        self
    }

    /// Headers whose values are logged as `*`
    pub fn redacted_headers(&self) -> &HashSet<HeaderName> {
        &self.redacted_headers
    }

    /// Build the primary client and freeze the handler list
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`](crate::ClientError::Transport) if the
    /// primary `reqwest` client cannot be built.
    pub fn build(self) -> ClientResult<HandlerChain> {
        let primary = self.primary.build()?;
        Ok(HandlerChain {
            name: self.name,
            handlers: self.additional_handlers,
            primary,
        })
    }
}

impl fmt::Debug for HandlerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBuilder")
            .field("name", &self.name)
            .field(
                "additional_handlers",
                &self
                    .additional_handlers
                    .iter()
                    .map(|handler| handler.name())
                    .collect::<Vec<_>>(),
            )
            .field("redacted_headers", &self.redacted_headers)
            .finish()
    }
}
