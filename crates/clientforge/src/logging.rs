//! Request logging installed around every client's handler chain
//!
//! [`LoggingHandlerBuilderFilter`] wraps each chain with two handlers:
//!
//! - [`LoggingScopeHandler`] runs outermost. It opens the `http_client_request`
//!   span and reports the total time spent in the pipeline, including every user
//!   handler.
//! - [`ClientLoggingHandler`] runs innermost, just above the transport, and logs
//!   what actually goes over the wire. Headers are only logged at `trace`.
//!
//! Header values marked through [`HandlerBuilder::redact_header`] are logged as
//! `*`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Request, Response};
use tracing::{Instrument, Level, debug, enabled, field, info, info_span, trace, warn};

use crate::error::ClientResult;
use crate::factory::{BuilderAction, HandlerBuilderFilter};
use crate::handler::{DelegatingHandler, HandlerBuilder, Next};
use crate::registry::ClientName;

/// Render `headers` as `name: value` pairs, masking redacted values
pub fn format_headers(headers: &HeaderMap, redacted: &HashSet<HeaderName>) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            if redacted.contains(name) {
                format!("{name}: *")
            } else {
                format!("{name}: {}", String::from_utf8_lossy(value.as_bytes()))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Handler builder filter adding request logging to every client
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandlerBuilderFilter;

impl LoggingHandlerBuilderFilter {
    /// Create the filter
    pub const fn new() -> Self {
        Self
    }
}

impl HandlerBuilderFilter for LoggingHandlerBuilderFilter {
    fn configure<'a>(&'a self, next: BuilderAction<'a>) -> BuilderAction<'a> {
        Box::new(move |builder: &mut HandlerBuilder| {
            next(builder);

            // Redactions registered by the user mutators above are already in place.
            let redacted = Arc::new(builder.redacted_headers().clone());
            let name = builder.name().clone();
            builder.additional_handlers_mut().insert(
                0,
                Arc::new(LoggingScopeHandler::new(name.clone(), Arc::clone(&redacted))),
            );
            builder
                .additional_handlers_mut()
                .push(Arc::new(ClientLoggingHandler::new(name, redacted)));
        })
    }
}

/// Outermost handler timing the whole pipeline
#[derive(Debug, Clone)]
pub struct LoggingScopeHandler {
    client: ClientName,
    redacted: Arc<HashSet<HeaderName>>,
}

impl LoggingScopeHandler {
    /// Create a scope handler for `client`
    pub fn new(client: ClientName, redacted: Arc<HashSet<HeaderName>>) -> Self {
        Self { client, redacted }
    }
}

#[async_trait]
impl DelegatingHandler for LoggingScopeHandler {
    fn name(&self) -> &str {
        "logging_scope"
    }

    async fn send(&self, request: Request, next: Next<'_>) -> ClientResult<Response> {
        let span = info_span!(
            "http_client_request",
            client = %self.client,
            method = %request.method(),
            uri = %request.url(),
            status = field::Empty,
            elapsed_ms = field::Empty,
        );

        async move {
            info!("start processing request");
            if enabled!(Level::TRACE) {
                trace!(headers = %format_headers(request.headers(), &self.redacted), "request headers");
            }

            let started = Instant::now();
            let result = next.run(request).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let span = tracing::Span::current();
            span.record("elapsed_ms", elapsed_ms);
            match &result {
                Ok(response) => {
                    span.record("status", response.status().as_u16());
                    info!(
                        status = response.status().as_u16(),
                        elapsed_ms, "end processing request"
                    );
                }
                Err(error) => {
                    warn!(%error, elapsed_ms, "request failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Innermost handler logging each transport round trip
#[derive(Debug, Clone)]
pub struct ClientLoggingHandler {
    client: ClientName,
    redacted: Arc<HashSet<HeaderName>>,
}

impl ClientLoggingHandler {
    /// Create a request handler for `client`
    pub fn new(client: ClientName, redacted: Arc<HashSet<HeaderName>>) -> Self {
        Self { client, redacted }
    }
}

#[async_trait]
impl DelegatingHandler for ClientLoggingHandler {
    fn name(&self) -> &str {
        "client_logging"
    }

    async fn send(&self, request: Request, next: Next<'_>) -> ClientResult<Response> {
        debug!(
            client = %self.client,
            method = %request.method(),
            uri = %request.url(),
            "sending request"
        );
        if enabled!(Level::TRACE) {
            trace!(
                client = %self.client,
                headers = %format_headers(request.headers(), &self.redacted),
                "sending request headers"
            );
        }

        let started = Instant::now();
        let response = next.run(request).await?;

        debug!(
            client = %self.client,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "received response"
        );
        if enabled!(Level::TRACE) {
            trace!(
                client = %self.client,
                headers = %format_headers(response.headers(), &self.redacted),
                "received response headers"
            );
        }
        Ok(response)
    }
}
