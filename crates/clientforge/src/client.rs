//! The transport client handed to application code
//!
//! [`HttpClient`] is a cheap value: per-instance settings (base address, default
//! headers, timeout) live on the value, while the handler chain is shared by all
//! clients created for the same name. Client mutators registered for a name run
//! against every freshly created instance.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Request, Response};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::handler::HandlerChain;
use crate::registry::ClientName;

/// HTTP client bound to a named configuration
#[derive(Clone)]
pub struct HttpClient {
    name: ClientName,
    base_address: Option<Url>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    chain: Arc<HandlerChain>,
}

impl HttpClient {
    /// Create an unconfigured client sending through `chain`
    pub fn new(name: ClientName, chain: Arc<HandlerChain>) -> Self {
        Self {
            name,
            base_address: None,
            default_headers: HeaderMap::new(),
            timeout: None,
            chain,
        }
    }

    /// Logical name this client was created for
    pub fn name(&self) -> &ClientName {
        &self.name
    }

    /// Base address relative request paths are resolved against
    pub fn base_address(&self) -> Option<&Url> {
        self.base_address.as_ref()
    }

    /// Set the base address
    pub fn set_base_address(&mut self, base_address: Url) -> &mut Self {
        self.base_address = Some(base_address);
        self
    }

    /// Headers added to every request that does not set them itself
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Mutable access to the default headers
    pub fn default_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.default_headers
    }

    /// Insert a default header, replacing any previous value
    pub fn insert_default_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.default_headers.insert(name, value);
        self
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Set the per-request timeout
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Handler chain this client sends through
    pub fn handler_chain(&self) -> &Arc<HandlerChain> {
        &self.chain
    }

    /// Resolve `uri` against the base address
    ///
    /// Absolute URIs are used as-is; relative ones require a base address.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequestUri`] when `uri` is relative and no
    /// base address is set, or when joining fails.
    pub fn resolve_uri(&self, uri: &str) -> ClientResult<Url> {
        match Url::parse(uri) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_address.as_ref().ok_or_else(|| {
                    ClientError::invalid_request_uri(
                        uri,
                        "relative URI requires a base address",
                    )
                })?;
                base.join(uri)
                    .map_err(|e| ClientError::invalid_request_uri(uri, e.to_string()))
            }
            Err(e) => Err(ClientError::invalid_request_uri(uri, e.to_string())),
        }
    }

    /// Build a request carrying this client's defaults
    ///
    /// # Errors
    ///
    /// See [`HttpClient::resolve_uri`].
    pub fn request(&self, method: Method, uri: &str) -> ClientResult<Request> {
        let mut request = Request::new(method, self.resolve_uri(uri)?);
        self.apply_defaults(&mut request);
        Ok(request)
    }

    /// Send `request` through the handler chain
    ///
    /// Default headers the request does not already carry and the client timeout
    /// are applied first.
    ///
    /// # Errors
    ///
    /// Propagates handler and transport failures.
    pub async fn send(&self, mut request: Request) -> ClientResult<Response> {
        self.apply_defaults(&mut request);
        self.chain.send(request).await
    }

    /// Send a `GET` for `uri`
    ///
    /// # Errors
    ///
    /// See [`HttpClient::request`] and [`HttpClient::send`].
    pub async fn get(&self, uri: &str) -> ClientResult<Response> {
        let request = self.request(Method::GET, uri)?;
        self.chain.send(request).await
    }

    fn apply_defaults(&self, request: &mut Request) {
        for (name, value) in &self.default_headers {
            if !request.headers().contains_key(name) {
                request.headers_mut().insert(name.clone(), value.clone());
            }
        }
        if let Some(timeout) = self.timeout
            && request.timeout().is_none()
        {
            *request.timeout_mut() = Some(timeout);
        }
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("name", &self.name)
            .field("base_address", &self.base_address.as_ref().map(Url::as_str))
            .field("default_headers", &self.default_headers.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerBuilder;
    use reqwest::header::{ACCEPT, USER_AGENT};

    fn client() -> HttpClient {
        let name = ClientName::new("github").unwrap();
        let chain = HandlerBuilder::new(name.clone()).build().unwrap();
        HttpClient::new(name, Arc::new(chain))
    }

    #[test]
    fn test_relative_uri_requires_base_address() {
        let client = client();
        let err = client.resolve_uri("users/octocat").unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequestUri { .. }));
    }

    #[test]
    fn test_relative_uri_joins_base_address() {
        let mut client = client();
        client.set_base_address(Url::parse("https://api.github.com/").unwrap());

        let url = client.resolve_uri("users/octocat").unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/users/octocat");
    }

    #[test]
    fn test_absolute_uri_ignores_base_address() {
        let mut client = client();
        client.set_base_address(Url::parse("https://api.github.com/").unwrap());

        let url = client.resolve_uri("https://example.com/health").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_request_carries_defaults() {
        let mut client = client();
        client
            .set_base_address(Url::parse("https://api.github.com/").unwrap())
            .insert_default_header(ACCEPT, HeaderValue::from_static("application/json"))
            .set_timeout(Duration::from_secs(5));

        let request = client.request(Method::GET, "repos").unwrap();
        assert_eq!(request.headers()[ACCEPT], "application/json");
        assert_eq!(request.timeout(), Some(&Duration::from_secs(5)));
    }

    #[test]
    fn test_explicit_request_header_wins() {
        let mut client = client();
        client.insert_default_header(ACCEPT, HeaderValue::from_static("application/json"));

        let mut request = Request::new(Method::GET, Url::parse("https://example.com").unwrap());
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("text/plain"));
        client.apply_defaults(&mut request);
        assert_eq!(request.headers()[ACCEPT], "text/plain");
    }

    #[test]
    fn test_default_headers_mut_edits_defaults() {
        let mut client = client();
        client.insert_default_header(ACCEPT, HeaderValue::from_static("application/json"));
        client.default_headers_mut().remove(ACCEPT);
        client
            .default_headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static("clientforge"));

        let request = client.request(Method::GET, "https://example.com/").unwrap();
        assert!(!request.headers().contains_key(ACCEPT));
        assert_eq!(request.headers()[USER_AGENT], "clientforge");
    }

    #[test]
    fn test_clones_share_handler_chain() {
        let client = client();
        let clone = client.clone();
        assert!(Arc::ptr_eq(client.handler_chain(), clone.handler_chain()));
    }
}
