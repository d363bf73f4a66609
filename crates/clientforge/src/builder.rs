//! Fluent per-name configuration builder

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName};
use url::Url;

use crate::client::HttpClient;
use crate::container::{ServiceCollection, ServiceProvider};
use crate::error::ClientResult;
use crate::handler::{DelegatingHandler, HandlerBuilder};
use crate::registry::{ClientName, Contribution};
use crate::typed::{self, TypedClient};

/// Configures one named client
///
/// Returned by the `add_http_client*` and `add_typed_client*` entry points of
/// [`HttpClientServiceCollectionExt`](crate::HttpClientServiceCollectionExt).
/// Every method appends a contribution for [`HttpClientBuilder::name`] and
/// hands the builder back; nothing is constructed until the provider resolves
/// a client.
///
/// # Examples
///
/// ```rust,no_run
/// use clientforge::{HttpClientServiceCollectionExt, ServiceCollection};
/// use std::time::Duration;
///
/// # fn example() -> clientforge::ClientResult<()> {
/// let mut services = ServiceCollection::new();
/// services
///     .add_http_client("github")?
///     .set_base_address("https://api.github.com/".parse().unwrap())
///     .set_timeout(Duration::from_secs(10))
///     .redact_logged_headers([reqwest::header::AUTHORIZATION]);
/// # Ok(())
/// # }
/// ```
pub struct HttpClientBuilder<'a> {
    services: &'a mut ServiceCollection,
    name: ClientName,
}

impl<'a> HttpClientBuilder<'a> {
    pub(crate) fn new(services: &'a mut ServiceCollection, name: ClientName) -> Self {
        Self { services, name }
    }

    /// Name every contribution is registered under
    pub fn name(&self) -> &ClientName {
        &self.name
    }

    /// The collection this builder registers into
    pub fn services(&mut self) -> &mut ServiceCollection {
        self.services
    }

    /// Apply `configure` to every client created for this name
    #[must_use]
    pub fn configure_client<F>(self, configure: F) -> Self
    where
        F: Fn(&mut HttpClient) + Send + Sync + 'static,
    {
        self.contribute(Contribution::client(configure))
    }

    /// Apply `configure` to the handler builder before the chain is built
    #[must_use]
    pub fn configure_handler_builder<F>(self, configure: F) -> Self
    where
        F: Fn(&mut HandlerBuilder) + Send + Sync + 'static,
    {
        self.contribute(Contribution::handler_builder(configure))
    }

    /// Add a delegating handler produced by `factory`
    ///
    /// The factory runs each time the handler chain is built, so handlers need
    /// not be shareable across names.
    #[must_use]
    pub fn add_handler<F>(self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn DelegatingHandler> + Send + Sync + 'static,
    {
        self.configure_handler_builder(move |builder| {
            builder.add_handler(factory());
        })
    }

    /// Adjust the primary `reqwest` client
    #[must_use]
    pub fn configure_primary_handler<F>(self, configure: F) -> Self
    where
        F: Fn(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send + Sync + 'static,
    {
        self.configure_handler_builder(move |builder| {
            builder.configure_primary(&configure);
        })
    }

    /// Log the values of `headers` as `*`
    #[must_use]
    pub fn redact_logged_headers<I>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = HeaderName>,
    {
        let headers: Vec<HeaderName> = headers.into_iter().collect();
        self.configure_handler_builder(move |builder| {
            for header in &headers {
                builder.redact_header(header.clone());
            }
        })
    }

    /// Set the timeout of every client created for this name
    #[must_use]
    pub fn set_timeout(self, timeout: Duration) -> Self {
        self.configure_client(move |client| {
            client.set_timeout(timeout);
        })
    }

    /// Set the base address of every client created for this name
    #[must_use]
    pub fn set_base_address(self, base_address: Url) -> Self {
        self.configure_client(move |client| {
            client.set_base_address(base_address.clone());
        })
    }

    /// Add default headers to every client created for this name
    #[must_use]
    pub fn add_default_headers(self, headers: HeaderMap) -> Self {
        self.configure_client(move |client| {
            for (name, value) in &headers {
                client.insert_default_header(name.clone(), value.clone());
            }
        })
    }

    /// Make `T` resolvable, built from this name's client
    #[must_use]
    pub fn typed_client<T: TypedClient>(self) -> Self {
        typed::bind_typed_client::<T>(self.services, &self.name);
        self
    }

    /// Make `T` resolvable, built from this name's client by `factory`
    #[must_use]
    pub fn typed_client_with<T, F>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(HttpClient, &ServiceProvider) -> ClientResult<T> + Send + Sync + 'static,
    {
        typed::bind_typed_client_with::<T, F>(self.services, &self.name, factory);
        self
    }

    fn contribute(self, contribution: Contribution) -> Self {
        self.services
            .client_options_mut()
            .register(&self.name, contribution);
        self
    }
}

impl fmt::Debug for HttpClientBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClientBuilder")
            .field("name", &self.name)
            .field(
                "contributions",
                &self.services.client_options().resolve(self.name.as_str()).len(),
            )
            .finish()
    }
}
