//! Registration entry points on [`ServiceCollection`]
//!
//! Every entry point validates its arguments first and only then touches the
//! collection, so a rejected call leaves no trace. Each successful call installs
//! the shared client infrastructure; installation is idempotent because it only
//! uses the add-if-absent and dedup-by-implementation primitives of the
//! collection. Services registered earlier by the application take precedence
//! over the defaults.

use std::sync::Arc;

use tracing::{debug, info};

use crate::builder::HttpClientBuilder;
use crate::client::HttpClient;
use crate::config::HttpClientsConfig;
use crate::container::{ServiceCollection, ServiceDescriptor};
use crate::error::ClientResult;
use crate::factory::{
    DefaultHandlerBuilderFactory, DefaultHttpClientFactory, HandlerBuilderFactory,
    HandlerBuilderFilter, HttpClientFactory,
};
use crate::logging::LoggingHandlerBuilderFilter;
use crate::registry::ClientName;
use crate::typed::TypedClient;

/// HTTP client registration for [`ServiceCollection`]
///
/// # Examples
///
/// ```rust,no_run
/// use clientforge::{HttpClientFactory, HttpClientServiceCollectionExt, ServiceCollection};
/// use std::sync::Arc;
///
/// # fn example() -> clientforge::ClientResult<()> {
/// let mut services = ServiceCollection::new();
/// services.add_http_client_configured("github", |client| {
///     client.set_base_address("https://api.github.com/".parse().unwrap());
/// })?;
///
/// let provider = services.build_provider();
/// let factory = provider.get_required::<Arc<dyn HttpClientFactory>>()?;
/// let github = factory.create_client("github")?;
/// # Ok(())
/// # }
/// ```
pub trait HttpClientServiceCollectionExt {
    /// Register the client factory infrastructure
    ///
    /// Safe to call any number of times; each role ends up with exactly one
    /// default implementation.
    fn add_http_client_infrastructure(&mut self) -> &mut Self;

    /// Configure the unnamed client
    fn add_default_http_client(&mut self) -> HttpClientBuilder<'_>;

    /// Configure the client called `name`
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`](crate::ClientError::InvalidArgument)
    /// if `name` is blank.
    fn add_http_client(&mut self, name: &str) -> ClientResult<HttpClientBuilder<'_>>;

    /// Configure the client called `name` and add `configure` as its first mutator
    ///
    /// # Errors
    ///
    /// See [`HttpClientServiceCollectionExt::add_http_client`].
    fn add_http_client_configured<F>(
        &mut self,
        name: &str,
        configure: F,
    ) -> ClientResult<HttpClientBuilder<'_>>
    where
        F: Fn(&mut HttpClient) + Send + Sync + 'static;

    /// Bind typed client `T` to the client named by [`TypedClient::client_name`]
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`](crate::ClientError::InvalidArgument)
    /// if the type's client name is blank.
    fn add_typed_client<T: TypedClient>(&mut self) -> ClientResult<HttpClientBuilder<'_>>;

    /// Bind typed client `T` to the client called `name`
    ///
    /// # Errors
    ///
    /// See [`HttpClientServiceCollectionExt::add_http_client`].
    fn add_typed_client_named<T: TypedClient>(
        &mut self,
        name: &str,
    ) -> ClientResult<HttpClientBuilder<'_>>;

    /// Bind typed client `T` to its default client name and configure that client
    ///
    /// # Errors
    ///
    /// See [`HttpClientServiceCollectionExt::add_typed_client`].
    fn add_typed_client_configured<T, F>(
        &mut self,
        configure: F,
    ) -> ClientResult<HttpClientBuilder<'_>>
    where
        T: TypedClient,
        F: Fn(&mut HttpClient) + Send + Sync + 'static;

    /// Bind typed client `T` to the client called `name` and configure it
    ///
    /// # Errors
    ///
    /// See [`HttpClientServiceCollectionExt::add_http_client`].
    fn add_typed_client_named_configured<T, F>(
        &mut self,
        name: &str,
        configure: F,
    ) -> ClientResult<HttpClientBuilder<'_>>
    where
        T: TypedClient,
        F: Fn(&mut HttpClient) + Send + Sync + 'static;

    /// Register every client described by `config`
    ///
    /// All entries are validated before the first one is registered.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`](crate::ClientError::InvalidArgument)
    /// naming the offending setting.
    fn add_http_clients_from_config(&mut self, config: &HttpClientsConfig) -> ClientResult<&mut Self>;
}

impl HttpClientServiceCollectionExt for ServiceCollection {
    fn add_http_client_infrastructure(&mut self) -> &mut Self {
        let builder_factory = self.try_add(ServiceDescriptor::singleton::<
            Arc<dyn HandlerBuilderFactory>,
            DefaultHandlerBuilderFactory,
            _,
        >(|_| {
            Ok(Arc::new(DefaultHandlerBuilderFactory::new()) as Arc<dyn HandlerBuilderFactory>)
        }));

        let client_factory = self.try_add(ServiceDescriptor::singleton::<
            Arc<dyn HttpClientFactory>,
            DefaultHttpClientFactory,
            _,
        >(|provider| {
            let builder_factory = provider.get_required::<Arc<dyn HandlerBuilderFactory>>()?;
            let filters = provider.get_all::<Arc<dyn HandlerBuilderFilter>>()?;
            Ok(Arc::new(DefaultHttpClientFactory::new(
                Arc::clone(provider.client_options()),
                builder_factory,
                filters,
            )) as Arc<dyn HttpClientFactory>)
        }));

        let logging_filter = self.try_add_enumerable(ServiceDescriptor::singleton::<
            Arc<dyn HandlerBuilderFilter>,
            LoggingHandlerBuilderFilter,
            _,
        >(|_| {
            Ok(Arc::new(LoggingHandlerBuilderFilter::new()) as Arc<dyn HandlerBuilderFilter>)
        }));

        if builder_factory || client_factory || logging_filter {
            debug!(
                builder_factory,
                client_factory, logging_filter, "installed http client infrastructure"
            );
        }
        self
    }

    fn add_default_http_client(&mut self) -> HttpClientBuilder<'_> {
        named_builder(self, ClientName::DEFAULT)
    }

    fn add_http_client(&mut self, name: &str) -> ClientResult<HttpClientBuilder<'_>> {
        let name = ClientName::new(name)?;
        Ok(named_builder(self, name))
    }

    fn add_http_client_configured<F>(
        &mut self,
        name: &str,
        configure: F,
    ) -> ClientResult<HttpClientBuilder<'_>>
    where
        F: Fn(&mut HttpClient) + Send + Sync + 'static,
    {
        Ok(self.add_http_client(name)?.configure_client(configure))
    }

    fn add_typed_client<T: TypedClient>(&mut self) -> ClientResult<HttpClientBuilder<'_>> {
        self.add_typed_client_named::<T>(T::client_name())
    }

    fn add_typed_client_named<T: TypedClient>(
        &mut self,
        name: &str,
    ) -> ClientResult<HttpClientBuilder<'_>> {
        Ok(self.add_http_client(name)?.typed_client::<T>())
    }

    fn add_typed_client_configured<T, F>(
        &mut self,
        configure: F,
    ) -> ClientResult<HttpClientBuilder<'_>>
    where
        T: TypedClient,
        F: Fn(&mut HttpClient) + Send + Sync + 'static,
    {
        self.add_typed_client_named_configured::<T, F>(T::client_name(), configure)
    }

    fn add_typed_client_named_configured<T, F>(
        &mut self,
        name: &str,
        configure: F,
    ) -> ClientResult<HttpClientBuilder<'_>>
    where
        T: TypedClient,
        F: Fn(&mut HttpClient) + Send + Sync + 'static,
    {
        Ok(self
            .add_http_client(name)?
            .configure_client(configure)
            .typed_client::<T>())
    }

    fn add_http_clients_from_config(&mut self, config: &HttpClientsConfig) -> ClientResult<&mut Self> {
        let prepared = config.prepare()?;
        let count = prepared.len();

        for client in prepared {
            let mut builder = named_builder(self, client.name);
            if let Some(base_address) = client.base_address {
                builder = builder.set_base_address(base_address);
            }
            if let Some(timeout) = client.timeout {
                builder = builder.set_timeout(timeout);
            }
            if !client.headers.is_empty() {
                builder = builder.add_default_headers(client.headers);
            }
            if !client.redacted_headers.is_empty() {
                builder = builder.redact_logged_headers(client.redacted_headers);
            }
            debug!(client = %builder.name(), "registered client from configuration");
        }

        info!(clients = count, "registered http clients from configuration");
        Ok(self)
    }
}

fn named_builder(services: &mut ServiceCollection, name: ClientName) -> HttpClientBuilder<'_> {
    services.add_http_client_infrastructure();
    HttpClientBuilder::new(services, name)
}
