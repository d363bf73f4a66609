//! Strongly-typed clients constructed from a named configuration
//!
//! A typed client is any type that wraps an [`HttpClient`] behind a
//! domain-specific API. Binding `T` to a name registers a transient recipe in
//! the service collection: every resolution of `T` asks the
//! [`HttpClientFactory`] for a fresh client of that name and wraps it.
//!
//! ```rust,no_run
//! use clientforge::{ClientResult, HttpClient, ServiceProvider, TypedClient};
//!
//! struct GitHubClient {
//!     http: HttpClient,
//! }
//!
//! impl TypedClient for GitHubClient {
//!     fn from_http_client(http: HttpClient, _: &ServiceProvider) -> ClientResult<Self> {
//!         Ok(Self { http })
//!     }
//! }
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::client::HttpClient;
use crate::container::{ServiceCollection, ServiceDescriptor, ServiceProvider};
use crate::error::ClientResult;
use crate::factory::HttpClientFactory;
use crate::registry::{ClientName, Contribution, TypedBinding};

/// A client type built on top of a named [`HttpClient`]
pub trait TypedClient: Send + Sync + Sized + 'static {
    /// Client name used when none is given at registration
    ///
    /// Defaults to the fully-qualified type name, so every registration of the
    /// same type without an explicit name shares one configuration.
    fn client_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Wrap a freshly created client
    ///
    /// # Errors
    ///
    /// Implementations may fail when a dependency cannot be resolved.
    fn from_http_client(client: HttpClient, services: &ServiceProvider) -> ClientResult<Self>;
}

/// Wraps a named client into a typed client `T`
pub trait TypedClientFactory<T>: Send + Sync {
    /// Construct `T` around `client`
    ///
    /// # Errors
    ///
    /// Propagates construction failures of `T`.
    fn create_client(&self, client: HttpClient, services: &ServiceProvider) -> ClientResult<T>;
}

/// Typed client factory delegating to [`TypedClient::from_http_client`]
pub struct DefaultTypedClientFactory<T> {
    _client: PhantomData<fn() -> T>,
}

impl<T> DefaultTypedClientFactory<T> {
    /// Create the factory
    pub const fn new() -> Self {
        Self {
            _client: PhantomData,
        }
    }
}

impl<T> Default for DefaultTypedClientFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DefaultTypedClientFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultTypedClientFactory")
            .field("client", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: TypedClient> TypedClientFactory<T> for DefaultTypedClientFactory<T> {
    fn create_client(&self, client: HttpClient, services: &ServiceProvider) -> ClientResult<T> {
        T::from_http_client(client, services)
    }
}

/// Bind `T` to `name`, constructing it through `Arc<dyn TypedClientFactory<T>>`
pub(crate) fn bind_typed_client<T: TypedClient>(services: &mut ServiceCollection, name: &ClientName) {
    services.try_add(ServiceDescriptor::singleton::<
        Arc<dyn TypedClientFactory<T>>,
        DefaultTypedClientFactory<T>,
        _,
    >(|_| {
        Ok(Arc::new(DefaultTypedClientFactory::<T>::new()) as Arc<dyn TypedClientFactory<T>>)
    }));

    bind::<T, _>(services, name, |client, provider| {
        provider
            .get_required::<Arc<dyn TypedClientFactory<T>>>()?
            .create_client(client, provider)
    });
}

/// Bind `T` to `name`, constructing it with `factory`
pub(crate) fn bind_typed_client_with<T, F>(
    services: &mut ServiceCollection,
    name: &ClientName,
    factory: F,
) where
    T: Send + Sync + 'static,
    F: Fn(HttpClient, &ServiceProvider) -> ClientResult<T> + Send + Sync + 'static,
{
    bind::<T, _>(services, name, factory);
}

fn bind<T, F>(services: &mut ServiceCollection, name: &ClientName, wrap: F)
where
    T: Send + Sync + 'static,
    F: Fn(HttpClient, &ServiceProvider) -> ClientResult<T> + Send + Sync + 'static,
{
    services
        .client_options_mut()
        .register(name, Contribution::TypedClientBinding(TypedBinding::of::<T>()));

    let client_name = name.clone();
    services.add(ServiceDescriptor::transient::<T, T, _>(move |provider| {
        let client = provider
            .get_required::<Arc<dyn HttpClientFactory>>()?
            .create_client(client_name.as_str())?;
        wrap(client, provider)
    }));

    debug!(
        client = %name,
        typed_client = std::any::type_name::<T>(),
        "bound typed client"
    );
}
