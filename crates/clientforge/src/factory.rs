//! Client factory collaborators and their default implementations
//!
//! [`DefaultHttpClientFactory`] turns the frozen [`ClientOptions`] into working
//! clients. For each name it builds the handler chain once:
//!
//! 1. obtain a fresh [`HandlerBuilder`] from the [`HandlerBuilderFactory`];
//! 2. compose the registered [`HandlerBuilderFilter`]s around the step that
//!    replays the name's handler builder mutators;
//! 3. run the composed action and build the chain.
//!
//! Every [`HttpClientFactory::create_client`] call then creates a new
//! [`HttpClient`] over that chain and replays the name's client mutators in
//! registration order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::client::HttpClient;
use crate::error::ClientResult;
use crate::handler::{HandlerBuilder, HandlerChain};
use crate::registry::{ClientName, ClientOptions};

/// Deferred configuration step run against a handler builder
pub type BuilderAction<'a> = Box<dyn FnOnce(&mut HandlerBuilder) + 'a>;

/// Creates configured clients by logical name
pub trait HttpClientFactory: Send + Sync {
    /// Create a client for `name`
    ///
    /// Names without registered configuration produce a default client.
    /// Implementations may keep per-name state for every name they are asked
    /// for; [`DefaultHttpClientFactory`] caches one handler chain per distinct
    /// name for its whole lifetime, so callers should not pass unbounded sets of
    /// names.
    ///
    /// # Errors
    ///
    /// Returns an error if the handler chain for `name` cannot be built.
    fn create_client(&self, name: &str) -> ClientResult<HttpClient>;
}

/// Produces the handler builder a chain is assembled from
pub trait HandlerBuilderFactory: Send + Sync {
    /// Fresh builder for `name`
    fn create_builder(&self, name: &ClientName) -> HandlerBuilder;
}

/// Wraps the handler builder configuration of every client
///
/// A filter receives the action configuring the builder and returns a new one,
/// usually calling `next` and then adjusting the result. Filters registered
/// first end up outermost.
pub trait HandlerBuilderFilter: Send + Sync {
    /// Wrap `next`
    fn configure<'a>(&'a self, next: BuilderAction<'a>) -> BuilderAction<'a>;
}

/// Handler builder factory starting every chain from a default `reqwest` client
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandlerBuilderFactory;

impl DefaultHandlerBuilderFactory {
    /// Create the factory
    pub const fn new() -> Self {
        Self
    }
}

impl HandlerBuilderFactory for DefaultHandlerBuilderFactory {
    fn create_builder(&self, name: &ClientName) -> HandlerBuilder {
        HandlerBuilder::new(name.clone())
    }
}

type ChainCell = Arc<Mutex<Option<Arc<HandlerChain>>>>;

/// Client factory replaying named configuration
pub struct DefaultHttpClientFactory {
    options: Arc<ClientOptions>,
    builder_factory: Arc<dyn HandlerBuilderFactory>,
    filters: Vec<Arc<dyn HandlerBuilderFilter>>,
    chains: Mutex<HashMap<ClientName, ChainCell>>,
}

impl DefaultHttpClientFactory {
    /// Create a factory over frozen options
    pub fn new(
        options: Arc<ClientOptions>,
        builder_factory: Arc<dyn HandlerBuilderFactory>,
        filters: Vec<Arc<dyn HandlerBuilderFilter>>,
    ) -> Self {
        Self {
            options,
            builder_factory,
            filters,
            chains: Mutex::new(HashMap::new()),
        }
    }

    /// Handler chain for `name`, built on first use
    ///
    /// Concurrent callers for the same name wait for a single build. A failed
    /// build is not cached, so the next call tries again.
    ///
    /// # Errors
    ///
    /// Returns an error if the primary `reqwest` client cannot be built.
    pub fn handler_chain(&self, name: &str) -> ClientResult<Arc<HandlerChain>> {
        let cell = Arc::clone(
            self.chains
                .lock()
                .entry(ClientName::from_lookup(name))
                .or_default(),
        );

        // Only this name's cell is held while mutators and filters run.
        let mut slot = cell.lock();
        if let Some(chain) = slot.as_ref() {
            return Ok(Arc::clone(chain));
        }
        let chain = Arc::new(self.build_chain(&ClientName::from_lookup(name))?);
        *slot = Some(Arc::clone(&chain));
        Ok(chain)
    }

    fn build_chain(&self, name: &ClientName) -> ClientResult<HandlerChain> {
        let mut builder = self.builder_factory.create_builder(name);

        let options = &self.options;
        let client = name.clone();
        let mut configure: BuilderAction<'_> = Box::new(move |builder: &mut HandlerBuilder| {
            for mutator in options.handler_builder_mutators(client.as_str()) {
                mutator(builder);
            }
        });
        for filter in self.filters.iter().rev() {
            configure = filter.configure(configure);
        }
        configure(&mut builder);

        let chain = builder.build()?;
        debug!(
            client = %name,
            handlers = ?chain.handler_names(),
            "built handler chain"
        );
        Ok(chain)
    }
}

impl HttpClientFactory for DefaultHttpClientFactory {
    fn create_client(&self, name: &str) -> ClientResult<HttpClient> {
        let chain = self.handler_chain(name)?;
        let mut client = HttpClient::new(ClientName::from_lookup(name), chain);

        let mut applied = 0usize;
        for mutator in self.options.client_mutators(name) {
            mutator(&mut client);
            applied += 1;
        }
        trace!(client = %client.name(), mutators = applied, "created http client");
        Ok(client)
    }
}

impl fmt::Debug for DefaultHttpClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultHttpClientFactory")
            .field("filters", &self.filters.len())
            .field("cached_chains", &self.chains.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{DelegatingHandler, Next};
    use crate::registry::{ClientOptionsRegistry, Contribution};
    use async_trait::async_trait;
    use reqwest::{Request, Response};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    struct Named(&'static str);

    #[async_trait]
    impl DelegatingHandler for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn send(&self, request: Request, next: Next<'_>) -> ClientResult<Response> {
            next.run(request).await
        }
    }

    struct Wrapping(&'static str);

    impl HandlerBuilderFilter for Wrapping {
        fn configure<'a>(&'a self, next: BuilderAction<'a>) -> BuilderAction<'a> {
            Box::new(move |builder: &mut HandlerBuilder| {
                next(builder);
                builder
                    .additional_handlers_mut()
                    .insert(0, Arc::new(Named(self.0)));
            })
        }
    }

    fn factory(
        registry: ClientOptionsRegistry,
        filters: Vec<Arc<dyn HandlerBuilderFilter>>,
    ) -> DefaultHttpClientFactory {
        DefaultHttpClientFactory::new(
            Arc::new(registry.freeze()),
            Arc::new(DefaultHandlerBuilderFactory::new()),
            filters,
        )
    }

    #[test]
    fn test_client_mutators_apply_in_order() {
        let mut registry = ClientOptionsRegistry::new();
        let name = ClientName::new("github").unwrap();
        registry.register(
            &name,
            Contribution::client(|client| {
                client.set_base_address(Url::parse("https://api.github.com/").unwrap());
            }),
        );
        registry.register(
            &name,
            Contribution::client(|client| {
                let joined = client.base_address().unwrap().join("v3/").unwrap();
                client.set_base_address(joined);
            }),
        );

        let client = factory(registry, Vec::new()).create_client("github").unwrap();
        assert_eq!(
            client.base_address().unwrap().as_str(),
            "https://api.github.com/v3/"
        );
    }

    #[test]
    fn test_unknown_name_yields_default_client() {
        let client = factory(ClientOptionsRegistry::new(), Vec::new())
            .create_client("unknown")
            .unwrap();
        assert_eq!(client.name().as_str(), "unknown");
        assert!(client.base_address().is_none());
    }

    #[test]
    fn test_unregistered_names_cached_per_name() {
        let factory = factory(ClientOptionsRegistry::new(), Vec::new());
        let first = factory.create_client("unknown").unwrap();
        let again = factory.create_client("unknown").unwrap();
        let other = factory.create_client("other").unwrap();

        assert!(Arc::ptr_eq(first.handler_chain(), again.handler_chain()));
        assert!(!Arc::ptr_eq(first.handler_chain(), other.handler_chain()));
        assert!(format!("{factory:?}").contains("cached_chains: 2"));
    }

    #[test]
    fn test_handler_chain_built_once_per_name() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let mut registry = ClientOptionsRegistry::new();
        registry.register(
            &ClientName::new("github").unwrap(),
            Contribution::handler_builder(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let factory = factory(registry, Vec::new());
        let first = factory.create_client("github").unwrap();
        let second = factory.create_client("github").unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(first.handler_chain(), second.handler_chain()));
    }

    #[test]
    fn test_concurrent_clients_build_chain_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let mut registry = ClientOptionsRegistry::new();
        registry.register(
            &ClientName::new("x").unwrap(),
            Contribution::handler_builder(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(50));
            }),
        );

        let factory = Arc::new(factory(registry, Vec::new()));
        let clients: Vec<HttpClient> = (0..8)
            .map(|_| {
                let factory = Arc::clone(&factory);
                std::thread::spawn(move || factory.create_client("x").unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(
            clients
                .iter()
                .all(|client| Arc::ptr_eq(client.handler_chain(), clients[0].handler_chain()))
        );
    }

    #[test]
    fn test_failed_chain_build_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let mut registry = ClientOptionsRegistry::new();
        registry.register(
            &ClientName::new("flaky").unwrap(),
            Contribution::handler_builder(move |builder| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    // An invalid user agent makes the primary client fail to build.
                    builder.configure_primary(|primary| primary.user_agent("bad\nagent"));
                }
            }),
        );

        let factory = factory(registry, Vec::new());
        assert!(factory.create_client("flaky").is_err());
        assert!(factory.create_client("flaky").is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_client_mutators_run_per_client() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut registry = ClientOptionsRegistry::new();
        registry.register(
            &ClientName::new("github").unwrap(),
            Contribution::client(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let factory = factory(registry, Vec::new());
        for _ in 0..3 {
            factory.create_client("github").unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_filters_wrap_mutators_first_outermost() {
        let mut registry = ClientOptionsRegistry::new();
        registry.register(
            &ClientName::new("github").unwrap(),
            Contribution::handler_builder(|builder| {
                builder.add_handler(Arc::new(Named("configured")));
            }),
        );

        let filters: Vec<Arc<dyn HandlerBuilderFilter>> =
            vec![Arc::new(Wrapping("first")), Arc::new(Wrapping("second"))];
        let chain = factory(registry, filters).handler_chain("github").unwrap();

        assert_eq!(chain.handler_names(), vec!["first", "second", "configured"]);
    }
}
