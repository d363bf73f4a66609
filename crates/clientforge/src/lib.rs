//! # clientforge
//!
//! Named and typed HTTP client registration for a small dependency container.
//!
//! Applications describe their outbound HTTP clients once at startup, under a
//! logical name, and resolve ready-to-use clients from the frozen
//! [`ServiceProvider`] later:
//!
//! - any number of independent configuration steps may target the same name;
//!   they are kept in registration order and replayed against every client
//!   created for that name
//! - typed clients bind a domain type to a name and become resolvable services
//! - the shared infrastructure (client factory, handler builder factory and
//!   logging filter) is registered idempotently by every entry point
//!
//! ## Architecture
//!
//! ```text
//! ServiceCollection ──add_http_client*──▶ ClientOptionsRegistry (per-name contributions)
//!        │                                         │
//!   build_provider                               freeze
//!        ▼                                         ▼
//! ServiceProvider ──▶ DefaultHttpClientFactory ◀── ClientOptions
//!                              │
//!                  HandlerBuilder ─▶ HandlerChain ─▶ reqwest::Client
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use clientforge::{
//!     ClientResult, HttpClient, HttpClientServiceCollectionExt, ServiceCollection,
//!     ServiceProvider, TypedClient,
//! };
//! use reqwest::header::{ACCEPT, HeaderValue};
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
//!
//! # async fn example() -> ClientResult<()> {
//! let mut services = ServiceCollection::new();
//! services
//!     .add_typed_client_named::<GitHubClient>("github")?
//!     .set_base_address("https://api.github.com/".parse().unwrap())
//!     .configure_client(|client| {
//!         client.insert_default_header(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
//!     });
//!
//! let provider = services.build_provider();
//! let github = provider.get_required::<GitHubClient>()?;
//! let response = github.http.get("repos/rust-lang/rust").await?;
//! println!("status: {}", response.status());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod builder;
pub mod client;
pub mod config;
pub mod container;
pub mod error;
pub mod extensions;
pub mod factory;
pub mod handler;
pub mod logging;
pub mod registry;
pub mod typed;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{HttpClientsConfig, LoggingConfig, NamedClientConfig};
pub use container::{
    ServiceCollection, ServiceDescriptor, ServiceLifetime, ServiceProvider, Slot, TypeKey,
};
pub use error::{ClientError, ClientResult};
pub use extensions::HttpClientServiceCollectionExt;
pub use factory::{
    BuilderAction, DefaultHandlerBuilderFactory, DefaultHttpClientFactory, HandlerBuilderFactory,
    HandlerBuilderFilter, HttpClientFactory,
};
pub use handler::{DelegatingHandler, HandlerBuilder, HandlerChain, Next};
pub use logging::{ClientLoggingHandler, LoggingHandlerBuilderFilter, LoggingScopeHandler};
pub use registry::{
    ClientMutator, ClientName, ClientOptions, ClientOptionsRegistry, Contribution,
    HandlerBuilderMutator, TypedBinding,
};
pub use typed::{DefaultTypedClientFactory, TypedClient, TypedClientFactory};
