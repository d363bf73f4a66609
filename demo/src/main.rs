//! clientforge demo
//!
//! Loads named clients from `clientforge.toml` (or the path given as the first
//! argument), binds a typed client to one of them and issues a request.
//!
//! ```text
//! cargo run -p clientforge-demo -- demo/clientforge.toml
//! ```

use std::sync::Arc;

use clientforge::{
    ClientResult, HttpClient, HttpClientFactory, HttpClientServiceCollectionExt,
    HttpClientsConfig, ServiceCollection, ServiceProvider, TypedClient,
};
use reqwest::header::{HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct Origin {
    origin: String,
}

/// Typed wrapper over the `httpbin` client
struct HttpBin {
    http: HttpClient,
}

impl HttpBin {
    async fn origin(&self) -> ClientResult<Origin> {
        Ok(self.http.get("ip").await?.json().await?)
    }
}

impl TypedClient for HttpBin {
    fn client_name() -> &'static str {
        "httpbin"
    }

    fn from_http_client(http: HttpClient, _: &ServiceProvider) -> ClientResult<Self> {
        Ok(Self { http })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demo/clientforge.toml".to_string());
    let config = HttpClientsConfig::from_file(&path)?;
    config.logging.init()?;

    let mut services = ServiceCollection::new();
    services.add_http_clients_from_config(&config)?;
    let _ = services
        .add_typed_client::<HttpBin>()?
        .configure_client(|client| {
            client.insert_default_header(USER_AGENT, HeaderValue::from_static("clientforge-demo"));
        });

    let provider = services.build_provider();
    info!(clients = ?provider.client_options().names(), "service provider ready");

    let httpbin = provider.get_required::<HttpBin>()?;
    let origin = httpbin.origin().await?;
    info!(origin = %origin.origin, "typed client request succeeded");

    let factory = provider.get_required::<Arc<dyn HttpClientFactory>>()?;
    let status = factory.create_client("httpbin")?.get("status/204").await?;
    info!(status = status.status().as_u16(), "named client request succeeded");

    Ok(())
}
