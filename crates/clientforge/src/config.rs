//! File and environment configuration of named clients
//!
//! ```toml
//! [logging]
//! level = "info,clientforge=debug"
//!
//! [clients.github]
//! base_address = "https://api.github.com/"
//! timeout_ms = 10000
//! redacted_headers = ["authorization"]
//!
//! [clients.github.headers]
//! accept = "application/vnd.github+json"
//! ```
//!
//! Environment variables with the `CLIENTFORGE` prefix override file settings,
//! using `__` as the nesting separator (e.g. `CLIENTFORGE__LOGGING__LEVEL=debug`).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::registry::ClientName;

/// Default environment variable prefix
pub const ENV_PREFIX: &str = "CLIENTFORGE";

/// Named clients and logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientsConfig {
    /// Client settings keyed by client name
    pub clients: HashMap<String, NamedClientConfig>,
    /// Log output settings
    pub logging: LoggingConfig,
}

impl HttpClientsConfig {
    /// Load configuration from a TOML, YAML or JSON file
    ///
    /// The format is chosen from the file extension. Environment variables with
    /// the [`ENV_PREFIX`] prefix override file settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// See [`HttpClientsConfig::from_file`].
    pub fn from_file_with_prefix(path: impl AsRef<Path>, env_prefix: &str) -> ClientResult<Self> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ClientError::ConfigFileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ClientError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ClientError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Validate every client entry, sorted by name
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`] for the first invalid entry.
    pub(crate) fn prepare(&self) -> ClientResult<Vec<PreparedClient>> {
        let mut names: Vec<&String> = self.clients.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.clients[name].prepare(name))
            .collect()
    }
}

/// Settings of one named client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamedClientConfig {
    /// Base address relative request paths are resolved against
    pub base_address: Option<String>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Default request headers
    pub headers: HashMap<String, String>,
    /// Headers whose values are logged as `*`
    pub redacted_headers: Vec<String>,
}

impl NamedClientConfig {
    fn prepare(&self, name: &str) -> ClientResult<PreparedClient> {
        let name = ClientName::new(name)?;

        let base_address = self
            .base_address
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| ClientError::invalid_argument("base_address", format!("{name}: {e}")))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (key, value) in &self.headers {
            let header = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ClientError::invalid_argument("headers", format!("{name}: {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::invalid_argument("headers", format!("{name}: {key}: {e}")))?;
            headers.insert(header, value);
        }

        let redacted_headers = self
            .redacted_headers
            .iter()
            .map(|key| {
                HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    ClientError::invalid_argument("redacted_headers", format!("{name}: {key}: {e}"))
                })
            })
            .collect::<ClientResult<Vec<_>>>()?;

        Ok(PreparedClient {
            name,
            base_address,
            timeout: self.timeout_ms.map(Duration::from_millis),
            headers,
            redacted_headers,
        })
    }
}

/// A validated client entry ready to be registered
#[derive(Debug)]
pub(crate) struct PreparedClient {
    pub(crate) name: ClientName,
    pub(crate) base_address: Option<Url>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) headers: HeaderMap,
    pub(crate) redacted_headers: Vec<HeaderName>,
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Install a global `tracing` subscriber writing to stderr
    ///
    /// `RUST_LOG` takes precedence over [`LoggingConfig::level`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Logging`] if a global subscriber is already set.
    pub fn init(&self) -> ClientResult<()> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let subscriber = tracing_subscriber::registry().with(filter);

        if self.json {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| ClientError::logging(e.to_string()))
        } else {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| ClientError::logging(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::Builder;

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_file_toml() {
        let file = write_config(
            ".toml",
            r#"
            [logging]
            level = "debug"
            json = true

            [clients.github]
            base_address = "https://api.github.com/"
            timeout_ms = 2500
            redacted_headers = ["authorization"]

            [clients.github.headers]
            accept = "application/vnd.github+json"
            "#,
        );

        let config = HttpClientsConfig::from_file_with_prefix(file.path(), "CLIENTFORGE_TEST_TOML")
            .unwrap();
        assert_eq!(
            config.logging,
            LoggingConfig {
                level: "debug".to_string(),
                json: true,
            }
        );

        let github = &config.clients["github"];
        assert_eq!(github.base_address.as_deref(), Some("https://api.github.com/"));
        assert_eq!(github.timeout_ms, Some(2500));
        assert_eq!(github.headers["accept"], "application/vnd.github+json");
        assert_eq!(github.redacted_headers, vec!["authorization".to_string()]);
    }

    #[test]
    fn test_from_file_json() {
        let file = write_config(
            ".json",
            r#"{ "clients": { "status": { "base_address": "https://status.example.com/" } } }"#,
        );

        let config = HttpClientsConfig::from_file_with_prefix(file.path(), "CLIENTFORGE_TEST_JSON")
            .unwrap();
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.clients.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = HttpClientsConfig::from_file("/nonexistent/clientforge.toml").unwrap_err();
        assert!(matches!(err, ClientError::ConfigFileNotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_config(".ini", "clients = 1");
        let err = HttpClientsConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedFormat));
    }

    #[test]
    fn test_prepare_sorted_and_parsed() {
        let mut config = HttpClientsConfig::default();
        config.clients.insert(
            "b".to_string(),
            NamedClientConfig {
                timeout_ms: Some(100),
                ..Default::default()
            },
        );
        config.clients.insert(
            "a".to_string(),
            NamedClientConfig {
                base_address: Some("https://a.example.com/".to_string()),
                headers: HashMap::from([("x-api-version".to_string(), "2".to_string())]),
                ..Default::default()
            },
        );

        let prepared = config.prepare().unwrap();
        assert_eq!(prepared[0].name.as_str(), "a");
        assert_eq!(prepared[0].headers["x-api-version"], "2");
        assert_eq!(prepared[1].timeout, Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_prepare_rejects_invalid_entries() {
        let mut config = HttpClientsConfig::default();
        config.clients.insert(
            "github".to_string(),
            NamedClientConfig {
                base_address: Some("not a url".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(config.prepare().unwrap_err().parameter(), Some("base_address"));

        let mut config = HttpClientsConfig::default();
        config.clients.insert(" ".to_string(), NamedClientConfig::default());
        assert_eq!(config.prepare().unwrap_err().parameter(), Some("name"));

        let mut config = HttpClientsConfig::default();
        config.clients.insert(
            "github".to_string(),
            NamedClientConfig {
                redacted_headers: vec!["bad header".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(
            config.prepare().unwrap_err().parameter(),
            Some("redacted_headers")
        );
    }
}
