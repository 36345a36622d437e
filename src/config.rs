//! Client configuration.
//!
//! [`ClientOptions`] is the resolved, immutable configuration snapshot built
//! by [`ClientBuilder`](crate::ClientBuilder) and handed to every manager at
//! construction. Per-kind caching behaviour lives in [`CachePolicy`].
//!
//! With the `config` feature, options can also be loaded from a TOML file
//! (see [`FileConfig`]). Resolution order:
//! 1. explicit path
//! 2. `~/.huginn/config.toml`
//!
//! The token may be omitted from the file and supplied via `HUGINN_TOKEN`.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::BoundedCache;
use crate::models::EntityKind;
use crate::rest::RetryConfig;
use crate::rest::http::DEFAULT_BASE_URL;
use crate::ws::DEFAULT_WS_URL;
use crate::{HuginnError, Result};

/// Default number of normalized events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Caching behaviour for one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Whether constructed entities are cached. Default: true.
    pub cache: bool,
    /// Maximum cached entries per manager. Default: unbounded.
    pub max: Option<usize>,
    /// Whether deletion purges the cache entry (true) or keeps a tombstone
    /// with `deleted_at` stamped (false). Default: true.
    pub dispose: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            cache: true,
            max: None,
            dispose: true,
        }
    }
}

impl CachePolicy {
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    pub fn max(mut self, max: Option<usize>) -> Self {
        self.max = max;
        self
    }

    pub fn dispose(mut self, enabled: bool) -> Self {
        self.dispose = enabled;
        self
    }

    /// Check the capacity the same way [`BoundedCache`] does.
    pub fn validate(&self) -> Result<()> {
        BoundedCache::<(), ()>::new(self.max).map(|_| ())
    }
}

/// Reconnect behaviour of the event stream.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Give up after this many consecutive failed connection attempts.
    /// `None` retries forever. Default: `None`.
    pub max_attempts: Option<u32>,
    /// Backoff between attempts.
    pub backoff: RetryConfig,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff: RetryConfig::new()
                .initial_delay(Duration::from_secs(1))
                .max_delay(Duration::from_secs(60)),
        }
    }
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub token: String,
    pub rest_url: String,
    pub ws_url: String,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    pub reconnect: ReconnectConfig,
    /// Broadcast buffer per event subscriber.
    pub event_capacity: usize,
    policies: HashMap<EntityKind, CachePolicy>,
}

impl ClientOptions {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            rest_url: DEFAULT_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            reconnect: ReconnectConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            policies: HashMap::new(),
        }
    }

    /// Cache policy for a kind (defaults when not configured).
    pub fn policy(&self, kind: EntityKind) -> CachePolicy {
        self.policies.get(&kind).copied().unwrap_or_default()
    }

    pub(crate) fn policy_mut(&mut self, kind: EntityKind) -> &mut CachePolicy {
        self.policies.entry(kind).or_default()
    }

    /// Validate the snapshot before it is shared.
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(HuginnError::Configuration("token must not be empty".into()));
        }
        if self.event_capacity == 0 {
            return Err(HuginnError::Configuration(
                "event capacity must be greater than zero".into(),
            ));
        }
        for (kind, policy) in &self.policies {
            policy
                .validate()
                .map_err(|e| HuginnError::Configuration(format!("{kind}: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(feature = "config")]
pub use file::FileConfig;

#[cfg(feature = "config")]
mod file {
    use std::collections::HashMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use serde::Deserialize;

    use super::{CachePolicy, ClientOptions};
    use crate::models::EntityKind;
    use crate::{HuginnError, Result};

    /// Environment variable consulted when the file has no token.
    pub const TOKEN_ENV_VAR: &str = "HUGINN_TOKEN";

    /// On-disk configuration.
    ///
    /// ```toml
    /// token = "gapi_..."
    ///
    /// [rest]
    /// timeout_secs = 15
    ///
    /// [cache.message]
    /// max = 500
    /// dispose = false
    /// ```
    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct FileConfig {
        #[serde(default)]
        pub token: Option<String>,
        #[serde(default)]
        pub rest: RestSection,
        #[serde(default)]
        pub ws: WsSection,
        #[serde(default)]
        pub retry: RetrySection,
        #[serde(default)]
        pub events: EventsSection,
        /// Cache policies keyed by entity kind name (e.g. `message`).
        #[serde(default)]
        pub cache: HashMap<String, CacheSection>,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct RestSection {
        #[serde(default)]
        pub url: Option<String>,
        #[serde(default)]
        pub timeout_secs: Option<u64>,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct WsSection {
        #[serde(default)]
        pub url: Option<String>,
        #[serde(default)]
        pub max_reconnect_attempts: Option<u32>,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct RetrySection {
        #[serde(default)]
        pub max_attempts: Option<u32>,
        #[serde(default)]
        pub initial_delay_ms: Option<u64>,
        #[serde(default)]
        pub max_delay_ms: Option<u64>,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct EventsSection {
        #[serde(default)]
        pub capacity: Option<usize>,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct CacheSection {
        #[serde(default)]
        pub enabled: Option<bool>,
        #[serde(default)]
        pub max: Option<usize>,
        #[serde(default)]
        pub dispose: Option<bool>,
    }

    impl FileConfig {
        /// Load configuration from the standard locations.
        pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
            let path = Self::resolve_path(explicit_path)?;
            let content = fs::read_to_string(&path).map_err(|e| {
                HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
            })?;
            Self::from_toml_str(&content).map_err(|e| {
                HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
            })
        }

        /// Parse configuration from a TOML string.
        pub fn from_toml_str(content: &str) -> Result<Self> {
            toml::from_str(content).map_err(|e| HuginnError::Configuration(e.to_string()))
        }

        fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
            if let Some(path) = explicit {
                if path.exists() {
                    return Ok(path.to_path_buf());
                }
                return Err(HuginnError::Configuration(format!(
                    "Config file not found: {path:?}"
                )));
            }

            if let Some(home) = dirs::home_dir() {
                let user_config = home.join(".huginn").join("config.toml");
                if user_config.exists() {
                    return Ok(user_config);
                }
            }

            Err(HuginnError::Configuration(
                "No config file found (looked in ~/.huginn/config.toml)".into(),
            ))
        }

        /// Resolve into a [`ClientOptions`] snapshot.
        ///
        /// The token falls back to `HUGINN_TOKEN` when absent from the file.
        pub fn into_options(self) -> Result<ClientOptions> {
            let token = self
                .token
                .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
                .ok_or_else(|| {
                    HuginnError::Configuration(format!(
                        "no token in config file and {TOKEN_ENV_VAR} is not set"
                    ))
                })?;

            let mut options = ClientOptions::new(token);
            if let Some(url) = self.rest.url {
                options.rest_url = url;
            }
            if let Some(secs) = self.rest.timeout_secs {
                options.request_timeout = Duration::from_secs(secs);
            }
            if let Some(url) = self.ws.url {
                options.ws_url = url;
            }
            options.reconnect.max_attempts = self.ws.max_reconnect_attempts;
            if let Some(n) = self.retry.max_attempts {
                options.retry.max_attempts = n;
            }
            if let Some(ms) = self.retry.initial_delay_ms {
                options.retry.initial_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = self.retry.max_delay_ms {
                options.retry.max_delay = Duration::from_millis(ms);
            }
            if let Some(capacity) = self.events.capacity {
                options.event_capacity = capacity;
            }

            for (name, section) in self.cache {
                let kind: EntityKind = name.parse()?;
                let policy = options.policy_mut(kind);
                *policy = CachePolicy {
                    cache: section.enabled.unwrap_or(policy.cache),
                    max: section.max.or(policy.max),
                    dispose: section.dispose.unwrap_or(policy.dispose),
                };
            }

            options.validate()?;
            Ok(options)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_cache_sections() {
            let config = FileConfig::from_toml_str(
                r#"
                token = "t"

                [cache.message]
                max = 500
                dispose = false

                [cache.member]
                enabled = false
                "#,
            )
            .unwrap();

            let options = config.into_options().unwrap();
            let message = options.policy(EntityKind::Message);
            assert_eq!(message.max, Some(500));
            assert!(!message.dispose);
            assert!(message.cache);
            assert!(!options.policy(EntityKind::Member).cache);
            assert_eq!(options.policy(EntityKind::Doc), CachePolicy::default());
        }

        #[test]
        fn rejects_unknown_kind() {
            let config = FileConfig::from_toml_str(
                r#"
                token = "t"
                [cache.emoji]
                max = 10
                "#,
            )
            .unwrap();
            assert!(config.into_options().is_err());
        }

        #[test]
        fn rejects_tiny_cache() {
            let config = FileConfig::from_toml_str(
                r#"
                token = "t"
                [cache.channel]
                max = 1
                "#,
            )
            .unwrap();
            assert!(config.into_options().is_err());
        }

        #[test]
        fn explicit_missing_path_is_error() {
            let err = FileConfig::load(Some(Path::new("/nonexistent/huginn.toml"))).unwrap_err();
            assert!(matches!(err, HuginnError::Configuration(_)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = CachePolicy::default();
        assert!(policy.cache);
        assert!(policy.dispose);
        assert_eq!(policy.max, None);
    }

    #[test]
    fn validate_rejects_empty_token() {
        assert!(ClientOptions::new("  ").validate().is_err());
        assert!(ClientOptions::new("gapi_x").validate().is_ok());
    }

    #[test]
    fn validate_rejects_capacity_one() {
        let mut options = ClientOptions::new("t");
        options.policy_mut(EntityKind::Message).max = Some(1);
        assert!(options.validate().is_err());
    }
}
