use crate::cache::TokenCacheConfig;
use crate::circuit_breaker::{CircuitBreakerConfig, RetryConfig};
use crate::culqi::validation::ChargeLimits;
use crate::error::{PaymentError, Result};
use crate::secrets::{deserialize_optional_secret, SecretString};
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Production Culqi API endpoint
pub const DEFAULT_CULQI_BASE_URL: &str = "https://api.culqi.com/v2";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Culqi client configuration
    #[serde(default)]
    pub culqi: CulqiConfig,
    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Culqi gateway client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CulqiConfig {
    /// Secret key used as bearer credential (required)
    #[serde(default, deserialize_with = "deserialize_optional_secret")]
    pub secret_key: Option<SecretString>,
    /// Public key, used for token issuance when present
    #[serde(default, deserialize_with = "deserialize_optional_secret")]
    pub public_key: Option<SecretString>,
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for each individual call in milliseconds
    #[serde(default = "default_culqi_timeout_ms")]
    pub timeout_ms: u64,
    /// Metadata attached to every charge; caller metadata wins on conflicts
    #[serde(default)]
    pub default_metadata: Map<String, Value>,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub token_cache: TokenCacheConfig,
    #[serde(default)]
    pub limits: ChargeLimits,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Expose /metrics
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    60
}

fn default_base_url() -> String {
    DEFAULT_CULQI_BASE_URL.to_string()
}

fn default_culqi_timeout_ms() -> u64 {
    30_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for CulqiConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            public_key: None,
            base_url: default_base_url(),
            timeout_ms: default_culqi_timeout_ms(),
            default_metadata: Map::new(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            token_cache: TokenCacheConfig::default(),
            limits: ChargeLimits::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl CulqiConfig {
    /// Minimal configuration for a given secret key
    pub fn with_secret_key(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: Some(Secret::new(secret_key.into())),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PaymentError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| PaymentError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("CULQI_SECRET_KEY") {
            info!("Using Culqi secret key from environment");
            self.culqi.secret_key = Some(Secret::new(key.trim().to_string()));
        }
        if let Some(key) = non_empty("CULQI_PUBLIC_KEY") {
            self.culqi.public_key = Some(Secret::new(key.trim().to_string()));
        }
        if let Some(url) = non_empty("CULQI_BASE_URL") {
            self.culqi.base_url = url.trim().to_string();
        }
        if let Some(host) = non_empty("HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| PaymentError::Config(format!("Invalid PORT value: {}", port)))?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.timeout_secs == 0 {
            return Err(PaymentError::Config(
                "Server timeout must be > 0".to_string(),
            ));
        }

        let culqi = &self.culqi;
        let url = Url::parse(&culqi.base_url).map_err(|e| {
            PaymentError::Config(format!("Invalid Culqi base URL '{}': {}", culqi.base_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PaymentError::Config(format!(
                "Culqi base URL must start with http:// or https://: {}",
                culqi.base_url
            )));
        }

        if culqi.timeout_ms == 0 {
            return Err(PaymentError::Config(
                "Culqi timeout must be > 0".to_string(),
            ));
        }

        if culqi.circuit_breaker.failure_threshold == 0 {
            return Err(PaymentError::Config(
                "Circuit breaker failure threshold must be > 0".to_string(),
            ));
        }

        if culqi.token_cache.enabled && culqi.token_cache.ttl_ms == 0 {
            return Err(PaymentError::Config(
                "Token cache TTL must be > 0 when the cache is enabled".to_string(),
            ));
        }

        if !(culqi.limits.max_amount > 0.0) {
            return Err(PaymentError::Config(
                "Maximum charge amount must be > 0".to_string(),
            ));
        }

        if culqi.limits.allowed_currencies.is_empty() {
            return Err(PaymentError::Config(
                "At least one currency must be allowed".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 3000
  timeout_secs: 30

culqi:
  secret_key: "sk_test_123"
  public_key: "pk_test_456"
  base_url: "https://api.culqi.com/v2"
  timeout_ms: 5000
  default_metadata:
    integration: "backend"
  circuit_breaker:
    failure_threshold: 3
    cooldown_ms: 1000
  retry:
    max_retries: 2
    base_delay_ms: 500
  token_cache:
    ttl_ms: 60000
  limits:
    max_amount: 500.0
    allowed_currencies: ["PEN"]

metrics:
  enabled: false
"#;

        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(
            config.culqi.secret_key.as_ref().unwrap().expose_secret(),
            "sk_test_123"
        );
        assert_eq!(config.culqi.timeout(), Duration::from_secs(5));
        assert_eq!(config.culqi.default_metadata["integration"], "backend");
        assert_eq!(config.culqi.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.culqi.retry.max_retries, 2);
        assert_eq!(config.culqi.retry.max_delay_ms, 30_000);
        assert_eq!(config.culqi.token_cache.ttl_ms, 60_000);
        assert_eq!(config.culqi.limits.allowed_currencies, vec!["PEN"]);
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(config.culqi.secret_key.is_none());
        assert_eq!(config.culqi.base_url, DEFAULT_CULQI_BASE_URL);
        assert_eq!(config.culqi.timeout_ms, 30_000);
        assert_eq!(config.culqi.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.culqi.circuit_breaker.cooldown_ms, 60_000);
        assert_eq!(config.culqi.retry.max_retries, 3);
        assert_eq!(config.culqi.retry.base_delay_ms, 1000);
        assert!(config.culqi.token_cache.enabled);
        assert_eq!(config.culqi.limits.allowed_currencies, vec!["PEN", "USD"]);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CULQI_SECRET_KEY", " sk_live_env "),
            ("CULQI_BASE_URL", "http://localhost:9000/v2"),
            ("CULQI_PUBLIC_KEY", ""),
            ("PORT", "9090"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(
            config.culqi.secret_key.as_ref().unwrap().expose_secret(),
            "sk_live_env"
        );
        assert!(config.culqi.public_key.is_none());
        assert_eq!(config.culqi.base_url, "http://localhost:9000/v2");
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_invalid_base_url() {
        let mut config = AppConfig::default();
        config.culqi.base_url = "ftp://api.culqi.com".to_string();
        assert!(config.validate().is_err());

        config.culqi.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_limits() {
        let mut config = AppConfig::default();
        config.culqi.limits.allowed_currencies.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.culqi.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: 7070").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 7070);

        assert!(AppConfig::from_file("/nonexistent/culqi.yaml").is_err());
    }
}
