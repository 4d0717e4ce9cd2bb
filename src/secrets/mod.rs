use crate::error::{PaymentError, Result};
use secrecy::Secret;
use serde::{Deserialize, Deserializer};
use std::env;
use std::fs;
use tracing::debug;

/// Secret string wrapper that prevents accidental exposure
pub type SecretString = Secret<String>;

/// Resolve a secret reference.
///
/// Supports formats:
/// - "env://VAR" - Load from environment variable
/// - "file:///path/to/file" - Load from file (e.g. a mounted Kubernetes secret)
/// - Any other value is returned as-is
pub fn resolve_secret_ref(value: &str) -> Result<String> {
    if let Some(env_var) = value.strip_prefix("env://") {
        debug!("Resolving environment variable: {}", env_var);
        env::var(env_var).map_err(|_| {
            PaymentError::Config(format!("Environment variable '{}' not found", env_var))
        })
    } else if let Some(path) = value.strip_prefix("file://") {
        debug!("Resolving file reference: {}", path);
        fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| PaymentError::Config(format!("Failed to read file {}: {}", path, e)))
    } else {
        Ok(value.to_string())
    }
}

/// Deserialize an optional secret, resolving references on the way in.
/// Empty strings count as absent.
pub fn deserialize_optional_secret<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => resolve_secret_ref(s.trim())
            .map(|resolved| Some(Secret::new(resolved)))
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "deserialize_optional_secret")]
        key: Option<SecretString>,
    }

    #[test]
    fn test_resolve_plain_and_env() {
        std::env::set_var("CULQI_PAYMENTS_TEST_SECRET", "sk_test_env");

        assert_eq!(resolve_secret_ref("sk_test_plain").unwrap(), "sk_test_plain");
        assert_eq!(
            resolve_secret_ref("env://CULQI_PAYMENTS_TEST_SECRET").unwrap(),
            "sk_test_env"
        );
        assert!(resolve_secret_ref("env://CULQI_PAYMENTS_MISSING_VAR").is_err());

        std::env::remove_var("CULQI_PAYMENTS_TEST_SECRET");
    }

    #[test]
    fn test_resolve_file_reference() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sk_test_file").unwrap();

        let reference = format!("file://{}", file.path().display());
        assert_eq!(resolve_secret_ref(&reference).unwrap(), "sk_test_file");
    }

    #[test]
    fn test_deserialize_optional_secret() {
        let holder: Holder = serde_yaml::from_str("key: sk_test_abc").unwrap();
        assert_eq!(holder.key.unwrap().expose_secret(), "sk_test_abc");

        let holder: Holder = serde_yaml::from_str("key: ''").unwrap();
        assert!(holder.key.is_none());

        let holder: Holder = serde_yaml::from_str("{}").unwrap();
        assert!(holder.key.is_none());

        assert!(serde_yaml::from_str::<Holder>("key: env://CULQI_PAYMENTS_NOT_SET").is_err());
    }
}
