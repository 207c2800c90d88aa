// src/config.rs
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::local_cache::DEFAULT_ENDPOINT;

pub const ENV_PREFIX: &str = "EXTRACLASSE_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read environment configuration")]
    Env(#[from] envy::Error),

    #[error("Invalid bind address '{0}'")]
    BindAddr(String),

    #[error("Invalid default endpoint URL")]
    Endpoint(#[from] url::ParseError),

    #[error("TLS needs both a certificate and a key path")]
    IncompleteTls,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./extraclasse_data")
}

fn default_remote_timeout_secs() -> u64 {
    30
}

/// `EXTRACLASSE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default)]
    pub default_endpoint: Option<String>,
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed(ENV_PREFIX).from_env::<AppConfig>()?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::BindAddr(self.bind_addr.clone()))
    }

    /// Used when local storage has no endpoint of its own.
    pub fn default_endpoint(&self) -> Result<Url, ConfigError> {
        let raw = self.default_endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        Ok(Url::parse(raw)?)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// Certificate and key, when TLS is configured.
    pub fn tls_paths(&self) -> Result<Option<(PathBuf, PathBuf)>, ConfigError> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Ok(Some((cert.clone(), key.clone()))),
            (None, None) => Ok(None),
            _ => Err(ConfigError::IncompleteTls),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<AppConfig, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.socket_addr().unwrap(), "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.storage_dir, PathBuf::from("./extraclasse_data"));
        assert_eq!(config.default_endpoint().unwrap().as_str(), DEFAULT_ENDPOINT);
        assert_eq!(config.remote_timeout(), Duration::from_secs(30));
        assert!(config.tls_paths().unwrap().is_none());
    }

    #[test]
    fn prefixed_values_are_read() {
        let config = from_pairs(&[
            ("EXTRACLASSE_BIND_ADDR", "0.0.0.0:8443"),
            ("EXTRACLASSE_STORAGE_DIR", "/var/lib/extraclasse"),
            ("EXTRACLASSE_DEFAULT_ENDPOINT", "http://localhost:8080/exec"),
            ("EXTRACLASSE_CERT_PATH", "cert.pem"),
            ("EXTRACLASSE_KEY_PATH", "key.pem"),
            ("EXTRACLASSE_REMOTE_TIMEOUT_SECS", "5"),
            ("UNRELATED", "x"),
        ])
        .unwrap();
        assert_eq!(config.socket_addr().unwrap().port(), 8443);
        assert_eq!(config.default_endpoint().unwrap().as_str(), "http://localhost:8080/exec");
        assert_eq!(
            config.tls_paths().unwrap(),
            Some((PathBuf::from("cert.pem"), PathBuf::from("key.pem")))
        );
        assert_eq!(config.remote_timeout_secs, 5);
    }

    #[test]
    fn bad_values_are_reported() {
        let config = from_pairs(&[("EXTRACLASSE_BIND_ADDR", "localhost")]).unwrap();
        assert!(matches!(config.socket_addr(), Err(ConfigError::BindAddr(_))));

        let config = from_pairs(&[("EXTRACLASSE_CERT_PATH", "cert.pem")]).unwrap();
        assert!(matches!(config.tls_paths(), Err(ConfigError::IncompleteTls)));

        assert!(from_pairs(&[("EXTRACLASSE_REMOTE_TIMEOUT_SECS", "soon")]).is_err());
    }
}
