//! Per-route proxy configuration.
//!
//! The host hands each route an untyped string-keyed table. It is checked
//! once at load time and turned into an immutable [`ProxyConfig`].

use thiserror::Error;
use url::Url;

/// The untyped per-route map owned by the host.
pub type RawConfig = toml::Table;

pub const HOST_KEY: &str = "host";
pub const PRESERVE_HOST_KEY: &str = "preserveHost";

/// Destination schemes a route may point at.
pub const ACCEPTED_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// Route activation failures. Fatal to the route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing config")]
    MissingConfig,

    #[error("Missing host config")]
    NoHost,

    #[error("Bad host config: {0}")]
    BadHost(String),

    #[error("Bad preserve host")]
    BadPreserveHost,
}

/// Validated destination for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Base URL every request is forwarded to.
    pub destination: Url,
    /// Forward the inbound `Host` instead of the destination's.
    pub preserve_host: bool,
}

impl ProxyConfig {
    pub fn new(destination: Url, preserve_host: bool) -> Self {
        Self {
            destination,
            preserve_host,
        }
    }

    /// Validate the host's table for one route.
    pub fn from_raw(raw: Option<&RawConfig>) -> Result<Self, ConfigError> {
        let raw = raw.ok_or(ConfigError::MissingConfig)?;

        let host = raw.get(HOST_KEY).ok_or(ConfigError::NoHost)?;
        let host = host
            .as_str()
            .ok_or_else(|| ConfigError::BadHost(format!("expected a string, got {}", host.type_str())))?;
        let destination = parse_destination(host)?;

        let preserve_host = match raw.get(PRESERVE_HOST_KEY) {
            Some(value) => value.as_bool().ok_or(ConfigError::BadPreserveHost)?,
            None => false,
        };

        Ok(Self {
            destination,
            preserve_host,
        })
    }
}

fn parse_destination(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::BadHost(format!("{}: {}", raw, e)))?;
    if !ACCEPTED_SCHEMES.contains(&url.scheme()) {
        return Err(ConfigError::BadHost(format!(
            "unsupported scheme {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::BadHost(format!("{} has no host", raw)));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(raw: &str) -> RawConfig {
        raw.parse::<toml::Table>().unwrap()
    }

    #[test]
    fn init_cases() {
        let cases: Vec<(&str, Option<RawConfig>, Result<(), ConfigError>)> = vec![
            ("missing config", None, Err(ConfigError::MissingConfig)),
            ("missing host", Some(table("")), Err(ConfigError::NoHost)),
            ("ok", Some(table(r#"host = "http://host.bla""#)), Ok(())),
            (
                "bad preserve host",
                Some(table("host = \"http://host.bla\"\npreserveHost = \"x\"")),
                Err(ConfigError::BadPreserveHost),
            ),
            (
                "ok preserve host",
                Some(table("host = \"http://host.bla\"\npreserveHost = true")),
                Ok(()),
            ),
        ];

        for (name, raw, expected) in cases {
            let result = ProxyConfig::from_raw(raw.as_ref()).map(|_| ());
            assert_eq!(result, expected, "{}", name);
        }
    }

    #[test]
    fn bad_hosts() {
        for raw in [
            "host = 1",
            r#"host = "bad://sdf.xx:jj?""#,
            r#"host = "not a url""#,
            r#"host = "ftp://files.example""#,
        ] {
            assert!(
                matches!(
                    ProxyConfig::from_raw(Some(&table(raw))),
                    Err(ConfigError::BadHost(_))
                ),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn preserve_host_defaults_to_false() {
        let config = ProxyConfig::from_raw(Some(&table(r#"host = "http://localhost:8000""#))).unwrap();
        assert!(!config.preserve_host);
        assert_eq!(config.destination.as_str(), "http://localhost:8000/");
    }
}
