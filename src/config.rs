use std::path::PathBuf;

use crate::catalog::CatalogKind;

/// Server settings, read once from `CAMPUS_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub catalog: CatalogKind,
    /// Certificate and key paths; both or neither.
    pub tls: Option<(PathBuf, PathBuf)>,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            password: "campus".into(),
            max_connections: 256,
            compact_threshold: 1000,
            catalog: CatalogKind::Standard,
            tls: None,
            metrics_port: None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
    TlsPairIncomplete,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
            ConfigError::TlsPairIncomplete => {
                write!(f, "both CAMPUS_TLS_CERT and CAMPUS_TLS_KEY must be set, or neither")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let parsed = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            lookup(var)
                .map(|value| value.trim().parse().map_err(|_| ConfigError::Invalid { var, value }))
                .transpose()
        };
        let narrow = |var: &'static str, v: u64| -> Result<u16, ConfigError> {
            u16::try_from(v).map_err(|_| ConfigError::Invalid {
                var,
                value: v.to_string(),
            })
        };

        let port = match parsed("CAMPUS_PORT")? {
            Some(v) => narrow("CAMPUS_PORT", v)?,
            None => defaults.port,
        };
        let metrics_port = parsed("CAMPUS_METRICS_PORT")?
            .map(|v| narrow("CAMPUS_METRICS_PORT", v))
            .transpose()?;
        let max_connections = match parsed("CAMPUS_MAX_CONNECTIONS")? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    var: "CAMPUS_MAX_CONNECTIONS",
                    value: "0".into(),
                });
            }
            Some(v) => v as usize,
            None => defaults.max_connections,
        };
        let catalog = match lookup("CAMPUS_SLOT_CATALOG") {
            Some(value) => CatalogKind::parse(value.trim()).ok_or(ConfigError::Invalid {
                var: "CAMPUS_SLOT_CATALOG",
                value,
            })?,
            None => defaults.catalog,
        };
        let tls = match (lookup("CAMPUS_TLS_CERT"), lookup("CAMPUS_TLS_KEY")) {
            (None, None) => None,
            (Some(cert), Some(key)) => Some((PathBuf::from(cert), PathBuf::from(key))),
            _ => return Err(ConfigError::TlsPairIncomplete),
        };

        Ok(Config {
            port,
            bind: lookup("CAMPUS_BIND").unwrap_or(defaults.bind),
            data_dir: lookup("CAMPUS_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            password: lookup("CAMPUS_PASSWORD").unwrap_or(defaults.password),
            max_connections,
            compact_threshold: parsed("CAMPUS_COMPACT_THRESHOLD")?.unwrap_or(defaults.compact_threshold),
            catalog,
            tls,
            metrics_port,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = from(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:5433");
    }

    #[test]
    fn overrides() {
        let config = from(&[
            ("CAMPUS_PORT", "6543"),
            ("CAMPUS_SLOT_CATALOG", "Legacy"),
            ("CAMPUS_COMPACT_THRESHOLD", "50"),
            ("CAMPUS_METRICS_PORT", "9000"),
            ("CAMPUS_TLS_CERT", "cert.pem"),
            ("CAMPUS_TLS_KEY", "key.pem"),
        ])
        .unwrap();
        assert_eq!(config.port, 6543);
        assert_eq!(config.catalog, CatalogKind::Legacy);
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.metrics_port, Some(9000));
        assert_eq!(config.tls, Some((PathBuf::from("cert.pem"), PathBuf::from("key.pem"))));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            from(&[("CAMPUS_PORT", "70000")]),
            Err(ConfigError::Invalid { var: "CAMPUS_PORT", .. })
        ));
        assert!(matches!(
            from(&[("CAMPUS_MAX_CONNECTIONS", "lots")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            from(&[("CAMPUS_MAX_CONNECTIONS", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            from(&[("CAMPUS_SLOT_CATALOG", "hourly")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert_eq!(from(&[("CAMPUS_TLS_KEY", "key.pem")]), Err(ConfigError::TlsPairIncomplete));
    }
}
