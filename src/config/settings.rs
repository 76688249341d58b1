//! Process settings read from the environment (and `.env` when present).
//!
//! Settings are resolved once by the binary and passed by value into the
//! components that need them.

use crate::db::Backend;
use crate::error::ConfigError;
use std::net::IpAddr;
use std::path::PathBuf;

pub const DEFAULT_EXTENSIONS_DIR: &str = "plugins";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/app.db?mode=rwc";
pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Settings {
    pub backend: Backend,
    pub database_url: String,
    pub extensions_dir: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub max_body_bytes: usize,
}

impl Settings {
    /// Load `.env` (if any) and read settings from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match get("DATABASE_TYPE") {
            Some(name) => name.parse()?,
            None => Backend::Sqlite,
        };
        let database_url = match (get("DATABASE_URL"), backend) {
            (Some(url), _) => url,
            (None, Backend::Sqlite) => DEFAULT_DATABASE_URL.to_string(),
            (None, Backend::Postgres) => return Err(ConfigError::Missing("DATABASE_URL")),
        };
        let extensions_dir = get("EXTENSIONS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXTENSIONS_DIR));
        let host = match get("HOST") {
            Some(h) => h.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "HOST",
                message: e.to_string(),
            })?,
            None => IpAddr::from([0, 0, 0, 0]),
        };
        let port = match get("PORT") {
            Some(p) => p.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: "PORT",
                message: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };
        let max_body_bytes = match get("MAX_BODY_BYTES") {
            Some(n) => n.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: "MAX_BODY_BYTES",
                message: e.to_string(),
            })?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(Settings {
            backend,
            database_url,
            extensions_dir,
            host,
            port,
            max_body_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_to_local_sqlite() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.backend, Backend::Sqlite);
        assert_eq!(s.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(s.extensions_dir, PathBuf::from("plugins"));
        assert_eq!(s.port, 8081);
        assert_eq!(s.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn postgres_requires_a_url() {
        let err = settings(&[("DATABASE_TYPE", "PostgreSQL")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));

        let s = settings(&[
            ("DATABASE_TYPE", "postgres"),
            ("DATABASE_URL", "postgres://localhost/app"),
        ])
        .unwrap();
        assert_eq!(s.backend, Backend::Postgres);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = settings(&[("DATABASE_TYPE", "sqlserver")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedBackend(ref n) if n == "sqlserver"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = settings(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let s = settings(&[("EXTENSIONS_DIR", "  "), ("PORT", "9000")]).unwrap();
        assert_eq!(s.extensions_dir, PathBuf::from("plugins"));
        assert_eq!(s.port, 9000);
    }
}
