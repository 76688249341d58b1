//! Connection provider: one configured backend, a fresh connection per call.

use crate::config::Settings;
use crate::error::ConfigError;
use async_trait::async_trait;
use sqlx::{AnyConnection, Connection, PgConnection, SqliteConnection};
use std::fmt;
use std::str::FromStr;

/// Storage backends compiled into this build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            _ => Err(ConfigError::UnsupportedBackend(s.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        })
    }
}

impl Backend {
    /// Placeholder for the `n`th (1-based) bound parameter.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Backend::Sqlite => "?".to_string(),
            Backend::Postgres => format!("${}", n),
        }
    }

    /// Quote a name that already passed the identifier grammar.
    ///
    /// SQLite gets backticks: a double-quoted name matching no column silently becomes a
    /// string literal there. PostgreSQL gets the lower-cased name in double quotes, which
    /// is what unquoted DDL folds to.
    pub fn quote_ident(self, name: &str) -> String {
        match self {
            Backend::Sqlite => format!("`{}`", name.replace('`', "``")),
            Backend::Postgres => format!("\"{}\"", name.to_lowercase().replace('"', "\"\"")),
        }
    }

    /// Left-hand side for comparing a column against a text parameter.
    /// PostgreSQL does not coerce text parameters to the column type.
    pub fn text_comparable(self, quoted_column: &str) -> String {
        match self {
            Backend::Sqlite => quoted_column.to_string(),
            Backend::Postgres => format!("CAST({} AS TEXT)", quoted_column),
        }
    }

    /// Column definition for an auto-incrementing integer primary key.
    pub fn auto_id(self) -> &'static str {
        match self {
            Backend::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Backend::Postgres => "SERIAL PRIMARY KEY",
        }
    }

    pub fn big_auto_id(self) -> &'static str {
        match self {
            Backend::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Backend::Postgres => "BIGSERIAL PRIMARY KEY",
        }
    }

    /// Expand the dialect tokens allowed in migration scripts.
    pub fn expand_tokens(self, sql: &str) -> String {
        sql.replace("{big_auto_id}", self.big_auto_id())
            .replace("{auto_id}", self.auto_id())
    }
}

/// A connection to the configured backend in its native driver, so rows of any column
/// type can be decoded.
pub enum DbConnection {
    Sqlite(SqliteConnection),
    Postgres(PgConnection),
}

/// What the record store and migration runner need from storage.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    fn backend(&self) -> Backend;

    /// Driver-neutral connection for bookkeeping statements whose column types are
    /// known (migrations, `plugin_config`). Closed when dropped.
    async fn open(&self) -> Result<AnyConnection, sqlx::Error>;

    /// Native connection for statements against arbitrary tables. Closed when dropped.
    async fn open_native(&self) -> Result<DbConnection, sqlx::Error>;
}

/// Opens unpooled sqlx connections to the configured database.
#[derive(Clone)]
pub struct ConnectionFactory {
    backend: Backend,
    url: String,
}

impl ConnectionFactory {
    pub fn new(backend: Backend, url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        let scheme_ok = match backend {
            Backend::Sqlite => url.starts_with("sqlite:"),
            Backend::Postgres => url.starts_with("postgres://") || url.starts_with("postgresql://"),
        };
        if !scheme_ok {
            return Err(ConfigError::Invalid {
                key: "DATABASE_URL",
                message: format!("url does not match database type {}", backend),
            });
        }
        sqlx::any::install_default_drivers();
        Ok(ConnectionFactory { backend, url })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Self::new(settings.backend, settings.database_url.clone())
    }
}

#[async_trait]
impl ConnectionProvider for ConnectionFactory {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn open(&self) -> Result<AnyConnection, sqlx::Error> {
        AnyConnection::connect(&self.url).await
    }

    async fn open_native(&self) -> Result<DbConnection, sqlx::Error> {
        Ok(match self.backend {
            Backend::Sqlite => DbConnection::Sqlite(SqliteConnection::connect(&self.url).await?),
            Backend::Postgres => DbConnection::Postgres(PgConnection::connect(&self.url).await?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("SQLite".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert_eq!("postgresql".parse::<Backend>().unwrap(), Backend::Postgres);
        assert!(matches!(
            "mysql".parse::<Backend>(),
            Err(ConfigError::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn placeholders_follow_dialect() {
        assert_eq!(Backend::Sqlite.placeholder(3), "?");
        assert_eq!(Backend::Postgres.placeholder(3), "$3");
        assert_eq!(Backend::Postgres.text_comparable("\"id\""), "CAST(\"id\" AS TEXT)");
        assert_eq!(Backend::Sqlite.text_comparable("`id`"), "`id`");
    }

    #[test]
    fn identifiers_quote_per_dialect() {
        assert_eq!(Backend::Sqlite.quote_ident("tableName"), "`tableName`");
        assert_eq!(Backend::Postgres.quote_ident("tableName"), "\"tablename\"");
        assert_eq!(Backend::Postgres.quote_ident("order"), "\"order\"");
    }

    #[test]
    fn tokens_expand_per_backend() {
        let sql = "CREATE TABLE t (id {auto_id}, n INT); CREATE TABLE u (id {big_auto_id})";
        let pg = Backend::Postgres.expand_tokens(sql);
        assert!(pg.contains("id SERIAL PRIMARY KEY"));
        assert!(pg.contains("id BIGSERIAL PRIMARY KEY"));
        let lite = Backend::Sqlite.expand_tokens(sql);
        assert!(!lite.contains('{'));
    }

    #[test]
    fn url_scheme_must_match_backend() {
        assert!(ConnectionFactory::new(Backend::Sqlite, "sqlite://x.db").is_ok());
        assert!(ConnectionFactory::new(Backend::Postgres, "sqlite://x.db").is_err());
    }
}
