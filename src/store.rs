//! Storage preparation before the first connection, and the `plugin_config` record of
//! which extensions were active at the last boot.

use crate::config::Settings;
use crate::db::{Backend, ConnectionProvider};
use crate::error::{BootError, ConfigError};
use crate::extension::ExtensionModule;
use sqlx::{ConnectOptions, Connection};
use std::path::PathBuf;
use std::str::FromStr;

const PLUGIN_TABLE: &str = "plugin_config";

/// Make sure the configured database can be opened: for SQLite, create the directory
/// holding the file; for PostgreSQL, create the database if it does not exist.
pub async fn prepare_database(settings: &Settings) -> Result<(), BootError> {
    match settings.backend {
        Backend::Sqlite => {
            if let Some(dir) = sqlite_parent_dir(&settings.database_url) {
                if !dir.as_os_str().is_empty() && !dir.exists() {
                    tracing::info!(path = %dir.display(), "creating database directory");
                    std::fs::create_dir_all(&dir)?;
                }
            }
            Ok(())
        }
        Backend::Postgres => ensure_database_exists(&settings.database_url).await,
    }
}

/// Directory of the file named by a `sqlite:` URL. None for in-memory databases.
fn sqlite_parent_dir(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or("");
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    PathBuf::from(path).parent().map(PathBuf::from)
}

/// Connect to the `postgres` maintenance database and run CREATE DATABASE when the
/// target is missing.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), BootError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url).map_err(|e| {
        ConfigError::Invalid {
            key: "DATABASE_URL",
            message: e.to_string(),
        }
    })?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&db_name)
            .fetch_one(&mut conn)
            .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), ConfigError> {
    let invalid = || ConfigError::Invalid {
        key: "DATABASE_URL",
        message: "no database path".into(),
    };
    let authority_start = url.find("://").ok_or_else(invalid)? + 3;
    let path_start = url[authority_start..]
        .find('/')
        .map(|i| authority_start + i + 1)
        .ok_or_else(invalid)?;
    let path_and_query = &url[path_start..];
    let (db_name, query) = match path_and_query.split_once('?') {
        Some((name, q)) => (name.trim(), Some(q)),
        None => (path_and_query.trim(), None),
    };
    let mut admin_url = format!("{}postgres", &url[..path_start]);
    if let Some(q) = query {
        admin_url.push('?');
        admin_url.push_str(q);
    }
    Ok((admin_url, db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Make `plugin_config` describe exactly the loaded extensions: upsert one active row
/// per module keyed by `plugin_name`, and mark every other row inactive. Runs as one
/// transaction.
pub async fn record_extensions(
    provider: &dyn ConnectionProvider,
    modules: &[ExtensionModule],
) -> Result<(), sqlx::Error> {
    let backend = provider.backend();
    let upsert = format!(
        "INSERT INTO {t} (plugin_name, class_name, description, is_active) VALUES ({}, {}, {}, 1) \
         ON CONFLICT (plugin_name) DO UPDATE SET class_name = excluded.class_name, \
         description = excluded.description, is_active = 1",
        backend.placeholder(1),
        backend.placeholder(2),
        backend.placeholder(3),
        t = PLUGIN_TABLE,
    );
    let mut conn = provider.open().await?;
    let mut tx = conn.begin().await?;
    for m in modules {
        let package = m
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| m.id.clone());
        let description = m.description.clone().unwrap_or_else(|| m.name.clone());
        sqlx::query(&upsert)
            .bind(m.id.clone())
            .bind(package)
            .bind(description)
            .execute(&mut *tx)
            .await?;
        tracing::debug!(id = %m.id, version = %m.version, "recorded extension");
    }

    let deactivate = deactivate_sql(backend, modules.len());
    let mut query = sqlx::query(&deactivate);
    for m in modules {
        query = query.bind(m.id.clone());
    }
    let done = query.execute(&mut *tx).await?;
    tx.commit().await?;
    if done.rows_affected() > 0 {
        tracing::info!(count = done.rows_affected(), "marked missing extensions inactive");
    }
    Ok(())
}

/// `UPDATE ... SET is_active = 0` for rows whose plugin was not loaded this time.
fn deactivate_sql(backend: Backend, loaded: usize) -> String {
    let mut sql = format!("UPDATE {} SET is_active = 0 WHERE is_active <> 0", PLUGIN_TABLE);
    if loaded > 0 {
        let phs: Vec<String> = (1..=loaded).map(|n| backend.placeholder(n)).collect();
        sql.push_str(&format!(" AND plugin_name NOT IN ({})", phs.join(", ")));
    }
    sql
}
