//! Apply pending migrations and record them in `_sys_migrations`.

use super::{MigrationPlan, MigrationUnit};
use crate::db::{Backend, ConnectionProvider};
use crate::error::MigrationError;
use sqlx::AnyConnection;
use sqlx::Connection;
use std::collections::HashMap;
use std::sync::Arc;

pub const MIGRATIONS_TABLE: &str = "_sys_migrations";

/// What a run did: versions applied now and versions that were already recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<i64>,
    pub skipped: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: String,
    pub source: String,
    /// None while pending.
    pub applied_at: Option<String>,
    /// False for recorded versions no loaded source provides any more.
    pub known: bool,
}

pub struct MigrationRunner {
    provider: Arc<dyn ConnectionProvider>,
}

impl MigrationRunner {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        MigrationRunner { provider }
    }

    /// Apply every unit in the plan that has no record yet, in plan order.
    /// Stops at the first failure; that unit's transaction is rolled back.
    pub async fn run(&self, plan: &MigrationPlan) -> Result<MigrationReport, MigrationError> {
        let backend = self.provider.backend();
        let mut conn = self.provider.open().await?;
        ensure_migrations_table(&mut conn).await?;
        let applied = applied_versions(&mut conn).await?;

        let mut report = MigrationReport::default();
        for unit in plan.units() {
            if applied.contains_key(&unit.version) {
                tracing::debug!(version = unit.version, source = %unit.source, "migration already applied");
                report.skipped.push(unit.version);
                continue;
            }
            tracing::info!(
                version = unit.version,
                description = %unit.description,
                source = %unit.source,
                "applying migration"
            );
            apply_unit(&mut conn, backend, unit).await?;
            report.applied.push(unit.version);
        }
        tracing::info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "migrations complete"
        );
        Ok(report)
    }

    /// Run the down script of an applied unit and delete its record. Operator use only.
    pub async fn rollback(&self, plan: &MigrationPlan, version: i64) -> Result<(), MigrationError> {
        let unit = plan.get(version).ok_or(MigrationError::UnknownVersion(version))?;
        let down = unit
            .down_sql
            .as_deref()
            .ok_or(MigrationError::Irreversible(version))?;

        let backend = self.provider.backend();
        let mut conn = self.provider.open().await?;
        ensure_migrations_table(&mut conn).await?;
        if !applied_versions(&mut conn).await?.contains_key(&version) {
            return Err(MigrationError::NotApplied(version));
        }

        let down = backend.expand_tokens(down);
        let mut tx = conn.begin().await?;
        tracing::debug!(sql = %down, "rollback");
        sqlx::raw_sql(&down)
            .execute(&mut *tx)
            .await
            .map_err(|e| apply_error(unit, e))?;
        let delete = format!(
            "DELETE FROM {} WHERE version = {}",
            MIGRATIONS_TABLE,
            backend.placeholder(1)
        );
        sqlx::query(&delete).bind(version).execute(&mut *tx).await?;
        tx.commit().await?;
        tracing::info!(version, source = %unit.source, "migration rolled back");
        Ok(())
    }

    /// Every unit in the plan with its applied state, then recorded versions the plan lacks.
    pub async fn status(&self, plan: &MigrationPlan) -> Result<Vec<MigrationStatus>, MigrationError> {
        let mut conn = self.provider.open().await?;
        ensure_migrations_table(&mut conn).await?;
        let mut recorded = applied_versions(&mut conn).await?;

        let mut out: Vec<MigrationStatus> = plan
            .units()
            .iter()
            .map(|u| MigrationStatus {
                version: u.version,
                description: u.description.clone(),
                source: u.source.clone(),
                applied_at: recorded.remove(&u.version).map(|r| r.applied_at),
                known: true,
            })
            .collect();
        let mut orphans: Vec<_> = recorded.into_iter().collect();
        orphans.sort_by_key(|(v, _)| *v);
        out.extend(orphans.into_iter().map(|(version, r)| MigrationStatus {
            version,
            description: r.description,
            source: r.source,
            applied_at: Some(r.applied_at),
            known: false,
        }));
        Ok(out)
    }
}

struct AppliedRecord {
    description: String,
    source: String,
    applied_at: String,
}

async fn ensure_migrations_table(conn: &mut AnyConnection) -> Result<(), sqlx::Error> {
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            version BIGINT PRIMARY KEY,
            description TEXT NOT NULL,
            source TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )
        "#,
        MIGRATIONS_TABLE
    );
    sqlx::query(&ddl).execute(&mut *conn).await?;
    Ok(())
}

async fn applied_versions(
    conn: &mut AnyConnection,
) -> Result<HashMap<i64, AppliedRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT version, description, source, applied_at FROM {} ORDER BY version",
        MIGRATIONS_TABLE
    );
    let rows: Vec<(i64, String, String, String)> =
        sqlx::query_as(&sql).fetch_all(&mut *conn).await?;
    Ok(rows
        .into_iter()
        .map(|(version, description, source, applied_at)| {
            (
                version,
                AppliedRecord {
                    description,
                    source,
                    applied_at,
                },
            )
        })
        .collect())
}

/// Up script and record insert in one transaction: both land or neither does.
async fn apply_unit(
    conn: &mut AnyConnection,
    backend: Backend,
    unit: &MigrationUnit,
) -> Result<(), MigrationError> {
    let up = backend.expand_tokens(&unit.up_sql);
    let mut tx = conn.begin().await?;
    tracing::debug!(sql = %up, "migrate");
    sqlx::raw_sql(&up)
        .execute(&mut *tx)
        .await
        .map_err(|e| apply_error(unit, e))?;

    let record = format!(
        "INSERT INTO {} (version, description, source, applied_at) VALUES ({}, {}, {}, {})",
        MIGRATIONS_TABLE,
        backend.placeholder(1),
        backend.placeholder(2),
        backend.placeholder(3),
        backend.placeholder(4)
    );
    sqlx::query(&record)
        .bind(unit.version)
        .bind(unit.description.clone())
        .bind(unit.source.clone())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| apply_error(unit, e))?;
    tx.commit().await.map_err(|e| apply_error(unit, e))?;
    Ok(())
}

fn apply_error(unit: &MigrationUnit, cause: sqlx::Error) -> MigrationError {
    MigrationError::ApplyFailure {
        version: unit.version,
        description: unit.description.clone(),
        source_name: unit.source.clone(),
        cause,
    }
}
