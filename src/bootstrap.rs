//! Boot sequence: settings -> storage -> extensions -> migrations -> state.
//!
//! The operator commands (`migrate`, `status`, `rollback`) reuse the same steps
//! without building the HTTP state.

use crate::config::Settings;
use crate::db::{ConnectionFactory, ConnectionProvider};
use crate::error::BootError;
use crate::extension::{self, ExtensionModule};
use crate::migration::{
    host_migrations, MigrationPlan, MigrationReport, MigrationRunner, MigrationStatus,
};
use crate::state::AppState;
use crate::store;
use std::sync::Arc;

/// Prepare the database and return a provider for it.
pub async fn connect(settings: &Settings) -> Result<Arc<dyn ConnectionProvider>, BootError> {
    store::prepare_database(settings).await?;
    let factory = ConnectionFactory::from_settings(settings)?;
    tracing::info!(backend = %settings.backend, "database configured");
    Ok(Arc::new(factory))
}

/// Discover extensions and merge their migrations with the host's.
pub fn plan(settings: &Settings) -> Result<(MigrationPlan, Vec<ExtensionModule>), BootError> {
    let modules = extension::discover(&settings.extensions_dir);
    let plan = MigrationPlan::build(host_migrations(), &modules)?;
    tracing::info!(units = plan.len(), extensions = modules.len(), "migration plan built");
    Ok((plan, modules))
}

/// Full startup: apply pending migrations, record active extensions, build the state.
/// Any error here must stop the process before the listener is bound.
pub async fn boot(settings: &Settings) -> Result<AppState, BootError> {
    let provider = connect(settings).await?;
    let (plan, modules) = plan(settings)?;
    MigrationRunner::new(provider.clone()).run(&plan).await?;
    store::record_extensions(provider.as_ref(), &modules).await?;
    Ok(AppState::new(provider, modules))
}

/// Apply pending migrations and record the extensions they came from, without serving.
pub async fn migrate(settings: &Settings) -> Result<MigrationReport, BootError> {
    let provider = connect(settings).await?;
    let (plan, modules) = plan(settings)?;
    let report = MigrationRunner::new(provider.clone()).run(&plan).await?;
    store::record_extensions(provider.as_ref(), &modules).await?;
    Ok(report)
}

pub async fn status(settings: &Settings) -> Result<Vec<MigrationStatus>, BootError> {
    let provider = connect(settings).await?;
    let (plan, _) = plan(settings)?;
    Ok(MigrationRunner::new(provider).status(&plan).await?)
}

pub async fn rollback(settings: &Settings, version: i64) -> Result<(), BootError> {
    let provider = connect(settings).await?;
    let (plan, _) = plan(settings)?;
    Ok(MigrationRunner::new(provider).rollback(&plan, version).await?)
}
