//! dynapi: generic table CRUD over HTTP, with schema migrations contributed by the host
//! and by extension packages discovered at startup.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod extension;
pub mod handlers;
pub mod migration;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use bootstrap::boot;
pub use config::Settings;
pub use db::{Backend, ConnectionFactory, ConnectionProvider, DbConnection};
pub use error::{AppError, BootError, ConfigError, ExtensionError, MigrationError};
pub use extension::{discover, ExtensionModule};
pub use migration::{MigrationPlan, MigrationReport, MigrationRunner, MigrationStatus, MigrationUnit};
pub use routes::app;
pub use service::{RecordStore, Row};
pub use state::AppState;
