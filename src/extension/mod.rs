//! Extension packages discovered at startup.
//!
//! A package is a directory or a `.zip` archive laid out as:
//!
//! ```text
//! manifest.json                      {"id", "name", "version", "description"?}
//! migrations/<version>_<slug>.up.sql
//! migrations/<version>_<slug>.down.sql   (optional)
//! ```
//!
//! Archives may nest that layout under a single top-level folder.

mod loader;

pub use loader::{discover, load_package};

use crate::migration::MigrationUnit;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A package that loaded cleanly, with the migrations it contributes.
#[derive(Clone, Debug)]
pub struct ExtensionModule {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub path: PathBuf,
    pub migrations: Vec<MigrationUnit>,
}
