//! Merge host and extension migrations into one version-ordered sequence.

use super::MigrationUnit;
use crate::error::MigrationError;
use crate::extension::ExtensionModule;

#[derive(Clone, Debug, Default)]
pub struct MigrationPlan {
    units: Vec<MigrationUnit>,
}

impl MigrationPlan {
    /// Host units plus every unit of every loaded module, ascending by version.
    /// Fails on the first version contributed twice, before anything is applied.
    pub fn build(
        host: Vec<MigrationUnit>,
        modules: &[ExtensionModule],
    ) -> Result<Self, MigrationError> {
        let mut units = host;
        for m in modules {
            units.extend(m.migrations.iter().cloned());
        }
        Self::from_units(units)
    }

    pub fn from_units(mut units: Vec<MigrationUnit>) -> Result<Self, MigrationError> {
        // Stable sort keeps contribution order among equal versions for the error message.
        units.sort_by_key(|u| u.version);
        for pair in units.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(MigrationError::DuplicateVersion {
                    version: pair[0].version,
                    first: pair[0].source.clone(),
                    second: pair[1].source.clone(),
                });
            }
        }
        Ok(MigrationPlan { units })
    }

    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    pub fn get(&self, version: i64) -> Option<&MigrationUnit> {
        self.units
            .binary_search_by_key(&version, |u| u.version)
            .ok()
            .map(|i| &self.units[i])
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
