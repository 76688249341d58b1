//! Migrations shipped with the host application (see `migrations/` at the crate root).

use super::{MigrationUnit, HOST_SOURCE};

struct HostScript {
    version: i64,
    description: &'static str,
    up: &'static str,
    down: &'static str,
}

const HOST_SCRIPTS: &[HostScript] = &[HostScript {
    version: 20240101000000,
    description: "initial tables",
    up: include_str!("../../migrations/20240101000000_initial_tables.up.sql"),
    down: include_str!("../../migrations/20240101000000_initial_tables.down.sql"),
}];

pub fn host_migrations() -> Vec<MigrationUnit> {
    HOST_SCRIPTS
        .iter()
        .map(|s| MigrationUnit {
            version: s.version,
            description: s.description.to_string(),
            source: HOST_SOURCE.to_string(),
            up_sql: s.up.to_string(),
            down_sql: Some(s.down.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_versions_are_unique_and_ascending() {
        let units = host_migrations();
        assert!(!units.is_empty());
        assert!(units.windows(2).all(|w| w[0].version < w[1].version));
        assert!(units.iter().all(|u| u.source == HOST_SOURCE));
    }

    #[test]
    fn initial_tables_create_plugin_config() {
        let units = host_migrations();
        assert!(units[0].up_sql.contains("CREATE TABLE plugin_config"));
        assert!(units[0]
            .down_sql
            .as_deref()
            .unwrap()
            .contains("DROP TABLE plugin_config"));
    }
}
