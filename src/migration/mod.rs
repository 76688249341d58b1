//! Versioned schema changes from the host and from extensions.
//!
//! Units are collected into a [`MigrationPlan`] (ordered by version, duplicates
//! rejected) and applied by a [`MigrationRunner`], which records each applied version
//! in `_sys_migrations` inside the same transaction as the unit's up script.
//!
//! Only one process may run migrations at a time; deployments with several instances
//! must serialize startup outside this crate.

mod host;
mod plan;
mod runner;

pub use host::host_migrations;
pub use plan::MigrationPlan;
pub use runner::{MigrationReport, MigrationRunner, MigrationStatus, MIGRATIONS_TABLE};

/// Source name used for migrations shipped with the host application.
pub const HOST_SOURCE: &str = "host";

/// One versioned schema change with a forward script and an optional reverse one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationUnit {
    pub version: i64,
    pub description: String,
    /// `host` or the id of the extension that contributed the unit.
    pub source: String,
    pub up_sql: String,
    pub down_sql: Option<String>,
}

/// Direction encoded in a migration file name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptKind {
    Up,
    Down,
}

/// Parse `<version>_<slug>.up.sql` / `<version>_<slug>.down.sql`, suffix in any case.
/// Returns (version, description, kind); the description is the slug with `_` as spaces.
pub fn parse_script_name(file_name: &str) -> Result<(i64, String, ScriptKind), String> {
    let lower = file_name.to_ascii_lowercase();
    let (stem, kind) = if lower.ends_with(".up.sql") {
        (&file_name[..file_name.len() - ".up.sql".len()], ScriptKind::Up)
    } else if lower.ends_with(".down.sql") {
        (&file_name[..file_name.len() - ".down.sql".len()], ScriptKind::Down)
    } else {
        return Err("expected a .up.sql or .down.sql suffix".into());
    };
    let (version, slug) = stem
        .split_once('_')
        .ok_or_else(|| "expected <version>_<description>".to_string())?;
    let version: i64 = version
        .parse()
        .map_err(|_| format!("version '{}' is not an integer", version))?;
    if version <= 0 {
        return Err("version must be positive".into());
    }
    if slug.is_empty() {
        return Err("description is empty".into());
    }
    Ok((version, slug.replace('_', " "), kind))
}

/// Pair up/down scripts into units. Every version needs a non-empty up script.
pub fn units_from_scripts<I>(source: &str, scripts: I) -> Result<Vec<MigrationUnit>, (String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    use std::collections::BTreeMap;

    let mut by_version: BTreeMap<i64, (String, Option<String>, Option<String>)> = BTreeMap::new();
    for (file_name, content) in scripts {
        let (version, description, kind) =
            parse_script_name(&file_name).map_err(|m| (file_name.clone(), m))?;
        let entry = by_version
            .entry(version)
            .or_insert_with(|| (description.clone(), None, None));
        if entry.0 != description {
            return Err((
                file_name,
                format!("version {} already used by '{}'", version, entry.0),
            ));
        }
        let slot = match kind {
            ScriptKind::Up => &mut entry.1,
            ScriptKind::Down => &mut entry.2,
        };
        if slot.is_some() {
            return Err((file_name, format!("duplicate script for version {}", version)));
        }
        *slot = Some(content);
    }

    let mut units = Vec::with_capacity(by_version.len());
    for (version, (description, up, down)) in by_version {
        let up = up
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| (format!("{}_*.up.sql", version), "missing or empty up script".to_string()))?;
        units.push(MigrationUnit {
            version,
            description,
            source: source.to_string(),
            up_sql: up,
            down_sql: down.filter(|s| !s.trim().is_empty()),
        });
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_script_names() {
        assert_eq!(
            parse_script_name("20240301000000_create_widgets.up.sql").unwrap(),
            (20240301000000, "create widgets".to_string(), ScriptKind::Up)
        );
        assert_eq!(
            parse_script_name("7_drop.down.sql").unwrap(),
            (7, "drop".to_string(), ScriptKind::Down)
        );
        assert_eq!(
            parse_script_name("8_Add_Index.UP.SQL").unwrap(),
            (8, "Add Index".to_string(), ScriptKind::Up)
        );
    }

    #[test]
    fn rejects_malformed_script_names() {
        for bad in [
            "create_widgets.up.sql",
            "20240301.up.sql",
            "20240301_.up.sql",
            "0_zero.up.sql",
            "-5_neg.up.sql",
            "1_thing.sql",
            "1_thing.up.txt",
        ] {
            assert!(parse_script_name(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn pairs_up_and_down_scripts() {
        let scripts = vec![
            ("2_second.up.sql".to_string(), "CREATE TABLE b (id INT)".to_string()),
            ("1_first.down.sql".to_string(), "DROP TABLE a".to_string()),
            ("1_first.up.sql".to_string(), "CREATE TABLE a (id INT)".to_string()),
        ];
        let units = units_from_scripts("inventory", scripts).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].version, 1);
        assert_eq!(units[0].down_sql.as_deref(), Some("DROP TABLE a"));
        assert_eq!(units[0].source, "inventory");
        assert_eq!(units[1].version, 2);
        assert_eq!(units[1].down_sql, None);
    }

    #[test]
    fn down_without_up_is_an_error() {
        let scripts = vec![("3_orphan.down.sql".to_string(), "DROP TABLE c".to_string())];
        let (_, msg) = units_from_scripts("x", scripts).unwrap_err();
        assert!(msg.contains("up script"));
    }

    #[test]
    fn conflicting_descriptions_for_one_version_are_an_error() {
        let scripts = vec![
            ("4_one.up.sql".to_string(), "SELECT 1".to_string()),
            ("4_other.up.sql".to_string(), "SELECT 2".to_string()),
        ];
        assert!(units_from_scripts("x", scripts).is_err());
    }
}
