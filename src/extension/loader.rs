//! Scan the extensions directory and load each package in isolation.

use super::{ExtensionModule, Manifest};
use crate::error::ExtensionError;
use crate::migration::units_from_scripts;
use crate::sql::ident::is_valid_identifier;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const MANIFEST: &str = "manifest.json";
const MIGRATIONS_DIR: &str = "migrations";

/// Load every package under `dir`. A missing directory yields no modules; a package
/// that fails to load is logged and skipped so the rest still load.
pub fn discover(dir: &Path) -> Vec<ExtensionModule> {
    let full = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    tracing::info!(path = %full.display(), "loading extensions");

    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %full.display(), "extension directory not found");
            return Vec::new();
        }
        Err(e) => {
            tracing::error!(path = %full.display(), error = %e, "cannot read extension directory");
            return Vec::new();
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|p| is_candidate(p))
        .collect();
    candidates.sort();

    let mut loaded: Vec<ExtensionModule> = Vec::new();
    let mut ids = HashSet::new();
    for path in candidates {
        match load_package(&path) {
            Ok(module) => {
                if !ids.insert(module.id.clone()) {
                    tracing::warn!(
                        id = %module.id,
                        path = %path.display(),
                        "extension id already loaded, skipping"
                    );
                    continue;
                }
                tracing::info!(
                    id = %module.id,
                    version = %module.version,
                    migrations = module.migrations.len(),
                    "loaded extension"
                );
                loaded.push(module);
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to load extension");
            }
        }
    }

    tracing::info!(count = loaded.len(), "extensions loaded");
    loaded
}

/// Directories and `.zip` files. Hidden entries (`.git`, editor state) are never packages.
fn is_candidate(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(true);
    if hidden {
        return false;
    }
    if path.is_dir() {
        return true;
    }
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Load one package from a directory or a zip archive.
pub fn load_package(path: &Path) -> Result<ExtensionModule, ExtensionError> {
    let (manifest_json, scripts) = if path.is_dir() {
        read_dir_package(path)?
    } else {
        read_zip_package(path)?
    };

    let manifest: Manifest =
        serde_json::from_str(&manifest_json).map_err(|e| ExtensionError::InvalidManifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if !is_valid_identifier(&manifest.id) {
        return Err(ExtensionError::InvalidManifest {
            path: path.to_path_buf(),
            message: format!("id '{}' must match [A-Za-z_][A-Za-z0-9_]*", manifest.id),
        });
    }

    let migrations = units_from_scripts(&manifest.id, scripts).map_err(|(file, message)| {
        ExtensionError::InvalidMigration {
            path: path.to_path_buf(),
            file,
            message,
        }
    })?;

    Ok(ExtensionModule {
        id: manifest.id,
        name: manifest.name,
        version: manifest.version,
        description: manifest.description,
        path: path.to_path_buf(),
        migrations,
    })
}

type PackageContents = (String, Vec<(String, String)>);

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ExtensionError + '_ {
    move |source| ExtensionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_dir_package(path: &Path) -> Result<PackageContents, ExtensionError> {
    let manifest_path = path.join(MANIFEST);
    if !manifest_path.is_file() {
        return Err(ExtensionError::MissingManifest {
            path: path.to_path_buf(),
        });
    }
    let manifest = fs::read_to_string(&manifest_path).map_err(io_err(path))?;

    let mut scripts = Vec::new();
    let migrations_dir = path.join(MIGRATIONS_DIR);
    if migrations_dir.is_dir() {
        for entry in fs::read_dir(&migrations_dir).map_err(io_err(path))? {
            let entry = entry.map_err(io_err(path))?;
            let file_path = entry.path();
            if !is_sql_file(&file_path) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let content = fs::read_to_string(&file_path).map_err(io_err(path))?;
            scripts.push((name, content));
        }
    }
    Ok((manifest, scripts))
}

fn read_zip_package(path: &Path) -> Result<PackageContents, ExtensionError> {
    let file = File::open(path).map_err(io_err(path))?;
    let mut archive = ZipArchive::new(file).map_err(|source| ExtensionError::Archive {
        path: path.to_path_buf(),
        source,
    })?;

    let manifest_name = archive
        .file_names()
        .filter(|n| *n == MANIFEST || n.ends_with(&format!("/{}", MANIFEST)))
        .min_by_key(|n| n.len())
        .map(String::from)
        .ok_or_else(|| ExtensionError::MissingManifest {
            path: path.to_path_buf(),
        })?;
    let prefix = manifest_name[..manifest_name.len() - MANIFEST.len()].to_string();
    let migrations_prefix = format!("{}{}/", prefix, MIGRATIONS_DIR);

    let manifest = read_zip_entry(&mut archive, &manifest_name, path)?;

    let script_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(&migrations_prefix) && n.to_ascii_lowercase().ends_with(".sql"))
        .filter(|n| !n[migrations_prefix.len()..].contains('/'))
        .map(String::from)
        .collect();
    let mut scripts = Vec::with_capacity(script_names.len());
    for entry_name in script_names {
        let content = read_zip_entry(&mut archive, &entry_name, path)?;
        scripts.push((entry_name[migrations_prefix.len()..].to_string(), content));
    }
    Ok((manifest, scripts))
}

fn read_zip_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    path: &Path,
) -> Result<String, ExtensionError> {
    let mut f = archive
        .by_name(name)
        .map_err(|source| ExtensionError::Archive {
            path: path.to_path_buf(),
            source,
        })?;
    let mut s = String::new();
    f.read_to_string(&mut s).map_err(io_err(path))?;
    Ok(s)
}

fn is_sql_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("sql"))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const MANIFEST_JSON: &str =
        r#"{"id": "inventory", "name": "Inventory", "version": "1.0.0", "description": "stock"}"#;

    fn write_dir_package(root: &Path, dir: &str, manifest: &str, scripts: &[(&str, &str)]) {
        let pkg = root.join(dir);
        fs::create_dir_all(pkg.join(MIGRATIONS_DIR)).unwrap();
        fs::write(pkg.join(MANIFEST), manifest).unwrap();
        for (name, sql) in scripts {
            fs::write(pkg.join(MIGRATIONS_DIR).join(name), sql).unwrap();
        }
    }

    fn write_zip_package(path: &Path, prefix: &str, manifest: &str, scripts: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let opts = SimpleFileOptions::default();
        zip.start_file(format!("{}manifest.json", prefix), opts).unwrap();
        zip.write_all(manifest.as_bytes()).unwrap();
        for (name, sql) in scripts {
            zip.start_file(format!("{}migrations/{}", prefix, name), opts)
                .unwrap();
            zip.write_all(sql.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(discover(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn loads_directory_package() {
        let dir = TempDir::new().unwrap();
        write_dir_package(
            dir.path(),
            "inventory",
            MANIFEST_JSON,
            &[
                ("20240301000000_create_stock.up.sql", "CREATE TABLE stock (id {auto_id})"),
                ("20240301000000_create_stock.down.sql", "DROP TABLE stock"),
                ("README.md", "ignored"),
            ],
        );
        let module = load_package(&dir.path().join("inventory")).unwrap();
        assert_eq!(module.id, "inventory");
        assert_eq!(module.description.as_deref(), Some("stock"));
        assert_eq!(module.migrations.len(), 1);
        assert_eq!(module.migrations[0].version, 20240301000000);
        assert_eq!(module.migrations[0].source, "inventory");
        assert!(module.migrations[0].down_sql.is_some());
    }

    #[test]
    fn loads_zip_package_with_top_level_folder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inventory.zip");
        write_zip_package(
            &path,
            "inventory-1.0.0/",
            MANIFEST_JSON,
            &[("20240301000000_create_stock.up.sql", "CREATE TABLE stock (id INTEGER)")],
        );
        let module = load_package(&path).unwrap();
        assert_eq!(module.id, "inventory");
        assert_eq!(module.migrations.len(), 1);
        assert_eq!(module.migrations[0].down_sql, None);
    }

    #[test]
    fn one_broken_package_does_not_stop_the_others() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.zip"), b"this is not a zip archive").unwrap();
        write_dir_package(
            dir.path(),
            "good",
            MANIFEST_JSON,
            &[("1_first.up.sql", "CREATE TABLE first (id INTEGER)")],
        );
        fs::write(dir.path().join("notes.txt"), "not a package").unwrap();

        let loaded = discover(dir.path());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "inventory");
    }

    #[test]
    fn invalid_manifests_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_dir_package(dir.path(), "noname", r#"{"id": "x", "version": "1"}"#, &[]);
        write_dir_package(
            dir.path(),
            "badid",
            r#"{"id": "bad id!", "name": "x", "version": "1"}"#,
            &[],
        );
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        assert!(matches!(
            load_package(&dir.path().join("noname")),
            Err(ExtensionError::InvalidManifest { .. })
        ));
        assert!(matches!(
            load_package(&dir.path().join("badid")),
            Err(ExtensionError::InvalidManifest { .. })
        ));
        assert!(matches!(
            load_package(&dir.path().join("empty")),
            Err(ExtensionError::MissingManifest { .. })
        ));
        assert!(discover(dir.path()).is_empty());
    }

    #[test]
    fn malformed_migration_names_fail_the_package() {
        let dir = TempDir::new().unwrap();
        write_dir_package(
            dir.path(),
            "inventory",
            MANIFEST_JSON,
            &[("create_stock.sql", "CREATE TABLE stock (id INTEGER)")],
        );
        assert!(matches!(
            load_package(&dir.path().join("inventory")),
            Err(ExtensionError::InvalidMigration { .. })
        ));
    }

    #[test]
    fn bundled_demo_package_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join("inventory");
        let module = load_package(&path).unwrap();
        assert_eq!(module.id, "inventory");
        assert_eq!(module.migrations.len(), 1);
        assert_eq!(module.migrations[0].description, "create stock");
    }

    #[test]
    fn second_package_with_same_id_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_dir_package(dir.path(), "a_first", MANIFEST_JSON, &[]);
        write_dir_package(dir.path(), "b_second", MANIFEST_JSON, &[]);
        let loaded = discover(dir.path());
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].path.ends_with("a_first"));
    }

    #[test]
    fn hidden_entries_are_not_packages() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".git").join("objects")).unwrap();
        write_dir_package(dir.path(), ".cache", MANIFEST_JSON, &[]);
        write_dir_package(dir.path(), "inventory", MANIFEST_JSON, &[]);
        let loaded = discover(dir.path());
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].path.ends_with("inventory"));
        assert!(!is_candidate(&dir.path().join(".git")));
    }

    #[test]
    fn zip_scripts_match_the_sql_suffix_in_any_case() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inventory.zip");
        write_zip_package(
            &path,
            "",
            MANIFEST_JSON,
            &[
                ("20240301000000_create_stock.UP.SQL", "CREATE TABLE stock (id INTEGER)"),
                ("20240301000000_create_stock.down.Sql", "DROP TABLE stock"),
                ("README.txt", "not a script"),
            ],
        );
        let module = load_package(&path).unwrap();
        assert_eq!(module.migrations.len(), 1);
        assert_eq!(module.migrations[0].version, 20240301000000);
        assert_eq!(module.migrations[0].down_sql.as_deref(), Some("DROP TABLE stock"));
    }
}
