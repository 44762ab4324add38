//! YAML config registry.
//!
//! # Storage layout
//!
//! ```text
//! ~/.fieldsync/
//!   config.yaml           (global settings, mode 0600)
//!   partitions/
//!     <partition>.yaml    (one file per partition, mode 0600)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from [`home`], delegates to `_at`. Only the
//!   operations the CLI calls without a home in hand have this form.
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ConfigError;
use crate::types::{PartitionConfig, PartitionId, RuleMap, Settings};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.fieldsync/`. Pure, no I/O.
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".fieldsync")
}

/// `<home>/.fieldsync/config.yaml`. Pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    root_at(home).join("config.yaml")
}

/// `<home>/.fieldsync/partitions/`. Pure, no I/O.
pub fn partitions_dir_at(home: &Path) -> PathBuf {
    root_at(home).join("partitions")
}

/// `<home>/.fieldsync/partitions/<partition>.yaml`. Pure, no I/O.
pub fn partition_path_at(home: &Path, partition: &PartitionId) -> PathBuf {
    partitions_dir_at(home).join(format!("{}.yaml", partition.0))
}

/// Create `dir` (mode `0700`) if it does not exist yet.
pub fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        set_dir_permissions(dir)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 2. Settings
// ---------------------------------------------------------------------------

/// Load `config.yaml`, falling back to [`Settings::default`] when absent.
pub fn load_settings_at(home: &Path) -> Result<Settings, ConfigError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    read_yaml(&path)
}

/// Atomically save `config.yaml`.
pub fn save_settings_at(home: &Path, settings: &Settings) -> Result<(), ConfigError> {
    ensure_dir(&root_at(home))?;
    write_yaml_atomic(&settings_path_at(home), settings)
}

/// Write the default `config.yaml` if none exists.
///
/// Idempotent: an existing file is loaded and returned unchanged.
pub fn init_at(home: &Path) -> Result<Settings, ConfigError> {
    let path = settings_path_at(home);
    if path.exists() {
        return load_settings_at(home);
    }
    let settings = Settings::default();
    save_settings_at(home, &settings)?;
    ensure_dir(&partitions_dir_at(home))?;
    Ok(settings)
}

// ---------------------------------------------------------------------------
// 3. Partitions
// ---------------------------------------------------------------------------

/// Load a single partition.
///
/// Returns `ConfigError::PartitionNotFound` if absent,
/// `ConfigError::Parse` (with path) if malformed YAML.
pub fn load_partition_at(
    home: &Path,
    partition: &PartitionId,
) -> Result<PartitionConfig, ConfigError> {
    let path = partition_path_at(home, partition);
    if !path.exists() {
        return Err(ConfigError::PartitionNotFound { path });
    }
    read_yaml(&path)
}

/// All registered partitions, sorted by id.
pub fn list_partitions_at(home: &Path) -> Result<Vec<PartitionConfig>, ConfigError> {
    let dir = partitions_dir_at(home);
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut entries: Vec<_> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut result = Vec::new();
    for entry in entries {
        let fname = entry.file_name();
        let name = fname.to_string_lossy();
        if !name.ends_with(".yaml") {
            continue;
        }
        result.push(read_yaml::<PartitionConfig>(&entry.path())?);
    }
    result.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(result)
}

/// `list_partitions_at` convenience wrapper.
pub fn list_partitions() -> Result<Vec<PartitionConfig>, ConfigError> {
    list_partitions_at(&home()?)
}

/// Atomically save a partition file.
pub fn save_partition_at(home: &Path, config: &PartitionConfig) -> Result<(), ConfigError> {
    ensure_dir(&partitions_dir_at(home))?;
    write_yaml_atomic(&partition_path_at(home, &config.id), config)
}

/// Register a partition served by `endpoint`.
///
/// Idempotent: if the partition already exists it is returned unchanged.
pub fn add_partition_at(
    home: &Path,
    partition: PartitionId,
    endpoint: String,
    rules: RuleMap,
) -> Result<PartitionConfig, ConfigError> {
    let path = partition_path_at(home, &partition);
    if path.exists() {
        return load_partition_at(home, &partition);
    }

    let now = Utc::now();
    let config = PartitionConfig {
        id: partition,
        endpoint,
        rules,
        created_at: now,
        updated_at: now,
    };
    save_partition_at(home, &config)?;
    Ok(config)
}

/// `add_partition_at` convenience wrapper.
pub fn add_partition(
    partition: PartitionId,
    endpoint: String,
    rules: RuleMap,
) -> Result<PartitionConfig, ConfigError> {
    add_partition_at(&home()?, partition, endpoint, rules)
}

// ---------------------------------------------------------------------------
// Home
// ---------------------------------------------------------------------------

/// Home directory, as used by the no-arg wrappers and the CLI.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let tmp_path = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(value)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    fn lt() -> PartitionId {
        PartitionId::from("lt")
    }

    #[test]
    fn partition_path_is_correct() {
        let home = make_home();
        let path = partition_path_at(home.path(), &lt());
        assert!(path.ends_with(".fieldsync/partitions/lt.yaml"));
    }

    #[test]
    fn missing_settings_fall_back_to_defaults() {
        let home = make_home();
        let settings = load_settings_at(home.path()).expect("load");
        assert_eq!(settings, Settings::default());
        assert!(!settings_path_at(home.path()).exists());
    }

    #[test]
    fn init_writes_defaults_once() {
        let home = make_home();
        let first = init_at(home.path()).expect("init");
        assert!(settings_path_at(home.path()).exists());

        let mut edited = first.clone();
        edited.retry.max_attempts = 7;
        save_settings_at(home.path(), &edited).expect("save");

        let second = init_at(home.path()).expect("init again");
        assert_eq!(second.retry.max_attempts, 7, "init must not overwrite");
    }

    #[test]
    fn root_dir_created_with_perms() {
        let home = make_home();
        init_at(home.path()).expect("init");
        let dir = root_at(home.path());
        assert!(dir.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn add_and_load_partition_roundtrip() {
        let home = make_home();
        let added = add_partition_at(
            home.path(),
            lt(),
            "https://lt.example.test".to_string(),
            RuleMap::new(),
        )
        .expect("add");
        let loaded = load_partition_at(home.path(), &lt()).expect("load");
        assert_eq!(loaded, added);
    }

    #[test]
    fn add_partition_is_idempotent() {
        let home = make_home();
        let first = add_partition_at(home.path(), lt(), "https://a".to_string(), RuleMap::new())
            .expect("add");
        let second = add_partition_at(home.path(), lt(), "https://b".to_string(), RuleMap::new())
            .expect("add again");
        assert_eq!(second.endpoint, first.endpoint);
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let home = make_home();
        add_partition_at(home.path(), lt(), "https://a".to_string(), RuleMap::new())
            .expect("add");
        let tmp = partition_path_at(home.path(), &lt()).with_extension("yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn load_missing_partition_returns_not_found() {
        let home = make_home();
        let err = load_partition_at(home.path(), &lt()).unwrap_err();
        assert!(matches!(err, ConfigError::PartitionNotFound { .. }));
    }

    #[test]
    fn list_partitions_empty_when_none_registered() {
        let home = make_home();
        assert!(list_partitions_at(home.path()).expect("list").is_empty());
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
