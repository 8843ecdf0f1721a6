use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::view::{SortDirection, SortField};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSenseConfig {
    #[serde(default)]
    pub notices: NoticeConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub categories: CategoryLimits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeConfig {
    /// How long a success notice stays up, in milliseconds.
    #[serde(default = "default_display_ms")]
    pub display_ms: u64,
}

impl NoticeConfig {
    #[must_use]
    pub const fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            display_ms: default_display_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_expiring_within_days")]
    pub expiring_within_days: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            expiring_within_days: default_expiring_within_days(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default)]
    pub sort_field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimits {
    #[serde(default = "default_max_per_user")]
    pub max_per_user: usize,
    #[serde(default = "default_name_min_len")]
    pub name_min_len: usize,
    #[serde(default = "default_name_max_len")]
    pub name_max_len: usize,
}

impl Default for CategoryLimits {
    fn default() -> Self {
        Self {
            max_per_user: default_max_per_user(),
            name_min_len: default_name_min_len(),
            name_max_len: default_name_max_len(),
        }
    }
}

/// Project config path under `root`.
#[must_use]
pub fn project_config_path(root: &Path) -> PathBuf {
    root.join(".stocksense/config.toml")
}

/// User config path, if the platform has a config directory.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stocksense/config.toml"))
}

/// Load `<root>/.stocksense/config.toml`; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(root: &Path) -> Result<StockSenseConfig> {
    let table = read_table(&project_config_path(root))?;
    into_config(table, &project_config_path(root))
}

/// # Errors
///
/// Returns an error if the user config exists but cannot be read or parsed.
pub fn load_user_config() -> Result<StockSenseConfig> {
    let Some(path) = user_config_path() else {
        return Ok(StockSenseConfig::default());
    };
    let table = read_table(&path)?;
    into_config(table, &path)
}

/// Effective config: user-level values, overridden key by key by the project file.
///
/// # Errors
///
/// Returns an error if either file exists but cannot be read or parsed.
pub fn resolve_config(root: &Path) -> Result<StockSenseConfig> {
    let user = match user_config_path() {
        Some(path) => read_table(&path)?,
        None => toml::Table::new(),
    };
    resolve_from_tables(user, read_table(&project_config_path(root))?, root)
}

fn resolve_from_tables(
    mut base: toml::Table,
    overrides: toml::Table,
    root: &Path,
) -> Result<StockSenseConfig> {
    merge_tables(&mut base, overrides);
    into_config(base, &project_config_path(root))
}

fn read_table(path: &Path) -> Result<toml::Table> {
    if !path.exists() {
        return Ok(toml::Table::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str::<toml::Table>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Upper bound for `alerts.expiring_within_days`.
pub const MAX_EXPIRING_WITHIN_DAYS: i64 = 3650;

fn into_config(table: toml::Table, path: &Path) -> Result<StockSenseConfig> {
    let config = toml::Value::Table(table)
        .try_into::<StockSenseConfig>()
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    let days = config.alerts.expiring_within_days;
    if !(0..=MAX_EXPIRING_WITHIN_DAYS).contains(&days) {
        bail!(
            "Invalid settings in {}: alerts.expiring_within_days must be 0-{MAX_EXPIRING_WITHIN_DAYS}, got {days}",
            path.display()
        );
    }
    Ok(config)
}

fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

const fn default_display_ms() -> u64 {
    3000
}

const fn default_expiring_within_days() -> i64 {
    7
}

const fn default_max_per_user() -> usize {
    50
}

const fn default_name_min_len() -> usize {
    2
}

const fn default_name_max_len() -> usize {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_project_config(root: &Path, body: &str) {
        let path = project_config_path(root);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create .stocksense");
        std::fs::write(path, body).expect("write config");
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("tempdir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg, StockSenseConfig::default());
        assert_eq!(cfg.notices.display_duration(), Duration::from_secs(3));
        assert_eq!(cfg.alerts.expiring_within_days, 7);
        assert_eq!(cfg.categories.max_per_user, 50);
        assert_eq!(cfg.view.sort_field, SortField::Name);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let root = tempfile::tempdir().expect("tempdir");
        write_project_config(
            root.path(),
            r#"
[view]
sort_field = "quantity"
direction = "desc"

[categories]
max_per_user = 10
"#,
        );
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.view.sort_field, SortField::Quantity);
        assert_eq!(cfg.view.direction, SortDirection::Desc);
        assert_eq!(cfg.categories.max_per_user, 10);
        assert_eq!(cfg.categories.name_max_len, 30);
        assert_eq!(cfg.notices.display_ms, 3000);
    }

    #[test]
    fn malformed_config_reports_path() {
        let root = tempfile::tempdir().expect("tempdir");
        write_project_config(root.path(), "[notices\ndisplay_ms = ");
        let err = load_project_config(root.path()).expect_err("should fail");
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn wrong_value_type_is_rejected() {
        let root = tempfile::tempdir().expect("tempdir");
        write_project_config(root.path(), "[alerts]\nexpiring_within_days = \"soon\"\n");
        assert!(load_project_config(root.path()).is_err());
    }

    #[test]
    fn out_of_range_expiry_window_is_rejected() {
        let root = tempfile::tempdir().expect("tempdir");
        write_project_config(
            root.path(),
            "[alerts]\nexpiring_within_days = 200000000000\n",
        );
        let err = load_project_config(root.path()).expect_err("should fail");
        assert!(format!("{err:#}").contains("expiring_within_days"));

        write_project_config(root.path(), "[alerts]\nexpiring_within_days = -1\n");
        assert!(load_project_config(root.path()).is_err());

        write_project_config(root.path(), "[alerts]\nexpiring_within_days = 3650\n");
        let cfg = load_project_config(root.path()).expect("upper bound is accepted");
        assert_eq!(cfg.alerts.expiring_within_days, MAX_EXPIRING_WITHIN_DAYS);
    }

    #[test]
    fn project_values_override_user_values_per_key() {
        let root = tempfile::tempdir().expect("tempdir");
        let user: toml::Table = toml::from_str(
            r"
[notices]
display_ms = 1500

[alerts]
expiring_within_days = 14
",
        )
        .expect("parse user");
        let project: toml::Table =
            toml::from_str("[alerts]\nexpiring_within_days = 3\n").expect("parse project");

        let cfg = resolve_from_tables(user, project, root.path()).expect("resolve");
        assert_eq!(cfg.notices.display_ms, 1500);
        assert_eq!(cfg.alerts.expiring_within_days, 3);
    }
}
