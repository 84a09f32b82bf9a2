// Configuration loader
// Loads settings from ~/.lanlink/config.toml, falling back to defaults

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::APP_DIR;
use super::settings::Config;

/// Load configuration from the default location.
///
/// A missing file is not an error; every setting has a default.
pub fn load_config() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        tracing::debug!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    load_config_from(&path)
}

/// Load configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// `~/.lanlink`
pub fn app_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot determine home directory")?;
    Ok(home.join(APP_DIR))
}

fn config_path() -> Result<PathBuf> {
    Ok(app_dir()?.join("config.toml"))
}

/// Resolve where the server list lives.
pub fn store_path(config: &Config) -> Result<PathBuf> {
    match &config.store_path {
        Some(path) => Ok(path.clone()),
        None => Ok(app_dir()?.join("servers.json")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            store_path = "/tmp/servers.json"

            [probe]
            management_timeout_ms = 2000
            "#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.probe.management_timeout_ms, 2000);
        assert_eq!(
            store_path(&config).unwrap(),
            PathBuf::from("/tmp/servers.json")
        );
    }

    #[test]
    fn test_load_config_rejects_bad_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[discovery\ncached_timeout_ms = ").unwrap();
        assert!(load_config_from(&path).is_err());
    }
}
