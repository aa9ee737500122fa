use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_USER: &str = "me";
const DEFAULT_LOG_LEVEL: &str = "warn";
/// FoodData Central's shared, rate-limited key.
const DEMO_KEY: &str = "DEMO_KEY";

/// Optional `config.toml` in the data directory.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    user: Option<String>,
    fdc_api_key: Option<String>,
    log_level: Option<String>,
}

pub struct Config {
    pub db_path: PathBuf,
    pub user: String,
    pub fdc_api_key: String,
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "vitals").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Self::from_dir(&data_dir, |key| std::env::var(key).ok())
    }

    /// Resolve settings: environment first, then `config.toml`, then defaults.
    fn from_dir(data_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = read_file_config(&data_dir.join("config.toml"))?;
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let db_path = env("VITALS_DB").map_or_else(|| data_dir.join("vitals.db"), PathBuf::from);
        let user = file.user.unwrap_or_else(|| DEFAULT_USER.to_string());
        let fdc_api_key = env("FDC_API_KEY")
            .or(file.fdc_api_key)
            .unwrap_or_else(|| DEMO_KEY.to_string());
        let log_level = file
            .log_level
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Config {
            db_path,
            user,
            fdc_api_key,
            log_level,
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = Config::from_dir(dir.path(), |_| None).unwrap();
        assert_eq!(config.db_path, dir.path().join("vitals.db"));
        assert_eq!(config.user, "me");
        assert_eq!(config.fdc_api_key, "DEMO_KEY");
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_file_values() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("config.toml"),
            "user = \"sam\"\nfdc_api_key = \"abc123\"\nlog_level = \"debug\"\n",
        )
        .unwrap();
        let config = Config::from_dir(dir.path(), |_| None).unwrap();
        assert_eq!(config.user, "sam");
        assert_eq!(config.fdc_api_key, "abc123");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("config.toml"), "fdc_api_key = \"abc123\"\n").unwrap();
        let config = Config::from_dir(dir.path(), |key| match key {
            "FDC_API_KEY" => Some("from-env".to_string()),
            "VITALS_DB" => Some("/tmp/other.db".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.fdc_api_key, "from-env");
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let dir = tempdir().unwrap();
        let config = Config::from_dir(dir.path(), |_| Some("  ".to_string())).unwrap();
        assert_eq!(config.db_path, dir.path().join("vitals.db"));
        assert_eq!(config.fdc_api_key, "DEMO_KEY");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("config.toml"), "user = [").unwrap();
        assert!(Config::from_dir(dir.path(), |_| None).is_err());
    }
}
