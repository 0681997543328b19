use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "plants";
const DEFAULT_DB_PATH: &str = "permaculture_plants.db";
const DEFAULT_USER_AGENT: &str = concat!("plant_scraper/", env!("CARGO_PKG_VERSION"));

/// Layered settings: defaults, then `plants.toml` (or `--config`), then `PLANTS_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub concurrency: usize,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file_source = match file {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .set_default("timeout_secs", 15_i64)?
            .set_default("concurrency", 4_i64)?
            .add_source(file_source)
            .add_source(Environment::with_prefix("PLANTS"))
            .build()
            .context("Failed to load settings")?
            .try_deserialize::<Settings>()
            .context("Invalid settings")?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let path = std::env::temp_dir().join(format!("plants-settings-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "db_path = \"test.db\"\nconcurrency = 2\nurls = [\"https://practicalplants.org/wiki/Malus_domestica\"]\n",
        )
        .unwrap();

        let s = Settings::load(Some(path.as_path())).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(s.db_path, PathBuf::from("test.db"));
        assert_eq!(s.concurrency, 2);
        assert_eq!(s.timeout_secs, 15);
        assert_eq!(s.urls.len(), 1);
        assert!(s.user_agent.starts_with("plant_scraper/"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/plants.toml"))).is_err());
    }
}
