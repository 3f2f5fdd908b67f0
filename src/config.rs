//! Process configuration, read once at start-up and passed down explicitly.
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub log_filter: String,
    pub seed_categories: Vec<SeedCategory>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeedCategory {
    pub name: String,
    pub base_price_per_kg: Decimal,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("ewaste.db"),
            log_filter: "info".to_string(),
            seed_categories: vec![
                SeedCategory::new("Motherboards", Decimal::from(5500)),
                SeedCategory::new("RAM", Decimal::from(7500)),
                SeedCategory::new("Phone Boards", Decimal::from(7500)),
            ],
        }
    }
}

impl SeedCategory {
    pub fn new(name: impl Into<String>, base_price_per_kg: Decimal) -> Self {
        Self {
            name: name.into(),
            base_price_per_kg,
        }
    }
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
