use std::path::PathBuf;

use config::{Config as Cfg, File};
use serde::Deserialize;

use crate::error::ConfigError;

const CONFIG_FILE: &str = "invoice-builder";
const ENV_PREFIX: &str = "INVOICE";
const DEFAULT_DB_FILE: &str = "invoices.db";

/// Argon2 passes are never configured below this.
pub const MIN_HASH_TIME_COST: u32 = 12;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub store: StoreConfig,
    pub links: LinkConfig,
    pub render: RenderConfig,
    pub validation: ValidationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            store: StoreConfig::default(),
            links: LinkConfig::default(),
            render: RenderConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Option<StoreBackend>,
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// An explicit backend wins; otherwise a configured path selects SQLite.
    pub fn resolved_backend(&self) -> StoreBackend {
        match (self.backend, &self.path) {
            (Some(b), _) => b,
            (None, Some(_)) => StoreBackend::Sqlite,
            (None, None) => StoreBackend::Memory,
        }
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub base_url: String,
    pub default_expiry_days: i64,
    pub hash_memory_kib: u32,
    pub hash_time_cost: u32,
    pub hash_parallelism: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            default_expiry_days: 30,
            hash_memory_kib: 19 * 1024,
            hash_time_cost: MIN_HASH_TIME_COST,
            hash_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// TrueType font embedded into PDFs instead of the bundled DejaVu Sans.
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub enforce_jurisdiction_vat: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enforce_jurisdiction_vat: true,
        }
    }
}

impl AppConfig {
    /// Reads `.env`, then an optional `invoice-builder.{toml,json,yaml}`, then `INVOICE__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize::<AppConfig>()?.normalized()
    }

    pub(crate) fn normalized(mut self) -> Result<Self, ConfigError> {
        self.links.base_url = self.links.base_url.trim_end_matches('/').to_string();
        if self.links.base_url.is_empty() {
            return Err(ConfigError::Invalid("links.base_url must not be empty".into()));
        }
        if self.links.default_expiry_days <= 0 {
            return Err(ConfigError::Invalid(
                "links.default_expiry_days must be positive".into(),
            ));
        }
        self.links.hash_time_cost = self.links.hash_time_cost.max(MIN_HASH_TIME_COST);
        self.links.hash_parallelism = self.links.hash_parallelism.max(1);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(src: &str) -> Result<AppConfig, ConfigError> {
        let cfg = Cfg::builder()
            .add_source(File::from_str(src, FileFormat::Toml))
            .build()?;
        cfg.try_deserialize::<AppConfig>()?.normalized()
    }

    #[test]
    fn empty_source_uses_defaults() {
        let cfg = from_toml("").unwrap();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.links.default_expiry_days, 30);
        assert_eq!(cfg.store.resolved_backend(), StoreBackend::Memory);
        assert!(cfg.validation.enforce_jurisdiction_vat);
    }

    #[test]
    fn path_selects_sqlite_backend() {
        let cfg = from_toml("[store]\npath = \"/tmp/x.db\"\n").unwrap();
        assert_eq!(cfg.store.resolved_backend(), StoreBackend::Sqlite);
        assert_eq!(cfg.store.sqlite_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn explicit_memory_backend_wins_over_path() {
        let cfg = from_toml("[store]\nbackend = \"memory\"\npath = \"/tmp/x.db\"\n").unwrap();
        assert_eq!(cfg.store.resolved_backend(), StoreBackend::Memory);
    }

    #[test]
    fn hash_time_cost_is_clamped() {
        let cfg = from_toml("[links]\nhash_time_cost = 2\nbase_url = \"https://inv.example/\"\n").unwrap();
        assert_eq!(cfg.links.hash_time_cost, MIN_HASH_TIME_COST);
        assert_eq!(cfg.links.base_url, "https://inv.example");
    }

    #[test]
    fn non_positive_expiry_is_rejected() {
        assert!(matches!(
            from_toml("[links]\ndefault_expiry_days = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }
}
