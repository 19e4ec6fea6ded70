//! Configuration resolution for Kindi.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/kindi/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete Kindi configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub promo: PromoConfig,
    #[serde(default)]
    pub certificates: CertificateConfig,
    #[serde(default)]
    pub purchase: PurchaseConfig,
}

/// Durable store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// `SQLite` database file. Falls back to [`database_path`] when unset.
    pub database_path: Option<PathBuf>,
}

/// Upper bound accepted for `cache.ttl_secs`: one year.
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Read-through cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached projection in seconds.
    pub ttl_secs: u64,
    /// Entries kept before the oldest are evicted.
    pub max_entries: usize,
}

impl CacheConfig {
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 10 * 60,
            max_entries: 10_000,
        }
    }
}

/// One-time promotional credit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromoConfig {
    /// Order id recorded for a promo redemption.
    pub code: String,
    /// Total redemptions allowed across all accounts.
    pub cap: u32,
}

impl Default for PromoConfig {
    fn default() -> Self {
        Self {
            code: "kindi-welcome".to_string(),
            cap: 100,
        }
    }
}

/// Certificate registration policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CertificateConfig {
    /// Ceiling on a registered certificate's lifetime, counted from issuance.
    pub max_validity_days: u32,
    /// Display name used when the caller supplies none.
    pub default_name: String,
}

impl CertificateConfig {
    pub fn max_validity_secs(&self) -> i64 {
        i64::from(self.max_validity_days) * 24 * 60 * 60
    }
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            max_validity_days: 365,
            default_name: "Untitled".to_string(),
        }
    }
}

/// Bounds on a single coin purchase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PurchaseConfig {
    pub min_quantity: u32,
    pub max_quantity: u32,
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            min_quantity: 1,
            max_quantity: 5,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// Settings files are merged key by key, so a file only overrides the
/// values it actually names.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let global = global_config_path().filter(|p| p.exists());

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
    }

    let files: Vec<&Path> = global.as_deref().into_iter().chain(explicit).collect();
    let mut config = resolve_files(&files)?;

    apply_env_overrides(&mut config);
    validate(&config)?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("kindi").join("settings.json"))
}

/// Default database location when none is configured.
pub fn database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("kindi").join("ledger.db"))
}

/// Merge settings files in order, later files winning, over the defaults.
fn resolve_files(paths: &[&Path]) -> Result<Config> {
    let mut merged = Value::Object(Map::new());
    for path in paths {
        merge_json(&mut merged, load_config_file(path)?);
    }
    Ok(serde_json::from_value(merged)?)
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("KINDI_DB_PATH") {
        config.storage.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("KINDI_CACHE_TTL_SECS") {
        if let Ok(n) = val.parse() {
            config.cache.ttl_secs = n;
        }
    }
    if let Ok(val) = std::env::var("KINDI_PROMO_CODE") {
        config.promo.code = val;
    }
    if let Ok(val) = std::env::var("KINDI_PROMO_CAP") {
        if let Ok(n) = val.parse() {
            config.promo.cap = n;
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.promo.code.is_empty() {
        return Err(Error::Config("promo.code must not be empty".to_string()));
    }
    if config.purchase.min_quantity == 0 || config.purchase.min_quantity > config.purchase.max_quantity
    {
        return Err(Error::Config(format!(
            "purchase bounds {}..={} are invalid",
            config.purchase.min_quantity, config.purchase.max_quantity
        )));
    }
    if config.cache.ttl_secs > MAX_CACHE_TTL_SECS {
        return Err(Error::Config(format!(
            "cache.ttl_secs must not exceed {MAX_CACHE_TTL_SECS}"
        )));
    }
    if config.certificates.max_validity_days == 0 {
        return Err(Error::Config(
            "certificates.max_validity_days must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_certificate_ceiling_is_one_year() {
        let config = Config::default();
        assert_eq!(config.certificates.max_validity_secs(), 365 * 24 * 60 * 60);
        assert_eq!(config.certificates.default_name, "Untitled");
    }

    #[test]
    fn default_purchase_bounds() {
        let config = Config::default();
        assert_eq!(config.purchase.min_quantity, 1);
        assert_eq!(config.purchase.max_quantity, 5);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let config: Config = serde_json::from_str(r#"{"promo": {"cap": 3}}"#).unwrap();
        assert_eq!(config.promo.cap, 3);
        assert_eq!(config.promo.code, PromoConfig::default().code);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn explicit_file_overrides_database_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"storage": {"database_path": "/tmp/kindi-test.db"}, "cache": {"ttl_secs": 5}}"#,
        )
        .unwrap();

        let config = resolve_files(&[path.as_path()]).unwrap();

        assert_eq!(
            config.storage.database_path,
            Some(PathBuf::from("/tmp/kindi-test.db"))
        );
        assert_eq!(config.cache.ttl(), Duration::from_secs(5));
    }

    #[test]
    fn overlay_keeps_sections_it_does_not_name() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        let explicit = dir.path().join("explicit.json");
        std::fs::write(&global, r#"{"promo": {"code": "spring", "cap": 7}}"#).unwrap();
        std::fs::write(&explicit, r#"{"promo": {"cap": 9}, "cache": {"ttl_secs": 5}}"#).unwrap();

        let config = resolve_files(&[global.as_path(), explicit.as_path()]).unwrap();

        assert_eq!(config.promo.code, "spring");
        assert_eq!(config.promo.cap, 9);
        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.cache.max_entries, CacheConfig::default().max_entries);
    }

    #[test]
    fn global_values_survive_unrelated_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        let explicit = dir.path().join("explicit.json");
        std::fs::write(&global, r#"{"promo": {"cap": 7}}"#).unwrap();
        std::fs::write(&explicit, r#"{"cache": {"ttl_secs": 5}}"#).unwrap();

        let config = resolve_files(&[global.as_path(), explicit.as_path()]).unwrap();
        assert_eq!(config.promo.cap, 7);
    }

    #[test]
    fn malformed_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = resolve_files(&[path.as_path()]).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn unreadable_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_files(&[dir.path()]).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn absurd_cache_ttl_rejected() {
        let mut config = Config::default();
        config.cache.ttl_secs = u64::MAX;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/kindi.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn inverted_purchase_bounds_rejected() {
        let mut config = Config::default();
        config.purchase.min_quantity = 6;
        assert!(validate(&config).is_err());
    }
}
