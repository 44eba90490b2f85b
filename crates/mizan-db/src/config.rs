//! # Ledger Configuration
//!
//! Configuration for the database pool, tenancy and document numbering.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MIZAN_DB_PATH=/var/lib/mizan/ledger.db                             │
//! │     MIZAN_TENANT_ID=acme                                               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/mizan/ledger.toml (Linux)                                │
//! │     ~/Library/Application Support/com.mizan.ledger/ledger.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     ./mizan.db, default tenant, SI/PI/CN prefixes                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # ledger.toml
//! [database]
//! path = "/var/lib/mizan/ledger.db"
//! max_connections = 5
//! busy_timeout_secs = 5
//!
//! [tenant]
//! id = "acme"
//!
//! [numbering]
//! sales_prefix = "SI"
//! purchase_prefix = "PI"
//! credit_note_prefix = "CN"
//! pad_width = 5
//!
//! [movements]
//! default_limit = 100
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use mizan_core::{DocumentKind, DEFAULT_TENANT_ID};

use crate::error::{DbError, DbResult};

// =============================================================================
// Database Settings
// =============================================================================

/// Pool and file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite file. `:memory:` opens a private in-memory database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long a writer waits for the SQLite write lock before the
    /// operation fails with a consistency violation.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mizan.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_secs: default_busy_timeout(),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Tenant Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSettings {
    #[serde(default = "default_tenant_id")]
    pub id: String,
}

fn default_tenant_id() -> String {
    DEFAULT_TENANT_ID.to_string()
}

impl Default for TenantSettings {
    fn default() -> Self {
        TenantSettings {
            id: default_tenant_id(),
        }
    }
}

// =============================================================================
// Numbering Settings
// =============================================================================

/// Document number format: `{prefix}-{YYYYMM}-{seq}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingSettings {
    #[serde(default = "default_sales_prefix")]
    pub sales_prefix: String,

    #[serde(default = "default_purchase_prefix")]
    pub purchase_prefix: String,

    #[serde(default = "default_credit_note_prefix")]
    pub credit_note_prefix: String,

    /// Zero-padded width of the sequence part.
    #[serde(default = "default_pad_width")]
    pub pad_width: usize,
}

fn default_sales_prefix() -> String {
    "SI".to_string()
}

fn default_purchase_prefix() -> String {
    "PI".to_string()
}

fn default_credit_note_prefix() -> String {
    "CN".to_string()
}

fn default_pad_width() -> usize {
    5
}

impl Default for NumberingSettings {
    fn default() -> Self {
        NumberingSettings {
            sales_prefix: default_sales_prefix(),
            purchase_prefix: default_purchase_prefix(),
            credit_note_prefix: default_credit_note_prefix(),
            pad_width: default_pad_width(),
        }
    }
}

impl NumberingSettings {
    pub fn prefix(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::SalesInvoice => &self.sales_prefix,
            DocumentKind::PurchaseInvoice => &self.purchase_prefix,
            DocumentKind::CreditNote => &self.credit_note_prefix,
        }
    }

    /// Formats a document number.
    ///
    /// ## Example
    /// ```rust
    /// use mizan_core::DocumentKind;
    /// use mizan_db::config::NumberingSettings;
    ///
    /// let numbering = NumberingSettings::default();
    /// assert_eq!(
    ///     numbering.format(DocumentKind::SalesInvoice, "202610", 7),
    ///     "SI-202610-00007"
    /// );
    /// ```
    pub fn format(&self, kind: DocumentKind, period: &str, seq: i64) -> String {
        format!(
            "{}-{}-{:0width$}",
            self.prefix(kind),
            period,
            seq,
            width = self.pad_width
        )
    }
}

// =============================================================================
// Movement Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementSettings {
    /// Rows returned by the movement history when the filter sets no limit.
    #[serde(default = "default_movement_limit")]
    pub default_limit: u32,
}

fn default_movement_limit() -> u32 {
    100
}

impl Default for MovementSettings {
    fn default() -> Self {
        MovementSettings {
            default_limit: default_movement_limit(),
        }
    }
}

/// The parts of the configuration the engines read at runtime.
#[derive(Debug, Clone, Default)]
pub struct LedgerSettings {
    pub numbering: NumberingSettings,
    pub movements: MovementSettings,
}

// =============================================================================
// Main Ledger Configuration
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub tenant: TenantSettings,

    #[serde(default)]
    pub numbering: NumberingSettings,

    #[serde(default)]
    pub movements: MovementSettings,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (ledger.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load ledger config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DbResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DbError::InvalidConfig("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Ledger config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.tenant.id.trim().is_empty() {
            return Err(DbError::InvalidConfig("tenant.id must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(DbError::InvalidConfig(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        let prefixes = [
            &self.numbering.sales_prefix,
            &self.numbering.purchase_prefix,
            &self.numbering.credit_note_prefix,
        ];
        if prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(DbError::InvalidConfig(
                "document prefixes must not be empty".into(),
            ));
        }

        if self.numbering.pad_width == 0 {
            return Err(DbError::InvalidConfig(
                "pad_width must be greater than 0".into(),
            ));
        }

        if self.movements.default_limit == 0 {
            return Err(DbError::InvalidConfig(
                "movements.default_limit must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MIZAN_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(id) = std::env::var("MIZAN_TENANT_ID") {
            debug!(tenant_id = %id, "Overriding tenant from environment");
            self.tenant.id = id;
        }

        if let Ok(max) = std::env::var("MIZAN_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid MIZAN_MAX_CONNECTIONS"),
            }
        }

        if let Ok(secs) = std::env::var("MIZAN_BUSY_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(n) => self.database.busy_timeout_secs = n,
                Err(_) => warn!(value = %secs, "Ignoring invalid MIZAN_BUSY_TIMEOUT_SECS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "mizan", "ledger")
            .map(|dirs| dirs.config_dir().join("ledger.toml"))
    }

    /// Runtime settings handed to the engines.
    pub fn settings(&self) -> LedgerSettings {
        LedgerSettings {
            numbering: self.numbering.clone(),
            movements: self.movements.clone(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.tenant_id(), DEFAULT_TENANT_ID);
        assert_eq!(config.numbering.sales_prefix, "SI");
        assert_eq!(config.movements.default_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = LedgerConfig::default();

        config.tenant.id = " ".to_string();
        assert!(config.validate().is_err());
        config.tenant.id = "acme".to_string();

        config.database.min_connections = 10;
        assert!(config.validate().is_err());
        config.database.min_connections = 1;

        config.numbering.credit_note_prefix = String::new();
        assert!(config.validate().is_err());
        config.numbering.credit_note_prefix = "CN".to_string();

        config.numbering.pad_width = 0;
        assert!(config.validate().is_err());
        config.numbering.pad_width = 4;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: LedgerConfig = toml::from_str(
            r#"
            [tenant]
            id = "acme"

            [numbering]
            sales_prefix = "INV"
            "#,
        )
        .unwrap();

        assert_eq!(config.tenant_id(), "acme");
        assert_eq!(config.numbering.sales_prefix, "INV");
        assert_eq!(config.numbering.purchase_prefix, "PI");
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_number_format() {
        let mut numbering = NumberingSettings::default();
        assert_eq!(
            numbering.format(DocumentKind::CreditNote, "202610", 42),
            "CN-202610-00042"
        );
        numbering.pad_width = 3;
        assert_eq!(
            numbering.format(DocumentKind::PurchaseInvoice, "202601", 1234),
            "PI-202601-1234"
        );
    }

    #[test]
    fn test_toml_serialization() {
        let config = LedgerConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[numbering]"));
    }
}
