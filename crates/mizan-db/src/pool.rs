//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  LedgerConfig::load(..) or DbConfig::new(path)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ db.stock() / db.invoices() / db.payments() / ...               │
//! │       ▼                                                                 │
//! │  Engines open BEGIN IMMEDIATE transactions on pooled connections.      │
//! │  SQLite admits one writer at a time; readers continue under WAL.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled for file databases so
//! readers never block the single writer and vice versa.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use mizan_core::DEFAULT_TENANT_ID;

use crate::config::{LedgerConfig, LedgerSettings};
use crate::engine::credit_note::CreditNoteEngine;
use crate::engine::invoice::InvoiceEngine;
use crate::engine::master::MasterData;
use crate::engine::payment::PaymentEngine;
use crate::engine::stock::StockLedger;
use crate::engine::transfer::TransferEngine;
use crate::error::{DbError, DbResult};
use crate::migrations;

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/mizan/ledger.db")
///     .max_connections(5)
///     .tenant_id("acme");
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// How long SQLite waits on a held write lock.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,

    /// Tenant the returned handle is scoped to.
    pub tenant_id: String,

    /// Numbering and query defaults for the engines.
    pub settings: LedgerSettings,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            settings: LedgerSettings::default(),
        }
    }

    /// Builds the pool configuration from a loaded [`LedgerConfig`].
    pub fn from_ledger_config(config: &LedgerConfig) -> Self {
        let db = &config.database;
        let base = if db.path.as_os_str() == IN_MEMORY {
            DbConfig::in_memory()
        } else {
            DbConfig::new(db.path.clone())
                .max_connections(db.max_connections)
                .min_connections(db.min_connections)
        };

        base.connect_timeout(Duration::from_secs(db.connect_timeout_secs))
            .busy_timeout(Duration::from_secs(db.busy_timeout_secs))
            .run_migrations(db.run_migrations)
            .tenant_id(config.tenant_id())
            .settings(config.settings())
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn settings(mut self, settings: LedgerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// // Database is isolated, perfect for tests
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            settings: LedgerSettings::default(),
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY
    }
}

// =============================================================================
// Database
// =============================================================================

/// Tenant-scoped database handle providing engine access.
///
/// Cloning is cheap: the pool and settings are shared.
///
/// ## Usage in Request Handlers
/// ```rust,ignore
/// async fn sell(db: &Database, req: NewInvoice) -> DbResult<InvoiceDetail> {
///     db.invoices().create(req).await
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    tenant_id: Arc<str>,
    settings: Arc<LedgerSettings>,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads (file databases)
    ///    - NORMAL synchronous
    ///    - Foreign keys enabled
    ///    - Busy timeout so writers queue for the lock
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    ///
    /// ## Returns
    /// * `Ok(Database)` - Ready-to-use database handle
    /// * `Err(DbError)` - Connection or migration failed
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            tenant_id = %config.tenant_id,
            "Initializing database connection"
        );

        let connect_options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true)
        }
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);

        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout);

        // An in-memory database lives exactly as long as its one connection.
        pool_options = if config.is_in_memory() {
            pool_options.idle_timeout(None).max_lifetime(None)
        } else {
            pool_options.idle_timeout(Some(config.idle_timeout))
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            tenant_id: Arc::from(config.tenant_id.as_str()),
            settings: Arc::new(config.settings),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Opens the database described by a loaded [`LedgerConfig`].
    pub async fn from_config(config: &LedgerConfig) -> DbResult<Self> {
        Self::new(DbConfig::from_ledger_config(config)).await
    }

    /// Runs database migrations.
    ///
    /// Idempotent: safe to run multiple times.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Returns a handle on the same pool scoped to another tenant.
    pub fn for_tenant(&self, tenant_id: impl AsRef<str>) -> Database {
        Database {
            pool: self.pool.clone(),
            tenant_id: Arc::from(tenant_id.as_ref()),
            settings: Arc::clone(&self.settings),
        }
    }

    /// Opens a write transaction holding the SQLite write lock from its
    /// first statement.
    ///
    /// A deferred transaction that reads before writing can be refused the
    /// lock mid-way under WAL; `BEGIN IMMEDIATE` queues on the busy timeout
    /// instead.
    pub(crate) async fn begin_immediate(&self) -> DbResult<Transaction<'static, Sqlite>> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(tx)
    }

    // =========================================================================
    // Engines
    // =========================================================================

    /// Locations and products.
    pub fn master_data(&self) -> MasterData {
        MasterData::new(self.clone())
    }

    /// Returns the stock ledger.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let qty = db.stock().get_stock("p-1", "wh-1").await?;
    /// ```
    pub fn stock(&self) -> StockLedger {
        StockLedger::new(self.clone())
    }

    pub fn transfers(&self) -> TransferEngine {
        TransferEngine::new(self.clone())
    }

    /// Sales and purchase invoices.
    pub fn invoices(&self) -> InvoiceEngine {
        InvoiceEngine::new(self.clone())
    }

    pub fn payments(&self) -> PaymentEngine {
        PaymentEngine::new(self.clone())
    }

    pub fn credit_notes(&self) -> CreditNoteEngine {
        CreditNoteEngine::new(self.clone())
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all engine operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
