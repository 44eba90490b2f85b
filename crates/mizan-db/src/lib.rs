//! # mizan-db: Persistence and Engines for the Mizan Ledger
//!
//! SQLite storage for stock, invoices, payments and credit notes, plus the
//! engines that own every transaction boundary.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mizan Data Flow                                  │
//! │                                                                         │
//! │  Request handler (create_invoice, allocate_fifo, ...)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     mizan-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Engines     │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (engine/)    │    │ (repository/) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ StockLedger   │───►│ StockRepo     │    │ 001_ledger_  │  │   │
//! │  │   │ InvoiceEngine │    │ InvoiceRepo   │    │   schema.sql │  │   │
//! │  │   │ PaymentEngine │    │ PaymentRepo   │    │              │  │   │
//! │  │   │ ...           │    │ ...           │    │              │  │   │
//! │  │   └───────┬───────┘    └───────────────┘    └──────────────┘  │   │
//! │  │           │                                                     │   │
//! │  │   ┌───────┴───────┐    ┌───────────────┐                       │   │
//! │  │   │   Database    │    │ LedgerConfig  │                       │   │
//! │  │   │   (pool.rs)   │◄───│  (config.rs)  │                       │   │
//! │  │   └───────────────┘    └───────────────┘                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool and the tenant-scoped [`Database`] handle
//! - [`config`] - `ledger.toml` loading with environment overrides
//! - [`migrations`] - Embedded schema migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per table group, SQL only
//! - [`engine`] - Units of work: stock, transfers, invoices, payments,
//!   credit notes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mizan_db::{Database, LedgerConfig};
//!
//! let config = LedgerConfig::load_or_default(None);
//! let db = Database::from_config(&config).await?;
//!
//! let invoice = db.invoices().create(request).await?;
//! let payment = db.payments().allocate_fifo(fifo).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::LedgerConfig;
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Engine re-exports for convenience
pub use engine::credit_note::CreditNoteEngine;
pub use engine::invoice::InvoiceEngine;
pub use engine::master::MasterData;
pub use engine::payment::PaymentEngine;
pub use engine::stock::StockLedger;
pub use engine::transfer::TransferEngine;
