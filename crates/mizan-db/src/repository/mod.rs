//! # Repository Module
//!
//! SQL for every ledger table, one repository per table family.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and Transactions                        │
//! │                                                                         │
//! │  Engine (e.g. InvoiceEngine::create)                                   │
//! │       │                                                                 │
//! │       │  let mut tx = db.begin_immediate().await?;                     │
//! │       │  InvoiceRepository::new(tenant).insert(&mut tx, &invoice)      │
//! │       │  StockRepository::new(tenant).apply_delta(&mut tx, ..)         │
//! │       │  MovementRepository::new(tenant).append(&mut tx, ..)           │
//! │       │  tx.commit().await?;                                           │
//! │       ▼                                                                 │
//! │  Repository methods take `&mut SqliteConnection`, so the same code     │
//! │  runs inside a transaction or on a plain pooled connection.            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every statement is scoped by `tenant_id`.
//!
//! ## Available Repositories
//!
//! - [`MasterRepository`] - Locations and products
//! - [`StockRepository`] - Stock rows and conditional updates
//! - [`MovementRepository`] - Append-only movement log
//! - [`TransferRepository`] - Transfers and their lines
//! - [`InvoiceRepository`] - Invoices, items, optimistic versioning
//! - [`PaymentRepository`] - Payments and FIFO allocations
//! - [`CreditNoteRepository`] - Credit notes and their lines
//! - [`SequenceRepository`] - Document number counters

pub mod credit_note;
pub mod invoice;
pub mod master;
pub mod movement;
pub mod payment;
pub mod sequence;
pub mod stock;
pub mod transfer;

pub use credit_note::CreditNoteRepository;
pub use invoice::InvoiceRepository;
pub use master::MasterRepository;
pub use movement::MovementRepository;
pub use payment::PaymentRepository;
pub use sequence::SequenceRepository;
pub use stock::StockRepository;
pub use transfer::TransferRepository;
