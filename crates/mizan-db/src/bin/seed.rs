//! # Demo Ledger Seeder
//!
//! Registers a demo tenant's locations and products, then walks through the
//! ledger's main flows so a fresh database has something to look at.
//!
//! ## Usage
//! ```bash
//! # Use ledger.toml from the platform config directory (or defaults)
//! cargo run -p mizan-db --bin seed
//!
//! # Explicit config file
//! cargo run -p mizan-db --bin seed -- --config ./ledger.toml
//!
//! # Override the database path
//! cargo run -p mizan-db --bin seed -- --db ./data/mizan.db
//! ```
//!
//! ## Walkthrough
//! 1. Purchase stock into the warehouse, sell part of it with a partial payment
//! 2. Try to sell from an empty van
//! 3. Return goods to the vendor with credit notes, one over the cap
//! 4. Transfer stock from the warehouse to the van
//! 5. Settle three customer invoices with one FIFO payment

use std::env;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use mizan_core::{
    Direction, FifoPayment, LocationType, Money, NewCreditNote, NewCreditNoteItem, NewInvoice,
    NewInvoiceItem, NewTransfer, PaymentMethod, Quantity, TransferLine,
};
use mizan_db::{Database, DbConfig, LedgerConfig};

const WAREHOUSE: &str = "loc-main-warehouse";
const VAN: &str = "loc-van-07";
const STORE: &str = "loc-high-street";
const WIDGET: &str = "prod-widget";
const GADGET: &str = "prod-gadget";
const GIZMO: &str = "prod-gizmo";
const CUSTOMER: &str = "cust-acme";
const VENDOR: &str = "vend-globex";

fn line(product_id: &str, units: i64, price_cents: i64) -> NewInvoiceItem {
    NewInvoiceItem {
        product_id: product_id.to_string(),
        quantity: Quantity::from_units(units),
        unit_price: Money::from_cents(price_cents),
        discount_bps: 0,
    }
}

fn invoice(
    direction: Direction,
    counterparty: &str,
    location_id: &str,
    items: Vec<NewInvoiceItem>,
) -> NewInvoice {
    NewInvoice {
        direction,
        counterparty_id: Some(counterparty.to_string()),
        location_id: location_id.to_string(),
        items,
        paid_amount: Money::zero(),
        payment_method: None,
        notes: None,
        invoice_date: None,
        created_by: Some("seed".to_string()),
    }
}

fn credit_note(invoice_id: &str, product_id: &str, units: i64, price_cents: i64) -> NewCreditNote {
    NewCreditNote {
        source_invoice_id: invoice_id.to_string(),
        location_id: None,
        credit_note_date: None,
        notes: Some("returned to vendor".to_string()),
        items: vec![NewCreditNoteItem {
            product_id: product_id.to_string(),
            quantity: Quantity::from_units(units),
            unit_price: Money::from_cents(price_cents),
            reason: Some("damaged in transit".to_string()),
        }],
        created_by: Some("seed".to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mizan=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Mizan Demo Ledger Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  ledger.toml to load (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file path (overrides the config)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = LedgerConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("🌱 Mizan Demo Ledger Seeder");
    println!("===========================");
    println!("Database: {}", config.database.path.display());
    println!("Tenant:   {}", config.tenant_id());
    println!();

    let db = Database::new(DbConfig::from_ledger_config(&config)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if db.master_data().get_location(WAREHOUSE).await.is_ok() {
        println!("⚠ Demo data already present");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Master data
    let master = db.master_data();
    master
        .register_location(WAREHOUSE, "Main Warehouse", LocationType::Warehouse)
        .await?;
    master.register_location(VAN, "Van 07", LocationType::Van).await?;
    master
        .register_location(STORE, "High Street Store", LocationType::Store)
        .await?;
    master.register_product(WIDGET, "WID-001", "Widget").await?;
    master.register_product(GADGET, "GAD-001", "Gadget").await?;
    master.register_product(GIZMO, "GIZ-001", "Gizmo").await?;
    println!("✓ Registered 3 locations and 3 products");

    // 1. Purchase, then a partially paid sale
    println!();
    println!("1. Purchase and sale");
    let purchase = db
        .invoices()
        .create(invoice(
            Direction::Purchase,
            VENDOR,
            WAREHOUSE,
            vec![line(WIDGET, 100, 250), line(GADGET, 10, 1200)],
        ))
        .await?;
    println!(
        "  {} total {} ({})",
        purchase.invoice.invoice_number,
        purchase.invoice.total_amount,
        purchase.invoice.payment_status.as_str()
    );

    let mut sale = invoice(
        Direction::Sales,
        CUSTOMER,
        WAREHOUSE,
        vec![line(WIDGET, 10, 500), line(GADGET, 2, 2000)],
    );
    sale.paid_amount = Money::from_cents(5000);
    sale.payment_method = Some(PaymentMethod::Cash);
    let sale = db.invoices().create(sale).await?;
    println!(
        "  {} total {} paid {} ({})",
        sale.invoice.invoice_number,
        sale.invoice.total_amount,
        sale.invoice.paid_amount,
        sale.invoice.payment_status.as_str()
    );
    println!(
        "  Widget at warehouse: {}",
        db.stock().get_stock(WIDGET, WAREHOUSE).await?
    );

    // 2. Selling from an empty van
    println!();
    println!("2. Sale from an empty van");
    match db
        .invoices()
        .create(invoice(Direction::Sales, CUSTOMER, VAN, vec![line(WIDGET, 1, 500)]))
        .await
    {
        Ok(detail) => println!("  unexpected: {} created", detail.invoice.invoice_number),
        Err(e) => println!("  refused: {}", e),
    }

    // 3. Purchase returns
    println!();
    println!("3. Purchase returns");
    let gizmos = db
        .invoices()
        .create(invoice(
            Direction::Purchase,
            VENDOR,
            WAREHOUSE,
            vec![line(GIZMO, 100, 100)],
        ))
        .await?;
    let first = db
        .credit_notes()
        .create(credit_note(&gizmos.invoice.id, GIZMO, 60, 100))
        .await?;
    db.credit_notes()
        .approve(&first.credit_note.id, Some("seed"))
        .await?;
    println!("  {} approved for 60", first.credit_note.credit_note_number);

    match db
        .credit_notes()
        .create(credit_note(&gizmos.invoice.id, GIZMO, 50, 100))
        .await
    {
        Ok(note) => println!("  unexpected: {} created", note.credit_note.credit_note_number),
        Err(e) => println!("  refused: {}", e),
    }

    let second = db
        .credit_notes()
        .create(credit_note(&gizmos.invoice.id, GIZMO, 40, 100))
        .await?;
    db.credit_notes()
        .approve(&second.credit_note.id, Some("seed"))
        .await?;
    println!("  {} approved for 40", second.credit_note.credit_note_number);
    println!(
        "  Gizmo at warehouse: {}, owed to vendor: {}",
        db.stock().get_stock(GIZMO, WAREHOUSE).await?,
        db.invoices().balance(&gizmos.invoice.id).await?
    );

    // 4. Transfer
    println!();
    println!("4. Transfer warehouse → van");
    let transfer = db
        .transfers()
        .transfer(NewTransfer {
            from_location_id: WAREHOUSE.to_string(),
            to_location_id: VAN.to_string(),
            items: vec![TransferLine {
                product_id: WIDGET.to_string(),
                quantity: Quantity::from_units(20),
            }],
            notes: Some("morning load".to_string()),
            created_by: Some("seed".to_string()),
        })
        .await?;
    println!(
        "  transfer {}: warehouse {}, van {}",
        transfer.transfer.id,
        db.stock().get_stock(WIDGET, WAREHOUSE).await?,
        db.stock().get_stock(WIDGET, VAN).await?
    );

    // 5. FIFO settlement
    println!();
    println!("5. FIFO payment");
    let customer = "cust-fifo";
    for units in [20, 40, 30] {
        let detail = db
            .invoices()
            .create(invoice(
                Direction::Sales,
                customer,
                WAREHOUSE,
                vec![line(WIDGET, units, 500)],
            ))
            .await?;
        println!(
            "  {} total {}",
            detail.invoice.invoice_number, detail.invoice.total_amount
        );
    }

    let result = db
        .payments()
        .allocate_fifo(FifoPayment {
            counterparty_id: customer.to_string(),
            direction: Direction::Sales,
            amount: Money::from_cents(25000),
            method: PaymentMethod::BankTransfer,
            allocation_date: None,
            reference_number: Some("BANK-0001".to_string()),
            notes: None,
            created_by: Some("seed".to_string()),
        })
        .await?;
    for allocation in &result.allocations {
        println!(
            "  {} ← {} ({})",
            allocation.invoice_id,
            allocation.allocated_amount,
            allocation.invoice_status_after.as_str()
        );
    }
    println!(
        "  allocated {}, unallocated {}",
        result.payment.total_allocated, result.payment.unallocated_amount
    );

    println!();
    println!("✓ Seed complete");

    db.close().await;
    Ok(())
}
