//! # Credit-Note Cap
//!
//! A credit note may never return more of a product than the source
//! invoice carried, counting every other approved credit note against the
//! same invoice.
//!
//! ```text
//! invoiced(P)             = 100
//! approved credits(P)     =  60   (CN-1)
//! requested(P)            =  50   (CN-2)  → 60 + 50 = 110 > 100  ✗
//! requested(P)            =  40   (CN-2)  → 60 + 40 = 100        ✓
//! ```

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::quantity::Quantity;

/// Sums quantities per product, keeping first-seen order.
pub fn quantities_by_product<'a, I>(lines: I) -> Vec<(String, Quantity)>
where
    I: IntoIterator<Item = (&'a str, Quantity)>,
{
    let mut order: Vec<(String, Quantity)> = Vec::new();
    for (product_id, quantity) in lines {
        match order.iter_mut().find(|(id, _)| id == product_id) {
            Some((_, total)) => *total += quantity,
            None => order.push((product_id.to_string(), quantity)),
        }
    }
    order
}

/// Checks requested credit quantities against the invoice.
///
/// ## Arguments
/// * `invoiced` - quantity per product on the source invoice
/// * `already_credited` - approved credit per product, excluding the note
///   being checked
/// * `requested` - the note's lines; duplicate products are summed first
///
/// ## Returns
/// The first product (in request order) that would be over-credited, as
/// [`CoreError::ExceedsInvoiceQuantity`]. A product absent from the invoice
/// counts as invoiced zero.
pub fn check_credit_caps(
    invoiced: &HashMap<String, Quantity>,
    already_credited: &HashMap<String, Quantity>,
    requested: &[(String, Quantity)],
) -> CoreResult<()> {
    let requested = quantities_by_product(
        requested
            .iter()
            .map(|(product_id, quantity)| (product_id.as_str(), *quantity)),
    );

    for (product_id, quantity) in requested {
        let invoiced_qty = invoiced.get(&product_id).copied().unwrap_or_default();
        let credited_qty = already_credited.get(&product_id).copied().unwrap_or_default();

        if credited_qty + quantity > invoiced_qty {
            return Err(CoreError::ExceedsInvoiceQuantity {
                product_id,
                invoiced: invoiced_qty,
                already_credited: credited_qty,
                requested: quantity,
            });
        }
    }

    Ok(())
}
