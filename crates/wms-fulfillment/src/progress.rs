use wms_schemas::OrderItem;

/// `round(100 * fully_picked / total)`, rounding halves up.
///
/// An item counts only when `picked_quantity >= quantity`; partial picks do
/// not contribute. An order with no items reports 0.
pub fn compute_progress(items: &[OrderItem]) -> u8 {
    let total = items.len() as i64;
    if total == 0 {
        return 0;
    }
    let complete = items.iter().filter(|i| i.is_fully_picked()).count() as i64;
    ((200 * complete + total) / (2 * total)) as u8
}
