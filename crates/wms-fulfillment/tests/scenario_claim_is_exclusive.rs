use chrono::Utc;
use wms_fulfillment::*;
use wms_ledger::{LedgerOp, StockBook};
use wms_schemas::*;

fn setup() -> (StockBook, OrderAggregate) {
    let mut book = StockBook::new();
    let now = Utc::now();
    book.apply(&LedgerOp::receive("SKU-A", "A-01", 10, "po-1"), None, "rcv", now)
        .unwrap();
    let new = NewOrder {
        order_number: "SO-2001".to_string(),
        customer_id: "C-2".to_string(),
        customer_name: "Globex".to_string(),
        priority: Priority::High,
        items: vec![NewOrderItem {
            sku: "SKU-A".to_string(),
            bin_location: "A-01".to_string(),
            quantity: 4,
        }],
    };
    (book, OrderAggregate::intake(&new, now).unwrap())
}

#[test]
fn second_claim_conflicts() {
    let (_, mut agg) = setup();
    let now = Utc::now();
    agg.claim("picker-1", now).unwrap();

    let err = agg.claim("picker-2", now).unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");
    assert_eq!(agg.order.picker_id.as_deref(), Some("picker-1"));
}

#[test]
fn unclaim_resets_tasks_and_keeps_reservation() {
    let (mut book, mut agg) = setup();
    let now = Utc::now();
    agg.claim("picker-1", now).unwrap();
    let fx = agg
        .generate_tasks(&book.balances().clone(), &AllocationPolicy::default(), "picker-1", now)
        .unwrap();
    book.apply_all(&fx.ledger, Some(agg.order.id), "picker-1", now)
        .unwrap();
    let task = agg.tasks[0].id;
    agg.record_pick(task, "picker-1", "SKU-A", "A-01", 1, now)
        .unwrap();

    let fx = agg.unclaim("supervisor", "shift change", now).unwrap();
    assert!(fx.ledger.is_empty());
    assert_eq!(fx.state_changes[0].to_status, OrderStatus::Pending);
    assert_eq!(fx.state_changes[0].reason.as_deref(), Some("shift change"));
    assert_eq!(agg.order.status, OrderStatus::Pending);
    assert!(agg.order.picker_id.is_none());
    assert_eq!(agg.tasks[0].status, TaskStatus::Pending);
    assert!(agg.tasks[0].picker_id.is_none());
    assert_eq!(agg.tasks[0].picked_quantity, 1);
    assert_eq!(agg.tasks[0].reserved_quantity, 3);

    // a new picker takes over where the last one stopped
    agg.claim("picker-2", now).unwrap();
    let err = agg
        .record_pick(task, "picker-1", "SKU-A", "A-01", 1, now)
        .unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");
    agg.record_pick(task, "picker-2", "SKU-A", "A-01", 3, now)
        .unwrap();
    assert_eq!(agg.order.progress, 100);
}

#[test]
fn unclaim_requires_picking() {
    let (_, mut agg) = setup();
    let err = agg.unclaim("supervisor", "oops", Utc::now()).unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");
}

#[test]
fn failed_pick_leaves_aggregate_untouched() {
    let (book, mut agg) = setup();
    let now = Utc::now();
    agg.claim("picker-1", now).unwrap();
    agg.generate_tasks(&book.balances().clone(), &AllocationPolicy::default(), "picker-1", now)
        .unwrap();
    let before = agg.clone();
    let task = agg.tasks[0].id;

    let overpick = agg
        .record_pick(task, "picker-1", "SKU-A", "A-01", 5, now)
        .unwrap_err();
    assert_eq!(overpick.kind(), "VALIDATION");
    let wrong_bin = agg
        .record_pick(task, "picker-1", "SKU-A", "A-09", 1, now)
        .unwrap_err();
    assert_eq!(wrong_bin.kind(), "VALIDATION");
    let zero = agg
        .record_pick(task, "picker-1", "SKU-A", "A-01", 0, now)
        .unwrap_err();
    assert_eq!(zero.kind(), "VALIDATION");
    let unknown = agg
        .record_pick(uuid::Uuid::new_v4(), "picker-1", "SKU-A", "A-01", 1, now)
        .unwrap_err();
    assert_eq!(unknown.kind(), "NOT_FOUND");

    assert_eq!(agg, before);
}
