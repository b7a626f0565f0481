use chrono::Utc;
use wms_fulfillment::*;
use wms_ledger::{LedgerOp, StockBook};
use wms_schemas::*;

fn book() -> StockBook {
    let mut book = StockBook::new();
    let now = Utc::now();
    book.apply(&LedgerOp::receive("SKU-A", "A-01", 10, "po-1"), None, "rcv", now)
        .unwrap();
    book.apply(&LedgerOp::receive("SKU-B", "B-01", 5, "po-1"), None, "rcv", now)
        .unwrap();
    book
}

fn order() -> OrderAggregate {
    let new = NewOrder {
        order_number: "SO-1001".to_string(),
        customer_id: "C-1".to_string(),
        customer_name: "Acme".to_string(),
        priority: Priority::Normal,
        items: vec![
            NewOrderItem {
                sku: "SKU-B".to_string(),
                bin_location: "B-01".to_string(),
                quantity: 1,
            },
            NewOrderItem {
                sku: "SKU-A".to_string(),
                bin_location: "A-01".to_string(),
                quantity: 3,
            },
        ],
    };
    OrderAggregate::intake(&new, Utc::now()).unwrap()
}

fn persist(book: &mut StockBook, agg: &OrderAggregate, effects: &Effects) {
    book.apply_all(&effects.ledger, Some(agg.order.id), "test", Utc::now())
        .unwrap();
}

#[test]
fn claim_pick_complete_pack_ship() {
    let mut book = book();
    let mut agg = order();
    let now = Utc::now();

    let fx = agg.claim("picker-1", now).unwrap();
    assert_eq!(fx.state_changes.len(), 1);
    assert_eq!(fx.state_changes[0].from_status, OrderStatus::Pending);
    assert_eq!(fx.state_changes[0].to_status, OrderStatus::Picking);
    assert_eq!(agg.order.picker_id.as_deref(), Some("picker-1"));

    let fx = agg
        .generate_tasks(&book.balances().clone(), &AllocationPolicy::default(), "picker-1", now)
        .unwrap();
    persist(&mut book, &agg, &fx);
    assert_eq!(fx.ledger.len(), 2);
    assert_eq!(book.balance("SKU-A", "A-01").reserved, 3);
    assert_eq!(book.balance("SKU-B", "B-01").reserved, 1);

    // route order follows bin codes
    let seq: Vec<(&str, i32)> = agg
        .tasks
        .iter()
        .map(|t| (t.bin_location.as_str(), t.sequence))
        .collect();
    assert_eq!(seq, vec![("A-01", 1), ("B-01", 2)]);

    let task_a = agg.tasks[0].id;
    let task_b = agg.tasks[1].id;

    let fx = agg
        .record_pick(task_a, "picker-1", "SKU-A", "A-01", 2, now)
        .unwrap();
    persist(&mut book, &agg, &fx);
    assert_eq!(agg.order.progress, 0);
    assert_eq!(agg.tasks[0].status, TaskStatus::InProgress);

    let fx = agg
        .record_pick(task_a, "picker-1", "SKU-A", "A-01", 1, now)
        .unwrap();
    persist(&mut book, &agg, &fx);
    assert_eq!(agg.order.progress, 50);
    assert_eq!(agg.tasks[0].status, TaskStatus::Completed);

    let fx = agg
        .record_pick(task_b, "picker-1", "SKU-B", "B-01", 1, now)
        .unwrap();
    persist(&mut book, &agg, &fx);
    assert_eq!(agg.order.progress, 100);

    let fx = agg.complete_picking("picker-1", now).unwrap();
    persist(&mut book, &agg, &fx);
    assert_eq!(agg.order.status, OrderStatus::Picked);
    assert!(agg.order.picked_at.is_some());
    assert!(agg.items.iter().all(|i| i.status == OrderItemStatus::FullyPicked));

    assert_eq!(book.balance("SKU-A", "A-01").on_hand, 7);
    assert_eq!(book.balance("SKU-A", "A-01").reserved, 0);
    assert_eq!(book.balance("SKU-B", "B-01").on_hand, 4);
    assert!(book.reconcile("SKU-A").is_clean());
    assert!(book.reconcile("SKU-B").is_clean());

    agg.claim_packing("packer-1", now).unwrap();
    let item_ids: Vec<_> = agg.items.iter().map(|i| (i.id, i.picked_quantity)).collect();
    for (id, qty) in item_ids {
        agg.verify_item(id, "packer-1", qty, now).unwrap();
    }
    agg.complete_packing("packer-1", now).unwrap();
    let fx = agg.ship("packer-1", Some("1Z999"), now).unwrap();
    assert_eq!(fx.state_changes[0].to_status, OrderStatus::Shipped);
    assert_eq!(agg.order.tracking_number.as_deref(), Some("1Z999"));
    assert!(agg.order.status.is_terminal());
}

#[test]
fn generate_tasks_is_idempotent() {
    let book = book();
    let mut agg = order();
    let now = Utc::now();
    agg.claim("picker-1", now).unwrap();

    let snapshot = book.balances().clone();
    let first = agg
        .generate_tasks(&snapshot, &AllocationPolicy::default(), "picker-1", now)
        .unwrap();
    let tasks = agg.tasks.clone();

    let second = agg
        .generate_tasks(&snapshot, &AllocationPolicy::default(), "picker-1", now)
        .unwrap();
    assert!(!first.is_empty());
    assert!(second.is_empty());
    assert_eq!(agg.tasks, tasks);
}

#[test]
fn per_unit_split_emits_one_task_per_unit() {
    let book = book();
    let mut agg = order();
    let now = Utc::now();
    agg.claim("picker-1", now).unwrap();
    let policy = AllocationPolicy {
        split_mode: SplitMode::PerUnit,
        alternate_bins: true,
    };
    let fx = agg
        .generate_tasks(&book.balances().clone(), &policy, "picker-1", now)
        .unwrap();

    assert_eq!(agg.tasks.len(), 4);
    assert!(agg.tasks.iter().all(|t| t.quantity == 1));
    // one reservation per bin portion, not per task
    assert_eq!(fx.ledger.len(), 2);
}

#[test]
fn packing_requires_every_picked_line_verified() {
    let book = book();
    let mut agg = order();
    let now = Utc::now();
    agg.claim("picker-1", now).unwrap();
    agg.generate_tasks(&book.balances().clone(), &AllocationPolicy::default(), "picker-1", now)
        .unwrap();
    for t in agg.tasks.clone() {
        agg.record_pick(t.id, "picker-1", &t.sku, &t.bin_location, t.quantity, now)
            .unwrap();
    }
    agg.complete_picking("picker-1", now).unwrap();
    agg.claim_packing("packer-1", now).unwrap();

    let first = agg.items[0].id;
    agg.verify_item(first, "packer-1", 1, now).unwrap();
    let err = agg.complete_packing("packer-1", now).unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");

    let err = agg.verify_item(first, "packer-1", 5, now).unwrap_err();
    assert_eq!(err.kind(), "VALIDATION");

    let err = agg.claim_packing("packer-2", now).unwrap_err();
    assert_eq!(err.kind(), "CONFLICT");
}
