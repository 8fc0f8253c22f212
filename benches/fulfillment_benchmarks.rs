use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stock_ledger_api::{
    commands::{
        orders::{ReturnOrderCommand, ReturnRequestItem},
        purchaseorders::{ReceiveLine, ReceivePurchaseOrderCommand},
    },
    services::{
        fulfillment::{
            derive_fulfillment_status, derive_purchase_order_status, is_fully_returned,
            ItemCounters, LineCounters,
        },
        stock_movements::MovementCursor,
    },
};
use uuid::Uuid;

fn items(size: i32) -> Vec<ItemCounters> {
    (0..size)
        .map(|i| ItemCounters {
            qty: 10,
            qty_reserved: 10,
            qty_shipped: i % 11,
            qty_returned: i % 3,
        })
        .collect()
}

// Status derivation runs on every transition
fn status_derivation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("status_derivation");

    for size in [1, 5, 20, 100].iter() {
        let counters = items(*size);
        group.bench_with_input(BenchmarkId::new("order", size), &counters, |b, counters| {
            b.iter(|| {
                (
                    derive_fulfillment_status(black_box(counters)),
                    is_fully_returned(black_box(counters)),
                )
            });
        });

        let lines: Vec<LineCounters> = (0..*size)
            .map(|i| LineCounters {
                qty_ordered: 50,
                qty_received: i * 7 % 60,
            })
            .collect();
        group.bench_with_input(BenchmarkId::new("purchase_order", size), &lines, |b, lines| {
            b.iter(|| derive_purchase_order_status(black_box(lines)));
        });
    }

    group.finish();
}

fn request_normalization_benchmark(c: &mut Criterion) {
    let ids: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
    let return_items: Vec<ReturnRequestItem> = (0..50)
        .map(|i| ReturnRequestItem {
            order_item_id: ids[i % ids.len()],
            qty: (i % 4) as i32,
        })
        .collect();
    let receive_lines: Vec<ReceiveLine> = (0..50)
        .map(|i| ReceiveLine {
            po_line_id: ids[i % ids.len()],
            qty: 1 + (i % 4) as i32,
        })
        .collect();

    c.bench_function("return_request_dedup", |b| {
        b.iter(|| ReturnOrderCommand::requested_quantities(black_box(&return_items)));
    });
    c.bench_function("receive_line_merge", |b| {
        b.iter(|| ReceivePurchaseOrderCommand::merged_lines(black_box(&receive_lines)));
    });
}

fn cursor_benchmark(c: &mut Criterion) {
    let cursor = MovementCursor {
        occurred_at: chrono::Utc::now(),
        created_at: chrono::Utc::now(),
        id: Uuid::new_v4(),
    };
    let token = cursor.encode().unwrap();

    c.bench_function("cursor_encode", |b| b.iter(|| black_box(&cursor).encode()));
    c.bench_function("cursor_decode", |b| {
        b.iter(|| MovementCursor::decode(black_box(&token)))
    });
}

criterion_group!(
    benches,
    status_derivation_benchmark,
    request_normalization_benchmark,
    cursor_benchmark
);
criterion_main!(benches);
