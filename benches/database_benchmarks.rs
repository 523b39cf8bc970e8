//! Criterion benchmarks for rust_db_access

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_db_access::prelude::*;

// ============================================================================
// Value Conversion Benchmarks
// ============================================================================

fn bench_value_conversions(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_conversions");
    group.throughput(Throughput::Elements(1));

    let long = DatabaseValue::from(123456789i64);
    group.bench_function("long_to_i32", |b| {
        b.iter(|| black_box(&long).convert::<i32>("n"))
    });

    group.bench_function("long_to_option_i64", |b| {
        b.iter(|| black_box(&long).convert::<Option<i64>>("n"))
    });

    let text = DatabaseValue::from("2024-01-15 10:30:00");
    group.bench_function("string_to_datetime", |b| {
        b.iter(|| black_box(&text).convert::<chrono::NaiveDateTime>("ts"))
    });

    let guid = DatabaseValue::from(uuid::Uuid::new_v4().as_bytes().to_vec());
    group.bench_function("bytes_to_uuid", |b| {
        b.iter(|| black_box(&guid).convert::<uuid::Uuid>("id"))
    });

    group.bench_function("null_to_option", |b| {
        b.iter(|| black_box(&DatabaseValue::Null).convert::<Option<String>>("s"))
    });

    group.finish();
}

// ============================================================================
// Parameter Binding Benchmarks
// ============================================================================

record! {
    #[derive(Debug, Clone, Default)]
    struct Order {
        id: i64 => "Id",
        customer: String => "Customer",
        note: Option<String> => "Note",
        amount: f64 => "Amount",
        external_id: uuid::Uuid => "ExternalId",
    }
}

fn sample_order(id: i64) -> Order {
    Order {
        id,
        customer: format!("customer-{}", id),
        note: (id % 2 == 0).then(|| "rush".to_string()),
        amount: id as f64 * 1.5,
        external_id: uuid::Uuid::new_v4(),
    }
}

fn bench_parameter_binding(c: &mut Criterion) {
    let mut group = c.benchmark_group("parameter_binding");

    group.bench_function("bind_scalar", |b| {
        b.iter(|| {
            let mut set = ParameterSet::new();
            set.bind("id", &black_box(42i64)).unwrap();
            set.bind("@name", black_box("Alice")).unwrap();
            black_box(set)
        });
    });

    group.bench_function("rebind_existing", |b| {
        let mut set = ParameterSet::new();
        for i in 0..16 {
            set.bind(&format!("p{}", i), &i).unwrap();
        }
        b.iter(|| {
            set.bind("P15", &black_box(7)).unwrap();
        });
    });

    let order = sample_order(1);
    group.bench_function("bind_record", |b| {
        b.iter(|| {
            let mut set = ParameterSet::new();
            set.bind_record(black_box(&order), &[]).unwrap();
            black_box(set)
        });
    });

    group.finish();
}

// ============================================================================
// SQLite Execution Benchmarks
// ============================================================================

fn seeded(rows: i64) -> Connection<'static> {
    let mut db = Connection::open(&Profile::new("bench", "sqlite", ":memory:")).unwrap();
    db.execute(
        "CREATE TABLE Orders (Id INTEGER PRIMARY KEY, Customer TEXT NOT NULL, Note TEXT, \
         Amount REAL NOT NULL, ExternalId BLOB NOT NULL)",
    )
    .unwrap();
    let mut tx = db.begin_transaction().unwrap();
    {
        let mut insert = tx.sql(
            "INSERT INTO Orders VALUES (@Id, @Customer, @Note, @Amount, @ExternalId)",
        );
        for id in 0..rows {
            insert.with_parameters(&sample_order(id));
            insert.as_non_query().unwrap();
        }
    }
    tx.commit().unwrap();
    db
}

fn bench_prepared_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepared_insert");
    group.throughput(Throughput::Elements(1));

    let mut db = seeded(0);
    let mut insert =
        db.sql("INSERT INTO Orders VALUES (@Id, @Customer, @Note, @Amount, @ExternalId)");
    let mut next = 0i64;
    group.bench_function("reused_command", |b| {
        b.iter(|| {
            next += 1;
            insert.with_parameters(&sample_order(next));
            insert.as_non_query().unwrap()
        });
    });

    group.finish();
}

fn bench_materialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialization");

    for size in [10i64, 100, 1000].iter() {
        let mut db = seeded(*size);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("records", size), size, |b, _| {
            b.iter(|| {
                let orders: Vec<Order> = db
                    .sql("SELECT * FROM Orders")
                    .as_records::<Order>()
                    .unwrap()
                    .collect::<Result<_>>()
                    .unwrap();
                black_box(orders)
            });
        });

        group.bench_with_input(BenchmarkId::new("row_maps", size), size, |b, _| {
            b.iter(|| {
                let rows: Vec<DatabaseRow> = db
                    .sql("SELECT * FROM Orders")
                    .as_records::<DatabaseRow>()
                    .unwrap()
                    .collect::<Result<_>>()
                    .unwrap();
                black_box(rows)
            });
        });

        group.bench_with_input(BenchmarkId::new("reader_sum", size), size, |b, _| {
            b.iter(|| {
                let mut command = db.sql("SELECT Amount FROM Orders");
                let mut reader = command.as_reader().unwrap();
                let mut total = 0.0;
                while let Some(row) = reader.next_row().unwrap() {
                    total += row.get_ordinal_as::<f64>(0).unwrap();
                }
                black_box(total)
            });
        });
    }

    group.finish();
}

fn bench_scalar(c: &mut Criterion) {
    let mut db = seeded(100);
    c.bench_function("scalar_count", |b| {
        b.iter(|| {
            let count: i64 = db.sql("SELECT count(*) FROM Orders").as_scalar().unwrap();
            black_box(count)
        });
    });
}

criterion_group!(
    benches,
    bench_value_conversions,
    bench_parameter_binding,
    bench_prepared_insert,
    bench_materialization,
    bench_scalar,
);

criterion_main!(benches);
