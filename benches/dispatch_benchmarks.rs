//! Dispatch throughput benchmarks: batch decoding and full sessions in
//! inline and per-table worker mode.

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures_util::stream;
use std::sync::Arc;
use std::time::Duration;
use tablemux::{
    Config, DataType, Datum, DispatchMode, FnMuxer, HandlerError, RawColumnSchema, RawSchema,
    Record, RowBatch, StreamEvent, StreamSession, TableMetadata, TableRecordHandler,
    TransportError,
};
use tokio::runtime::Runtime;

struct Counter(u64);

#[async_trait]
impl TableRecordHandler for Counter {
    async fn handle_record(&mut self, record: &Record) -> Result<(), HandlerError> {
        if record.get_datum("latency").is_some() {
            self.0 += 1;
        }
        Ok(())
    }
}

fn schema(name: &str) -> RawSchema {
    RawSchema::new(
        name,
        vec![
            RawColumnSchema::plain("path", DataType::String),
            RawColumnSchema::plain("latency", DataType::Int64),
            RawColumnSchema::plain("upid", DataType::Uint128),
        ],
    )
}

fn batch(rows: usize) -> RowBatch {
    let rows: Vec<Vec<Datum>> = (0..rows)
        .map(|i| {
            vec![
                Datum::from(format!("/path/{}", i % 17)),
                Datum::Int64(i as i64),
                Datum::Uint128(i as u128),
            ]
        })
        .collect();
    RowBatch::from_rows(&[DataType::String, DataType::Int64, DataType::Uint128], &rows)
        .unwrap()
}

/// `tables` interleaved tables, each with `batches` batches of `rows` rows
fn events(tables: usize, batches: usize, rows: usize) -> Vec<StreamEvent> {
    let template = batch(rows);
    let mut events: Vec<StreamEvent> = (0..tables)
        .map(|t| StreamEvent::opened(format!("t{t}"), schema(&format!("table_{t}"))))
        .collect();
    for _ in 0..batches {
        for t in 0..tables {
            events.push(StreamEvent::batch(format!("t{t}"), template.clone()));
        }
    }
    events.extend((0..tables).map(|t| StreamEvent::closed(format!("t{t}"))));
    events
}

fn bench_batch_decode(c: &mut Criterion) {
    let metadata = Arc::new(schema("decode").decode().unwrap());
    let mut group = c.benchmark_group("batch_decode");
    for &rows in &[100usize, 1_000, 10_000] {
        let template = batch(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| {
                let decoded = template.clone().decode(&metadata).unwrap();
                decoded.records().count()
            });
        });
    }
    group.finish();
}

fn bench_session(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("session");
    for mode in [DispatchMode::Inline, DispatchMode::PerTableWorker] {
        let mut config = Config::default();
        config.dispatch.mode = mode;
        let input = events(8, 16, 256);
        group.throughput(Throughput::Elements(8 * 16 * 256));
        group.bench_with_input(BenchmarkId::new("mode", format!("{mode:?}")), &input, |b, input| {
            b.iter(|| {
                let muxer = FnMuxer(|_: &TableMetadata| -> Option<Box<dyn TableRecordHandler>> {
                    Some(Box::new(Counter(0)))
                });
                let events = stream::iter(input.clone().into_iter().map(Ok::<_, TransportError>));
                rt.block_on(StreamSession::new(muxer, events, &config).stream())
                    .unwrap()
                    .records_delivered
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets = bench_batch_decode, bench_session
}
criterion_main!(benches);
