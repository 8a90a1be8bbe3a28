//! Integration benchmark for the sensor processing pipeline.
//!
//! Feeds synthetic advertisement records through `run_with_io` with a fake
//! scanner, covering filter -> decode -> throttle -> format -> write.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mitemp_listener::app::{Options, Scanner, run_with_io};
use mitemp_listener::{
    AdvertisementRecord, MacAddress, SENSOR_SERVICE_UUID, ScanConfig, ScanError,
    ServiceDataEntry, decode_all,
};
use std::future::Future;
use std::pin::Pin;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};

/// Complete 18-byte frame: 21.0 °C, 54.4 %
fn sensor_payload() -> Vec<u8> {
    vec![
        0x50, 0x20, 0xAA, 0x01, 0x17, 0xFF, 0xEE, 0xDD, 0xA8, 0x65, 0x4C, 0x0D, 0x10, 0x04,
        0xD2, 0x00, 0x20, 0x02,
    ]
}

fn sensor_record(mac: MacAddress, name: &str) -> AdvertisementRecord {
    AdvertisementRecord::new(
        Some(name.to_string()),
        mac,
        vec![
            ServiceDataEntry::new(0x181A, vec![0x00; 13]),
            ServiceDataEntry::new(SENSOR_SERVICE_UUID, sensor_payload()),
        ],
    )
}

const TEST_MAC: MacAddress = MacAddress([0x4C, 0x65, 0xA8, 0xDD, 0xEE, 0xFF]);

/// A fake scanner that replays records and closes its channel.
struct FakeScanner {
    records: Vec<AdvertisementRecord>,
}

impl Scanner for FakeScanner {
    fn start_scan(
        &self,
        _config: ScanConfig,
        _shutdown: watch::Receiver<bool>,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<mpsc::Receiver<AdvertisementRecord>, ScanError>>
                + Send
                + '_,
        >,
    > {
        let records = self.records.clone();
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(records.len().max(1));
            tokio::spawn(async move {
                for r in records {
                    let _ = tx.send(r).await;
                }
            });
            Ok(rx)
        })
    }
}

fn default_options() -> Options {
    use clap::Parser;
    Options::parse_from(["mitemp-listener"])
}

fn run_once(rt: &Runtime, scanner: &FakeScanner, options: Options, capacity: usize) -> Vec<u8> {
    let (_stop, shutdown) = watch::channel(false);
    let mut out = Vec::<u8>::with_capacity(capacity);
    let mut err = Vec::<u8>::new();

    rt.block_on(async {
        run_with_io(options, scanner, shutdown, &mut out, &mut err)
            .await
            .unwrap();
    });
    out
}

/// Benchmark the pure decode step
fn bench_decode(c: &mut Criterion) {
    let record = sensor_record(TEST_MAC, "MJ_HT_V1");
    c.bench_function("decode_all", |b| b.iter(|| decode_all(black_box(&record))));
}

/// Benchmark batch processing through the full pipeline
fn bench_batch_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_pipeline");
    let rt = Runtime::new().unwrap();

    for batch_size in [1, 10, 100] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &size| {
                let scanner = FakeScanner {
                    records: (0..size)
                        .map(|_| sensor_record(TEST_MAC, "MJ_HT_V1"))
                        .collect(),
                };
                b.iter(|| black_box(run_once(&rt, &scanner, default_options(), 64 * size)))
            },
        );
    }

    group.finish();
}

/// Benchmark a noisy environment where most advertisements are from other devices
fn bench_filtered_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered_pipeline");
    let rt = Runtime::new().unwrap();

    let records = (0..100u8)
        .map(|i| {
            let mac = MacAddress([0x4C, 0x65, 0xA8, 0xDD, 0xEE, i]);
            let name = if i % 10 == 0 { "MJ_HT_V1" } else { "LYWSD03MMC" };
            sensor_record(mac, name)
        })
        .collect();
    let scanner = FakeScanner { records };

    group.throughput(Throughput::Elements(100));
    group.bench_function("100_records_10_matching", |b| {
        b.iter(|| {
            let out = run_once(&rt, &scanner, default_options(), 64 * 10);
            debug_assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), 10);
            black_box(out)
        })
    });

    group.finish();
}

/// Benchmark with throttling enabled (realistic scenario where most readings are dropped)
fn bench_throttled_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("throttled_pipeline");
    let rt = Runtime::new().unwrap();

    let scanner = FakeScanner {
        records: (0..100)
            .map(|_| sensor_record(TEST_MAC, "MJ_HT_V1"))
            .collect(),
    };

    group.throughput(Throughput::Elements(100));
    group.bench_function("100_same_mac_throttled", |b| {
        b.iter(|| {
            let mut options = default_options();
            options.throttle = Some(std::time::Duration::from_secs(3600));
            let out = run_once(&rt, &scanner, options, 64);
            debug_assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), 1);
            black_box(out)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_decode,
    bench_batch_pipeline,
    bench_filtered_pipeline,
    bench_throttled_pipeline,
);
criterion_main!(benches);
