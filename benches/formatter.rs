//! Benchmarks for the output formatters and alias lookup.
//!
//! Isolates formatting from the async runtime so the per-line cost can be
//! compared between output formats.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use mitemp_listener::{
    AliasMap, InfluxDbFormatter, MacAddress, OutputFormatter, Reading, TextFormatter,
    resolve_name,
};
use std::time::SystemTime;

const TEST_MAC: MacAddress = MacAddress([0x4C, 0x65, 0xA8, 0xDD, 0xEE, 0xFF]);

fn reading() -> Reading {
    Reading {
        name: "MJ_HT_V1".to_string(),
        address: TEST_MAC,
        timestamp: SystemTime::UNIX_EPOCH,
        temperature: -12.3,
        humidity: 54.4,
    }
}

fn bench_formats(c: &mut Criterion) {
    let mut group = c.benchmark_group("format");
    group.throughput(Throughput::Elements(1));

    let reading = reading();
    let text = TextFormatter;
    let influxdb = InfluxDbFormatter::new("mitemp_measurement".to_string());

    group.bench_function("text", |b| {
        b.iter(|| black_box(text.format(black_box(&reading), black_box("MJ_HT_V1"))))
    });
    group.bench_function("influxdb", |b| {
        b.iter(|| black_box(influxdb.format(black_box(&reading), black_box("MJ_HT_V1"))))
    });
    group.bench_function("influxdb_escaped_name", |b| {
        b.iter(|| black_box(influxdb.format(black_box(&reading), black_box("Living Room, North"))))
    });

    group.finish();
}

fn bench_alias_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("alias_resolution");
    group.throughput(Throughput::Elements(1));

    let reading = reading();

    let empty_aliases = AliasMap::new();
    group.bench_function("no_alias", |b| {
        b.iter(|| black_box(resolve_name(black_box(&reading), black_box(&empty_aliases))))
    });

    // Many aliases, none for this sensor (lookup miss)
    let many_aliases: AliasMap = (0..100u8)
        .map(|i| (MacAddress([0x4C, 0x65, 0xA8, 0x00, 0x00, i]), format!("Room_{i}")))
        .collect();
    group.bench_function("miss_in_100", |b| {
        b.iter(|| black_box(resolve_name(black_box(&reading), black_box(&many_aliases))))
    });

    group.finish();
}

criterion_group!(benches, bench_formats, bench_alias_resolution);
criterion_main!(benches);
