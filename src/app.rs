//! Core application runner (business logic) for `mitemp-listener`.
//!
//! This module is decoupled from CLI entry, signal handling, and process exit
//! codes so it can be tested deterministically with an injected scanner and
//! injected output streams.

use crate::advertisement::AdvertisementRecord;
use crate::alias::{Alias, AliasMap};
use crate::decoder;
use crate::filter::{self, DEFAULT_TARGET_NAME};
use crate::mac_address::MacAddress;
use crate::output::influxdb::{DEFAULT_MEASUREMENT, InfluxDbFormatter};
use crate::output::text::TextFormatter;
use crate::output::{OutputFormat, OutputFormatter};
use crate::scanner::{Backend, DEFAULT_ADAPTER, ScanConfig, ScanError};
use crate::throttle::Throttle;
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Command-line configuration.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Local name of the sensors to listen to (case-insensitive).
    #[arg(long, default_value = DEFAULT_TARGET_NAME)]
    pub name: String,

    /// Bluetooth adapter: `default`, an adapter name like `hci1`, or its index.
    #[arg(long, default_value = DEFAULT_ADAPTER)]
    pub device: String,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// Random static address to assign to the adapter before scanning, for
    /// adapters without a hardware address (hci backend only).
    #[arg(long, value_name = "MAC", value_parser = parse_mac)]
    pub random_address: Option<MacAddress>,

    /// Output format
    #[arg(long, default_value_t, value_enum)]
    pub format: OutputFormat,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = DEFAULT_MEASUREMENT)]
    pub influxdb_measurement: String,

    /// Specify human-readable alias for a sensor.
    /// Format: --alias 4C:65:A8:DD:EE:FF=Bedroom
    #[arg(long = "alias", value_parser = crate::alias::parse_alias, value_name = "ALIAS")]
    pub aliases: Vec<Alias>,

    /// Throttle readings per sensor to at most one per interval.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = crate::throttle::parse_duration)]
    pub throttle: Option<Duration>,

    /// Maximum time to wait for the scanner to stop after a termination signal.
    #[arg(long, default_value = "5s", value_parser = crate::throttle::parse_duration)]
    pub shutdown_timeout: Duration,

    /// Verbose output: debug logging and skipped-frame diagnostics
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

fn parse_mac(src: &str) -> Result<MacAddress, String> {
    src.parse().map_err(|e| format!("{e}"))
}

impl Options {
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            backend: self.backend,
            adapter: self.device.clone(),
            random_address: self.random_address,
        }
    }

    fn formatter(&self) -> Box<dyn OutputFormatter> {
        match self.format {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Influxdb => {
                Box::new(InfluxDbFormatter::new(self.influxdb_measurement.clone()))
            }
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        config: ScanConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<mpsc::Receiver<AdvertisementRecord>, ScanError>>
                + Send
                + '_,
        >,
    >;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        config: ScanConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<mpsc::Receiver<AdvertisementRecord>, ScanError>>
                + Send
                + '_,
        >,
    > {
        Box::pin(crate::scanner::start_scan(config, shutdown))
    }
}

/// Run the core processing loop, writing readings to `out` and verbose diagnostics to `err`.
///
/// - Records whose local name does not match `options.name` are ignored.
/// - Every complete sensor frame in a matching record is throttled (optionally),
///   formatted, and written as one line to `out`.
/// - Incomplete sensor frames are reported on `err` only when `options.verbose` is set.
///
/// Returns once the scanner closes its channel, which it does after `shutdown`
/// is set.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    shutdown: watch::Receiver<bool>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let aliases: AliasMap = crate::alias::to_map(&options.aliases);
    let formatter = options.formatter();
    let mut throttle = options.throttle.map(Throttle::new);

    let mut records = scanner.start_scan(options.scan_config(), shutdown).await?;
    info!(name = %options.name, backend = %options.backend, "scanning for sensors");

    while let Some(record) = records.recv().await {
        if !filter::matches(&record, &options.name) {
            continue;
        }

        for reading in decoder::decode_all(&record) {
            let should_emit = throttle
                .as_mut()
                .is_none_or(|t| t.should_emit(reading.address));
            if !should_emit {
                continue;
            }

            let name = crate::alias::resolve_name(&reading, &aliases);
            writeln!(out, "{}", formatter.format(&reading, name))?;
        }

        if options.verbose {
            for skipped in decoder::skipped(&record) {
                writeln!(err, "{}: {skipped}", record.address)?;
            }
        }
    }

    debug!("scanner channel closed");
    Ok(())
}
