use clap::Parser;
use mitemp_listener::app::{Options, RealScanner, RunError, run_with_io};
use std::panic::{self, PanicHookInfo};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Log to stderr so stdout carries only readings. `RUST_LOG` overrides the level.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves with the signal name on SIGINT or SIGTERM.
async fn termination_signal() -> std::io::Result<&'static str> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

/// Scan until a termination signal, then stop the scanner and wait for it
/// to finish, at most `options.shutdown_timeout`.
async fn run(options: Options) -> Result<(), RunError> {
    let shutdown_timeout = options.shutdown_timeout;
    let (stop, shutdown) = watch::channel(false);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();

    let scan = run_with_io(options, &RealScanner, shutdown, &mut stdout, &mut stderr);
    tokio::pin!(scan);

    let received = tokio::select! {
        result = &mut scan => return result,
        received = termination_signal() => received,
    };
    match received {
        Ok(name) => info!(signal = name, "signal received, stopping scan"),
        Err(e) => {
            warn!(error = %e, "cannot listen for termination signals");
            return scan.await;
        }
    }

    stop.send_replace(true);
    match tokio::time::timeout(shutdown_timeout, scan).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout = ?shutdown_timeout, "scanner did not stop in time, exiting");
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd, Telegraf execd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    init_logging(options.verbose);

    match run(options).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
