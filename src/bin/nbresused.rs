//! nbresused - notebook server memory exporter daemon.
//!
//! Samples the resident memory of a notebook server, its kernels and the
//! machine every interval and serves the gauges on `/metrics`.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use nbresuse::background::run_tick_loop;
#[cfg(not(target_os = "linux"))]
use nbresuse::collector::MockFs;
#[cfg(target_os = "linux")]
use nbresuse::collector::RealFs;
use nbresuse::collector::{
    CollectorConfig, DEFAULT_KERNEL_MARKER, FileSystem, MetricsCollector, ProcfsTable, host_pid,
};
use nbresuse::export;
use nbresuse::metrics::PrometheusSink;
use nbresuse::session::{JupyterSessionRegistry, RegistryConfig};

/// Notebook server memory exporter.
#[derive(Parser)]
#[command(name = "nbresused", about = "Notebook server memory exporter", version)]
struct Args {
    /// Address to serve /metrics and /healthz on.
    #[arg(long, default_value = "127.0.0.1:9091", env = "NBRESUSE_LISTEN")]
    listen: SocketAddr,

    /// Sampling interval in milliseconds.
    #[arg(
        long,
        default_value = "1000",
        env = "NBRESUSE_INTERVAL_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval_ms: u64,

    /// Base URL of the notebook server whose sessions are exported.
    #[arg(long, default_value = "http://127.0.0.1:8888", env = "JUPYTER_SERVER_URL")]
    server_url: String,

    /// API token of the notebook server.
    #[arg(long, env = "JUPYTER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Timeout of one session list request in milliseconds.
    #[arg(long, default_value = "5000")]
    request_timeout_ms: u64,

    /// Root of the process tree summed into total_memory_usage.
    /// Defaults to the process that launched the exporter.
    #[arg(long, env = "NBRESUSE_PID")]
    pid: Option<u32>,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Command-line argument that marks a kernel process.
    #[arg(long, default_value = DEFAULT_KERNEL_MARKER)]
    kernel_marker: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("nbresused={level}").parse()?)
        .add_directive(format!("nbresuse={level}").parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

/// Root of the summed process tree: `--pid`, else the launching process.
fn root_pid(pid: Option<u32>) -> u32 {
    pid.unwrap_or_else(host_pid)
}

/// Resolves once SIGINT or SIGTERM arrives.
#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listening for SIGINT")?;
            info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
    }
    Ok(())
}

/// Resolves once Ctrl-C arrives.
#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.context("listening for Ctrl-C")?;
    info!("received Ctrl-C, shutting down");
    Ok(())
}

async fn run<F: FileSystem + 'static>(args: Args, fs: F) -> Result<()> {
    let registry = JupyterSessionRegistry::new(&RegistryConfig {
        server_url: args.server_url.clone(),
        token: args.token.clone(),
        timeout: Duration::from_millis(args.request_timeout_ms),
    })
    .context("building session client")?;
    let sink = PrometheusSink::new().context("registering gauges")?;
    let metrics_registry = sink.registry().clone();

    let config = CollectorConfig {
        root_pid: root_pid(args.pid),
        kernel_marker: args.kernel_marker.clone(),
    };
    info!(
        "Config: interval={}ms, listen={}, sessions={}, root_pid={}, proc={}",
        args.interval_ms,
        args.listen,
        registry.sessions_url(),
        config.root_pid,
        args.proc_path
    );

    let table = ProcfsTable::new(fs, args.proc_path.clone());
    let collector = MetricsCollector::new(registry, table, sink, config);

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("listening on {}", args.listen))?;

    let cancel = CancellationToken::new();
    let ticks = tokio::spawn(run_tick_loop(
        collector,
        Duration::from_millis(args.interval_ms),
        cancel.clone(),
    ));
    let server = tokio::spawn(export::serve(listener, metrics_registry, cancel.clone()));

    let signal = shutdown_signal().await;
    cancel.cancel();

    let tick_count = ticks.await.context("tick loop panicked")?;
    server.await.context("metrics server panicked")??;
    signal?;

    info!(tick_count, "nbresused stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet)?;

    info!("nbresused {} starting", env!("CARGO_PKG_VERSION"));

    #[cfg(target_os = "linux")]
    let fs = RealFs::new();
    #[cfg(not(target_os = "linux"))]
    let fs = {
        info!("not running on Linux, sampling the built-in notebook server fixture");
        MockFs::notebook_server()
    };

    run(args, fs).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["nbresused"]).unwrap();
        assert_eq!(args.listen, "127.0.0.1:9091".parse::<SocketAddr>().unwrap());
        assert_eq!(args.interval_ms, 1000);
        assert_eq!(args.request_timeout_ms, 5000);
        assert_eq!(args.kernel_marker, "ipykernel_launcher");
        assert_eq!(args.proc_path, "/proc");
    }

    #[test]
    fn test_args_reject_zero_interval() {
        assert!(Args::try_parse_from(["nbresused", "--interval-ms", "0"]).is_err());
    }

    #[test]
    fn test_root_pid_override() {
        let args = Args::try_parse_from(["nbresused", "--pid", "42"]).unwrap();
        assert_eq!(root_pid(args.pid), 42);
    }

    #[cfg(unix)]
    #[test]
    fn test_root_pid_defaults_to_launching_process() {
        let args = Args::try_parse_from(["nbresused"]).unwrap();
        assert_eq!(args.pid, None);
        let root = root_pid(args.pid);
        assert_eq!(root, std::os::unix::process::parent_id());
        assert_ne!(root, std::process::id());
    }

    #[test]
    fn test_args_verbosity() {
        let args = Args::try_parse_from(["nbresused", "-vv", "--pid", "42"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.pid, Some(42));
        assert!(!args.quiet);
    }
}
