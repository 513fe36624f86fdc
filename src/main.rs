use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfscan::catalog::CatalogClient;
use shelfscan::codec;
use shelfscan::config::{self, Overrides};
use shelfscan::device::DeviceTransport;
use shelfscan::metrics::Metrics;
use shelfscan::routes;
use shelfscan::session::SessionController;
use shelfscan::state::AppState;
use shelfscan::types::ShelfLocation;

#[derive(Parser)]
#[command(
    name = "shelfscan",
    version,
    about = "Barcode scan ingestion for a personal library catalog",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    /// Flags for the default `run` command
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Read scans and ingest them into the catalog (default)
    Run(RunArgs),
    /// Print the label codes for every row of a shelf
    Labels {
        #[arg(long)]
        shelf_id: u32,
        #[arg(long, default_value_t = 1)]
        rows: u32,
    },
}

#[derive(Args, Debug, Default, PartialEq)]
struct RunArgs {
    /// Catalog service base URL
    #[arg(long)]
    server_url: Option<String>,
    /// Scanner input device; reads from stdin when unset
    #[arg(long)]
    input_device_path: Option<String>,
    /// Port for the metrics endpoint
    #[arg(long)]
    metrics_port: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run(cli.run)) {
        Command::Labels { shelf_id, rows } => print_labels(shelf_id, rows),
        Command::Run(args) => {
            let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            let result = rt.block_on(run(args));
            // stdin reads sit on a blocking thread that never returns on its own
            rt.shutdown_timeout(Duration::from_secs(1));
            result
        }
    }
}

fn print_labels(shelf_id: u32, rows: u32) -> anyhow::Result<()> {
    for row in 1..=rows {
        let code = codec::encode(ShelfLocation::new(shelf_id, row))?;
        println!("{}\tshelf {} row {}", code, shelf_id, row);
    }
    Ok(())
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    // Logs go to stdout and to ./logs/shelfscan.log, rotated daily
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily("logs", "shelfscan.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // Keep the guards alive so the non-blocking writers flush on exit
    let _log_guards = (stdout_guard, file_guard);

    // embedded defaults -> shelfscan.toml -> SHELFSCAN_CONFIG -> env -> command line
    let app_cfg = config::load_with(&Overrides {
        server_url: args.server_url,
        input_device_path: args.input_device_path,
        metrics_port: args.metrics_port,
    })?;

    let metrics = Metrics::new();
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    let server = if app_cfg.metrics.enabled {
        let addr: SocketAddr = format!("{}:{}", app_cfg.metrics.host, app_cfg.metrics.port)
            .parse()
            .map_err(|e| {
                anyhow::anyhow!("invalid metrics addr {}:{} - {}", app_cfg.metrics.host, app_cfg.metrics.port, e)
            })?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("metrics listening on http://{}/metrics", listener.local_addr()?);
        let app = routes::router(AppState::new(app_cfg.clone(), metrics.clone()));
        let shutdown = cancel.clone().cancelled_owned();
        Some(tokio::spawn(async move { axum::serve(listener, app).with_graceful_shutdown(shutdown).await }))
    } else {
        None
    };

    let catalog = Arc::new(CatalogClient::new(&app_cfg.catalog, metrics.clone())?);
    info!(catalog = %catalog.base_url(), "using catalog service");

    let transport = DeviceTransport::from_path(app_cfg.device.device_path());
    let (mut scans, reader) =
        transport.spawn(app_cfg.device.queue_capacity, app_cfg.device.retry_delay(), cancel.clone());

    let mut controller = SessionController::new(catalog, metrics.clone())
        .with_check_digit_verification(app_cfg.codec.verify_check_digit);
    controller.initialize(&cancel).await;
    controller.run(&mut scans, &cancel).await;

    // The controller only returns on shutdown or when the scan source ends.
    cancel.cancel();
    drop(scans);
    if let Err(e) = reader.await {
        warn!(error = %e, "device reader task failed");
    }
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "metrics server failed"),
            Err(e) => warn!(error = %e, "metrics server task failed"),
        }
    }

    let m = metrics.get_snapshot();
    info!(
        processed = m.books_processed,
        failed = m.books_failed,
        discarded = m.scans_discarded,
        "shelfscan stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler, waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping...");
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Command, RunArgs};

    fn run_args(cli: Cli) -> RunArgs {
        match cli.command.unwrap_or(Command::Run(cli.run)) {
            Command::Run(args) => args,
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_work_with_and_without_subcommand() {
        let expected = RunArgs {
            server_url: Some("http://x".into()),
            input_device_path: Some("/dev/input/event3".into()),
            metrics_port: Some(9999),
        };
        let flags = [
            "--server-url",
            "http://x",
            "--input-device-path",
            "/dev/input/event3",
            "--metrics-port",
            "9999",
        ];

        let bare = Cli::try_parse_from(std::iter::once("shelfscan").chain(flags)).unwrap();
        assert_eq!(run_args(bare), expected);

        let explicit = Cli::try_parse_from(["shelfscan", "run"].into_iter().chain(flags)).unwrap();
        assert_eq!(run_args(explicit), expected);

        assert_eq!(run_args(Cli::try_parse_from(["shelfscan"]).unwrap()), RunArgs::default());
    }

    #[test]
    fn labels_subcommand_parses() {
        let cli = Cli::try_parse_from(["shelfscan", "labels", "--shelf-id", "12", "--rows", "4"]).unwrap();
        assert_eq!(cli.command, Some(Command::Labels { shelf_id: 12, rows: 4 }));
        // run flags do not mix with another subcommand
        assert!(Cli::try_parse_from(["shelfscan", "--metrics-port", "1", "labels", "--shelf-id", "1"]).is_err());
    }
}
