//! wgbridge CLI - WireGuard tunnel bridge
//!
//! Runs the bridge daemon and drives it from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wgbridge_daemon::{daemon_addr, DaemonClient, DaemonService};
use wgbridge_lib::{
    methods, AlwaysGranted, Backend, BackendError, BackendProvider, Bridge, ControllerConfig,
    LifecycleController, MemoryBackend, MethodCall, MethodResult, PermissionProvider,
    PrivilegedProcess, WgQuickBackend,
};

/// wgbridge - Drive WireGuard tunnels through a method-call bridge
#[derive(Parser, Debug)]
#[command(name = "wgbridge")]
#[command(about = "wgbridge - Drive WireGuard tunnels through a method-call bridge")]
#[command(version)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (", env!("GIT_HASH"), ", built ", env!("BUILD_TIME"), ")"
))]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Daemon address
    #[arg(long, global = true, env = "WGBRIDGE_ADDR", default_value_t = daemon_addr())]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Drive the system `wg-quick` and `wg` tools
    WgQuick,
    /// In-process simulation, no interfaces are created
    Memory,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge daemon in the foreground
    #[command(long_about = r#"
Run the bridge daemon. Clients connect over localhost TCP to start and stop
the tunnel, read statistics and follow stage changes.

EXAMPLES:
  # Real interfaces (needs root)
  sudo wgbridge daemon --runtime-dir /run/wgbridge

  # Simulated backend for development
  wgbridge daemon --backend memory

ENVIRONMENT VARIABLES:
  WGBRIDGE_ADDR                Daemon address
  WGBRIDGE_BACKEND             Backend kind (wg-quick, memory)
  WGBRIDGE_RUNTIME_DIR         Directory for generated wg-quick files
  WGBRIDGE_BACKEND_WAIT        Seconds to wait for the backend to come up
  WGBRIDGE_TRANSITION_TIMEOUT  Seconds to wait for a tunnel transition
    "#)]
    Daemon {
        /// Tunnel backend
        #[arg(long, value_enum, env = "WGBRIDGE_BACKEND", default_value = "wg-quick")]
        backend: BackendKind,

        /// Directory for generated wg-quick config files
        #[arg(long, env = "WGBRIDGE_RUNTIME_DIR", default_value = "/run/wgbridge")]
        runtime_dir: PathBuf,

        /// Seconds to wait for the backend to come up
        #[arg(long, env = "WGBRIDGE_BACKEND_WAIT", default_value = "10")]
        backend_wait: u64,

        /// Seconds to wait for a tunnel transition to be confirmed
        #[arg(long, env = "WGBRIDGE_TRANSITION_TIMEOUT", default_value = "30")]
        transition_timeout: u64,
    },

    /// Bring a tunnel up from a wg-quick config file
    Up {
        /// Path to the wg-quick config
        config: PathBuf,

        /// Tunnel name (defaults to the config file stem)
        #[arg(long)]
        name: Option<String>,
    },

    /// Bring the tunnel down
    Down,

    /// Show transfer statistics
    Stats {
        /// Tunnel name
        name: String,
    },

    /// Show the last known connection stage
    Stage,

    /// Follow stage changes until interrupted
    Watch,

    /// Check that the daemon is running
    Ping,

    /// Stop the daemon
    Shutdown,
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

fn build_controller(
    kind: BackendKind,
    runtime_dir: PathBuf,
    config: ControllerConfig,
) -> LifecycleController {
    match kind {
        BackendKind::WgQuick => {
            let provider = BackendProvider::new(move || -> Result<Arc<dyn Backend>, BackendError> {
                let backend = WgQuickBackend::new(runtime_dir.clone());
                backend.probe()?;
                Ok(Arc::new(backend))
            });
            let permission: Arc<dyn PermissionProvider> = Arc::new(PrivilegedProcess);
            LifecycleController::new(provider, permission, config)
        }
        BackendKind::Memory => {
            warn!("Using the in-memory backend, no interfaces will be created");
            LifecycleController::new(
                BackendProvider::ready(Arc::new(MemoryBackend::new())),
                Arc::new(AlwaysGranted),
                config,
            )
        }
    }
}

async fn run_daemon(
    addr: &str,
    kind: BackendKind,
    runtime_dir: PathBuf,
    config: ControllerConfig,
) -> Result<()> {
    let controller = build_controller(kind, runtime_dir, config);
    let bridge = Arc::new(Bridge::new(Arc::new(controller)));
    let service = DaemonService::new(bridge);
    let shutdown = service.shutdown_handle();

    let listener = DaemonService::bind(addr)
        .await
        .context("Failed to bind daemon address")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            shutdown.shutdown();
        }
    });

    service.run(listener).await.context("Daemon failed")?;
    info!("wgbridge daemon stopped");
    Ok(())
}

async fn connect(addr: &str) -> Result<DaemonClient> {
    DaemonClient::connect(addr)
        .await
        .with_context(|| format!("Daemon not reachable at {} (is `wgbridge daemon` running?)", addr))
}

/// Turn a bridge result into the returned value or an error
fn expect_success(method: &str, result: MethodResult) -> Result<serde_json::Value> {
    match result {
        MethodResult::Success { value } => Ok(value),
        MethodResult::Error { code, message, .. } => bail!("{} failed: {} ({})", method, message, code),
        MethodResult::NotImplemented => bail!("{} is not supported by the daemon", method),
    }
}

async fn invoke(client: &mut DaemonClient, call: MethodCall) -> Result<serde_json::Value> {
    let method = call.method.clone();
    let result = client
        .invoke(call)
        .await
        .with_context(|| format!("Failed to call {}", method))?;
    expect_success(&method, result)
}

async fn up(addr: &str, config: PathBuf, name: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => config
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .context("Cannot derive a tunnel name from the config path, pass --name")?,
    };
    let text = tokio::fs::read_to_string(&config)
        .await
        .with_context(|| format!("Failed to read {}", config.display()))?;

    let mut client = connect(addr).await?;
    invoke(
        &mut client,
        MethodCall::new(
            methods::INITIALIZE,
            serde_json::json!({ "localizedDescription": name }),
        ),
    )
    .await?;
    invoke(
        &mut client,
        MethodCall::new(methods::START, serde_json::json!({ "wgQuickConfig": text })),
    )
    .await?;

    println!("{} is up", name);
    Ok(())
}

async fn watch(addr: &str) -> Result<()> {
    let mut stages = connect(addr)
        .await?
        .listen()
        .await
        .context("Failed to subscribe to stage changes")?;

    loop {
        tokio::select! {
            stage = stages.recv() => match stage {
                Some(stage) => println!("{}", stage),
                None => {
                    warn!("Daemon closed the stage stream");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                if let Err(e) = stages.cancel().await {
                    error!("Failed to cancel stage stream: {}", e);
                }
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Daemon {
            backend,
            runtime_dir,
            backend_wait,
            transition_timeout,
        } => {
            info!("wgbridge daemon starting...");
            info!("Backend: {:?}", backend);
            if backend == BackendKind::WgQuick {
                info!("Runtime directory: {}", runtime_dir.display());
            }

            let config = ControllerConfig::new()
                .with_backend_wait(Duration::from_secs(backend_wait))
                .with_transition_timeout(Duration::from_secs(transition_timeout));
            run_daemon(&cli.addr, backend, runtime_dir, config).await
        }

        Commands::Up { config, name } => up(&cli.addr, config, name).await,

        Commands::Down => {
            let mut client = connect(&cli.addr).await?;
            invoke(&mut client, MethodCall::without_arguments(methods::STOP)).await?;
            println!("Tunnel is down");
            Ok(())
        }

        Commands::Stats { name } => {
            let mut client = connect(&cli.addr).await?;
            let value = invoke(
                &mut client,
                MethodCall::new(methods::GET_STATS, serde_json::Value::String(name)),
            )
            .await?;
            match value.as_str() {
                Some(json) => println!("{}", json),
                None => println!("{}", value),
            }
            Ok(())
        }

        Commands::Stage => {
            let mut client = connect(&cli.addr).await?;
            let value = invoke(&mut client, MethodCall::without_arguments(methods::STAGE)).await?;
            println!("{}", value.as_str().unwrap_or("none"));
            Ok(())
        }

        Commands::Watch => watch(&cli.addr).await,

        Commands::Ping => {
            let mut client = connect(&cli.addr).await?;
            let status = client.ping().await.context("Ping failed")?;
            println!("wgbridge daemon {}", status.version);
            println!("  Uptime:  {}s", status.uptime_seconds);
            println!("  Started: {}", status.started_at);
            println!("  Stage:   {}", status.stage);
            println!(
                "  Tunnel:  {}",
                status.tunnel.as_deref().unwrap_or("(not initialized)")
            );
            Ok(())
        }

        Commands::Shutdown => {
            let mut client = connect(&cli.addr).await?;
            client.shutdown().await.context("Shutdown failed")?;
            println!("Daemon stopped");
            Ok(())
        }
    }
}
