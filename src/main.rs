//! Purpose: `voldriver` binary entry point.
//! Role: Parses args, installs tracing, starts the plugin adapter, waits for a signal or fatal error.
//! Invariants: Errors are emitted as one JSON line on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: A serving failure after start exits the process; nothing is restarted.
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::{Map, Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voldriver::api::{DEFAULT_VOLUME_ROOT, DirVolumeManager, Error, ErrorKind, to_exit_code};
use voldriver::{Adapter, AdapterConfig};

#[derive(Parser, Debug)]
#[command(
    name = "voldriver",
    version,
    about = "Docker volume plugin backed by a local volume manager",
    long_about = None,
    after_help = r#"EXAMPLES
  $ voldriver                                   # unix:///run/docker/plugins/rexray.sock
  $ voldriver --name "Block Store"              # unix:///run/docker/plugins/block-store.sock
  $ voldriver --address tcp://127.0.0.1:7979 --spec /etc/docker/plugins/blk.spec

The discovery file is written once and never overwritten; delete it to
republish a changed address."#
)]
struct Cli {
    #[arg(long, default_value = "default-docker", help = "Module name; drives default socket and spec paths")]
    name: String,
    #[arg(long, default_value = "Docker volume driver")]
    description: String,
    #[arg(
        long,
        default_value = "",
        help = "Listen address: unix:///path.sock or tcp://host:port (default derived from --name)"
    )]
    address: String,
    #[arg(long, help = "Discovery file path (default /etc/docker/plugins/<name>.spec)")]
    spec: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_VOLUME_ROOT, help = "Root directory for volume data")]
    volume_root: PathBuf,
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = Cli::try_parse().map_err(|err| {
        if !err.use_stderr() {
            let _ = err.print();
            std::process::exit(0);
        }
        Error::new(ErrorKind::Usage)
            .with_message("invalid arguments")
            .with_hint(err.to_string().trim_end().to_string())
    })?;

    init_tracing();

    let manager = Arc::new(DirVolumeManager::new(cli.volume_root));
    let adapter = Adapter::new(
        AdapterConfig {
            name: cli.name,
            description: cli.description,
            address: cli.address,
            discovery_path: cli.spec,
        },
        manager,
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start runtime")
                .with_source(err)
        })?;

    runtime.block_on(async {
        let mut server = adapter.start().await?;
        info!(
            name = adapter.name(),
            address = adapter.address(),
            spec = %adapter.discovery_path().display(),
            "voldriver ready"
        );

        let fatal = tokio::select! {
            result = server.wait() => Some(result),
            _ = shutdown_signal() => None,
        };
        match fatal {
            Some(result) => {
                result?;
                Err(Error::new(ErrorKind::Internal).with_message("server exited unexpectedly"))
            }
            None => {
                adapter.stop()?;
                server.shutdown().await
            }
        }
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(err.wire_message()));
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    let mut causes = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        causes.push(json!(cause.to_string()));
        source = cause.source();
    }
    if !causes.is_empty() {
        inner.insert("causes".to_string(), Value::Array(causes));
    }
    json!({ "error": Value::Object(inner) })
}

fn emit_error(err: &Error) {
    eprintln!("{}", error_json(err));
}
