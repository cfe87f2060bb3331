//! Purpose: Own the plugin socket: bind, serve, and tear down.
//! Exports: `Endpoint`, `Listener`, `Server`, `bind`, timeout constants.
//! Role: Transport layer under the verb router; unix sockets and TCP share one accept loop.
//! Invariants: Unix binds create the parent directory (0755) and clear stale socket files first.
//! Invariants: TCP connections get fixed header-read/response timeouts and a 1 MiB header buffer.
//! Invariants: Bind failures return to the caller; accept failures end serving with an error.
//! Notes: Shutdown closes the listener and removes the socket file; in-flight
//! connections are not drained.

use std::fmt;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as HttpBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tokio_stream::{Stream, StreamExt};
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, info, warn};

use crate::core::address::{Address, Scheme};
use crate::core::error::{Error, ErrorKind, map_io_error_kind};

pub const TCP_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const TCP_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const TCP_MAX_HEADER_BYTES: usize = 1 << 20;

const SOCKET_DIR_MODE: u32 = 0o755;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl From<&Address> for Endpoint {
    fn from(address: &Address) -> Self {
        match address.scheme {
            Scheme::Unix => Endpoint::Unix(PathBuf::from(&address.endpoint)),
            Scheme::Tcp => Endpoint::Tcp(address.endpoint.clone()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

pub(crate) fn create_dir_0755(dir: &Path) -> Result<(), Error> {
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(SOCKET_DIR_MODE)
        .create(dir)
        .map_err(|err| {
            Error::new(map_io_error_kind(&err))
                .with_message("failed to create directory")
                .with_path(dir)
                .with_source(err)
        })
}

/// Remove whatever a previous unclean shutdown left at `path`.
fn remove_stale_socket(path: &Path) -> Result<(), Error> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(Error::new(ErrorKind::Io)
                .with_message("failed to inspect stale socket path")
                .with_path(path)
                .with_source(err));
        }
    };
    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale socket");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::new(ErrorKind::Io)
            .with_message("failed to remove stale socket")
            .with_path(path)
            .with_source(err)),
    }
}

fn bind_error(endpoint: &Endpoint, err: io::Error) -> Error {
    let error = Error::new(ErrorKind::Bind)
        .with_message(format!("failed to bind {endpoint}"))
        .with_source(err);
    match endpoint {
        Endpoint::Unix(path) => error.with_path(path),
        Endpoint::Tcp(_) => error,
    }
}

enum Bound {
    Unix(UnixListener),
    Tcp(TcpListener),
}

/// A bound, not yet serving, listener.
pub struct Listener {
    endpoint: Endpoint,
    local_addr: String,
    bound: Bound,
}

pub async fn bind(endpoint: &Endpoint) -> Result<Listener, Error> {
    match endpoint {
        Endpoint::Unix(path) => {
            if let Some(parent) = path.parent() {
                create_dir_0755(parent)?;
            }
            remove_stale_socket(path)?;
            let listener = UnixListener::bind(path).map_err(|err| bind_error(endpoint, err))?;
            Ok(Listener {
                endpoint: endpoint.clone(),
                local_addr: endpoint.to_string(),
                bound: Bound::Unix(listener),
            })
        }
        Endpoint::Tcp(addr) => {
            let listener = TcpListener::bind(addr.as_str())
                .await
                .map_err(|err| bind_error(endpoint, err))?;
            let local_addr = match listener.local_addr() {
                Ok(local) => format!("tcp://{local}"),
                Err(_) => endpoint.to_string(),
            };
            Ok(Listener {
                endpoint: endpoint.clone(),
                local_addr,
                bound: Bound::Tcp(listener),
            })
        }
    }
}

impl Listener {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The bound address; for TCP this carries the real port when `:0` was requested.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// Start the accept loop on a background task.
    pub fn serve(self, app: Router) -> Server {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let socket_path = match &self.endpoint {
            Endpoint::Unix(path) => Some(path.clone()),
            Endpoint::Tcp(_) => None,
        };
        let task = match self.bound {
            Bound::Unix(listener) => {
                let http = HttpBuilder::new(TokioExecutor::new());
                tokio::spawn(accept_loop(
                    UnixListenerStream::new(listener),
                    app,
                    http,
                    shutdown_rx,
                ))
            }
            Bound::Tcp(listener) => {
                let mut http = HttpBuilder::new(TokioExecutor::new());
                http.http1()
                    .timer(TokioTimer::new())
                    .header_read_timeout(TCP_READ_TIMEOUT)
                    .max_buf_size(TCP_MAX_HEADER_BYTES);
                let app = app.layer(TimeoutLayer::new(TCP_WRITE_TIMEOUT));
                tokio::spawn(accept_loop(
                    TcpListenerStream::new(listener),
                    app,
                    http,
                    shutdown_rx,
                ))
            }
        };
        info!(address = %self.local_addr, "serving volume plugin");
        Server {
            local_addr: self.local_addr,
            socket_path,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

async fn accept_loop<S, IO>(
    mut incoming: S,
    app: Router,
    http: HttpBuilder<TokioExecutor>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<(), Error>
where
    S: Stream<Item = io::Result<IO>> + Unpin,
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let stream = tokio::select! {
            next = incoming.next() => match next {
                Some(Ok(stream)) => stream,
                Some(Err(err)) => {
                    return Err(Error::new(ErrorKind::Io)
                        .with_message("failed to accept connection")
                        .with_source(err));
                }
                None => return Ok(()),
            },
            _ = &mut shutdown => return Ok(()),
        };
        let service = TowerToHyperService::new(app.clone());
        let http = http.clone();
        tokio::spawn(async move {
            if let Err(err) = http.serve_connection(TokioIo::new(stream), service).await {
                debug!(error = %err, "connection closed with error");
            }
        });
    }
}

/// Handle to a running accept loop.
pub struct Server {
    local_addr: String,
    socket_path: Option<PathBuf>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), Error>>>,
}

impl Server {
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    pub fn socket_path(&self) -> Option<&Path> {
        self.socket_path.as_deref()
    }

    /// Resolve when serving ends. An `Err` is a fatal serving failure the
    /// host process is expected to exit on. Safe to cancel and call again.
    pub async fn wait(&mut self) -> Result<(), Error> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.task = None;
        flatten_join(result)
    }

    /// Close the listener and remove the socket file.
    pub async fn shutdown(mut self) -> Result<(), Error> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let result = match self.task.take() {
            Some(task) => flatten_join(task.await),
            None => Ok(()),
        };
        self.remove_socket_file();
        info!(address = %self.local_addr, "volume plugin stopped");
        result
    }

    fn remove_socket_file(&mut self) {
        let Some(path) = self.socket_path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove socket file"),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.remove_socket_file();
    }
}

fn flatten_join(result: Result<Result<(), Error>, tokio::task::JoinError>) -> Result<(), Error> {
    match result {
        Ok(result) => result,
        Err(err) => Err(Error::new(ErrorKind::Internal)
            .with_message("serve task failed")
            .with_source(err)),
    }
}
