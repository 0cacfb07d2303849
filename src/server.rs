//! Unix domain socket server.
//!
//! Binds the configured socket path, accepts connections, and runs one
//! task per connection. The accept loop never waits on connection work.

use crate::config::Config;
use crate::connection::handle_connection;
use crate::dispatch::Dispatcher;
use crate::storage::Storage;
use std::fs;
use std::future::Future;
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Server startup and runtime failures
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind socket '{}': {source}", .path.display())]
    Bind { path: PathBuf, source: io::Error },
    #[error("socket '{}' is already in use by a running server", .0.display())]
    AddressInUse(PathBuf),
    #[error("refusing to replace '{}': not a socket", .0.display())]
    NotASocket(PathBuf),
    #[error("failed to set permissions on '{}': {source}", .path.display())]
    Permissions { path: PathBuf, source: io::Error },
}

/// Removes the socket file when dropped.
#[derive(Debug)]
struct SocketFile {
    path: PathBuf,
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed socket file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove socket file"),
        }
    }
}

/// A listener bound to the socket path, owning the socket file.
#[derive(Debug)]
pub struct BoundSocket {
    listener: UnixListener,
    file: SocketFile,
}

impl BoundSocket {
    pub fn path(&self) -> &Path {
        &self.file.path
    }
}

/// Server instance
pub struct Server {
    config: Config,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Create a new server instance with empty storage
    pub fn new(config: Config) -> Self {
        Server {
            config,
            dispatcher: Arc::new(Dispatcher::new(Storage::new())),
        }
    }

    /// Shared storage, for inspection after or during serving
    pub fn storage(&self) -> Arc<Storage> {
        Arc::clone(self.dispatcher.storage())
    }

    /// Bind the configured socket path.
    ///
    /// A stale socket file left by a dead server is replaced. A live
    /// server on the same path, or a non-socket file, fails fast.
    pub async fn bind(&self) -> Result<BoundSocket, ServerError> {
        let path = &self.config.socket_path;
        remove_stale_socket(path).await?;

        let listener = UnixListener::bind(path).map_err(|source| ServerError::Bind {
            path: path.clone(),
            source,
        })?;
        let file = SocketFile { path: path.clone() };

        fs::set_permissions(path, fs::Permissions::from_mode(self.config.socket_mode)).map_err(
            |source| ServerError::Permissions {
                path: path.clone(),
                source,
            },
        )?;

        info!(
            socket = %path.display(),
            mode = %format!("{:o}", self.config.socket_mode),
            "Server listening"
        );
        Ok(BoundSocket { listener, file })
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let socket = self.bind().await?;
        self.serve(socket, shutdown).await;
        Ok(())
    }

    /// Accept connections on `socket` until `shutdown` resolves, then
    /// drain open connections within the grace period.
    pub async fn serve<F>(self, socket: BoundSocket, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        debug!(socket = %socket.path().display(), "Accepting connections");
        let BoundSocket { listener, file } = socket;
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        let mut next_id: u64 = 0;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        next_id += 1;
                        let conn = format!("conn-{next_id}");
                        debug!(conn = %conn, active = connections.len() + 1, "Client connected");

                        let dispatcher = Arc::clone(&self.dispatcher);
                        let read_buffer_size = self.config.read_buffer_size;
                        let stop = stop_rx.clone();
                        connections.spawn(async move {
                            let result =
                                handle_connection(stream, &conn, dispatcher, read_buffer_size, stop)
                                    .await;
                            match result {
                                Ok(()) => debug!(conn = %conn, "Client disconnected"),
                                Err(e) => warn!(conn = %conn, error = %e, "Connection error"),
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        drop(listener);
        let _ = stop_tx.send(true);
        self.drain(&mut connections).await;
        drop(file);

        match self.storage().stats() {
            Ok(stats) => info!(
                items = stats.item_count,
                stores = stats.stores,
                deletes = stats.deletes,
                "Server stopped"
            ),
            Err(e) => warn!(error = %e, "Server stopped; storage statistics unavailable"),
        }
    }

    /// Wait for open connections, aborting any still open after the grace period.
    async fn drain(&self, connections: &mut JoinSet<()>) {
        if connections.is_empty() {
            return;
        }
        info!(open = connections.len(), "Waiting for open connections to close");

        let grace = self.config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                grace_secs = grace.as_secs_f64(),
                "Grace period elapsed, closing remaining connections"
            );
            connections.shutdown().await;
        }
    }
}

/// Clear the way for binding `path`.
async fn remove_stale_socket(path: &Path) -> Result<(), ServerError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ServerError::Bind {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.file_type().is_socket() {
        return Err(ServerError::NotASocket(path.to_path_buf()));
    }

    if tokio::net::UnixStream::connect(path).await.is_ok() {
        return Err(ServerError::AddressInUse(path.to_path_buf()));
    }

    info!(socket = %path.display(), "Removing stale socket file");
    fs::remove_file(path).map_err(|source| ServerError::Bind {
        path: path.to_path_buf(),
        source,
    })
}
