// Gazette — Unix Domain Socket Server
//
// Listens on a Unix domain socket for newline-delimited JSON-RPC 2.0
// requests. Every connection runs in its own tokio task and shares the one
// escrow store handle. The accept loop ends when the shutdown future fires;
// the caller then closes the store.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::store::EscrowRepository;

use super::handler::process_request;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Unix Domain Socket server for the escrow store.
pub struct UdsServer {
    store: Arc<dyn EscrowRepository>,
    socket_path: PathBuf,
}

impl UdsServer {
    pub fn new(store: Arc<dyn EscrowRepository>, socket_path: PathBuf) -> Self {
        Self { store, socket_path }
    }

    /// Default socket path: `$XDG_RUNTIME_DIR/gazette/gazette.sock`
    /// Falls back to `/tmp/gazette/gazette.sock`.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        runtime_dir.join("gazette").join("gazette.sock")
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Accept connections until `shutdown` resolves, then remove the socket.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> std::io::Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Remove stale socket file if it exists
        if self.socket_path.exists() {
            tokio::fs::remove_file(&self.socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner-only access to the socket
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.socket_path, perms)?;
        }

        tracing::info!(socket = %self.socket_path.display(), "Gazette gateway listening");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            // Persistent failures such as EMFILE would otherwise spin.
                            tracing::warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let store = Arc::clone(&self.store);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, store).await {
                            tracing::error!("Connection handler error: {}", e);
                        }
                    });
                }
                _ = &mut shutdown => {
                    tracing::info!("Gateway stopped accepting connections");
                    break;
                }
            }
        }

        drop(listener);
        if let Err(e) = tokio::fs::remove_file(&self.socket_path).await {
            tracing::debug!(error = %e, "Socket file already gone");
        }
        Ok(())
    }
}

/// Handle a single client connection.
/// Reads newline-delimited JSON-RPC requests and writes one response per line.
async fn handle_connection(
    stream: UnixStream,
    store: Arc<dyn EscrowRepository>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Ok(cred) = stream.peer_cred() {
        tracing::debug!(uid = cred.uid(), pid = ?cred.pid(), "Client connected");
    }

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = process_request(&line, store.as_ref());
        let mut json = serde_json::to_string(&response)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
