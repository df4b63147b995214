//! IPC Manager: the single connection to an external launcher process.
//!
//! Owns one [`Connection`], a background reader task that decodes inbound
//! frames and forwards them to a channel, and a `send` path for outbound
//! frames. Closing is idempotent — a second `close()` is a no-op, since both
//! normal shutdown and an error-triggered teardown may race to call it.

use crate::error::DapperError;
use crate::framing::ipc::{Decoder, MessageKind};
use crate::transport::Connection;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

/// One decoded inbound IPC frame.
#[derive(Debug, Clone)]
pub struct IpcMessage {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

/// Manages a single launcher connection: a reader task plus a write half
/// guarded for concurrent `send` calls.
pub struct IpcManager {
    writer: Arc<Mutex<Connection>>,
    reader_task: tokio::task::JoinHandle<()>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl IpcManager {
    /// Splits ownership of `connection`'s read/write halves is not available
    /// for a boxed duplex stream, so reads and writes both go through the
    /// same `Mutex`-guarded connection; the reader task holds it only for
    /// the duration of each `read` call, so writes are never starved for
    /// long.
    pub fn spawn(connection: Connection, inbound: mpsc::UnboundedSender<IpcMessage>) -> Self {
        let shared = Arc::new(Mutex::new(connection));
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let reader_task = tokio::spawn(reader_loop(shared.clone(), inbound, closed.clone()));

        Self { writer: shared, reader_task, closed }
    }

    /// Encodes and writes one frame. Fails immediately if the manager has
    /// already been closed.
    pub async fn send(&self, kind: MessageKind, payload: &[u8]) -> Result<(), DapperError> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(DapperError::SessionShuttingDown);
        }
        let framed = crate::framing::ipc::encode(kind, payload);
        let mut conn = self.writer.lock().await;
        conn.write_all(&framed)
            .await
            .map_err(|e| DapperError::Transport(format!("ipc write failed: {e}")))?;
        conn.flush().await.map_err(|e| DapperError::Transport(format!("ipc flush failed: {e}")))
    }

    /// Idempotent shutdown: stops the reader task and marks the manager
    /// closed. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        self.reader_task.abort();
    }
}

async fn reader_loop(
    connection: Arc<Mutex<Connection>>,
    inbound: mpsc::UnboundedSender<IpcMessage>,
    closed: Arc<std::sync::atomic::AtomicBool>,
) {
    let mut decoder = Decoder::new();
    let mut chunk = [0u8; 4096];

    loop {
        if closed.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }

        let read_result = {
            let mut conn = connection.lock().await;
            conn.read(&mut chunk).await
        };

        let n = match read_result {
            Ok(0) => return, // peer closed
            Ok(n) => n,
            Err(_) => return,
        };

        decoder.feed(&chunk[..n]);

        loop {
            match decoder.try_decode() {
                Ok(Some((kind, payload))) => {
                    if inbound.send(IpcMessage { kind, payload }).is_err() {
                        return; // receiver dropped
                    }
                }
                Ok(None) => break,
                Err(_) => return, // framing corruption; drop the connection
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{connect_with_backoff, Endpoint, Listener};
    use std::time::Duration;

    #[tokio::test]
    async fn sends_and_receives_a_frame_round_trip() {
        let endpoint = Endpoint::Tcp { host: "127.0.0.1".to_string(), port: 0 };
        let listener = Listener::bind(&endpoint).await.unwrap();
        let bound = listener.local_endpoint().unwrap();

        let server_task = tokio::spawn(async move { listener.accept().await.unwrap() });
        let client_conn = connect_with_backoff(&bound, Duration::from_secs(1)).await.unwrap();
        let server_conn = server_task.await.unwrap();

        let (server_tx, mut server_rx) = mpsc::unbounded_channel();
        let server_mgr = IpcManager::spawn(server_conn, server_tx);

        let (client_tx, _client_rx) = mpsc::unbounded_channel();
        let client_mgr = IpcManager::spawn(client_conn, client_tx);

        client_mgr.send(MessageKind::Command, b"ping").await.unwrap();

        let received = server_rx.recv().await.unwrap();
        assert_eq!(received.kind, MessageKind::Command);
        assert_eq!(received.payload, b"ping");

        server_mgr.close().await;
        client_mgr.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let endpoint = Endpoint::Tcp { host: "127.0.0.1".to_string(), port: 0 };
        let listener = Listener::bind(&endpoint).await.unwrap();
        let bound = listener.local_endpoint().unwrap();

        let server_task = tokio::spawn(async move { listener.accept().await.unwrap() });
        let client_conn = connect_with_backoff(&bound, Duration::from_secs(1)).await.unwrap();
        let _server_conn = server_task.await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mgr = IpcManager::spawn(client_conn, tx);
        mgr.close().await;
        mgr.close().await;
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let endpoint = Endpoint::Tcp { host: "127.0.0.1".to_string(), port: 0 };
        let listener = Listener::bind(&endpoint).await.unwrap();
        let bound = listener.local_endpoint().unwrap();

        let server_task = tokio::spawn(async move { listener.accept().await.unwrap() });
        let client_conn = connect_with_backoff(&bound, Duration::from_secs(1)).await.unwrap();
        let _server_conn = server_task.await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mgr = IpcManager::spawn(client_conn, tx);
        mgr.close().await;

        let err = mgr.send(MessageKind::Event, b"x").await.unwrap_err();
        assert!(matches!(err, DapperError::SessionShuttingDown));
    }
}
