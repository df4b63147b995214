//! Connection-layer abstraction over TCP, Unix domain sockets, and (on
//! Windows) named pipes, plus an `auto` policy for picking one.
//!
//! Everything above this module talks to a [`Connection`], a boxed
//! `AsyncRead + AsyncWrite` stream; it never names a concrete transport type.

use crate::error::DapperError;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// A connected duplex byte stream, transport-agnostic from here up.
pub struct Connection {
    inner: Pin<Box<dyn AsyncReadWrite>>,
}

trait AsyncReadWrite: AsyncRead + AsyncWrite + Send {}
impl<T: AsyncRead + AsyncWrite + Send> AsyncReadWrite for T {}

impl Connection {
    fn new<T: AsyncRead + AsyncWrite + Send + 'static>(stream: T) -> Self {
        Self { inner: Box::pin(stream) }
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_shutdown(cx)
    }
}

/// Where an IPC listener binds, and how a peer should connect to it.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    #[cfg(unix)]
    UnixSocket { path: PathBuf },
    #[cfg(windows)]
    NamedPipe { name: String },
}

impl Endpoint {
    /// Picks a transport appropriate to the host platform: a named pipe on
    /// Windows, else a Unix domain socket in `state_dir`, else TCP loopback
    /// on an ephemeral port.
    #[must_use]
    pub fn auto(state_dir: &Path, session_id: &str) -> Self {
        #[cfg(windows)]
        {
            let _ = state_dir;
            return Endpoint::NamedPipe { name: format!(r"\\.\pipe\dapper-{session_id}") };
        }
        #[cfg(all(unix, not(windows)))]
        {
            return Endpoint::UnixSocket { path: state_dir.join(format!("dapper-{session_id}.sock")) };
        }
        #[allow(unreachable_code)]
        Endpoint::Tcp { host: "127.0.0.1".to_string(), port: 0 }
    }
}

/// A bound, not-yet-accepting listener for one [`Endpoint`].
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, DapperError> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))
                    .await
                    .map_err(|e| DapperError::Transport(format!("tcp bind failed: {e}")))?;
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            Endpoint::UnixSocket { path } => {
                let _ = std::fs::remove_file(path);
                let listener = UnixListener::bind(path)
                    .map_err(|e| DapperError::Transport(format!("unix socket bind failed: {e}")))?;
                Ok(Listener::Unix(listener))
            }
            #[cfg(windows)]
            Endpoint::NamedPipe { .. } => Err(DapperError::Transport(
                "named pipe listener requires the windows named-pipe backend".to_string(),
            )),
        }
    }

    /// The local address a peer should use to connect, once bound. Only
    /// meaningful for `Tcp`, where `port: 0` is resolved by the OS at bind
    /// time.
    pub fn local_endpoint(&self) -> Result<Endpoint, DapperError> {
        match self {
            Listener::Tcp(listener) => {
                let addr = listener
                    .local_addr()
                    .map_err(|e| DapperError::Transport(format!("local_addr failed: {e}")))?;
                Ok(Endpoint::Tcp { host: addr.ip().to_string(), port: addr.port() })
            }
            #[cfg(unix)]
            Listener::Unix(_) => Err(DapperError::Transport(
                "unix socket endpoints are already fully resolved before bind".to_string(),
            )),
        }
    }

    pub async fn accept(&self) -> Result<Connection, DapperError> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, _) = listener
                    .accept()
                    .await
                    .map_err(|e| DapperError::Transport(format!("tcp accept failed: {e}")))?;
                Ok(Connection::new(stream))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, _) = listener
                    .accept()
                    .await
                    .map_err(|e| DapperError::Transport(format!("unix accept failed: {e}")))?;
                Ok(Connection::new(stream))
            }
        }
    }
}

/// Connects to `endpoint`, retrying with exponential backoff until
/// `timeout` elapses. Launcher processes may not have bound their listener
/// yet by the time the adapter tries to connect.
pub async fn connect_with_backoff(endpoint: &Endpoint, timeout: Duration) -> Result<Connection, DapperError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut backoff = Duration::from_millis(10);

    loop {
        let attempt = connect_once(endpoint).await;
        match attempt {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(DapperError::Transport(format!(
                        "connect to {endpoint:?} timed out after {timeout:?}: {e}"
                    )));
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_millis(500));
            }
        }
    }
}

async fn connect_once(endpoint: &Endpoint) -> Result<Connection, DapperError> {
    match endpoint {
        Endpoint::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(|e| DapperError::Transport(format!("tcp connect failed: {e}")))?;
            Ok(Connection::new(stream))
        }
        #[cfg(unix)]
        Endpoint::UnixSocket { path } => {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| DapperError::Transport(format!("unix connect failed: {e}")))?;
            Ok(Connection::new(stream))
        }
        #[cfg(windows)]
        Endpoint::NamedPipe { name } => {
            use tokio::net::windows::named_pipe::ClientOptions;
            let client = ClientOptions::new()
                .open(name)
                .map_err(|e| DapperError::Transport(format!("named pipe connect failed: {e}")))?;
            Ok(Connection::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tcp_loopback_roundtrips_bytes() {
        let endpoint = Endpoint::Tcp { host: "127.0.0.1".to_string(), port: 0 };
        let listener = Listener::bind(&endpoint).await.unwrap();
        let bound = listener.local_endpoint().unwrap();

        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            tokio::io::AsyncReadExt::read_exact(&mut conn, &mut buf).await.unwrap();
            buf
        });

        let mut client = connect_with_backoff(&bound, Duration::from_secs(1)).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut client, b"hello").await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(&received, b"hello");
    }

    #[test]
    fn auto_picks_a_unix_socket_on_unix() {
        #[cfg(all(unix, not(windows)))]
        {
            let endpoint = Endpoint::auto(Path::new("/tmp"), "abc123");
            assert!(matches!(endpoint, Endpoint::UnixSocket { .. }));
        }
    }
}
