//! Dual TCP / Unix listener support for the Plugin Server Runtime's BIND
//! state (§4.E: "listen on an ephemeral TCP port on loopback, or a unix
//! socket under a system temp directory if configured").
//!
//! Generalizes the teacher's TCP/VSOCK transport duality to this spec's
//! TCP/unix-socket duality: one stream type that tonic can serve over
//! regardless of which family accepted the connection.

use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tokio_stream::{Stream, StreamExt};
use tonic::transport::server::Connected;

/// Either side of the TCP/unix duality, behind one `AsyncRead + AsyncWrite`
/// type so the gRPC server loop doesn't need to care which one it got.
pub enum EitherIo {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl AsyncRead for EitherIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            EitherIo::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            EitherIo::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for EitherIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            EitherIo::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            EitherIo::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            EitherIo::Tcp(s) => Pin::new(s).poll_flush(cx),
            EitherIo::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            EitherIo::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            EitherIo::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// tonic needs every served connection to report `Connected`; this spec has
/// no use for peer address metadata, so the connect-info is a unit value.
impl Connected for EitherIo {
    type ConnectInfo = ();

    fn connect_info(&self) -> Self::ConnectInfo {}
}

/// Bind a TCP loopback listener and return its boxed incoming stream plus
/// the address to advertise in the handshake line.
pub async fn bind_tcp(
) -> std::io::Result<(Pin<Box<dyn Stream<Item = std::io::Result<EitherIo>> + Send>>, String)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;
    let incoming = TcpListenerStream::new(listener).map(|r| r.map(EitherIo::Tcp));
    Ok((Box::pin(incoming), local_addr.to_string()))
}

/// Bind a Unix domain socket under the system temp directory (§4.E) and
/// return its boxed incoming stream plus the socket path to advertise in
/// the handshake line. Any stale socket file at the computed path is
/// removed first.
pub async fn bind_unix(
) -> std::io::Result<(Pin<Box<dyn Stream<Item = std::io::Result<EitherIo>> + Send>>, String)> {
    let path = unix_socket_path();
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    let incoming = UnixListenerStream::new(listener).map(|r| r.map(EitherIo::Unix));
    Ok((Box::pin(incoming), path.display().to_string()))
}

fn unix_socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("kv-plugin-{}.sock", std::process::id()))
}

/// Best-effort cleanup of the socket file on shutdown; a server crash
/// leaving it behind is harmless since `bind_unix` unlinks stale files.
pub fn remove_socket_file(path: &str) {
    let _ = std::fs::remove_file(path);
}
