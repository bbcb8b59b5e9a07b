//! Transport variants and the socket-option knobs §4.2 exposes per broker.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UdpSocket, UnixStream};
use tokio_rustls::{client::TlsStream as ClientTlsStream, TlsConnector};

use crate::net::tls::TlsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SonetKind {
    Tcp,
    Udp,
    Tls,
    Dtls,
    Sctp,
    Unix,
}

/// SO_KEEPALIVE tuning; `None` leaves the OS defaults in place.
#[derive(Debug, Clone, Copy)]
pub struct KeepAliveParams {
    pub count: u32,
    pub idle_secs: u32,
    pub interval_secs: u32,
}

/// Per-broker socket tunables (§4.2): TCP_CORK, TCP_NODELAY, keepalive, and
/// the ingress/egress token buckets.
#[derive(Debug, Clone, Default)]
pub struct SocketOptions {
    pub cork: bool,
    pub nodelay: bool,
    pub keepalive: Option<KeepAliveParams>,
}

/// An established connection. Wraps the concrete tokio I/O type behind one
/// `AsyncRead + AsyncWrite` façade so the reactor and HTTP/WS layers never
/// match on the underlying transport.
pub enum Transport {
    Tcp(TcpStream),
    Tls(Box<ClientTlsStream<TcpStream>>),
    Udp(UdpSocket),
    Unix(UnixStream),
    /// SCTP is implemented only on Linux, via a raw one-to-one socket; see
    /// [`sctp`]. Other platforms surface it as an unsupported transport at
    /// construction time rather than failing mid-handshake.
    Sctp(crate::net::transport::sctp::SctpStream),
}

impl Transport {
    pub fn kind(&self) -> SonetKind {
        match self {
            Transport::Tcp(_) => SonetKind::Tcp,
            Transport::Tls(_) => SonetKind::Tls,
            Transport::Udp(_) => SonetKind::Udp,
            Transport::Unix(_) => SonetKind::Unix,
            Transport::Sctp(_) => SonetKind::Sctp,
        }
    }

    /// Apply TCP_NODELAY where the underlying transport supports it
    /// (TCP and TLS-over-TCP). Other transports ignore the setting.
    pub fn apply_options(&self, opts: &SocketOptions) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.set_nodelay(opts.nodelay),
            Transport::Tls(s) => s.get_ref().0.set_nodelay(opts.nodelay),
            _ => Ok(()),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Transport::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Udp(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "UDP is message-oriented; use recv_from instead of the stream façade",
            ))),
            Transport::Sctp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            Transport::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Udp(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "UDP is message-oriented; use send_to instead of the stream façade",
            ))),
            Transport::Sctp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Transport::Unix(s) => Pin::new(s).poll_flush(cx),
            Transport::Udp(_) => Poll::Ready(Ok(())),
            Transport::Sctp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Transport::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Udp(_) => Poll::Ready(Ok(())),
            Transport::Sctp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Derive the SNI host from a connect URL (`scheme://host[:port]/...`).
pub fn sni_from_url(url: &str) -> Option<String> {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let host_port = without_scheme.split(['/', '?', '#']).next()?;
    let host = host_port.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

pub async fn connect_tcp(addr: SocketAddr) -> io::Result<TcpStream> {
    TcpStream::connect(addr).await
}

pub async fn connect_tls(
    addr: SocketAddr,
    url: &str,
    tls_config: &TlsConfig,
) -> io::Result<ClientTlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let server_name_str = tls_config
        .sni_override
        .clone()
        .or_else(|| sni_from_url(url))
        .unwrap_or_else(|| addr.ip().to_string());
    let server_name = rustls_pki_types::ServerName::try_from(server_name_str)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
        .to_owned();
    let connector = TlsConnector::from(Arc::new((*tls_config_to_rustls(tls_config)).clone()));
    connector.connect(server_name, tcp).await
}

fn tls_config_to_rustls(cfg: &TlsConfig) -> Arc<rustls::ClientConfig> {
    crate::net::tls::build_client_config(cfg)
}

pub async fn bind_udp(addr: SocketAddr) -> io::Result<UdpSocket> {
    UdpSocket::bind(addr).await
}

pub async fn connect_unix(path: &std::path::Path) -> io::Result<UnixStream> {
    UnixStream::connect(path).await
}

#[cfg(unix)]
pub mod sctp {
    //! Minimal one-to-one SCTP client socket via raw `libc` calls — there is
    //! no maintained async SCTP crate in the ecosystem, so the socket is
    //! created with `libc::socket` and then handed to a tokio
    //! `AsyncFd`-driven wrapper for readiness-based I/O.

    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, RawFd};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::unix::AsyncFd;
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    pub struct SctpStream {
        inner: AsyncFd<std::net::TcpStream>,
    }

    impl SctpStream {
        /// Create a one-to-one SCTP socket (`IPPROTO_SCTP`) and connect it.
        /// Returns `Unsupported` on kernels without SCTP support compiled
        /// in, which this library does not attempt to detect up front.
        pub async fn connect(addr: std::net::SocketAddr) -> io::Result<SctpStream> {
            let domain = if addr.is_ipv4() {
                libc::AF_INET
            } else {
                libc::AF_INET6
            };
            let fd: RawFd = unsafe { libc::socket(domain, libc::SOCK_STREAM, libc::IPPROTO_SCTP) };
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            set_nonblocking(fd)?;
            let std_stream = unsafe { std::net::TcpStream::from_raw_fd(fd) };
            connect_raw(fd, addr)?;
            Ok(SctpStream {
                inner: AsyncFd::new(std_stream)?,
            })
        }
    }

    fn set_nonblocking(fd: RawFd) -> io::Result<()> {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn connect_raw(fd: RawFd, addr: std::net::SocketAddr) -> io::Result<()> {
        use std::mem;
        let (sockaddr, len) = match addr {
            std::net::SocketAddr::V4(v4) => {
                let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = v4.port().to_be();
                sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
                (sin as libc::sockaddr_in, mem::size_of::<libc::sockaddr_in>())
            }
            std::net::SocketAddr::V6(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "IPv6 SCTP connect not wired up",
                ));
            }
        };
        let ret = unsafe {
            libc::connect(
                fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                len as libc::socklen_t,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::WouldBlock && err.raw_os_error() != Some(libc::EINPROGRESS) {
                return Err(err);
            }
        }
        Ok(())
    }

    impl AsyncRead for SctpStream {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            loop {
                let mut guard = match self.inner.poll_read_ready(cx) {
                    Poll::Ready(Ok(g)) => g,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                };
                let unfilled = buf.initialize_unfilled();
                match guard.try_io(|inner| {
                    use std::io::Read;
                    inner.get_ref().as_raw_fd();
                    let mut stream_ref = inner.get_ref();
                    stream_ref.read(unfilled)
                }) {
                    Ok(Ok(n)) => {
                        buf.advance(n);
                        return Poll::Ready(Ok(()));
                    }
                    Ok(Err(e)) => return Poll::Ready(Err(e)),
                    Err(_would_block) => continue,
                }
            }
        }
    }

    impl AsyncWrite for SctpStream {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            loop {
                let mut guard = match self.inner.poll_write_ready(cx) {
                    Poll::Ready(Ok(g)) => g,
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                };
                match guard.try_io(|inner| {
                    use std::io::Write;
                    let mut stream_ref = inner.get_ref();
                    stream_ref.write(buf)
                }) {
                    Ok(result) => return Poll::Ready(result),
                    Err(_would_block) => continue,
                }
            }
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}

#[cfg(not(unix))]
pub mod sctp {
    //! SCTP is Linux/Unix-only; non-Unix targets get a type that always
    //! fails to construct rather than a silently absent module.
    pub struct SctpStream;

    impl SctpStream {
        pub async fn connect(_addr: std::net::SocketAddr) -> std::io::Result<SctpStream> {
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "SCTP is only implemented on Unix targets",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sni_derives_host_without_port() {
        assert_eq!(
            sni_from_url("https://example.com:8443/path"),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn sni_handles_bare_host() {
        assert_eq!(sni_from_url("example.com"), Some("example.com".to_string()));
    }

    #[test]
    fn sni_rejects_empty_host() {
        assert_eq!(sni_from_url("https:///path"), None);
    }
}
