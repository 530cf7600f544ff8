//! A trait to represent a stream

use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_native_tls::{TlsConnector, TlsStream};
use async_trait::async_trait;
use log::debug;
use pin_project::pin_project;
use tokio::io::{self, AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpStream};

use crate::smtp::error::Error;

/// Parameters to use for secure clients
pub struct ClientTlsParameters {
    /// A connector from `native-tls`
    pub connector: TlsConnector,
    /// The domain to send during the TLS handshake
    pub domain: String,
}

impl fmt::Debug for ClientTlsParameters {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ClientTlsParameters")
            .field("connector", &"TlsConnector")
            .field("domain", &self.domain)
            .finish()
    }
}

impl ClientTlsParameters {
    /// Creates a `ClientTlsParameters`
    pub fn new(domain: String, connector: TlsConnector) -> ClientTlsParameters {
        ClientTlsParameters { connector, domain }
    }

    /// Parameters verifying the server certificate against `domain`, or
    /// accepting any certificate when `accept_invalid_certs` is set
    pub fn for_domain(domain: &str, accept_invalid_certs: bool) -> ClientTlsParameters {
        let connector = TlsConnector::new()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .danger_accept_invalid_hostnames(accept_invalid_certs);
        ClientTlsParameters::new(strip_brackets(domain).to_string(), connector)
    }
}

/// Represents the different types of underlying network streams
#[pin_project(project = NetworkStreamProj)]
#[allow(missing_debug_implementations)]
pub enum NetworkStream {
    /// Plain TCP stream
    Tcp(#[pin] TcpStream),
    /// Encrypted TCP stream
    Tls(#[pin] TlsStream<TcpStream>),
}

impl AsyncRead for NetworkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_read(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NetworkStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_write(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_flush(cx),
            NetworkStreamProj::Tls(s) => s.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_shutdown(cx),
            NetworkStreamProj::Tls(s) => s.poll_shutdown(cx),
        }
    }
}

/// A trait for the concept of opening a stream
///
/// The probe only talks to the network through this trait, so tests can hand
/// it in-memory streams.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stream produced by this connector
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens a connection to `host:port`, negotiating TLS right away when
    /// parameters are given
    async fn connect(
        &self,
        host: &str,
        port: u16,
        tls_parameters: Option<&ClientTlsParameters>,
    ) -> Result<Self::Stream, Error>;

    /// Upgrades to TLS connection.
    ///
    /// The stream is consumed: on failure it is dropped mid-handshake, which
    /// closes the socket without QUIT.
    async fn upgrade_tls(
        &self,
        stream: Self::Stream,
        tls_parameters: &ClientTlsParameters,
    ) -> Result<Self::Stream, Error>;
}

/// Connector opening real TCP connections
#[derive(Debug, Default, Clone, Copy)]
pub struct NetConnector;

#[async_trait]
impl Connector for NetConnector {
    type Stream = NetworkStream;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        tls_parameters: Option<&ClientTlsParameters>,
    ) -> Result<NetworkStream, Error> {
        let addresses = lookup_host((strip_brackets(host), port)).await?;
        let tcp_stream = connect_any(addresses).await?;

        match tls_parameters {
            Some(context) => {
                let tls_stream = context
                    .connector
                    .connect(context.domain.as_str(), tcp_stream)
                    .await?;
                Ok(NetworkStream::Tls(tls_stream))
            }
            None => Ok(NetworkStream::Tcp(tcp_stream)),
        }
    }

    async fn upgrade_tls(
        &self,
        stream: NetworkStream,
        tls_parameters: &ClientTlsParameters,
    ) -> Result<NetworkStream, Error> {
        match stream {
            NetworkStream::Tcp(stream) => {
                let tls_stream = tls_parameters
                    .connector
                    .connect(tls_parameters.domain.as_str(), stream)
                    .await?;
                Ok(NetworkStream::Tls(tls_stream))
            }
            tls => Ok(tls),
        }
    }
}

/// Tries each resolved address in turn and returns the first connection,
/// or the last error
async fn connect_any<I>(addresses: I) -> Result<TcpStream, Error>
where
    I: IntoIterator<Item = SocketAddr>,
{
    let mut last_error = None;
    for addr in addresses {
        debug!("connecting to {}", addr);
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!("connection to {} failed: {}", addr, err);
                last_error = Some(err);
            }
        }
    }
    match last_error {
        Some(err) => Err(Error::Io(err)),
        None => Err(Error::Resolution),
    }
}

/// `[::1]` style literals are accepted as host, the resolver wants them bare
fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|host| host.strip_suffix(']'))
        .unwrap_or(host)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_strip_brackets() {
        assert_eq!(strip_brackets("[::1]"), "::1");
        assert_eq!(strip_brackets("smtp.example.com"), "smtp.example.com");
        assert_eq!(strip_brackets("[broken"), "[broken");
    }

    #[test]
    fn test_tls_parameters_debug() {
        let parameters = ClientTlsParameters::for_domain("[::1]", false);
        assert_eq!(parameters.domain, "::1");
        assert!(format!("{:?}", parameters).contains("TlsConnector"));
    }

    #[tokio::test]
    async fn test_connect_any_skips_unreachable_addresses() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_addr = listener.local_addr().unwrap();

        let stream = connect_any(vec![closed_addr, open_addr]).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), open_addr);

        assert!(matches!(
            connect_any(vec![closed_addr]).await,
            Err(Error::Io(_))
        ));
        assert!(matches!(
            connect_any(Vec::new()).await,
            Err(Error::Resolution)
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = NetConnector.connect("127.0.0.1", port, None).await;
        match result {
            Err(Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connection should be refused"),
        }
    }
}
