//! TLS connection establishment to the tunnel server.

use std::net::SocketAddr;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::ClientError;

/// Everything needed to (re)dial the server.
pub(crate) struct Dialer {
    pub(crate) server_addr: String,
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl Dialer {
    /// Builds a dialer for `server_addr` (`host:port`). The host part doubles
    /// as the TLS server name.
    pub(crate) fn new(server_addr: &str, config: rustls::ClientConfig) -> Result<Self, ClientError> {
        let (host, port) = split_host_port(server_addr)?;
        port.parse::<u16>()
            .map_err(|_| ClientError::Config(format!("bad port in server address: {server_addr}")))?;

        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|_| ClientError::Config(format!("bad host in server address: {server_addr}")))?;

        Ok(Self {
            server_addr: server_addr.to_owned(),
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
        })
    }

    /// Dials the server over TCP v4 and completes the TLS handshake.
    pub(crate) async fn dial(&self) -> std::io::Result<TlsStream<TcpStream>> {
        let addr = resolve_v4(&self.server_addr).await?;
        let tcp = TcpStream::connect(addr).await?;
        self.connector.connect(self.server_name.clone(), tcp).await
    }
}

/// Resolves `host:port` to the first IPv4 address it yields.
async fn resolve_v4(addr: &str) -> std::io::Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("{addr} resolved to no ipv4 address"),
            )
        })
}

pub(crate) fn split_host_port(addr: &str) -> Result<(&str, &str), ClientError> {
    addr.rsplit_once(':')
        .filter(|(host, port)| !host.is_empty() && !port.is_empty())
        .ok_or_else(|| ClientError::Config(format!("server address is not host:port: {addr}")))
}
