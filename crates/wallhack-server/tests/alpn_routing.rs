//! End-to-end mux tests: real TLS handshakes routed by ALPN.

use std::sync::Arc;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair,
    PKCS_ECDSA_P256_SHA256,
};
use rustls::pki_types::{PrivateKeyDer, ServerName};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use wallhack_server::{common_name, TlsMux};
use wallhack_transport::tls;

#[ctor::ctor]
fn install_crypto() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

struct TestCa {
    cert: Certificate,
    key: KeyPair,
}

impl TestCa {
    fn new() -> Self {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "wallhack test ca");
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    /// Issues a leaf cert; returns (cert PEM, key PEM).
    fn issue(&self, cn: &str, san: Option<&str>) -> (String, String) {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut params = match san {
            Some(san) => CertificateParams::new(vec![san.to_string()]).unwrap(),
            None => CertificateParams::default(),
        };
        params.distinguished_name.push(DnType::CommonName, cn);
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert.pem(), key.serialize_pem())
    }
}

/// Auxiliary-side server config: same cert, no client auth, ALPN h2.
fn aux_server_config(cert_pem: &str, key_pem: &str) -> rustls::ServerConfig {
    let certs = rustls_pemfile_certs(cert_pem);
    let key = rustls_pemfile_key(key_pem);
    let mut config =
        rustls::ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .unwrap();
    config.alpn_protocols = vec![b"h2".to_vec()];
    config
}

fn rustls_pemfile_certs(pem: &str) -> Vec<rustls::pki_types::CertificateDer<'static>> {
    rustls_pemfile::certs(&mut std::io::Cursor::new(pem))
        .collect::<Result<_, _>>()
        .unwrap()
}

fn rustls_pemfile_key(pem: &str) -> PrivateKeyDer<'static> {
    rustls_pemfile::private_key(&mut std::io::Cursor::new(pem))
        .unwrap()
        .unwrap()
}

fn root_store(ca: &TestCa) -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    roots.add(ca.cert.der().clone()).unwrap();
    roots
}

/// Client config without a client certificate, with the given ALPN.
fn anon_client_config(ca: &TestCa, alpn: &[u8]) -> rustls::ClientConfig {
    let mut config =
        rustls::ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
            .with_root_certificates(root_store(ca))
            .with_no_client_auth();
    config.alpn_protocols = vec![alpn.to_vec()];
    config
}

async fn connect(
    addr: std::net::SocketAddr,
    config: rustls::ClientConfig,
) -> std::io::Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let server_name = ServerName::try_from("localhost").unwrap();
    let tcp = TcpStream::connect(addr).await?;
    TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await
}

#[tokio::test]
async fn routes_tunnel_and_auxiliary_clients_by_alpn() {
    let ca = TestCa::new();
    let (server_cert, server_key) = ca.issue("server", Some("localhost"));
    let (client_cert, client_key) = ca.issue("foo", None);

    let tunnel_config =
        Arc::new(tls::server_config(&server_cert, &server_key, &ca.cert.pem()).unwrap());
    let aux_config = Arc::new(aux_server_config(&server_cert, &server_key));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (mux, mut frontends) = TlsMux::new(vec![listener], tunnel_config, Some(aux_config));
    let shutdown = CancellationToken::new();
    let mux_task = tokio::spawn(mux.run(shutdown.clone()));

    // Client A offers the tunnel protocol and a client certificate.
    let tunnel_client =
        tls::client_config(&client_cert, &client_key, Some(&ca.cert.pem())).unwrap();
    let _conn_a = connect(addr, tunnel_client).await.unwrap();

    let routed = frontends.tunnel.recv().await.unwrap();
    let (_, session) = routed.get_ref();
    assert_eq!(session.alpn_protocol(), Some(&b"wallhack"[..]));
    let peer_certs = session.peer_certificates().unwrap();
    assert_eq!(peer_certs.len(), 1);
    assert_eq!(common_name(&peer_certs[0]).unwrap(), "foo");

    // Client B offers h2 and no certificate: auxiliary frontend.
    let _conn_b = connect(addr, anon_client_config(&ca, b"h2")).await.unwrap();

    let routed_b = frontends.auxiliary.recv().await.unwrap();
    let (_, session_b) = routed_b.get_ref();
    assert_eq!(session_b.alpn_protocol(), Some(&b"h2"[..]));

    // The tunnel frontend never saw client B.
    assert!(frontends.tunnel.try_recv().is_err());

    shutdown.cancel();
    mux_task.await.unwrap().unwrap();

    // Closed frontends are the downstream shutdown signal.
    assert!(frontends.tunnel.recv().await.is_none());
    assert!(frontends.auxiliary.recv().await.is_none());
}

#[tokio::test]
async fn accepts_on_every_backend_listener() {
    let ca = TestCa::new();
    let (server_cert, server_key) = ca.issue("server", Some("localhost"));
    let (client_cert, client_key) = ca.issue("bar", None);

    let tunnel_config =
        Arc::new(tls::server_config(&server_cert, &server_key, &ca.cert.pem()).unwrap());

    let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addrs = [first.local_addr().unwrap(), second.local_addr().unwrap()];

    let (mux, mut frontends) = TlsMux::new(vec![first, second], tunnel_config, None);
    let shutdown = CancellationToken::new();
    let mux_task = tokio::spawn(mux.run(shutdown.clone()));

    let mut conns = Vec::new();
    for addr in addrs {
        let config = tls::client_config(&client_cert, &client_key, Some(&ca.cert.pem())).unwrap();
        conns.push(connect(addr, config).await.unwrap());
        let routed = frontends.tunnel.recv().await.unwrap();
        assert_eq!(routed.get_ref().1.alpn_protocol(), Some(&b"wallhack"[..]));
    }

    shutdown.cancel();
    mux_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn rejects_tls12_only_clients() {
    let ca = TestCa::new();
    let (server_cert, server_key) = ca.issue("server", Some("localhost"));
    let (client_cert, client_key) = ca.issue("foo", None);

    let tunnel_config =
        Arc::new(tls::server_config(&server_cert, &server_key, &ca.cert.pem()).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (mux, mut frontends) = TlsMux::new(vec![listener], tunnel_config, None);
    let shutdown = CancellationToken::new();
    let mux_task = tokio::spawn(mux.run(shutdown.clone()));

    let mut old_client =
        rustls::ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS12])
            .with_root_certificates(root_store(&ca))
            .with_client_auth_cert(
                rustls_pemfile_certs(&client_cert),
                rustls_pemfile_key(&client_key),
            )
            .unwrap();
    old_client.alpn_protocols = vec![b"wallhack".to_vec()];

    assert!(connect(addr, old_client).await.is_err());
    assert!(frontends.tunnel.try_recv().is_err());

    shutdown.cancel();
    mux_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn without_auxiliary_non_tunnel_alpn_is_rejected() {
    let ca = TestCa::new();
    let (server_cert, server_key) = ca.issue("server", Some("localhost"));

    let tunnel_config =
        Arc::new(tls::server_config(&server_cert, &server_key, &ca.cert.pem()).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (mux, mut frontends) = TlsMux::new(vec![listener], tunnel_config, None);
    let shutdown = CancellationToken::new();
    let mux_task = tokio::spawn(mux.run(shutdown.clone()));

    assert!(connect(addr, anon_client_config(&ca, b"h2")).await.is_err());
    assert!(frontends.tunnel.try_recv().is_err());

    shutdown.cancel();
    mux_task.await.unwrap().unwrap();
}
