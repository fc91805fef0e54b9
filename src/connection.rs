//! IMAP session setup and error mapping
//!
//! Provides `connect()` and `select()` for [`ImapMailStore`], plus the
//! translation of IMAP failures into HTTP-style [`StoreError`] statuses
//! so the mutator's retry policy applies unchanged.
//!
//! [`ImapMailStore`]: crate::ImapMailStore

use crate::config::ImapConfig;
use crate::error::{Error, Result, StoreError};
use async_imap::Session;
use rustls::pki_types::ServerName;
use std::io;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

/// A TLS-wrapped IMAP session.
pub type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// Build a TLS connector that accepts all certificates.
///
/// Proton Bridge listens on localhost with a self-signed certificate.
fn tls_connector() -> TlsConnector {
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Open a fresh TLS-wrapped IMAP session: TCP, STARTTLS, handshake,
/// LOGIN.
pub async fn connect(config: &ImapConfig) -> Result<ImapSession> {
    let addr = format!("{}:{}", config.host, config.port);
    debug!("Connecting to IMAP server at {}", addr);

    let tcp_stream = TcpStream::connect(&addr).await?;
    let mut client = async_imap::Client::new(tcp_stream.compat());

    client
        .run_command_and_check_ok("STARTTLS", None)
        .await
        .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;

    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

    let inner = client.into_inner().into_inner();
    let tls_stream = tls_connector()
        .connect(server_name, inner)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;

    let session = async_imap::Client::new(tls_stream.compat())
        .login(&config.username, &config.password)
        .await
        .map_err(|(e, _)| Error::Login(e.to_string()))?;

    info!("Connected to IMAP server as {}", config.username);
    Ok(session)
}

/// SELECT a folder on an existing session.
pub async fn select(session: &mut ImapSession, folder: &str) -> Result<()> {
    session
        .select(folder)
        .await
        .map_err(|e| imap_error(&format!("SELECT {folder}"), e))?;
    Ok(())
}

/// Wrap an async-imap error, keeping transport failures distinct from
/// server responses.
pub fn imap_error(context: &str, error: async_imap::error::Error) -> Error {
    match error {
        async_imap::error::Error::Io(e) => Error::Io(e),
        async_imap::error::Error::ConnectionLost => Error::Io(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            format!("{context}: connection lost"),
        )),
        other => Error::Imap(format!("{context}: {other}")),
    }
}

/// Map a server response text to a status.
///
/// Recognises RFC 5530 response codes and the plain-text phrasing
/// Bridge uses when it omits them.
#[must_use]
pub fn status_for_response(text: &str) -> u16 {
    let upper = text.to_ascii_uppercase();
    let has = |needles: &[&str]| needles.iter().any(|n| upper.contains(n));

    if has(&["OVERQUOTA", "[LIMIT]", "QUOTA", "TOO MANY"]) {
        429
    } else if has(&["NOPERM", "PERMISSION", "DENIED", "READ-ONLY"]) {
        403
    } else if has(&["NONEXISTENT", "NOT FOUND", "NO SUCH"]) {
        404
    } else if has(&["UNAVAILABLE", "TEMPORAR", "TRY AGAIN", "SERVERBUG"]) {
        503
    } else {
        400
    }
}

impl From<Error> for StoreError {
    fn from(error: Error) -> Self {
        let status = match &error {
            Error::Io(_) | Error::Tls(_) => 503,
            Error::Login(_) => 403,
            Error::Imap(text) => status_for_response(text),
            Error::Config(_) | Error::Query(_) => 400,
        };
        Self::new(status, error.to_string())
    }
}

/// Certificate verifier that accepts every certificate.
#[derive(Debug)]
struct AcceptAnyCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
