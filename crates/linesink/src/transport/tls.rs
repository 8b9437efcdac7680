// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! TLS client channel built on rustls.
//!
//! Three verification modes cover the deployment spectrum:
//!
//! - [`TlsVerifyMode::Strict`]: full chain and host name verification
//!   against the webpki root set, optionally extended with a CA file.
//! - [`TlsVerifyMode::Relaxed`]: chain verified, host name mismatches
//!   tolerated (load balancers fronting a shared certificate).
//! - [`TlsVerifyMode::Disabled`]: no verification. Only defensible on a
//!   trusted local network.
//!
//! The handshake completes inside [`wrap`] so certificate and protocol
//! failures surface at connect time, distinguished from transient socket
//! faults.

use std::io::BufReader;
use std::net::TcpStream;
use std::sync::Arc;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, ClientConnection, RootCertStore};

use crate::config::{SenderConfig, TlsVerifyMode};
use crate::error::{Error, Result};
use crate::transport::ByteStream;

/// TLS-wrapped TCP stream.
pub(crate) type TlsStream = rustls::StreamOwned<ClientConnection, TcpStream>;

/// Wrap `tcp` in a TLS session and complete the handshake.
pub(crate) fn wrap(tcp: TcpStream, config: &SenderConfig) -> Result<TlsStream> {
    let client_config = build_client_config(config)?;
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| Error::Tls(format!("invalid server name {:?}: {}", config.host, e)))?;

    let conn = ClientConnection::new(Arc::new(client_config), server_name)
        .map_err(|e| Error::Tls(format!("creating TLS session: {}", e)))?;

    let mut stream = TlsStream::new(conn, tcp);
    // Drive the handshake to completion now; the socket's read/write
    // timeouts bound each round-trip.
    while stream.conn.is_handshaking() {
        stream
            .conn
            .complete_io(&mut stream.sock)
            .map_err(classify_handshake_error)?;
    }
    log::debug!(
        "TLS session established with {} ({:?} verification)",
        config.host,
        config.tls_verify
    );
    Ok(stream)
}

/// Split handshake failures into trust problems (terminal) and socket
/// faults (retryable).
fn classify_handshake_error(e: std::io::Error) -> Error {
    let is_tls = e
        .get_ref()
        .is_some_and(|inner| inner.downcast_ref::<rustls::Error>().is_some())
        || e.kind() == std::io::ErrorKind::InvalidData;
    if is_tls {
        Error::Tls(format!("TLS handshake failed: {}", e))
    } else {
        Error::Connection(format!("TLS handshake I/O: {}", e))
    }
}

/// Build the rustls client configuration for the requested mode.
fn build_client_config(config: &SenderConfig) -> Result<ClientConfig> {
    let builder = ClientConfig::builder();
    let verified = match config.tls_verify {
        TlsVerifyMode::Strict => builder.with_root_certificates(root_store(config)?),
        TlsVerifyMode::Relaxed => {
            let inner = WebPkiServerVerifier::builder(Arc::new(root_store(config)?))
                .build()
                .map_err(|e| Error::Tls(format!("building certificate verifier: {}", e)))?;
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(HostnameTolerantVerifier { inner }))
        }
        TlsVerifyMode::Disabled => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier)),
    };
    let client_config = match client_auth(config)? {
        Some((certs, key)) => verified
            .with_client_auth_cert(certs, key)
            .map_err(|e| Error::Tls(format!("loading client certificate: {}", e)))?,
        None => verified.with_no_client_auth(),
    };
    Ok(client_config)
}

/// Load the mutual-TLS client certificate chain and key, if configured.
#[allow(clippy::type_complexity)]
fn client_auth(
    config: &SenderConfig,
) -> Result<Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>> {
    let (Some(cert_path), Some(key_path)) = (&config.tls_client_cert, &config.tls_client_key)
    else {
        return Ok(None);
    };

    let cert_file = std::fs::File::open(cert_path).map_err(|e| {
        Error::Tls(format!(
            "reading client certificate {}: {}",
            cert_path.display(),
            e
        ))
    })?;
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| {
                Error::Tls(format!(
                    "parsing client certificate {}: {}",
                    cert_path.display(),
                    e
                ))
            })?;
    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "client certificate file {} contains no certificates",
            cert_path.display()
        )));
    }

    let key_file = std::fs::File::open(key_path).map_err(|e| {
        Error::Tls(format!("reading client key {}: {}", key_path.display(), e))
    })?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| Error::Tls(format!("parsing client key {}: {}", key_path.display(), e)))?
        .ok_or_else(|| {
            Error::Tls(format!(
                "client key file {} contains no private key",
                key_path.display()
            ))
        })?;

    Ok(Some((certs, key)))
}

/// Webpki roots plus any CA file from the config.
fn root_store(config: &SenderConfig) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = &config.tls_roots {
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Tls(format!("reading CA file {}: {}", path.display(), e))
        })?;
        let mut reader = BufReader::new(file);
        let mut added = 0usize;
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert: CertificateDer<'static> = cert.map_err(|e| {
                Error::Tls(format!("parsing CA file {}: {}", path.display(), e))
            })?;
            roots
                .add(cert)
                .map_err(|e| Error::Tls(format!("adding CA certificate: {}", e)))?;
            added += 1;
        }
        if added == 0 {
            return Err(Error::Tls(format!(
                "CA file {} contains no certificates",
                path.display()
            )));
        }
        log::debug!("loaded {} CA certificate(s) from {}", added, path.display());
    }
    Ok(roots)
}

// ============================================================================
// ByteStream for the TLS stream
// ============================================================================

impl ByteStream for TlsStream {
    fn shutdown(&mut self, how: std::net::Shutdown) -> std::io::Result<()> {
        self.conn.send_close_notify();
        // Flush the close_notify if the peer is still there.
        let _ = self.conn.complete_io(&mut self.sock);
        self.sock.shutdown(how)
    }

    fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.sock.peer_addr()
    }

    fn set_read_timeout(&self, dur: Option<std::time::Duration>) -> std::io::Result<()> {
        self.sock.set_read_timeout(dur)
    }

    fn set_write_timeout(&self, dur: Option<std::time::Duration>) -> std::io::Result<()> {
        self.sock.set_write_timeout(dur)
    }

    fn is_tls(&self) -> bool {
        true
    }
}

// ============================================================================
// Relaxed verifier: chain checked, host name tolerated
// ============================================================================

#[derive(Debug)]
struct HostnameTolerantVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for HostnameTolerantVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> core::result::Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName
                | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> core::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> core::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

// ============================================================================
// No-verification verifier (TlsVerifyMode::Disabled)
// ============================================================================

#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> core::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> core::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> core::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
