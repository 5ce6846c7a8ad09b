//! TLS settings for the exec websocket, which does not go through reqwest.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, Error, SignatureScheme};
use std::sync::Arc;
use tokio_tungstenite::Connector;
use ws_core::error::{InfraError, Result};

/// Skips certificate chain and host name checks. Handshake signatures are
/// still verified so the session keys belong to whoever holds the certificate.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Connector for exec sessions. `None` keeps tokio-tungstenite's default
/// verification against the webpki roots.
pub(super) fn exec_connector(insecure_skip_tls_verify: bool) -> Result<Option<Connector>> {
    if !insecure_skip_tls_verify {
        return Ok(None);
    }

    let provider = Arc::new(ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| InfraError::Internal(format!("Failed to configure TLS: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(Some(Connector::Rustls(Arc::new(config))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verified_connections_use_default_connector() {
        assert!(exec_connector(false).unwrap().is_none());
    }

    #[test]
    fn test_verifier_accepts_unknown_certificate() {
        let verifier = AcceptAnyCertificate(Arc::new(ring::default_provider()));
        let cert = CertificateDer::from(vec![0u8; 16]);
        let name = ServerName::try_from("api.cluster.local").unwrap();
        assert!(verifier
            .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
            .is_ok());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }

    #[test]
    fn test_insecure_connector_uses_rustls() {
        match exec_connector(true).unwrap() {
            Some(Connector::Rustls(_)) => {}
            _ => panic!("expected a rustls connector"),
        }
    }
}
