//! Optional TLS wrapping for the server's accept loop: a
//! `rustls::ServerConfig` built from a certificate chain and private key,
//! handed to a `tokio_rustls::TlsAcceptor`. Requires a real certificate
//! chain — server identity is the point, not best-effort encryption
//! between anonymous peers.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::error::TransportError;

pub fn server_acceptor(
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
) -> Result<TlsAcceptor, TransportError> {
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|e| TransportError::AuthFailure(e.to_string()))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
