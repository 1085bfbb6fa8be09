//! TLS client configuration from file-based settings.
//!
//! Roots come from `ca_cert` and every PEM file in `ca_path`; with
//! neither set, the Mozilla roots from `webpki-roots` are used. A client
//! identity is attached only when both `client_cert` and `client_key`
//! are configured.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};

use spawngrid_core::TlsSettings;

use crate::error::{RemoteError, RemoteResult};

/// Build a rustls client config for one backend.
pub fn client_config(settings: &TlsSettings) -> RemoteResult<ClientConfig> {
    let builder = ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| RemoteError::Tls(format!("protocol versions: {e}")))?;

    let builder = if settings.skip_verify {
        warn!("TLS server verification disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerifier))
    } else {
        builder.with_root_certificates(root_store(settings)?)
    };

    let config = match (&settings.client_cert, &settings.client_key) {
        (Some(cert), Some(key)) => {
            let chain = load_certs(cert)?;
            let key = load_key(key)?;
            debug!(cert = ?cert, "using TLS client identity");
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| RemoteError::Tls(format!("client identity: {e}")))?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(config)
}

fn root_store(settings: &TlsSettings) -> RemoteResult<RootCertStore> {
    let mut store = RootCertStore::empty();

    if let Some(ca_cert) = &settings.ca_cert {
        add_certs(&mut store, ca_cert)?;
    }
    if let Some(ca_path) = &settings.ca_path {
        let entries = std::fs::read_dir(ca_path)
            .map_err(|e| RemoteError::Tls(format!("read {}: {e}", ca_path.display())))?;
        for entry in entries {
            let path = entry
                .map_err(|e| RemoteError::Tls(format!("read {}: {e}", ca_path.display())))?
                .path();
            if !path.is_file() || !is_pem_file(&path) {
                continue;
            }
            // Key files may share the directory; only certificates count.
            for cert in read_certs(&path)? {
                store.add(cert).map_err(|e| {
                    RemoteError::Tls(format!("add CA from {}: {e}", path.display()))
                })?;
            }
        }
    }

    if store.is_empty() {
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    Ok(store)
}

fn is_pem_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("pem" | "crt" | "cer")
    )
}

fn add_certs(store: &mut RootCertStore, path: &Path) -> RemoteResult<()> {
    for cert in load_certs(path)? {
        store
            .add(cert)
            .map_err(|e| RemoteError::Tls(format!("add CA from {}: {e}", path.display())))?;
    }
    Ok(())
}

fn read_certs(path: &Path) -> RemoteResult<Vec<CertificateDer<'static>>> {
    let file =
        File::open(path).map_err(|e| RemoteError::Tls(format!("open {}: {e}", path.display())))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RemoteError::Tls(format!("parse {}: {e}", path.display())))
}

fn load_certs(path: &Path) -> RemoteResult<Vec<CertificateDer<'static>>> {
    let certs = read_certs(path)?;
    if certs.is_empty() {
        return Err(RemoteError::Tls(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> RemoteResult<PrivateKeyDer<'static>> {
    let file =
        File::open(path).map_err(|e| RemoteError::Tls(format!("open {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| RemoteError::Tls(format!("parse {}: {e}", path.display())))?
        .ok_or_else(|| RemoteError::Tls(format!("no private key in {}", path.display())))
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};

    #[derive(Debug)]
    pub struct NoVerifier;

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
