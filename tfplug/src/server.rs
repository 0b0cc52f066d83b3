//! Server module for running Terraform providers
//!
//! This module starts the provider gRPC server, prints the go-plugin
//! handshake and handles graceful shutdown.

use crate::error::{Result, TfplugError};
use crate::grpc::{ControllerService, HealthService, ProviderService};
use crate::proto::health::health_server::HealthServer;
use crate::proto::plugin::grpc_controller_server::GrpcControllerServer;
use crate::proto::ProviderServer;
use crate::provider::Provider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};

/// Environment variable Terraform sets so plugins know they were launched by it
pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

const CORE_PROTOCOL_VERSION: u8 = 1;
const APP_PROTOCOL_VERSION: u8 = 6;

/// Server configuration for running a Terraform provider
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PEM certificate to serve TLS with; plaintext when unset
    pub cert_path: Option<PathBuf>,
    /// PEM private key matching `cert_path`
    pub key_path: Option<PathBuf>,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// How long in-flight requests get to finish once shutdown starts
    pub shutdown_timeout: Duration,
    /// Refuse to start unless launched by Terraform
    pub require_magic_cookie: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cert_path: std::env::var_os("TF_PLUGIN_CERT_PATH").map(PathBuf::from),
            key_path: std::env::var_os("TF_PLUGIN_KEY_PATH").map(PathBuf::from),
            max_message_size: 256 << 20, // 256MB
            shutdown_timeout: Duration::from_secs(30),
            require_magic_cookie: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cert_path(mut self, path: PathBuf) -> Self {
        self.cert_path = Some(path);
        self
    }

    pub fn with_key_path(mut self, path: PathBuf) -> Self {
        self.key_path = Some(path);
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Skip the magic cookie check, for debugging outside Terraform
    pub fn without_magic_cookie(mut self) -> Self {
        self.require_magic_cookie = false;
        self
    }
}

struct TlsSetup {
    config: ServerTlsConfig,
    handshake_cert: String,
}

async fn load_tls(config: &ServerConfig) -> Result<Option<TlsSetup>> {
    let (cert_path, key_path) = match (&config.cert_path, &config.key_path) {
        (Some(cert), Some(key)) => (cert, key),
        (None, None) => return Ok(None),
        _ => {
            return Err(TfplugError::TlsError(
                "both a certificate and a key are required to serve TLS".to_string(),
            ))
        }
    };

    let cert = tokio::fs::read_to_string(cert_path)
        .await
        .map_err(|e| TfplugError::TlsError(format!("Failed to read certificate: {}", e)))?;
    let key = tokio::fs::read(key_path)
        .await
        .map_err(|e| TfplugError::TlsError(format!("Failed to read key: {}", e)))?;

    let mut tls = ServerTlsConfig::new().identity(Identity::from_pem(cert.as_bytes(), key));
    if let Ok(client_cert) = std::env::var("PLUGIN_CLIENT_CERT") {
        tls = tls.client_ca_root(Certificate::from_pem(client_cert));
    }

    Ok(Some(TlsSetup {
        config: tls,
        handshake_cert: handshake_cert(&cert),
    }))
}

/// go-plugin expects the DER certificate in unpadded standard base64, which
/// is the PEM body without armour, line breaks or padding.
fn handshake_cert(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect::<String>()
        .trim_end_matches('=')
        .to_string()
}

fn handshake_line(addr: std::net::SocketAddr, cert: Option<&str>) -> String {
    let mut line = format!(
        "{}|{}|tcp|{}|grpc",
        CORE_PROTOCOL_VERSION, APP_PROTOCOL_VERSION, addr
    );
    if let Some(cert) = cert {
        line.push('|');
        line.push_str(cert);
    }
    line
}

/// Waits for SIGTERM. SIGINT is ignored: Terraform forwards Ctrl-C to its
/// plugins and then calls StopProvider itself.
async fn wait_for_terminate() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut term), Ok(mut int)) => loop {
                tokio::select! {
                    _ = term.recv() => {
                        tracing::info!("received SIGTERM, shutting down");
                        return;
                    }
                    _ = int.recv() => {
                        tracing::debug!("ignoring SIGINT; terraform will stop the provider");
                    }
                }
            },
            _ => {
                tracing::warn!("unable to install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}

/// Main entry point for running a provider
pub async fn serve<P: Provider + 'static>(provider: P, config: ServerConfig) -> Result<()> {
    if config.require_magic_cookie
        && std::env::var(MAGIC_COOKIE_KEY).ok().as_deref() != Some(MAGIC_COOKIE_VALUE)
    {
        return Err(TfplugError::NotLaunchedByTerraform);
    }

    // Already installed is fine.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let tls = load_tls(&config).await?;

    let provider_service = ProviderServer::new(ProviderService::new(provider))
        .max_decoding_message_size(config.max_message_size)
        .max_encoding_message_size(config.max_message_size);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let mut builder = Server::builder();
    if let Some(tls) = &tls {
        builder = builder.tls_config(tls.config.clone())?;
    }
    let router = builder
        .add_service(HealthServer::new(HealthService))
        .add_service(GrpcControllerServer::new(ControllerService::new(
            Arc::clone(&shutdown_tx),
        )))
        .add_service(provider_service);

    println!(
        "{}",
        handshake_line(addr, tls.as_ref().map(|t| t.handshake_cert.as_str()))
    );
    tracing::info!(%addr, tls = tls.is_some(), "provider server listening");

    let signal_tx = Arc::clone(&shutdown_tx);
    tokio::spawn(async move {
        wait_for_terminate().await;
        signal_tx.send_replace(true);
    });

    let mut server_rx = shutdown_rx.clone();
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
    let server = router.serve_with_incoming_shutdown(incoming, async move {
        let _ = server_rx.wait_for(|stop| *stop).await;
    });
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result.map_err(TfplugError::from),
        _ = shutdown_rx.wait_for(|stop| *stop) => {}
    }

    // Shutdown has begun; give in-flight requests the configured grace period.
    match tokio::time::timeout(config.shutdown_timeout, server).await {
        Ok(result) => {
            result?;
            tracing::info!("server shutdown complete");
        }
        Err(_) => {
            tracing::warn!(timeout = ?config.shutdown_timeout, "shutdown timeout exceeded, forcing exit");
        }
    }
    Ok(())
}

/// Convenience function to run a provider with default configuration
pub async fn serve_default<P: Provider + 'static>(provider: P) -> Result<()> {
    serve(provider, ServerConfig::default()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_without_tls_has_five_fields() {
        let addr: std::net::SocketAddr = "127.0.0.1:41234".parse().unwrap();
        assert_eq!(handshake_line(addr, None), "1|6|tcp|127.0.0.1:41234|grpc");
    }

    #[test]
    fn handshake_cert_strips_armour_and_padding() {
        let pem = "-----BEGIN CERTIFICATE-----\nMIIBaz\nCCAR==\n-----END CERTIFICATE-----\n";
        assert_eq!(handshake_cert(pem), "MIIBazCCAR");

        let addr: std::net::SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert_eq!(
            handshake_line(addr, Some("MIIBazCCAR")),
            "1|6|tcp|127.0.0.1:1|grpc|MIIBazCCAR"
        );
    }

    #[test]
    fn default_config_has_sane_limits() {
        let config = ServerConfig::default();
        assert_eq!(config.max_message_size, 256 << 20);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert!(config.require_magic_cookie);
    }

    #[tokio::test]
    async fn key_without_certificate_is_rejected() {
        let config = ServerConfig {
            cert_path: None,
            key_path: Some(PathBuf::from("/nonexistent/key.pem")),
            ..ServerConfig::default()
        };
        assert!(matches!(load_tls(&config).await, Err(TfplugError::TlsError(_))));
    }
}
