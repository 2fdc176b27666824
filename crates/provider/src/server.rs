//! Plugin Server
//!
//! go-plugin handshake and the gRPC server Terraform connects to.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tracing::{info, warn};

use crate::provider::CorelliumProvider;
use crate::tfplugin6::provider_server::ProviderServer;

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str = "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// Terraform's client certificate under AutoMTLS
pub const CLIENT_CERT_ENV: &str = "PLUGIN_CLIENT_CERT";

pub const REGISTRY_ADDRESS: &str = "registry.terraform.io/corellium/corellium";

const CORE_PROTOCOL_VERSION: u32 = 1;
const APP_PROTOCOL_VERSION: u32 = 6;

pub enum ServeMode {
    /// Launched by Terraform
    Plugin { client_cert: Option<String> },
    /// Started by hand; Terraform attaches through `TF_REATTACH_PROVIDERS`
    Debug,
}

pub fn magic_cookie_matches() -> bool {
    cookie_matches(std::env::var(MAGIC_COOKIE_KEY).ok().as_deref())
}

fn cookie_matches(value: Option<&str>) -> bool {
    value == Some(MAGIC_COOKIE_VALUE)
}

pub fn client_cert_from_env() -> Option<String> {
    std::env::var(CLIENT_CERT_ENV).ok().filter(|pem| !pem.trim().is_empty())
}

/// Self-signed certificate the server presents to Terraform
pub struct ServerCertificate {
    pub cert_pem: String,
    pub key_pem: String,
    pub der: Vec<u8>,
}

impl ServerCertificate {
    pub fn generate() -> anyhow::Result<Self> {
        let mut params = CertificateParams::new(vec!["localhost".to_string()])?;
        params.distinguished_name.push(DnType::CommonName, "localhost");
        params.distinguished_name.push(DnType::OrganizationName, "Corellium");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let key = KeyPair::generate()?;
        let cert = params.self_signed(&key)?;

        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            der: cert.der().to_vec(),
        })
    }
}

/// The line go-plugin reads from stdout to find the server
pub fn handshake_line(addr: SocketAddr, cert: Option<&ServerCertificate>) -> String {
    let cert = cert.map(|c| STANDARD_NO_PAD.encode(&c.der)).unwrap_or_default();
    format!("{CORE_PROTOCOL_VERSION}|{APP_PROTOCOL_VERSION}|tcp|{addr}|grpc|{cert}")
}

/// `TF_REATTACH_PROVIDERS` value for debug mode
pub fn reattach_config(addr: SocketAddr, pid: u32) -> serde_json::Value {
    serde_json::json!({
        REGISTRY_ADDRESS: {
            "Protocol": "grpc",
            "ProtocolVersion": APP_PROTOCOL_VERSION,
            "Pid": pid,
            "Test": true,
            "Addr": {
                "Network": "tcp",
                "String": addr.to_string(),
            }
        }
    })
}

/// Bind, announce, and serve the provider until shutdown.
pub async fn serve(mode: ServeMode) -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    info!("Provider listening on {}", addr);

    let shutdown = Arc::new(Notify::new());
    let provider = CorelliumProvider::new(shutdown.clone());

    let mut builder = Server::builder();
    let mut stdout = io::stdout();

    match &mode {
        ServeMode::Plugin { client_cert } => {
            let cert = match client_cert {
                Some(client_pem) => {
                    if !client_pem.contains("BEGIN CERTIFICATE") {
                        warn!("{} does not hold a PEM certificate", CLIENT_CERT_ENV);
                    }
                    let cert = ServerCertificate::generate()?;
                    let identity = Identity::from_pem(&cert.cert_pem, &cert.key_pem);
                    builder = builder.tls_config(ServerTlsConfig::new().identity(identity))?;
                    info!("Serving over TLS");
                    Some(cert)
                }
                None => None,
            };
            writeln!(stdout, "{}", handshake_line(addr, cert.as_ref()))?;
        }
        ServeMode::Debug => {
            let reattach = reattach_config(addr, std::process::id());
            writeln!(stdout, "Provider started. To attach Terraform, set:\n")?;
            writeln!(stdout, "\tTF_REATTACH_PROVIDERS='{reattach}'\n")?;
        }
    }
    stdout.flush()?;

    builder
        .add_service(ProviderServer::new(provider))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown_signal(shutdown))
        .await?;

    info!("Provider shutdown complete");
    Ok(())
}

async fn shutdown_signal(stop: Arc<Notify>) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received interrupt"),
        _ = terminate => info!("Received SIGTERM"),
        _ = stop.notified() => info!("Terraform requested shutdown"),
    }
}
