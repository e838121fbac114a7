//! Server binary: loads configuration, opens the storage engine, wires the
//! bridge dispatcher over it, and drives the RPC accept loop.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use kv_storage::StorageEngine;
use rpc_transport::server::{Connection, Dispatcher};
use telemetry::TelemetryConfig;

use node_runtime::bridge::{Bridge, BridgeEnv};
use node_runtime::config::{exit_code, Args, ConfigError, NodeConfig};
use node_runtime::models;

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match NodeConfig::load(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return ExitCode::from(match err {
                ConfigError::Read { .. } | ConfigError::Parse { .. } => exit_code::CONFIG,
            });
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::from(exit_code::USAGE);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::from(exit_code::OK),
        Err(err) => {
            eprintln!("node-runtime exited with error: {err:#}");
            ExitCode::from(exit_code::CONFIG)
        }
    }
}

async fn run(config: NodeConfig) -> Result<()> {
    let telemetry_config = TelemetryConfig {
        log_level: config.log_level.clone(),
        ..TelemetryConfig::from_env()
    };
    let metrics_port = telemetry_config.metrics_port;
    let _telemetry = telemetry::init_telemetry(telemetry_config).context("failed to initialize telemetry")?;

    if let Some(secrets_path) = &config.secrets_path {
        let passphrase = std::env::var("HATN_SECRETS_PASSPHRASE")
            .context("HATN_SECRETS_PASSPHRASE must be set when secrets_path is configured")?;
        node_runtime::secrets::load(secrets_path, &passphrase).context("failed to unseal secrets blob")?;
        info!("secrets blob unsealed");
    }

    let storage = Arc::new(StorageEngine::open_default(&config.storage.root_dir).context("failed to open storage engine")?);
    let default_env = Arc::new(BridgeEnv::new("default", storage));
    let mut bridge = Bridge::new(default_env);
    models::register(&mut bridge);
    let bridge = Arc::new(bridge);

    let mut dispatcher = Dispatcher::new();
    bridge.install(&mut dispatcher);
    let dispatcher = Arc::new(dispatcher);

    let metrics_addr: SocketAddr = ([0, 0, 0, 0], metrics_port).into();
    tokio::spawn(async move {
        if let Err(err) = telemetry::serve_metrics(metrics_addr).await {
            warn!(%err, "metrics endpoint stopped");
        }
    });

    match &config.tls {
        Some(tls) => accept_tls(&config, tls, dispatcher).await,
        None => accept_plain(&config, dispatcher).await,
    }
}

async fn accept_plain(config: &NodeConfig, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "accepting plaintext connections");

    loop {
        let (stream, peer) = listener.accept().await?;
        let dispatcher = dispatcher.clone();
        telemetry::CONNECTIONS_OPEN.inc();
        tokio::spawn(async move {
            let connection = Connection::new(stream, dispatcher, "default");
            if let Err(err) = connection.run().await {
                warn!(%peer, %err, "connection ended with error");
            }
            telemetry::CONNECTIONS_OPEN.dec();
        });
    }
}

#[cfg(feature = "tls")]
async fn accept_tls(config: &NodeConfig, tls: &node_runtime::config::TlsConfig, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let acceptor = build_tls_acceptor(tls)?;
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "accepting TLS connections");

    loop {
        let (stream, peer) = listener.accept().await?;
        let dispatcher = dispatcher.clone();
        let acceptor = acceptor.clone();
        telemetry::CONNECTIONS_OPEN.inc();
        tokio::spawn(async move {
            match acceptor.accept(stream).await {
                Ok(tls_stream) => {
                    let connection = Connection::new(tls_stream, dispatcher, "default");
                    if let Err(err) = connection.run().await {
                        warn!(%peer, %err, "connection ended with error");
                    }
                }
                Err(err) => warn!(%peer, %err, "TLS handshake failed"),
            }
            telemetry::CONNECTIONS_OPEN.dec();
        });
    }
}

#[cfg(not(feature = "tls"))]
async fn accept_tls(_config: &NodeConfig, _tls: &node_runtime::config::TlsConfig, _dispatcher: Arc<Dispatcher>) -> Result<()> {
    anyhow::bail!("TLS configured but this binary was built without the `tls` feature")
}

#[cfg(feature = "tls")]
fn build_tls_acceptor(tls: &node_runtime::config::TlsConfig) -> Result<tokio_rustls::TlsAcceptor> {
    let cert_file = std::fs::File::open(&tls.cert_path).with_context(|| format!("opening {}", tls.cert_path.display()))?;
    let mut cert_reader = std::io::BufReader::new(cert_file);
    let cert_chain = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .context("parsing certificate chain")?;

    let key_file = std::fs::File::open(&tls.key_path).with_context(|| format!("opening {}", tls.key_path.display()))?;
    let mut key_reader = std::io::BufReader::new(key_file);
    let private_key = rustls_pemfile::private_key(&mut key_reader)
        .context("parsing private key")?
        .context("no private key found in key file")?;

    rpc_transport::tls::server_acceptor(cert_chain, private_key).context("building TLS acceptor")
}
