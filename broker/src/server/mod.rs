use anyhow::{Context, Result};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::common::config::BrokerConfig;
use credentials::CachingCredentialsProvider;
use identity::{ClientIpResolver, RemoteAddr};
use metrics::PrometheusMetrics;
use roles::StaticRoleFinder;
use service::BrokerService;
use sts::StsRoleAssumer;
use tracing::{error, info, warn};

pub mod context;
pub mod credentials;
pub mod error;
mod handlers;
pub mod identity;
pub mod metrics;
pub mod roles;
mod service;
mod status;
pub mod sts;
#[cfg(test)]
mod testing;

pub async fn run(config: BrokerConfig, config_path: Option<PathBuf>) -> Result<()> {
    println!("Starting Role Broker...");

    info!("🚀 Starting credential broker");
    info!("📡 Metadata port: {}", config.server.port);
    info!("🏥 Health port: {}", config.server.health_port);
    info!("⏱️  Request timeout: {}s", config.server.request_timeout);
    info!("🔐 Role mappings: {}", config.roles.len());

    let identity = Arc::new(ClientIpResolver::new(config.server.trust_forwarded_for));
    let roles = Arc::new(StaticRoleFinder::new(config.roles.clone()));
    let assumer = Arc::new(StsRoleAssumer::from_config(&config.sts).await);
    let credentials = Arc::new(CachingCredentialsProvider::new(
        assumer,
        config.sts.refresh_window(),
        config.sts.session_duration(),
    ));
    let refresher = credentials
        .clone()
        .spawn_refresher(config.sts.refresh_interval());
    let metrics = Arc::new(PrometheusMetrics::new().context("failed to build metrics registry")?);

    #[cfg(unix)]
    if let Some(path) = config_path {
        spawn_role_reloader(path, roles.clone())?;
    }
    #[cfg(not(unix))]
    let _ = config_path;

    let service = BrokerService::new(
        identity,
        roles,
        credentials,
        metrics,
        config.server.request_timeout(),
    );

    // Start metadata HTTP server
    let metadata_service = service.clone();
    let port = config.server.port;
    let metadata_handle = tokio::spawn(async move {
        let make_svc = make_service_fn(move |conn: &AddrStream| {
            let service = metadata_service.clone();
            let remote = conn.remote_addr();
            async move {
                Ok::<_, Infallible>(service_fn(move |mut req| {
                    let service = service.clone();
                    req.extensions_mut().insert(RemoteAddr(remote));
                    async move { service.handle_metadata_request(req).await }
                }))
            }
        });

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let server = Server::bind(&addr).serve(make_svc);

        info!("🌐 Metadata HTTP server listening on {}", addr);

        if let Err(e) = server.await {
            error!("Metadata HTTP server error: {}", e);
        }
    });

    // Start internal HTTP server (for health checks, metrics)
    let internal_service = service.clone();
    let health_port = config.server.health_port;
    let internal_handle = tokio::spawn(async move {
        let make_svc = make_service_fn(move |_conn| {
            let service = internal_service.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let service = service.clone();
                    async move { service.handle_internal_request(req).await }
                }))
            }
        });

        let addr = SocketAddr::from(([0, 0, 0, 0], health_port));
        let server = Server::bind(&addr).serve(make_svc);

        info!("🏥 Internal HTTP server listening on {}", addr);

        if let Err(e) = server.await {
            error!("Internal HTTP server error: {}", e);
        }
    });

    println!("✅ All servers started successfully!");

    println!();
    println!("🎯 Server Endpoints:");
    println!(
        "   🔐 Credentials:     http://0.0.0.0:{}/latest/meta-data/iam/security-credentials/",
        port
    );
    println!("   🏥 Health/Metrics:  http://0.0.0.0:{}", health_port);
    println!();

    // Wait for all tasks - if any exit, we should exit with an error
    tokio::select! {
        result = metadata_handle => {
            error!("Metadata server exited unexpectedly: {:?}", result);
            std::process::exit(1);
        },
        result = internal_handle => {
            error!("Internal server exited unexpectedly: {:?}", result);
            std::process::exit(1);
        },
        result = refresher => {
            error!("Credential refresher exited unexpectedly: {:?}", result);
            std::process::exit(1);
        },
    }
}

/// Reload role mappings from the config file on SIGHUP.
#[cfg(unix)]
fn spawn_role_reloader(path: PathBuf, roles: Arc<StaticRoleFinder>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            info!("SIGHUP received, reloading roles from {}", path.display());
            match BrokerConfig::load(&path) {
                Ok(config) => roles.replace(config.roles).await,
                Err(e) => warn!("Keeping current role mappings: {}", e),
            }
        }
    });
    Ok(())
}
