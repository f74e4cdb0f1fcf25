#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Driftmesh node entrypoint (systemd-friendly).
//! Wires the rhizome and vomp cores to the store, the monitor notifier and
//! the file server, then runs the single-owner event loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};

use driftmesh::core::store::SledBundleStore;
use driftmesh::core::types::NodeConfig;
use driftmesh::core::verify::Ed25519Verifier;
use driftmesh::monitoring::metrics::Metrics;
use driftmesh::monitoring::monitor::Monitor;
use driftmesh::rhizome::core::RhizomeCore;
use driftmesh::rhizome::{server, RHIZOME_ENQUEUE_INTERVAL_MS};
use driftmesh::vomp::core::VompCore;
use driftmesh::vomp::VOMP_CALL_STATUS_INTERVAL_MS;

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let mut config = match std::env::var("DRIFTMESH_CONFIG") {
        Ok(path) => NodeConfig::load(&path)
            .with_context(|| format!("loading config from {path}"))?,
        Err(_) => NodeConfig::default(),
    };
    config.node.data_dir = env("DRIFTMESH_DATA_DIR", &config.node.data_dir);
    if let Ok(port) = std::env::var("DRIFTMESH_HTTP_PORT") {
        config.rhizome.http_port = port.parse().context("DRIFTMESH_HTTP_PORT")?;
    }

    let data_dir = PathBuf::from(&config.node.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let metrics = Arc::new(Metrics::new().expect("metrics init failed"));
    let store = Arc::new(SledBundleStore::open(&data_dir).context("opening bundle store")?);
    let monitor = Arc::new(Monitor::new());

    // MDP egress: a deployment attaches the datagram transport to this
    // receiver. Without one we drain and drop.
    let (mdp_tx, mut mdp_egress) = tokio::sync::mpsc::unbounded_channel();

    let mut vomp = VompCore::new(Arc::clone(&monitor), mdp_tx, Arc::clone(&metrics));
    vomp.set_local_codecs(&config.vomp.codecs);

    let (mut rhizome, mut fetch_done) = RhizomeCore::new(
        store.clone(),
        Arc::new(Ed25519Verifier),
        data_dir.join("import"),
        Arc::clone(&metrics),
    );
    rhizome.set_http_port(config.rhizome.http_port);

    if config.rhizome.serve_files {
        let addr: SocketAddr = ([0, 0, 0, 0], config.rhizome.http_port).into();
        let server_store = store.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve_files(server_store, addr).await {
                warn!(error = %e, "file server stopped");
            }
        });
    }

    info!(
        name = %config.node.name,
        data_dir = %config.node.data_dir,
        http_port = config.rhizome.http_port,
        "driftmesh node starting"
    );

    let epoch = Instant::now();
    let now_ms = move || epoch.elapsed().as_millis() as u64;

    let mut enqueue_timer =
        tokio::time::interval(Duration::from_millis(RHIZOME_ENQUEUE_INTERVAL_MS));
    let mut vomp_timer = tokio::time::interval(Duration::from_millis(VOMP_CALL_STATUS_INTERVAL_MS));

    loop {
        tokio::select! {
            _ = enqueue_timer.tick() => {
                let promoted = rhizome.enqueue_suggestions(now_ms());
                if promoted > 0 {
                    info!(promoted, "promoted candidates to fetch slots");
                }
            }
            _ = vomp_timer.tick() => {
                vomp.tick(now_ms());
            }
            Some(done) = fetch_done.recv() => {
                rhizome.on_fetch_done(done);
            }
            Some(frame) = mdp_egress.recv() => {
                // No transport attached in the standalone binary.
                tracing::debug!(dst = %frame.dst.sid, bytes = frame.payload.len(), "dropping egress frame");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}
