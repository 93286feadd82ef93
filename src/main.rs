use anyhow::Result;
use facegate::{
    api::{self, handlers::AppState, metrics},
    archive::PhotoArchive,
    config::Config,
    extractor::HaarEncoder,
    gallery::{GalleryFile, GalleryStore},
    matcher::MatchPolicy,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "facegate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting facegate face recognition service");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded (threshold {}, max {} photos per person)",
        config.gallery.threshold, config.gallery.max_photos_per_identity
    );

    let gallery = GalleryStore::open(
        GalleryFile::new(&config.gallery.encodings_file),
        config.gallery.max_photos_per_identity,
    )
    .await;
    metrics::record_gallery_size(gallery.stats());

    let archive = if config.archive.enabled {
        let archive = PhotoArchive::new(config.archive.faces_dir.clone());
        match archive.ensure_root().await {
            Ok(()) => Some(Arc::new(archive)),
            Err(e) => {
                warn!("Photo archive disabled, cannot create {:?}: {}", config.archive.faces_dir, e);
                None
            }
        }
    } else {
        info!("Photo archive disabled by configuration");
        None
    };

    let state = AppState {
        gallery: Arc::new(gallery),
        encoder: Arc::new(HaarEncoder::new()),
        archive,
        policy: MatchPolicy::with_threshold(config.gallery.threshold),
    };
    let app = api::create_app(state, &config.server.static_dir);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on http://{}", addr);
    info!("  /capture.html registers a new face, /validate.html checks one");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
