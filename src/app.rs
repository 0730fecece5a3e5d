use std::future::IntoFuture;
use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info, warn};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::portal::Portal;
use crate::query::QueryService;
use crate::state::AppState;
use crate::utils::fmt_duration;
use crate::web::create_router;

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    queries: QueryService,
}

impl App {
    /// Build the portal client and cache store from `config`.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        let portal =
            Portal::new(config.portal_settings()).context("Failed to create portal client")?;
        let cache = CacheStore::new(config.cache_path.clone(), config.cache_ttl);

        info!(
            portal = %portal.entry_url(),
            cache_path = %cache.path().display(),
            cache_ttl = fmt_duration(cache.ttl()),
            request_delay = fmt_duration(config.request_delay),
            request_timeout = fmt_duration(config.request_timeout),
            "application configured"
        );

        Ok(App {
            queries: QueryService::new(portal, cache),
            config,
        })
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }

    /// Serve the JSON API until a shutdown signal arrives.
    ///
    /// In-flight requests get `shutdown_timeout` to finish before the
    /// process gives up on them.
    pub async fn serve(self) -> ExitCode {
        match self.serve_inner().await {
            Ok(code) => code,
            Err(e) => {
                error!(error = ?e, "web server failed");
                ExitCode::FAILURE
            }
        }
    }

    async fn serve_inner(self) -> Result<ExitCode, anyhow::Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        let state = AppState::new(self.queries);
        let router = create_router(state, self.config.api_timeout);

        info!(
            address = %addr,
            version = env!("CARGO_PKG_VERSION"),
            commit = env!("GIT_COMMIT_SHORT"),
            "web server listening"
        );

        let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
        let server = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signalled_tx.send(());
            })
            .into_future();
        tokio::pin!(server);

        let shutdown_timeout = self.config.shutdown_timeout;
        let deadline = async move {
            if signalled_rx.await.is_err() {
                // Server ended on its own; never fire.
                std::future::pending::<()>().await;
            }
            info!(
                timeout = fmt_duration(shutdown_timeout),
                "shutdown requested, draining requests"
            );
            tokio::time::sleep(shutdown_timeout).await;
        };

        tokio::select! {
            result = &mut server => {
                result.context("web server error")?;
                info!("web server stopped");
                Ok(ExitCode::SUCCESS)
            }
            _ = deadline => {
                warn!(
                    timeout = fmt_duration(shutdown_timeout),
                    "graceful shutdown timed out, dropping in-flight requests"
                );
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = ?e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
