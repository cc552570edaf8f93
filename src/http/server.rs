//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, timeout)
//! - Own the shared state: provider client, resilience context, poller, store
//! - Apply hot-reloaded configuration (webhook secret, admin key)
//! - Graceful shutdown: stop accepting, then cancel poll sessions

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{ServiceConfig, WebhookConfig};
use crate::error::{ProviderError, ResilienceError};
use crate::http::handlers::{health_handler, webhook_handler};
use crate::polling::{PollHandle, PollSettings, Poller};
use crate::provider::ProviderClient;
use crate::resilience::ResilienceContext;
use crate::store::{AssetStore, UpdateSource};
use crate::webhook::WebhookVerifier;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build provider client: {0}")]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<ArcSwap<WebhookVerifier>>,
    pub admin_api_key: Arc<ArcSwap<String>>,
    pub client: Arc<ProviderClient>,
    pub context: ResilienceContext,
    pub poller: Poller<ProviderClient>,
    pub store: AssetStore,
    pub started_at: Instant,
}

impl AppState {
    /// Poll `asset_id` until it finishes and mirror the result into the store.
    ///
    /// A permanent provider error settles a known asset as errored so it is
    /// not resumed on the next start. Failures never create store records.
    pub fn start_tracking(&self, asset_id: &str) -> PollHandle {
        let store = self.store.clone();
        let context = self.context.clone();
        let job_id = asset_id.to_string();

        self.poller.start_polling(asset_id, move |result| match result {
            Ok(outcome) => {
                store.apply_status(&outcome.status, UpdateSource::Poll);
                context.forget(&job_id);
            }
            Err(e) => {
                tracing::warn!(asset_id = %job_id, error = %e, stalled = e.is_stalled_job(), "Stopped tracking asset");
                let known = match &e {
                    ResilienceError::Permanent(_) => store.mark_errored(&job_id, e.to_string()),
                    _ => store.record_failure(&job_id, e.to_string()),
                };
                if known {
                    context.record_outcome(&job_id, "poll", Some(e.to_string()));
                }
            }
        })
    }
}

fn verifier_from(config: &WebhookConfig) -> WebhookVerifier {
    WebhookVerifier::new(
        config.secret.as_bytes().to_vec(),
        Duration::from_secs(config.tolerance_secs),
    )
}

/// HTTP server for the video resilience service.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Build the server. Poll sessions derive from `shutdown`.
    pub fn new(
        config: &ServiceConfig,
        store: AssetStore,
        shutdown: CancellationToken,
    ) -> Result<Self, ServerError> {
        let client = Arc::new(ProviderClient::new(&config.provider)?);
        let context = ResilienceContext::from_config(config);
        let poller = Poller::new(
            Arc::clone(&client),
            context.clone(),
            PollSettings::from_config(&config.polling),
            shutdown,
        );

        let state = AppState {
            verifier: Arc::new(ArcSwap::from_pointee(verifier_from(&config.webhook))),
            admin_api_key: Arc::new(ArcSwap::from_pointee(config.admin.api_key.clone())),
            client,
            context,
            poller,
            store,
            started_at: Instant::now(),
        };

        let router = Self::build_router(config, state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/webhooks/video", post(webhook_handler))
            .route("/health", get(health_handler));

        if config.admin.enabled {
            router = router.merge(admin::router(state.clone()));
        }

        router
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` fires, then stop every poll session.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ServiceConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload = tokio::spawn(apply_config_updates(self.state.clone(), config_updates));
        self.resume_tracking();

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        reload.abort();
        self.state.poller.stop_all().await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Restart polling for stored assets that never reached a terminal state.
    fn resume_tracking(&self) {
        let pending: Vec<_> = self
            .state
            .store
            .list()
            .into_iter()
            .filter(|record| !record.status.is_terminal())
            .collect();

        for record in &pending {
            self.state.start_tracking(&record.asset_id);
        }
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Resumed tracking of unfinished assets");
        }
    }
}

async fn apply_config_updates(state: AppState, mut updates: mpsc::UnboundedReceiver<ServiceConfig>) {
    while let Some(config) = updates.recv().await {
        state.verifier.store(Arc::new(verifier_from(&config.webhook)));
        state.admin_api_key.store(Arc::new(config.admin.api_key.clone()));
        tracing::info!(
            tolerance_secs = config.webhook.tolerance_secs,
            "Applied configuration reload"
        );
    }
}
