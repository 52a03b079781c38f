use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use mentors_storage::DynMentorStore;

use crate::{
    cache::{DirectoryCache, TagCache},
    config::AppConfig,
    handlers,
    middleware as app_middleware,
    repository::MentorRepository,
    storage,
    triggers::Triggers,
};

/// Shared handler state. Cheap to clone; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<DirectoryCache>,
    pub tags: Arc<TagCache>,
    pub repository: MentorRepository,
    pub triggers: Triggers,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: DynMentorStore, cfg: &AppConfig) -> Self {
        let directory = Arc::new(DirectoryCache::new(store.clone(), cfg.cache.ttl()));
        let tags = Arc::new(TagCache::new(store, cfg.cache.tags_ttl()));
        let repository = MentorRepository::new(directory.clone(), cfg.cache.bypass);
        let triggers = Triggers::new(repository.clone(), directory.clone(), tags.clone());
        let admin_token = cfg
            .admin
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Arc::from);

        Self {
            directory,
            tags,
            repository,
            triggers,
            admin_token,
        }
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Public directory
        .route("/mentors", get(handlers::list_mentors))
        .route("/mentors/{slug}", get(handlers::get_mentor))
        .route("/mentors/id/{legacy_id}", get(handlers::get_mentor_by_legacy_id))
        .route("/tags", get(handlers::list_tags))
        // Store change notifications
        .route("/webhooks/record-changed", post(handlers::record_changed))
        // Mentor self-service
        .route(
            "/profile",
            get(handlers::get_profile).post(handlers::save_profile),
        )
        .route("/profile/picture", post(handlers::update_picture))
        // Operators
        .route("/admin/mentors", get(handlers::admin_list_mentors))
        .route("/admin/mentors/{slug}", patch(handlers::edit_mentor))
        .route("/admin/mentors/{slug}/status", post(handlers::moderate_mentor))
        .route("/admin/cache/invalidate", post(handlers::invalidate_cache))
        .route("/admin/cache/stats", get(handlers::cache_stats))
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .nest("/api/v1", api_routes())
        .with_state(state)
        // Middleware stack (outermost last: request id -> trace -> cors/compression -> timeout -> body limit)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            cfg.request_timeout(),
        ))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<DynMentorStore>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            store: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses an already constructed store instead of the configured backend.
    pub fn with_store(mut self, store: DynMentorStore) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> anyhow::Result<MentorsServer> {
        let store = match self.store {
            Some(store) => store,
            None => storage::create_store(&self.config.storage).await?,
        };
        let state = AppState::new(store, &self.config);
        let app = build_app(&self.config, state.clone());

        Ok(MentorsServer {
            addr: self.addr,
            app,
            state,
        })
    }
}

pub struct MentorsServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
}

impl MentorsServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Loads the catalog in the background so the first request finds a
    /// populated cache. Failure is not fatal; the next read retries.
    pub fn warm_up(&self) {
        if self.state.repository.bypass() {
            return;
        }
        let directory = self.state.directory.clone();
        tokio::spawn(async move {
            match directory.get().await {
                Ok(snapshot) => tracing::info!(records = snapshot.len(), "directory cache warmed"),
                Err(e) => tracing::warn!(error = %e, "directory cache warm-up failed"),
            }
        });
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        self.warm_up();
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
