use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    clinics, config::AppConfig, events, geocode, handlers, leads,
    middleware as app_middleware, ratelimit::RateLimiter, scan, seo, state::AppState,
};

/// How often expired rate-limit buckets are swept out of the table.
const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub struct NitcheckServer {
    addr: SocketAddr,
    app: Router,
    limiter: Arc<RateLimiter>,
}

pub fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let state = AppState::from_config(cfg.clone())?;
    Ok(build_router(state, cfg.server.body_limit_bytes))
}

fn build_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // SEO plumbing
        .route("/sitemap.xml", get(seo::sitemap))
        .route("/api/seo/site", get(seo::site_json_ld))
        // Scan pipeline
        .route("/api/scan", post(scan::scan_photo))
        .route("/api/scan/status", get(scan::scan_status))
        .route("/api/cron/warm-inference", get(scan::warm_inference))
        // Lead forms
        .route("/api/contact-clinic", post(leads::contact_clinic))
        .route("/api/clinic-apply", post(leads::clinic_apply))
        .route("/api/clinic-enquiry", post(leads::clinic_enquiry))
        // Clinic finder
        .route("/api/clinics", get(clinics::list_clinics))
        .route("/api/clinics/reload", post(clinics::reload_clinics))
        .route("/api/geocode", get(geocode::geocode))
        // Analytics intake
        .route("/api/events", post(events::track_event))
        .with_state(state)
        // Middleware stack (order: request id -> cors/compression/trace -> body limit)
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %method,
                        http.target = %uri,
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
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

    pub fn build(self) -> anyhow::Result<NitcheckServer> {
        let state = AppState::from_config(self.config.clone())?;
        let limiter = state.limiter.clone();
        let app = build_router(state, self.config.server.body_limit_bytes);

        Ok(NitcheckServer {
            addr: self.addr,
            app,
            limiter,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NitcheckServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        // Periodic sweep of expired rate-limit buckets
        let limiter = self.limiter;
        let janitor = tokio::spawn(async move {
            let mut tick = tokio::time::interval(LIMITER_SWEEP_INTERVAL);
            loop {
                tick.tick().await;
                limiter.sweep();
            }
        });

        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        janitor.abort();
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
