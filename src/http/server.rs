//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the Axum router: management routes, admin routes, proxy
//!   fallback
//! - Wire the middleware stack in the documented order
//! - Serve with graceful shutdown, stopping the health checker and
//!   cancelling in-flight retry loops

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use http_body_util::Full;
use redis::aio::MultiplexedConnection;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::{self, AdminCredentials};
use crate::config::GatewayConfig;
use crate::health::HealthChecker;
use crate::http::handlers;
use crate::observability::metrics;
use crate::proxy::{ProxyError, ReverseProxy};
use crate::security::api_key::{api_key_middleware, ApiKeyManager};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};

/// Application state injected into handlers and middleware.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub proxy: Arc<ReverseProxy>,
    pub health: Option<Arc<HealthChecker>>,
    pub api_keys: Option<ApiKeyManager>,
    pub rate_limiter: Option<RateLimiter>,
    pub admin_auth: Option<AdminCredentials>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: Arc<GatewayState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Assemble all subsystems. `redis` feeds the rate limiter and the
    /// API key store; without it both are disabled and the proxy core
    /// still runs.
    pub fn new(
        config: GatewayConfig,
        redis: Option<MultiplexedConnection>,
    ) -> Result<Self, ProxyError> {
        let cancel = CancellationToken::new();

        let proxy = Arc::new(ReverseProxy::new(
            &config.services,
            config.circuit_breaker,
            config.retry.clone(),
            config.limits.max_body_bytes,
            cancel.child_token(),
        )?);

        let health = if config.health_check.enabled {
            let checker = Arc::new(HealthChecker::new(
                config.services.clone(),
                config.health_check.interval(),
                config.health_check.timeout(),
            ));
            let proxy_for_callback = proxy.clone();
            checker.register_callback(Arc::new(move |service, url, healthy| {
                proxy_for_callback.update_backend_health(service, url, healthy);
            }));
            Some(checker)
        } else {
            None
        };

        if redis.is_none() {
            tracing::warn!("No Redis connection; rate limiting and API keys are disabled");
        }
        let api_keys = redis.clone().map(ApiKeyManager::new);
        let rate_limiter = redis.map(|conn| {
            RateLimiter::new(
                conn,
                config.rate_limit.requests_per_minute,
                config.rate_limit.window(),
            )
        });

        let admin_auth = config
            .admin
            .enabled
            .then(|| AdminCredentials::new(&config.admin.username, &config.admin.password));

        let state = Arc::new(GatewayState {
            config,
            proxy,
            health,
            api_keys,
            rate_limiter,
            admin_auth,
        });

        let router = Self::build_router(state.clone());

        Ok(Self {
            router,
            state,
            cancel,
        })
    }

    /// The dispatch pipeline, for tests and embedding.
    pub fn proxy(&self) -> Arc<ReverseProxy> {
        self.state.proxy.clone()
    }

    /// Build the router with the middleware chain, outermost first:
    /// panic recovery, metrics, tracing, timeout, CORS, admin auth,
    /// API-key validation, rate limiting.
    fn build_router(state: Arc<GatewayState>) -> Router {
        let cors = cors_layer(&state.config.cors.allowed_origins);
        let request_timeout = Duration::from_secs(state.config.timeouts.request_secs);

        Router::new()
            .route("/health", get(handlers::health))
            .route("/info", get(handlers::info))
            .route("/services/health", get(handlers::services_health))
            .route("/metrics", get(handlers::metrics_endpoint))
            .merge(admin::router())
            .fallback(proxy_handler)
            .with_state(state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(CatchPanicLayer::custom(handle_panic))
                    .layer(middleware::from_fn(metrics::track_requests))
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(request_timeout))
                    .layer(cors)
                    .layer(middleware::from_fn_with_state(
                        state.clone(),
                        admin::admin_auth_middleware,
                    ))
                    .layer(middleware::from_fn_with_state(
                        state.clone(),
                        api_key_middleware,
                    ))
                    .layer(middleware::from_fn_with_state(state, rate_limit_middleware)),
            )
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(checker) = &self.state.health {
            tokio::spawn(checker.clone().run());
        }

        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let graceful = async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received");
            cancel.cancel();
            if let Some(checker) = &state.health {
                checker.stop();
            }
        };

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(graceful)
        .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Everything that is not a management or admin route goes through the
/// proxy core.
async fn proxy_handler(State(state): State<Arc<GatewayState>>, request: Request<Body>) -> Response {
    state.proxy.handle(request).await
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-api-key"),
        ])
        .max_age(Duration::from_secs(3600));

    if allowed_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}

/// Recovered panics become a 500 with the standard envelope.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> axum::http::Response<Full<Bytes>> {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(error = %detail, "Panic recovered in request pipeline");

    let body = serde_json::json!({
        "error": "Internal server error",
        "message": "The gateway encountered an unexpected error",
    });

    axum::http::Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::from(body.to_string()))
        .expect("static response construction cannot fail")
}
