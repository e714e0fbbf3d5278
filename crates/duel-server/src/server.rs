//! `DuelServer`: Axum HTTP + `WebSocket` front end around the hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use duel_core::ConnectionId;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{JwtResolver, PrincipalResolver};
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::hub::Hub;
use crate::presence::{InMemoryPresence, PresenceStore};
use crate::rooms;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{SessionLimits, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub resolver: Arc<dyn PrincipalResolver>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub start_time: Instant,
    pub limits: SessionLimits,
    pub max_message_size: usize,
}

/// The duel server. Construct inside a Tokio runtime: the hub's tasks are
/// spawned immediately.
pub struct DuelServer {
    config: ServerConfig,
    state: AppState,
    tasks: Vec<JoinHandle<()>>,
}

impl DuelServer {
    /// Server with JWT authentication and in-memory presence.
    pub fn new(config: ServerConfig) -> Self {
        let resolver = Arc::new(JwtResolver::new(
            config.jwt_secret.as_ref(),
            config.allow_query_token,
        ));
        Self::with_parts(config, resolver, Arc::new(InMemoryPresence::new()))
    }

    pub fn with_parts(
        config: ServerConfig,
        resolver: Arc<dyn PrincipalResolver>,
        presence: Arc<dyn PresenceStore>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (hub, tasks) = Hub::start(config.command_queue, presence, &shutdown.token());
        let state = AppState {
            hub,
            resolver,
            shutdown,
            start_time: Instant::now(),
            limits: SessionLimits {
                ping_interval: config.ping_interval(),
                ping_timeout: config.ping_timeout(),
                write_timeout: config.write_timeout(),
                send_queue: config.send_queue,
            },
            max_message_size: config.max_message_size,
        };
        Self {
            config,
            state,
            tasks,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/api/user/rooms", get(rooms::list_rooms).post(rooms::list_rooms))
            .layer(cors_layer(&self.config.frontend_url))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub fn hub(&self) -> &Hub {
        &self.state.hub
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Bind and serve in the background.
    pub async fn start(self) -> std::io::Result<ServerHandle> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        let serve = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = result {
                warn!(error = %e, "http server exited with error");
            }
        });
        info!(%addr, "duel server listening");

        let mut tasks = self.tasks;
        tasks.push(serve);
        Ok(ServerHandle {
            addr,
            hub: self.state.hub,
            shutdown: self.state.shutdown,
            tasks,
        })
    }
}

/// A running server.
pub struct ServerHandle {
    pub addr: SocketAddr,
    hub: Hub,
    shutdown: Arc<ShutdownCoordinator>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting, close every session and wait for background tasks.
    pub async fn shutdown(self, timeout: Option<Duration>) {
        self.hub.broadcaster().close_all();
        self.shutdown.graceful_shutdown(self.tasks, timeout).await;
    }
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!(frontend_url, error = %e, "invalid frontend origin, CORS disabled");
            cors
        }
    }
}

/// GET /ws. Authentication happens before the upgrade.
async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let player = match state.resolver.resolve(&headers, query.as_deref()).await {
        Ok(player) => player,
        Err(e) => {
            warn!(error = %e, "upgrade refused");
            return e.into_response();
        }
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let conn_id = ConnectionId::new();
    let shutdown = state.shutdown.token();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(socket, player, conn_id, state.hub, state.limits, shutdown)
        })
        .into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.hub.broadcaster().connection_count();
    Json(health::health_check(
        state.start_time,
        connections,
        state.hub.stats(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::{SECRET, token_for};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use tower::ServiceExt;

    fn make_server() -> DuelServer {
        DuelServer::new(ServerConfig {
            jwt_secret: Some(SecretString::from(SECRET)),
            ..ServerConfig::default()
        })
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["rooms"], 0);
    }

    #[tokio::test]
    async fn rooms_endpoint_accepts_get_and_post() {
        let server = make_server();
        for method in [Method::GET, Method::POST] {
            let req = Request::builder()
                .method(method)
                .uri("/api/user/rooms")
                .body(Body::empty())
                .unwrap();
            let resp = server.router().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(body_json(resp).await, serde_json::json!({"rooms": []}));
        }
    }

    #[tokio::test]
    async fn ws_without_token_is_unauthorized() {
        let app = make_server().router();
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authenticated_plain_get_is_not_upgraded() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/ws")
            .header(header::AUTHORIZATION, format!("Bearer {}", token_for(5, SECRET)))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
        assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn cors_allows_frontend_origin() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5173"
        );
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_binds_an_ephemeral_port() {
        let handle = make_server().start().await.unwrap();
        assert_ne!(handle.port(), 0);
        handle.shutdown(Some(Duration::from_secs(1))).await;
    }
}
