use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use radar_proto::config::{Bounds, Config, MapConfig};
use radar_proto::protocol::{Command, Product, ViewState};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::core::ViewerEvent;

#[derive(Clone)]
struct HttpState {
    view: watch::Receiver<ViewState>,
    event_tx: mpsc::Sender<ViewerEvent>,
    client: Arc<ClientConfig>,
}

/// Static settings a front-end needs to place the overlay.
#[derive(Debug, Clone, Serialize)]
pub struct ClientConfig {
    pub bounds: Bounds,
    pub map: MapConfig,
    pub frame_interval_ms: u64,
    pub products: Vec<ProductInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductInfo {
    pub id: Product,
    pub forecast: bool,
}

impl ClientConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bounds: config.overlay.bounds(),
            map: config.map.clone(),
            frame_interval_ms: config.playback.frame_interval_ms,
            products: Product::ALL
                .into_iter()
                .map(|id| ProductInfo {
                    id,
                    forecast: id.is_forecast(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct OpacityStatus {
    opacity: u8,
}

pub fn router(
    view: watch::Receiver<ViewState>,
    event_tx: mpsc::Sender<ViewerEvent>,
    client: ClientConfig,
) -> Router {
    let app_state = HttpState {
        view,
        event_tx,
        client: Arc::new(client),
    };

    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/config", get(get_config))
        .route("/api/next", get(next_frame).post(next_frame))
        .route("/api/prev", get(prev_frame).post(prev_frame))
        .route("/api/play", get(play).post(play))
        .route("/api/stop", get(stop).post(stop))
        .route("/api/toggle", get(toggle).post(toggle))
        .route("/api/reload", get(reload).post(reload))
        .route("/api/frame/:idx", get(go_to).post(go_to))
        .route("/api/product/:id", get(select_product).post(select_product))
        .route("/api/opacity/:percent", get(set_opacity).post(set_opacity))
        .route("/api/opacity", get(get_opacity))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    view: watch::Receiver<ViewState>,
    event_tx: mpsc::Sender<ViewerEvent>,
    client: ClientConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(view, event_tx, client);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn send(state: &HttpState, cmd: Command) -> StatusCode {
    info!("HTTP API: {:?}", cmd);
    if state
        .event_tx
        .send(ViewerEvent::ClientCommand(cmd))
        .await
        .is_err()
    {
        error!("Failed to send command: viewer core is gone");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn get_state(State(state): State<HttpState>) -> Json<ViewState> {
    Json(state.view.borrow().clone())
}

async fn get_config(State(state): State<HttpState>) -> Json<ClientConfig> {
    Json(state.client.as_ref().clone())
}

async fn next_frame(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Next).await
}

async fn prev_frame(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Prev).await
}

async fn play(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Play).await
}

async fn stop(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Stop).await
}

async fn toggle(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::TogglePlay).await
}

async fn reload(State(state): State<HttpState>) -> StatusCode {
    send(&state, Command::Reload).await
}

async fn go_to(State(state): State<HttpState>, Path(idx): Path<i64>) -> StatusCode {
    send(&state, Command::GoTo { index: idx }).await
}

async fn select_product(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    match id.parse::<Product>() {
        Ok(product) => send(&state, Command::SelectProduct { product }).await,
        Err(e) => {
            warn!("HTTP API: {}", e);
            StatusCode::BAD_REQUEST
        }
    }
}

async fn set_opacity(State(state): State<HttpState>, Path(percent): Path<i32>) -> StatusCode {
    let value = (percent as f32 / 100.0).clamp(0.0, 1.0);
    send(&state, Command::Opacity { value }).await
}

async fn get_opacity(State(state): State<HttpState>) -> Json<OpacityStatus> {
    let opacity = (state.view.borrow().opacity * 100.0).round() as u8;
    Json(OpacityStatus { opacity })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Router, mpsc::Receiver<ViewerEvent>) {
        let (_tx, view) = watch::channel(ViewState::new(Product::Cmax, 0.65));
        let (event_tx, event_rx) = mpsc::channel(8);
        let client = ClientConfig::from_config(&Config::default());
        (router(view, event_tx, client), event_rx)
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn command(rx: &mut mpsc::Receiver<ViewerEvent>) -> Command {
        match rx.try_recv() {
            Ok(ViewerEvent::ClientCommand(cmd)) => cmd,
            other => panic!("expected a command, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_step_routes_forward_commands() {
        let (app, mut rx) = app();
        assert_eq!(call(app.clone(), "POST", "/api/next").await.0, StatusCode::OK);
        assert_eq!(command(&mut rx), Command::Next);
        assert_eq!(call(app.clone(), "GET", "/api/prev").await.0, StatusCode::OK);
        assert_eq!(command(&mut rx), Command::Prev);
        assert_eq!(call(app, "POST", "/api/frame/-1").await.0, StatusCode::OK);
        assert_eq!(command(&mut rx), Command::GoTo { index: -1 });
    }

    #[tokio::test]
    async fn test_product_route_validates_id() {
        let (app, mut rx) = app();
        assert_eq!(
            call(app.clone(), "POST", "/api/product/steps").await.0,
            StatusCode::OK
        );
        assert_eq!(
            command(&mut rx),
            Command::SelectProduct {
                product: Product::Steps
            }
        );
        assert_eq!(
            call(app, "POST", "/api/product/bogus").await.0,
            StatusCode::BAD_REQUEST
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_opacity_percent_is_clamped() {
        let (app, mut rx) = app();
        call(app.clone(), "POST", "/api/opacity/150").await;
        assert_eq!(command(&mut rx), Command::Opacity { value: 1.0 });

        let (status, body) = call(app, "GET", "/api/opacity").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["opacity"], 65);
    }

    #[tokio::test]
    async fn test_state_and_config_are_json() {
        let (app, _rx) = app();
        let (_, body) = call(app.clone(), "GET", "/api/state").await;
        let state: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(state["status"], "loading");
        assert_eq!(state["product"], "CMAX");

        let (_, body) = call(app, "GET", "/api/config").await;
        let config: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(config["frame_interval_ms"], 700);
        assert_eq!(config["products"][1]["id"], "STEPS");
        assert_eq!(config["products"][1]["forecast"], true);
    }
}
