//! HTTP control endpoint for the dispatch service.
//!
//! `GET /` runs one intake pass and acknowledges it. Quoting, placement and
//! polling only happen on the engine's own cycles. The partner facing paths
//! are answered with 404.

use axum::{
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Json},
	routing::{get, post},
	Router,
};
use courier_config::ApiConfig;
use courier_core::DispatchEngine;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Engine whose cycles the endpoint triggers.
	pub engine: Arc<DispatchEngine>,
}

/// Builds the router with all control routes.
pub fn router(engine: Arc<DispatchEngine>) -> Router {
	Router::new()
		.route("/", get(handle_intake))
		.route("/place-order", post(handle_place_order))
		.route("/status", post(handle_status))
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(AppState { engine })
}

/// Starts the HTTP server and serves until it fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<DispatchEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Dispatch API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles GET / by running one intake pass.
async fn handle_intake(State(state): State<AppState>) -> impl IntoResponse {
	match state.engine.ingest_once().await {
		Ok(accepted) => (
			StatusCode::OK,
			Json(json!({
				"message": "Data fetched, selected, and processed successfully",
				"accepted": accepted,
			})),
		),
		Err(e) => {
			tracing::warn!("Triggered intake failed: {}", e);
			(
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(json!({ "message": format!("Intake failed: {}", e) })),
			)
		},
	}
}

async fn handle_place_order() -> impl IntoResponse {
	(
		StatusCode::NOT_FOUND,
		Json(json!({
			"message": "This endpoint is not accessible directly. Please use the /status endpoint."
		})),
	)
}

async fn handle_status() -> impl IntoResponse {
	(
		StatusCode::NOT_FOUND,
		Json(json!({
			"message": "This endpoint is not accessible directly. Please use the /place-order endpoint."
		})),
	)
}
