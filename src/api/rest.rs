use crate::api::error::ApiResult;
use crate::api::types::*;
use crate::engine::{EngineStatus, StressEngine};
use crate::metrics::metrics_route;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

pub struct RestApi {
    engine: Arc<StressEngine>,
}

impl RestApi {
    pub fn new(engine: Arc<StressEngine>) -> Self {
        Self { engine }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/metrics", metrics_route())
            .route("/api/v1/run", post(start_run).get(get_status))
            .route("/api/v1/run/stop", post(stop_run))
            .with_state(self.engine.clone())
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn start_run(
    State(engine): State<Arc<StressEngine>>,
    Json(req): Json<StartRunRequest>,
) -> ApiResult<(StatusCode, Json<StartRunResponse>)> {
    let config = req.into_config()?;

    match engine.start(config)? {
        Some(run_id) => Ok((
            StatusCode::CREATED,
            Json(StartRunResponse {
                run_id,
                message: format!("Run started with {} workers", config.worker_count),
            }),
        )),
        // Unreachable after validation, but the engine treats zero workers as a no-op
        None => Err(crate::api::ApiError::InvalidRequest("no workers requested".into())),
    }
}

async fn stop_run(State(engine): State<Arc<StressEngine>>) -> Json<StopRunResponse> {
    let stopped = engine.stop();
    Json(StopRunResponse {
        stopped,
        message: if stopped {
            "Run stopped".into()
        } else {
            "No active run".into()
        },
    })
}

async fn get_status(State(engine): State<Arc<StressEngine>>) -> Json<EngineStatus> {
    Json(engine.status())
}
