//! Flow API routes.
//!
//! - `POST /api/flows/{flow}`       — trigger a run, returns 202 with the run id
//! - `GET  /api/runs/{id}`          — persisted run snapshot
//! - `GET  /api/runs/{id}/events`   — progress stream (SSE), history then live
//! - `POST /api/runs/{id}/cancel`   — request cancellation at the next step

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use dealforge_agent::runner::FlowRunner;
use dealforge_core::{FlowError, FlowInput, FlowRun, FlowRunId, ProgressEventKind};

#[derive(Clone)]
pub struct ApiState {
    runner: FlowRunner,
}

pub fn router(runner: FlowRunner) -> Router {
    Router::new()
        .route("/api/flows/{flow}", post(trigger_flow))
        .route("/api/runs/{id}", get(run_status))
        .route("/api/runs/{id}/events", get(run_events))
        .route("/api/runs/{id}/cancel", post(cancel_run))
        .with_state(ApiState { runner })
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub run_id: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

fn error_response(error: FlowError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        FlowError::UnknownFlow(_) => StatusCode::BAD_REQUEST,
        FlowError::NotFound(_) => StatusCode::NOT_FOUND,
        FlowError::Cancelled => StatusCode::CONFLICT,
        FlowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError { error: error.to_string() }))
}

async fn trigger_flow(
    State(state): State<ApiState>,
    Path(flow): Path<String>,
    Json(input): Json<FlowInput>,
) -> Result<(StatusCode, Json<TriggerResponse>), (StatusCode, Json<ApiError>)> {
    let run_id = state.runner.trigger(&flow, input).await.map_err(error_response)?;
    info!(event_name = "flow_triggered", flow = %flow, run_id = %run_id, "flow run accepted");
    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { run_id: run_id.to_string() })))
}

async fn run_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<FlowRun>, (StatusCode, Json<ApiError>)> {
    let run = state.runner.status(&FlowRunId(id)).await.map_err(error_response)?;
    Ok(Json(run))
}

fn event_name(kind: ProgressEventKind) -> &'static str {
    match kind {
        ProgressEventKind::StepStarted => "step_started",
        ProgressEventKind::StepCompleted => "step_completed",
        ProgressEventKind::StepRetried => "step_retried",
        ProgressEventKind::RunCompleted => "run_completed",
        ProgressEventKind::RunFailed => "run_failed",
    }
}

async fn run_events(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, axum::Error>>>, (StatusCode, Json<ApiError>)>
{
    let rx = state.runner.subscribe(&FlowRunId(id)).await.map_err(error_response)?;
    let stream = ReceiverStream::new(rx)
        .map(|event| Event::default().event(event_name(event.kind)).json_data(&event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn cancel_run(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let id = FlowRunId(id);
    state.runner.cancel(&id).await.map_err(error_response)?;
    info!(event_name = "flow_cancel_requested", run_id = %id, "cancellation requested");
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use tower::ServiceExt;

    use dealforge_agent::llm::ScriptedLlm;
    use dealforge_agent::prompts::PromptBuilder;
    use dealforge_agent::retriever::InMemoryRetriever;
    use dealforge_agent::runner::{FlowRunner, RunnerConfig};
    use dealforge_agent::steps::{StepConfig, StepContext};
    use dealforge_core::CompanyProfile;
    use dealforge_db::{InMemoryAlertRepository, InMemoryFlowRunRepository};

    use super::router;

    fn test_router(llm: ScriptedLlm) -> Router {
        let ctx = StepContext {
            profile: Arc::new(CompanyProfile::default()),
            llm: Arc::new(llm),
            retriever: Arc::new(InMemoryRetriever::new()),
            alerts: Arc::new(InMemoryAlertRepository::new()),
            prompts: PromptBuilder::new().expect("templates"),
            config: StepConfig {
                llm_max_retries: 0,
                max_fragments: 10,
                decision: Default::default(),
                health: Default::default(),
                alerts: Default::default(),
            },
        };
        let runner = FlowRunner::new(
            ctx,
            Arc::new(InMemoryFlowRunRepository::new()),
            RunnerConfig { step_max_retries: 1 },
        );
        router(runner)
    }

    fn trigger_request(flow: &str) -> Request<Body> {
        let input = serde_json::json!({
            "deal": {
                "id": "deal-1",
                "title": "Platform Rebuild",
                "client_name": "Acme"
            }
        });
        Request::builder()
            .method("POST")
            .uri(format!("/api/flows/{flow}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(input.to_string()))
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn unknown_flow_is_a_bad_request() {
        let app = test_router(ScriptedLlm::new());
        let response = app.oneshot(trigger_request("escalation")).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap_or_default().contains("escalation"));
    }

    #[tokio::test]
    async fn trigger_then_poll_until_completed() {
        // Monitoring with no communications needs no model calls.
        let app = test_router(ScriptedLlm::new());
        let response =
            app.clone().oneshot(trigger_request("monitoring")).await.expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let run_id = body_json(response).await["run_id"]
            .as_str()
            .expect("run id")
            .to_string();

        let mut status = String::new();
        for _ in 0..50 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/runs/{run_id}"))
                        .body(Body::empty())
                        .expect("request"),
                )
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
            status = body_json(response).await["status"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            if status == "completed" || status == "failed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let app = test_router(ScriptedLlm::new());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/runs/no-such-run")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_of_unknown_run_is_not_found() {
        let app = test_router(ScriptedLlm::new());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/runs/no-such-run/cancel")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn event_stream_for_unknown_run_is_not_found() {
        let app = test_router(ScriptedLlm::new());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/runs/no-such-run/events")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
