//! Job submission webhook.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use reel_models::WebhookEnvelope;
use reel_worker::{JobReport, WorkerError};
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// `POST /webhook`
///
/// Admits the job or refuses it immediately, then runs it to a terminal state
/// and answers with the job report. The job runs on its own task, so a client
/// that hangs up does not abort the render.
pub async fn receive_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<JobReport>> {
    let envelope: WebhookEnvelope = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;

    let Some(webhook_type) = envelope.webhook_type() else {
        metrics::record_webhook("unknown", "bad_type");
        return Err(ApiError::bad_request(format!(
            "Unknown webhook type: {}",
            envelope.event_type
        )));
    };
    let kind = webhook_type.job_kind();
    let job_id = envelope.payload.parsed_job_id();

    let slot = match state.admission.try_acquire() {
        Ok(slot) => slot,
        Err(WorkerError::AdmissionRejected { active, max }) => {
            metrics::record_webhook(webhook_type.as_str(), "rejected");
            if let Some(job_id) = job_id {
                state
                    .orchestrator
                    .reporter()
                    .mark_rejected(job_id, Some(kind))
                    .await;
            }
            return Err(ApiError::AdmissionRejected { active, max });
        }
        Err(e) => return Err(ApiError::internal(e.to_string())),
    };

    metrics::record_webhook(webhook_type.as_str(), "accepted");
    info!(
        job_type = webhook_type.as_str(),
        job_id = ?job_id,
        active = state.admission.active(),
        "Webhook accepted"
    );

    let title = envelope.payload.title.clone();
    let handle = state.orchestrator.spawn(slot, kind, envelope.payload);

    let report = match handle.await {
        Ok(report) => report,
        Err(e) => {
            let message = format!("Job task failed: {}", e);
            error!(job_id = ?job_id, "{}", message);
            match job_id {
                Some(job_id) => {
                    state
                        .orchestrator
                        .reporter()
                        .mark_failed(job_id, kind, &title, &message, None)
                        .await;
                }
                None => warn!("Crashed job had no usable id, status not recorded"),
            }
            JobReport::crashed(job_id, kind, message)
        }
    };

    Ok(Json(report))
}
