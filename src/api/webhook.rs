//! Webhook handler for GitHub push events

use axum::{
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
};
use tracing::{Instrument, info, info_span};

use crate::SharedState;
use crate::error::HookError;
use crate::job::DeploymentJob;
use crate::pipeline::run_pipeline;
use crate::signature::{SIGNATURE_HEADER, verify_signature};
use crate::webhook::{EVENT_HEADER, EventDecision, PUSH_EVENT, filter_event};

/// Unique id GitHub assigns to each delivery
const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

/// Handles the GitHub webhook POST request.
///
/// Non-push events are answered with 204 before the body or signature is
/// looked at. A push must carry a valid signature and, when it targets the
/// deploy branch, starts the deployment in the background before answering 204.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HookError> {
    let event_type = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());
    if event_type != Some(PUSH_EVENT) {
        info!("ignoring non-push event: {:?}", event_type);
        return Ok(StatusCode::NO_CONTENT);
    }

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    verify_signature(&state.config.secret, &body, signature)?;

    let event = match filter_event(event_type, &body, &state.config.deploy_ref)? {
        EventDecision::Ignored(_) => return Ok(StatusCode::NO_CONTENT),
        EventDecision::Deploy(event) => event,
    };

    let delivery = headers
        .get(DELIVERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let pusher = event.pusher_name.clone().unwrap_or_else(|| "unknown".to_string());

    let job = DeploymentJob::new(&state.config.shell, &state.config.script, event);
    info!(
        "executing script: {} (job {}, delivery {}, pushed by {})",
        job.script.display(),
        job.id,
        delivery,
        pusher
    );

    // Fire and forget; the outcome only shows up in the logs.
    let shared_state = state.clone();
    tokio::spawn(
        async move {
            run_pipeline(job, &shared_state.invalidator).await;
        }
        .instrument(info_span!("webhook", delivery = %delivery)),
    );

    Ok(StatusCode::NO_CONTENT)
}
