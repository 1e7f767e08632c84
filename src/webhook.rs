//! Push event filtering

use tracing::{debug, info};

use crate::error::{HookError, Result};

/// GitHub event type header.
pub const EVENT_HEADER: &str = "X-GitHub-Event";
/// The only actionable event type.
pub const PUSH_EVENT: &str = "push";
/// Branch whose pushes trigger a deployment unless configured otherwise.
pub const DEFAULT_DEPLOY_REF: &str = "refs/heads/master";

/// Data extracted from a push payload.
/// Only `git_ref` is required, the rest is logged when present.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub git_ref: String,
    pub commit_sha: Option<String>,
    pub pusher_name: Option<String>,
}

impl PushEvent {
    /// Decode a verified payload; it must be a JSON object with a string `ref`.
    pub fn from_payload(body: &[u8]) -> Result<Self> {
        let payload: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
            info!("Could not parse JSON body: {}", e);
            HookError::BadRequest(format!("invalid JSON payload: {}", e))
        })?;

        let git_ref = payload
            .get("ref")
            .and_then(|r| r.as_str())
            .ok_or_else(|| HookError::BadRequest("no ref".to_string()))?;

        Ok(Self {
            git_ref: git_ref.to_string(),
            commit_sha: payload
                .get("after")
                .and_then(|v| v.as_str())
                .map(String::from),
            pusher_name: payload
                .get("pusher")
                .and_then(|p| p.get("name"))
                .and_then(|v| v.as_str())
                .map(String::from),
        })
    }
}

/// Why a well-formed request did not trigger a deployment.
#[derive(Debug, Clone, PartialEq)]
pub enum IgnoreReason {
    NotPush(Option<String>),
    OtherRef(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventDecision {
    Ignored(IgnoreReason),
    Deploy(PushEvent),
}

/// Decide whether an already verified request should trigger a deployment.
///
/// Non-push events are ignored without looking at the body.
pub fn filter_event(
    event_type: Option<&str>,
    body: &[u8],
    deploy_ref: &str,
) -> Result<EventDecision> {
    if event_type != Some(PUSH_EVENT) {
        info!("ignoring non-push event: {:?}", event_type);
        return Ok(EventDecision::Ignored(IgnoreReason::NotPush(
            event_type.map(String::from),
        )));
    }

    let event = PushEvent::from_payload(body)?;
    debug!("{:?}", &event);

    if event.git_ref != deploy_ref {
        info!("ignoring push to ref: {}", event.git_ref);
        return Ok(EventDecision::Ignored(IgnoreReason::OtherRef(event.git_ref)));
    }

    Ok(EventDecision::Deploy(event))
}
