//! Response envelope normalization.
//!
//! Providers answer submit and poll requests with the same job object, either at the root:
//!   { "id": "...", "status": "processing", "outputs": [], "urls": { "get": "<poll url>" } }
//! or wrapped in a legacy envelope:
//!   { "code": 200, "message": "success", "data": { ...same object... } }
//! Terminal failure carries `status: "failed"` plus `error` or `message`.

use crate::ProviderError;
use serde_json::Value;

/// Normalized result of a submit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The terminal result came back immediately.
    Inline(Vec<String>),
    /// The job is running; poll this URL.
    Poll(String),
}

/// Normalized result of one poll call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready(Vec<String>),
    Pending,
    /// Provider-reported failure, upstream message verbatim.
    Failed(String),
}

#[derive(Debug, PartialEq, Eq)]
enum JobState {
    Done(Vec<String>),
    Failed(String),
    InProgress {
        poll_url: Option<String>,
        id: Option<String>,
    },
}

const FAILED_STATUSES: &[&str] = &["failed", "error", "canceled", "cancelled"];
const DONE_STATUSES: &[&str] = &["completed", "succeeded", "success"];

/// The job object, whether at the root or under `data`.
fn job_body(v: &Value) -> &Value {
    match v.get("data") {
        Some(d) if d.is_object() => d,
        _ => v,
    }
}

fn non_empty_str(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn collect_outputs(body: &Value) -> Vec<String> {
    let raw = body.get("outputs").or_else(|| body.get("output"));
    match raw {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| non_empty_str(Some(i)))
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn failure_message(body: &Value) -> String {
    non_empty_str(body.get("error"))
        .or_else(|| non_empty_str(body.get("message")))
        .unwrap_or_else(|| "provider reported failure".to_string())
}

fn classify(root: &Value) -> Result<JobState, ProviderError> {
    if !root.is_object() {
        return Err(ProviderError::Protocol(format!(
            "expected JSON object, got {}",
            root
        )));
    }
    // Legacy envelope error: `{ "code": 4xx, "message": ... }` without a job object.
    if root.get("data").map_or(true, Value::is_null) {
        if let Some(code) = root.get("code").and_then(Value::as_i64) {
            if !(200..300).contains(&code) {
                let msg = non_empty_str(root.get("message")).unwrap_or_default();
                return Err(ProviderError::Protocol(format!(
                    "provider returned code {}: {}",
                    code, msg
                )));
            }
        }
    }

    let body = job_body(root);
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if FAILED_STATUSES.contains(&status.as_str()) {
        return Ok(JobState::Failed(failure_message(body)));
    }
    let outputs = collect_outputs(body);
    if !outputs.is_empty() {
        return Ok(JobState::Done(outputs));
    }
    if DONE_STATUSES.contains(&status.as_str()) {
        return Err(ProviderError::Protocol(format!(
            "job reported '{}' without outputs",
            status
        )));
    }
    let poll_url = body
        .get("urls")
        .and_then(|u| non_empty_str(u.get("get")))
        .or_else(|| non_empty_str(body.get("poll_url")))
        .or_else(|| non_empty_str(body.get("pollUrl")));
    Ok(JobState::InProgress {
        poll_url,
        id: non_empty_str(body.get("id")),
    })
}

/// Normalize a submit response. `fallback_poll` builds a poll URL from the job id when the
/// provider omits one.
pub(crate) fn normalize_submit(
    root: &Value,
    fallback_poll: impl Fn(&str) -> String,
) -> Result<SubmitOutcome, ProviderError> {
    match classify(root)? {
        JobState::Done(outputs) => Ok(SubmitOutcome::Inline(outputs)),
        JobState::Failed(msg) => Err(ProviderError::Generation(msg)),
        JobState::InProgress {
            poll_url: Some(url),
            ..
        } => Ok(SubmitOutcome::Poll(url)),
        JobState::InProgress {
            poll_url: None,
            id: Some(id),
        } => Ok(SubmitOutcome::Poll(fallback_poll(&id))),
        JobState::InProgress {
            poll_url: None,
            id: None,
        } => Err(ProviderError::Protocol(
            "submit response carried neither outputs nor a poll URL".to_string(),
        )),
    }
}

pub(crate) fn normalize_poll(root: &Value) -> Result<PollOutcome, ProviderError> {
    Ok(match classify(root)? {
        JobState::Done(outputs) => PollOutcome::Ready(outputs),
        JobState::Failed(msg) => PollOutcome::Failed(msg),
        JobState::InProgress { .. } => PollOutcome::Pending,
    })
}
