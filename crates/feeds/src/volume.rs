//! Dune async query execution.
//!
//! A run is submit → poll status until finished → page through results.
//! Status handling is a pure transition ([`QueryExecution::observe`]) so the
//! state machine can be tested without I/O; the client only adds transport
//! and the poll sleep.

use crate::http::{HttpRequest, RetryingClient};
use serde_json::{json, Value};
use stablecoin_core::{ReportError, VolumeRow};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

pub const DUNE_API_BASE_URL: &str = "https://api.dune.com/api/v1";

const API_KEY_HEADER: &str = "X-Dune-API-Key";

/// Polling and paging parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between status polls (default: 5s)
    pub interval: Duration,
    /// Status polls before giving up (default: 120)
    pub max_polls: u32,
    /// Rows requested per result page (default: 1000)
    pub page_limit: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_polls: 120,
            page_limit: 1000,
        }
    }
}

/// Execution state as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Executing,
    Completed,
    CompletedPartial,
    Failed,
    Canceled,
    Expired,
    /// Anything else, including an empty or missing state
    Other(String),
}

impl ExecutionState {
    pub fn from_api(raw: &str) -> Self {
        match raw {
            "QUERY_STATE_PENDING" => ExecutionState::Pending,
            "QUERY_STATE_EXECUTING" => ExecutionState::Executing,
            "QUERY_STATE_COMPLETED" => ExecutionState::Completed,
            "QUERY_STATE_COMPLETED_PARTIAL" => ExecutionState::CompletedPartial,
            "QUERY_STATE_FAILED" => ExecutionState::Failed,
            "QUERY_STATE_CANCELED" => ExecutionState::Canceled,
            "QUERY_STATE_EXPIRED" => ExecutionState::Expired,
            other => ExecutionState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ExecutionState::Pending => "QUERY_STATE_PENDING",
            ExecutionState::Executing => "QUERY_STATE_EXECUTING",
            ExecutionState::Completed => "QUERY_STATE_COMPLETED",
            ExecutionState::CompletedPartial => "QUERY_STATE_COMPLETED_PARTIAL",
            ExecutionState::Failed => "QUERY_STATE_FAILED",
            ExecutionState::Canceled => "QUERY_STATE_CANCELED",
            ExecutionState::Expired => "QUERY_STATE_EXPIRED",
            ExecutionState::Other(raw) => raw,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::CompletedPartial)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ExecutionState::Failed | ExecutionState::Canceled | ExecutionState::Expired
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do after observing a status payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Finished,
    PollAgain,
}

/// A submitted execution and the last state seen for it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExecution {
    pub execution_id: String,
    pub state: Option<ExecutionState>,
}

impl QueryExecution {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            state: None,
        }
    }

    /// Apply one status payload.
    ///
    /// Completed (or completed-partial) finishes; failed, canceled and
    /// expired are errors carrying the provider's message; any other state
    /// flagged `is_execution_finished` is an error; everything else polls
    /// again.
    pub fn observe(&mut self, status: &Value) -> Result<PollStep, ReportError> {
        let raw = status.get("state").and_then(Value::as_str).unwrap_or("");
        let state = ExecutionState::from_api(raw);
        self.state = Some(state.clone());

        if state.is_success() {
            return Ok(PollStep::Finished);
        }
        if state.is_failure() {
            return Err(ReportError::data_unavailable(failure_message(status)));
        }
        let finished = status
            .get("is_execution_finished")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if finished {
            let shown = if raw.is_empty() { "unknown" } else { raw };
            return Err(ReportError::data_unavailable(format!(
                "Dune execution finished in unexpected state: {}",
                shown
            )));
        }
        Ok(PollStep::PollAgain)
    }
}

fn failure_message(status: &Value) -> String {
    let message = status
        .get("error")
        .and_then(|e| e.get("message"))
        .filter(|m| !m.is_null());
    match message {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) | None => {
            let state = status.get("state").and_then(Value::as_str).unwrap_or("unknown");
            format!("Dune query execution failed with state {}", state)
        }
        Some(other) => other.to_string(),
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    /// Object rows only; anything else in `rows` is dropped
    pub rows: Vec<VolumeRow>,
    pub next_offset: Option<u64>,
}

/// Parse a results payload: `result.rows` plus the top-level `next_offset`.
pub fn parse_result_page(payload: &Value) -> Result<ResultPage, ReportError> {
    let result = payload
        .get("result")
        .and_then(Value::as_object)
        .ok_or_else(|| ReportError::data_unavailable("Dune result payload is missing result rows"))?;
    let rows = result.get("rows").and_then(Value::as_array).ok_or_else(|| {
        ReportError::data_unavailable("Dune result payload has invalid rows structure")
    })?;

    let next_offset = match payload.get("next_offset") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(n.as_u64().ok_or_else(invalid_cursor)?),
        Some(Value::String(s)) => Some(s.trim().parse().map_err(|_| invalid_cursor())?),
        Some(_) => return Err(invalid_cursor()),
    };

    Ok(ResultPage {
        rows: rows.iter().filter_map(|r| r.as_object().cloned()).collect(),
        next_offset,
    })
}

fn invalid_cursor() -> ReportError {
    ReportError::data_unavailable("Dune result payload has an invalid next_offset")
}

/// Client for the Dune query API.
#[derive(Clone)]
pub struct VolumeQueryClient {
    client: RetryingClient,
    base_url: String,
    api_key: String,
    settings: PollSettings,
}

impl VolumeQueryClient {
    pub fn new(client: RetryingClient, base_url: &str, api_key: &str, settings: PollSettings) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            settings,
        }
    }

    /// Start an execution of the saved query.
    pub async fn submit(&self, query_id: u64) -> Result<QueryExecution, ReportError> {
        let url = format!("{}/query/{}/execute", self.base_url, query_id);
        let request = HttpRequest::post_json("dune.execute", url, json!({"performance": "medium"}))
            .header(API_KEY_HEADER, &self.api_key);
        let response = self.client.request_json(&request).await?;

        let execution_id = match response.get("execution_id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(ReportError::data_unavailable(
                    "Dune execute response is missing execution_id",
                ))
            }
        };
        info!(query_id, execution_id = %execution_id, "Dune execution submitted");
        Ok(QueryExecution::new(execution_id))
    }

    /// Poll until the execution finishes, fails or polling runs out.
    pub async fn wait_for_completion(&self, execution: &mut QueryExecution) -> Result<(), ReportError> {
        let url = format!("{}/execution/{}/status", self.base_url, execution.execution_id);
        let request = HttpRequest::get("dune.status", url).header(API_KEY_HEADER, &self.api_key);

        for poll in 1..=self.settings.max_polls {
            let status = self.client.request_json(&request).await?;
            if execution.observe(&status)? == PollStep::Finished {
                info!(
                    execution_id = %execution.execution_id,
                    polls = poll,
                    "Dune execution finished"
                );
                return Ok(());
            }
            debug!(
                execution_id = %execution.execution_id,
                poll,
                state = execution.state.as_ref().map(ExecutionState::as_str).unwrap_or(""),
                "Dune execution still running"
            );
            if poll < self.settings.max_polls {
                self.client.sleeper().sleep(self.settings.interval).await;
            }
        }

        Err(ReportError::data_unavailable(
            "Dune query execution timed out while polling for results",
        ))
    }

    /// Fetch every result row, following `next_offset` until it is absent.
    pub async fn fetch_rows(&self, execution_id: &str) -> Result<Vec<VolumeRow>, ReportError> {
        let url = format!("{}/execution/{}/results", self.base_url, execution_id);
        let mut rows = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let request = HttpRequest::get("dune.results", url.as_str())
                .header(API_KEY_HEADER, &self.api_key)
                .query("offset", offset)
                .query("limit", self.settings.page_limit)
                .query("allow_partial_results", "true");
            let page = parse_result_page(&self.client.request_json(&request).await?)?;
            debug!(offset, rows = page.rows.len(), "Fetched Dune result page");
            rows.extend(page.rows);

            match page.next_offset {
                Some(next) => offset = next,
                None => break,
            }
        }

        if rows.is_empty() {
            return Err(ReportError::data_unavailable("Dune query returned no rows"));
        }
        info!(execution_id, rows = rows.len(), "Dune results fetched");
        Ok(rows)
    }

    /// Submit, wait and fetch.
    pub async fn run(&self, query_id: u64) -> Result<Vec<VolumeRow>, ReportError> {
        let mut execution = self.submit(query_id).await?;
        self.wait_for_completion(&mut execution).await?;
        self.fetch_rows(&execution.execution_id).await
    }
}
