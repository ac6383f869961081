//! Scripted transport and sleeper for tests.

use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::retry::Sleeper;
use async_trait::async_trait;
use serde_json::Value;
use stablecoin_core::ReportError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type Script = VecDeque<Result<HttpResponse, ReportError>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport that replays queued responses per method and URL (query
/// parameters are not part of the key) and records every request.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<(HttpMethod, String), Script>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: HttpMethod, url: &str, result: Result<HttpResponse, ReportError>) {
        lock(&self.scripts)
            .entry((method, url.to_string()))
            .or_default()
            .push_back(result);
    }

    pub fn push_response(&self, method: HttpMethod, url: &str, response: HttpResponse) {
        self.push(method, url, Ok(response));
    }

    pub fn push_json(&self, method: HttpMethod, url: &str, body: Value) {
        self.push_response(method, url, HttpResponse::new(200, body.to_string()));
    }

    pub fn push_status(&self, method: HttpMethod, url: &str, status: u16) {
        self.push_response(method, url, HttpResponse::new(status, ""));
    }

    pub fn push_error(&self, method: HttpMethod, url: &str, error: ReportError) {
        self.push(method, url, Err(error));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ReportError> {
        lock(&self.requests).push(request.clone());
        let scripted = lock(&self.scripts)
            .get_mut(&(request.method, request.url.clone()))
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| {
            Err(ReportError::data_unavailable(format!(
                "No scripted response for {} {}",
                request.method.as_str(),
                request.url
            )))
        })
    }
}

/// Sleeper that returns immediately and records requested durations.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
    }
}
