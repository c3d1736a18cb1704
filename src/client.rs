//! Check-in service client
//!
//! The orchestrator talks to the service through the [`CheckinClient`]
//! trait so tests can substitute a scripted client. The production
//! implementation is a thin reqwest wrapper speaking JSON.

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::cycle::task::TaskDescriptor;
use crate::error::{AttemptError, FetchError};
use crate::geo::GeneratedCoordinate;

/// Timeout for task-list fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
/// Timeout for check-in attempts.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(20);

/// Access to the remote check-in service.
pub trait CheckinClient {
    /// List the tasks currently visible for a group.
    fn fetch_tasks(
        &self,
        group_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<TaskDescriptor>, FetchError>> + Send;

    /// Submit one check-in attempt and return the raw response body.
    fn attempt(
        &self,
        group_id: &str,
        task: &TaskDescriptor,
        coordinate: &GeneratedCoordinate,
    ) -> impl std::future::Future<Output = Result<String, AttemptError>> + Send;
}

/// Production client over HTTP with a session credential cookie.
pub struct HttpCheckinClient {
    client: reqwest::Client,
    base_url: String,
    session_credential: String,
}

impl HttpCheckinClient {
    #[must_use]
    pub fn new(base_url: String, session_credential: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_credential,
        }
    }

    fn cookie_header(&self) -> String {
        format!("session={}", self.session_credential)
    }
}

impl CheckinClient for HttpCheckinClient {
    async fn fetch_tasks(&self, group_id: &str) -> Result<Vec<TaskDescriptor>, FetchError> {
        if group_id.is_empty() {
            return Err(FetchError::InvalidGroup(group_id.to_string()));
        }
        let url = format!("{}/api/groups/{group_id}/tasks", self.base_url);
        debug!(group = %group_id, "fetching task list");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::COOKIE, self.cookie_header())
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        response
            .json::<Vec<TaskDescriptor>>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }

    async fn attempt(
        &self,
        group_id: &str,
        task: &TaskDescriptor,
        coordinate: &GeneratedCoordinate,
    ) -> Result<String, AttemptError> {
        let url = format!(
            "{}/api/groups/{group_id}/tasks/{}/checkin",
            self.base_url, task.id
        );
        debug!(group = %group_id, task = %task.id, "submitting check-in attempt");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::COOKIE, self.cookie_header())
            .timeout(ATTEMPT_TIMEOUT)
            .json(&json!({
                "lat": coordinate.lat,
                "lng": coordinate.lng,
                "accuracy": coordinate.accuracy,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Timeout
                } else {
                    AttemptError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))
    }
}
