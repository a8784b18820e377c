//! Blocking HTTP client for the workout backend.

use crate::config::ApiConfig;
use crate::dashboard::{BackendSummary, SummarySource};
use crate::submission::{LogSubmitter, WorkoutLogPayload};
use crate::{Error, Result};

const WORKOUT_LOG_PATH: &str = "/workout-logs";
const SUMMARY_PATH: &str = "/dashboard/summary";

/// Backend client; every request is bounded by the configured timeout
pub struct ApiClient {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Config("api.base_url is not set".into()))?
            .trim_end_matches('/')
            .to_string();

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .build()
            .into();

        Ok(Self {
            agent,
            base_url,
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }
}

impl LogSubmitter for ApiClient {
    fn submit(&self, payload: &WorkoutLogPayload) -> Result<()> {
        let url = self.url(WORKOUT_LOG_PATH);
        let mut request = self.agent.post(&url);
        if let Some(auth) = self.bearer() {
            request = request.header("Authorization", auth);
        }

        request.send_json(payload)?;
        tracing::info!("Workout log for day {} accepted by {}", payload.program_day_id, url);
        Ok(())
    }
}

impl SummarySource for ApiClient {
    fn fetch_summary(&self) -> Result<BackendSummary> {
        let url = self.url(SUMMARY_PATH);
        let mut request = self.agent.get(&url);
        if let Some(auth) = self.bearer() {
            request = request.header("Authorization", auth);
        }

        let response = request.call()?;
        let summary: BackendSummary = response.into_body().read_json()?;
        tracing::debug!("Fetched dashboard summary from {}", url);
        Ok(summary)
    }
}
