use super::auth::AccessTokenSource;
use crate::domain::jobs::{JobConfig, JobState, JobStatus, StreamSpec};
use crate::error::PortError;
use crate::ports::transcoder::TranscodeJobPort;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info};

pub const TRANSCODER_API_BASE: &str = "https://transcoder.googleapis.com";

#[derive(Deserialize)]
struct JobResource {
    name: String,
}

#[derive(Deserialize)]
struct JobStateResponse {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<JobErrorResponse>,
}

#[derive(Deserialize)]
struct JobErrorResponse {
    #[serde(default)]
    message: String,
}

/// Google Transcoder API v1 client for one project and region.
pub struct GcpTranscoderApi {
    http: reqwest::Client,
    project_id: String,
    location: String,
    base_url: String,
    auth: Arc<AccessTokenSource>,
}

impl GcpTranscoderApi {
    pub fn new(
        http: reqwest::Client,
        project_id: impl Into<String>,
        location: impl Into<String>,
        auth: Arc<AccessTokenSource>,
    ) -> Self {
        Self {
            http,
            project_id: project_id.into(),
            location: location.into(),
            base_url: TRANSCODER_API_BASE.to_string(),
            auth,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn jobs_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/jobs",
            self.base_url, self.project_id, self.location
        )
    }

    /// Jobs are addressed by their full resource name, `projects/.../jobs/<id>`.
    fn job_url(&self, name: &str) -> String {
        if name.starts_with("projects/") {
            format!("{}/v1/{}", self.base_url, name)
        } else {
            format!("{}/{}", self.jobs_url(), name)
        }
    }
}

/// Request body for `jobs.create`.
pub fn job_request_body(config: &JobConfig) -> Value {
    let elementary_streams: Vec<Value> = config
        .elementary_streams
        .iter()
        .map(|stream| match &stream.spec {
            StreamSpec::Video(video) => {
                let mut codec = Map::new();
                codec.insert(
                    video.codec.clone(),
                    json!({
                        "bitrateBps": video.bitrate_bps,
                        "frameRate": video.frame_rate,
                        "widthPixels": video.width_pixels,
                        "heightPixels": video.height_pixels,
                    }),
                );
                json!({ "key": stream.key, "videoStream": codec })
            }
            StreamSpec::Audio(audio) => json!({
                "key": stream.key,
                "audioStream": {
                    "codec": audio.codec,
                    "bitrateBps": audio.bitrate_bps,
                    "sampleRateHertz": audio.sample_rate_hertz,
                    "channelCount": audio.channel_count,
                }
            }),
        })
        .collect();

    let mux_streams: Vec<Value> = config
        .mux_streams
        .iter()
        .map(|mux| {
            json!({
                "key": mux.key,
                "container": mux.container,
                "elementaryStreams": mux.elementary_streams,
            })
        })
        .collect();

    json!({
        "inputUri": config.input_uri,
        "outputUri": config.output_uri,
        "config": {
            "elementaryStreams": elementary_streams,
            "muxStreams": mux_streams,
        }
    })
}

pub fn parse_state(state: &str) -> JobState {
    match state {
        "PENDING" => JobState::Pending,
        "RUNNING" => JobState::Running,
        "SUCCEEDED" => JobState::Succeeded,
        "FAILED" => JobState::Failed,
        _ => JobState::Unspecified,
    }
}

fn job_status(body: JobStateResponse) -> JobStatus {
    let state = body
        .state
        .as_deref()
        .map(parse_state)
        .unwrap_or(JobState::Unspecified);
    JobStatus {
        state,
        error: body.error.map(|e| e.message).filter(|m| !m.is_empty()),
    }
}

async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response, PortError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(action, %status, "Transcoder API error: {}", body);
    Err(format!("transcoder {} failed with status {}: {}", action, status, body).into())
}

#[async_trait]
impl TranscodeJobPort for GcpTranscoderApi {
    async fn create_job(&self, config: &JobConfig) -> Result<String, PortError> {
        let response = self
            .http
            .post(self.jobs_url())
            .bearer_auth(self.auth.token().await?)
            .json(&job_request_body(config))
            .send()
            .await?;
        let job: JobResource = check(response, "create").await?.json().await?;

        info!(job = %job.name, input = %config.input_uri, output = %config.output_uri, "Transcoder job created");
        Ok(job.name)
    }

    async fn get_job(&self, name: &str) -> Result<JobStatus, PortError> {
        let response = self
            .http
            .get(self.job_url(name))
            .bearer_auth(self.auth.token().await?)
            .send()
            .await?;
        let body: JobStateResponse = check(response, "get").await?.json().await?;
        Ok(job_status(body))
    }

    async fn delete_job(&self, name: &str) -> Result<(), PortError> {
        let response = self
            .http
            .delete(self.job_url(name))
            .bearer_auth(self.auth.token().await?)
            .send()
            .await?;
        check(response, "delete").await?;
        info!(job = %name, "Transcoder job deleted");
        Ok(())
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}
