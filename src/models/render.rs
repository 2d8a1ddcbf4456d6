use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{InputType, JobSpec, JobState, RenderJob, RenderOptions};

/// Body of `POST /api/v1/render`.
///
/// Required fields are optional here so that a missing field is reported by
/// validation together with every other offending field.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    #[garde(required)]
    pub input_type: Option<InputType>,

    #[garde(required, length(min = 1))]
    pub content: Option<String>,

    #[garde(dive)]
    #[serde(default)]
    pub options: Option<RenderOptions>,
}

impl RenderRequest {
    /// Validate the submission and turn it into an enqueueable job spec.
    /// On failure, returns one message per offending field.
    pub fn into_spec(self) -> Result<JobSpec, Vec<String>> {
        if let Err(report) = self.validate() {
            return Err(report
                .iter()
                .map(|(path, error)| format!("{path}: {error}"))
                .collect());
        }

        match (self.input_type, self.content) {
            (Some(input_type), Some(content)) => Ok(JobSpec {
                input_type,
                content,
                options: self.options.unwrap_or_default(),
            }),
            _ => Err(vec!["inputType and content are required".to_string()]),
        }
    }
}

/// Response after submitting a render job.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobState,
}

/// Response for querying job status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<RenderJob> for JobStatusResponse {
    fn from(job: RenderJob) -> Self {
        Self {
            id: job.id,
            state: job.state,
            result: job.result.filter(|_| job.state == JobState::Completed),
            error: job.failure_reason.filter(|_| job.state == JobState::Failed),
        }
    }
}

/// Response for a completed job's artifact reference.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub download_url: String,
}
