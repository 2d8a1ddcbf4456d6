use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// How `content` of a job is interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InputType {
    Url,
    Html,
}

/// Lifecycle state of a render job, assigned by the queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobState {
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Rendering options supplied with a submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// `png`, `docx` or a PDF page size; anything else renders an A4 PDF.
    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,

    /// CSS selectors whose `:hover` state is forced before capture.
    #[garde(inner(inner(length(min = 1))))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover_selectors: Option<Vec<String>>,

    /// Page-global flag the page sets to `true` once it is ready.
    #[garde(length(min = 1))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_event: Option<String>,
}

/// The immutable part of a job, fixed at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub input_type: InputType,
    pub content: String,
    #[serde(default)]
    pub options: RenderOptions,
}

/// A render job as held by the queue store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: Uuid,
    pub spec: JobSpec,
    pub state: JobState,
    /// Artifact reference; set only when `state` is `Completed`.
    pub result: Option<String>,
    /// Set only when `state` is `Failed`.
    pub failure_reason: Option<String>,
    /// Identity of the worker holding the claim.
    pub worker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    pub fn new(spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            spec,
            state: JobState::Queued,
            result: None,
            failure_reason: None,
            worker: None,
            created_at: now,
            updated_at: now,
        }
    }
}
