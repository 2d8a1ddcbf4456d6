//! Headless-browser rendering of HTML/URL jobs into PDF, PNG or DOCX.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::models::format::OutputFormat;
use crate::models::job::JobSpec;
use crate::services::docx::DocxError;

pub mod hover;
pub mod pipeline;
pub mod scripts;
pub mod session;

/// Bytes produced for a job, tagged with the format they are in.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, spec: &JobSpec) -> Result<RenderedDocument, RenderError>;
}

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub chrome_path: Option<PathBuf>,
    pub sandbox: bool,
    pub window_size: (u32, u32),
    pub navigation_timeout: Duration,
    pub ready_timeout: Duration,
    pub hover_settle: Duration,
}

impl RendererSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            sandbox: config.chrome_sandbox,
            window_size: (1280, 800),
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
            ready_timeout: Duration::from_millis(config.ready_timeout_ms),
            hover_settle: Duration::from_millis(config.hover_settle_ms),
        }
    }

    /// headless_chrome drops a connection that sees no events for this long;
    /// keep it well past the longest single wait in the pipeline.
    pub fn idle_browser_timeout(&self) -> Duration {
        self.navigation_timeout.max(self.ready_timeout) + Duration::from_secs(60)
    }
}

/// Renders jobs with a fresh headless Chrome per job.
///
/// The DevTools client is synchronous, so each render runs on the blocking
/// thread pool.
pub struct ChromeRenderer {
    settings: Arc<RendererSettings>,
}

impl ChromeRenderer {
    pub fn new(settings: RendererSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

#[async_trait]
impl DocumentRenderer for ChromeRenderer {
    async fn render(&self, spec: &JobSpec) -> Result<RenderedDocument, RenderError> {
        let settings = Arc::clone(&self.settings);
        let spec = spec.clone();
        tokio::task::spawn_blocking(move || pipeline::render_document(&settings, &spec))
            .await
            .map_err(|e| RenderError::Join(e.to_string()))?
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Failed to load content: {0}")]
    Load(String),

    #[error("Timed out after {}ms waiting for {stage}", .timeout.as_millis())]
    Timeout { stage: &'static str, timeout: Duration },

    #[error("Page script failed: {0}")]
    Script(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Docx(#[from] DocxError),

    #[error("Render task aborted: {0}")]
    Join(String),
}
