use headless_chrome::protocol::cdp::Page;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::Tab;
use std::thread::sleep;
use std::time::{Duration, Instant};

use super::hover;
use super::scripts::{self, NetworkState};
use super::session::BrowserSession;
use super::{RenderError, RenderedDocument, RendererSettings};
use crate::models::format::OutputFormat;
use crate::models::job::{InputType, JobSpec};
use crate::services::docx;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// No new resource entries for this long counts as network idle.
const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);

/// Run the full pipeline for one job: load, readiness wait, hover, canvas
/// snapshot, export. The browser session is released when this returns,
/// on success and on error alike.
pub fn render_document(
    settings: &RendererSettings,
    spec: &JobSpec,
) -> Result<RenderedDocument, RenderError> {
    let format = OutputFormat::from_options(&spec.options);
    let session = BrowserSession::launch(settings)?;
    let tab = session.tab();

    load_content(tab, spec, settings.navigation_timeout)?;

    if let Some(flag) = spec.options.wait_for_event.as_deref() {
        wait_for_ready_flag(tab, flag, settings.ready_timeout);
    }

    if let Some(selectors) = spec.options.hover_selectors.as_deref() {
        if !selectors.is_empty() {
            let applied = hover::force_hover_states(tab, selectors, &hover::chrome_strategies());
            tracing::debug!(selectors = selectors.len(), applied, "Hover states applied");
            sleep(settings.hover_settle);
        }
    }

    let replaced = snapshot_canvases(tab)?;
    if replaced > 0 {
        tracing::debug!(canvases = replaced, "Canvases replaced with static images");
    }

    let bytes = export(tab, format)?;
    Ok(RenderedDocument { format, bytes })
}

fn evaluate(tab: &Tab, expression: &str, await_promise: bool) -> Result<serde_json::Value, RenderError> {
    let object = tab
        .evaluate(expression, await_promise)
        .map_err(|e| RenderError::Script(e.to_string()))?;
    Ok(object.value.unwrap_or(serde_json::Value::Null))
}

fn load_content(tab: &Tab, spec: &JobSpec, timeout: Duration) -> Result<(), RenderError> {
    let started = Instant::now();
    match spec.input_type {
        InputType::Url => {
            tab.navigate_to(&spec.content)
                .and_then(|tab| tab.wait_until_navigated())
                .map_err(|e| RenderError::Load(format!("{}: {}", spec.content, e)))?;
        }
        InputType::Html => {
            tab.navigate_to("about:blank")
                .and_then(|tab| tab.wait_until_navigated())
                .map_err(|e| RenderError::Load(e.to_string()))?;
            evaluate(tab, &scripts::set_content(&spec.content), false)?;
        }
    }

    let remaining = timeout.saturating_sub(started.elapsed());
    wait_for_network_idle(tab, remaining)
}

/// Wait until the document has loaded and no new resources have appeared
/// for [`NETWORK_QUIET_WINDOW`].
fn wait_for_network_idle(tab: &Tab, timeout: Duration) -> Result<(), RenderError> {
    let deadline = Instant::now() + timeout;
    let mut last_count = None;
    let mut quiet_since = Instant::now();

    loop {
        let raw = evaluate(tab, scripts::NETWORK_STATE, false)?;
        let state: NetworkState = raw
            .as_str()
            .and_then(|s| serde_json::from_str(s).ok())
            .ok_or_else(|| RenderError::Script(format!("unexpected network state {raw}")))?;

        let now = Instant::now();
        if last_count != Some(state.resources) {
            last_count = Some(state.resources);
            quiet_since = now;
        }

        if state.ready_state == "complete" && now.duration_since(quiet_since) >= NETWORK_QUIET_WINDOW {
            return Ok(());
        }
        if now >= deadline {
            return Err(RenderError::Timeout {
                stage: "network idle",
                timeout,
            });
        }
        sleep(POLL_INTERVAL);
    }
}

/// Poll `window[flag]` until it is truthy. Gives up quietly at the timeout.
fn wait_for_ready_flag(tab: &Tab, flag: &str, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    let script = scripts::ready_flag(flag);

    loop {
        match evaluate(tab, &script, false) {
            Ok(serde_json::Value::Bool(true)) => {
                tracing::debug!(flag, "Page signalled ready");
                return;
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(flag, error = %e, "Readiness poll failed"),
        }
        if Instant::now() >= deadline {
            tracing::warn!(flag, timeout_ms = timeout.as_millis() as u64, "Readiness flag never set, capturing anyway");
            return;
        }
        sleep(POLL_INTERVAL);
    }
}

fn snapshot_canvases(tab: &Tab) -> Result<u64, RenderError> {
    let replaced = evaluate(tab, scripts::SNAPSHOT_CANVASES, true)?;
    Ok(replaced.as_u64().unwrap_or(0))
}

fn export(tab: &Tab, format: OutputFormat) -> Result<Vec<u8>, RenderError> {
    match format {
        OutputFormat::Png => export_png(tab),
        OutputFormat::Docx => {
            let html = evaluate(tab, scripts::OUTER_HTML, false)?;
            let html = html
                .as_str()
                .ok_or_else(|| RenderError::Export("document has no HTML to serialize".to_string()))?;
            Ok(docx::html_to_docx(html)?)
        }
        OutputFormat::Pdf {
            page_size,
            print_background,
        } => {
            let (paper_width, paper_height) = page_size.dimensions_in();
            let options = PrintToPdfOptions {
                print_background: Some(print_background),
                paper_width: Some(paper_width),
                paper_height: Some(paper_height),
                ..Default::default()
            };
            tab.print_to_pdf(Some(options))
                .map_err(|e| RenderError::Export(format!("PDF: {}", e)))
        }
    }
}

fn export_png(tab: &Tab) -> Result<Vec<u8>, RenderError> {
    let size = evaluate(tab, scripts::DOCUMENT_SIZE, false)?;
    let (width, height) = size
        .as_str()
        .and_then(|s| serde_json::from_str::<(f64, f64)>(s).ok())
        .ok_or_else(|| RenderError::Script(format!("unexpected document size {size}")))?;

    let clip = Page::Viewport {
        x: 0.0,
        y: 0.0,
        width: width.max(1.0),
        height: height.max(1.0),
        scale: 1.0,
    };
    let bytes = tab
        .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, Some(clip), true)
        .map_err(|e| RenderError::Export(format!("Screenshot: {}", e)))?;

    match image::guess_format(&bytes) {
        Ok(image::ImageFormat::Png) => Ok(bytes),
        other => Err(RenderError::Export(format!(
            "screenshot is not a PNG ({:?})",
            other.ok()
        ))),
    }
}
