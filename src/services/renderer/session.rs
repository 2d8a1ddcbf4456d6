use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;

use super::{RenderError, RendererSettings};

/// A headless Chrome process with a single tab, owned by one job.
///
/// Dropping the session closes the tab and kills the browser, so every exit
/// path out of the pipeline releases it.
pub struct BrowserSession {
    tab: Arc<Tab>,
    // Dropped after `tab`; its Drop terminates the Chrome process.
    _browser: Browser,
}

impl BrowserSession {
    pub fn launch(settings: &RendererSettings) -> Result<Self, RenderError> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(settings.sandbox)
            .window_size(Some(settings.window_size))
            .path(settings.chrome_path.clone())
            .idle_browser_timeout(settings.idle_browser_timeout())
            .build()
            .map_err(|e| RenderError::Launch(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| RenderError::Launch(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| RenderError::Launch(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(settings.navigation_timeout);

        tracing::debug!("Browser session started");
        Ok(Self {
            tab,
            _browser: browser,
        })
    }

    pub fn tab(&self) -> &Tab {
        &self.tab
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            tracing::debug!(error = %e, "Tab close failed; browser process is terminated regardless");
        }
        tracing::debug!("Browser session released");
    }
}
