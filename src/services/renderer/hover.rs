//! Best-effort `:hover` forcing.
//!
//! Every selector is run through each strategy in order. A strategy that
//! fails is logged and skipped; it never fails the job.

use headless_chrome::protocol::cdp::{CSS, DOM};
use headless_chrome::Tab;

use super::scripts;

/// Class added to hovered elements so stylesheets can pair `:hover` rules
/// with `.hover`.
pub const HOVER_CLASS: &str = "hover";

pub trait HoverStrategy<T: ?Sized> {
    fn name(&self) -> &'static str;
    fn apply(&self, target: &T, selector: &str) -> anyhow::Result<()>;
}

/// Engine-level pseudo-class forcing via `CSS.forcePseudoState`.
pub struct ForcePseudoState;

impl HoverStrategy<Tab> for ForcePseudoState {
    fn name(&self) -> &'static str {
        "force_pseudo_state"
    }

    fn apply(&self, tab: &Tab, selector: &str) -> anyhow::Result<()> {
        tab.call_method(DOM::Enable {
            include_whitespace: None,
        })?;
        tab.call_method(CSS::Enable(None))?;

        for element in tab.find_elements(selector)? {
            tab.call_method(CSS::ForcePseudoState {
                node_id: element.node_id,
                forced_pseudo_classes: vec!["hover".to_string()],
            })?;
        }
        Ok(())
    }
}

/// DOM fallback: tag matching elements with [`HOVER_CLASS`].
pub struct HoverClassInjection;

impl HoverStrategy<Tab> for HoverClassInjection {
    fn name(&self) -> &'static str {
        "hover_class_injection"
    }

    fn apply(&self, tab: &Tab, selector: &str) -> anyhow::Result<()> {
        let touched = tab
            .evaluate(&scripts::add_class(selector, HOVER_CLASS), false)?
            .value
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        match touched {
            -1 => anyhow::bail!("invalid selector"),
            0 => anyhow::bail!("no element matches"),
            _ => Ok(()),
        }
    }
}

pub fn chrome_strategies() -> [&'static dyn HoverStrategy<Tab>; 2] {
    [&ForcePseudoState, &HoverClassInjection]
}

/// Run every strategy for every selector. Returns the number of successful
/// attempts.
pub fn force_hover_states<T: ?Sized>(
    target: &T,
    selectors: &[String],
    strategies: &[&dyn HoverStrategy<T>],
) -> usize {
    let mut applied = 0;
    for selector in selectors {
        for strategy in strategies {
            match strategy.apply(target, selector) {
                Ok(()) => {
                    applied += 1;
                    tracing::debug!(selector = %selector, strategy = strategy.name(), "Hover state forced");
                }
                Err(e) => {
                    tracing::warn!(
                        selector = %selector,
                        strategy = strategy.name(),
                        error = %e,
                        "Hover attempt failed"
                    );
                }
            }
        }
    }
    applied
}
