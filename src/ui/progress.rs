//! Spinner for network work; plain stderr lines when not on a terminal

use super::context::UiContext;
use console::style;

/// A task spinner that prints plain lines when not interactive
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            eprintln!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.stop(message),
            None => self.fallback(true, message),
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.error(message),
            None => self.fallback(false, message),
        }
    }

    fn fallback(&self, ok: bool, message: &str) {
        let tag = match (ok, self.interactive) {
            (true, true) => style("✓").green(),
            (true, false) => style("[OK]").green(),
            (false, true) => style("✗").red(),
            (false, false) => style("[FAIL]").red(),
        };
        eprintln!("{} {}", tag, message);
    }

    /// Clear the spinner without any message
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.clear();
        }
    }
}
