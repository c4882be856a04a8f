//! Terminal output for the CLI
//!
//! Uses `cliclack` for spinners and prompts in an interactive terminal and
//! falls back to plain lines in CI and when output is piped.

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{key_value, outro_warn, section, step_info, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
pub use prompts::confirm;
