//! Output functions for consistent CLI formatting
//!
//! Interactive sessions go through `cliclack::log`; everything else gets a
//! bracketed tag per line so logs stay greppable.

use super::context::UiContext;
use console::{style, StyledObject};

fn plain(tag: StyledObject<&str>, message: &str) {
    println!("  {} {}", tag, message);
}

/// Closing line after a cancelled or partial operation
pub fn outro_warn(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).yellow().bold()).ok();
    } else {
        println!();
        plain(style("[WARN]").yellow(), message);
    }
}

/// Bold header before a group of lines
pub fn section(ctx: &UiContext, title: &str) {
    println!();
    if ctx.use_fancy_output() {
        cliclack::log::info(style(title).bold()).ok();
    } else {
        println!("{}", style(title).bold());
    }
}

pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(format!("{} ({})", message, style(detail).dim())).ok();
    } else {
        plain(style("[OK]").green(), &format!("{} ({})", message, detail));
    }
}

pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(format!("{} - {}", message, style(hint).dim())).ok();
    } else {
        plain(style("[WARN]").yellow(), &format!("{} - {}", message, hint));
    }
}

pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::info(message).ok();
    } else {
        plain(style("[INFO]").cyan(), message);
    }
}

/// `key: value`, key dimmed in a terminal
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    let key = if ctx.use_fancy_output() {
        style(key).dim().to_string()
    } else {
        key.to_string()
    };
    println!("  {}: {}", key, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_non_interactive() {
        let ctx = UiContext::non_interactive();
        section(&ctx, "Caches");
        key_value(&ctx, "http-cache", "/tmp/http");
        step_info(&ctx, "Nothing to clear.");
        step_ok_detail(&ctx, "Configuration initialized", "/tmp/config.toml");
        step_warn_hint(&ctx, "Config already exists", "Use --force to overwrite");
        outro_warn(&ctx, "Aborted.");
    }
}
