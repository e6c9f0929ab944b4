//! Terminal output and prompting for the command flows.
//!
//! Everything here is user-facing text on stdout, separate from `tracing`
//! diagnostics. Prompting sits behind [`Prompter`] so flows run unattended in
//! tests.

use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::FlowError;
use crate::paths;

const RULE_WIDTH: usize = 60;

pub fn success(message: &str) {
    println!("{} {message}", "✓".green());
}

pub fn failure(message: &str) {
    println!("{} {message}", "✗".red());
}

pub fn warn(message: &str) {
    println!("{} {message}", "⚠".yellow());
}

pub fn info(message: &str) {
    println!("  {message}");
}

pub fn bullet(message: &str) {
    println!("  • {message}");
}

pub fn blank() {
    println!();
}

pub fn connected(target: &str) {
    println!("{} {target}", "●".green());
}

pub fn disconnected() {
    println!("{} Not connected", "○".dimmed());
}

/// A block of text set off by horizontal rules, used for public keys.
pub fn framed(title: &str, lines: &[String]) {
    println!("{}", "━".repeat(RULE_WIDTH).dimmed());
    println!();
    println!("  {}", title.bold());
    println!();
    for line in lines {
        println!("  {line}");
        println!();
    }
    println!("{}", "━".repeat(RULE_WIDTH).dimmed());
}

/// Where to authorize a public key.
pub fn key_instructions(workspace_url: Option<&str>) -> String {
    match workspace_url {
        Some(url) => format!("Add key: {url} → Remote Access"),
        None => "Add key in your workspace (open in browser) → Remote Access".to_string(),
    }
}

pub fn display_path(path: &Path, home: &Path) -> String {
    paths::contract_home(path, home)
}

pub fn stdout_is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Spinner for one step. Hidden when stdout is not a terminal, in which case
/// the step text is printed once instead.
pub struct Step {
    bar: ProgressBar,
}

impl Step {
    pub fn start(message: &str) -> Self {
        let bar = if stdout_is_terminal() {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
                bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        } else {
            println!("  {message}...");
            ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
        };
        bar.set_message(message.to_string());
        Self { bar }
    }

    pub fn update(&self, message: &str) {
        if self.bar.is_hidden() {
            println!("  {message}...");
        }
        self.bar.set_message(message.to_string());
    }

    pub fn succeed(self, message: &str) {
        self.bar.finish_and_clear();
        success(message);
    }

    pub fn fail(self, message: &str) {
        self.bar.finish_and_clear();
        failure(message);
    }
}

/// Interactive input used by the flows.
pub trait Prompter: Send + Sync {
    /// Whether a human can answer prompts.
    fn is_interactive(&self) -> bool;

    /// Free-form line, falling back to `default` on empty input.
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String, FlowError>;

    /// Index of the chosen item.
    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize, FlowError>;

    /// Block until the user presses Enter.
    fn pause(&self, prompt: &str) -> Result<(), FlowError>;
}

/// [`Prompter`] on the controlling terminal via dialoguer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
    }

    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String, FlowError> {
        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme).with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input
            .interact_text()
            .map(|s| s.trim().to_string())
            .map_err(|e| FlowError::Prompt(e.to_string()))
    }

    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize, FlowError> {
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact_opt()
            .map_err(|e| FlowError::Prompt(e.to_string()))?
            .ok_or(FlowError::Cancelled)
    }

    fn pause(&self, prompt: &str) -> Result<(), FlowError> {
        let term = console::Term::stdout();
        term.write_str(&format!("{prompt} "))
            .and_then(|_| term.read_line())
            .map(|_| ())
            .map_err(|e| FlowError::Prompt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_instructions() {
        assert_eq!(
            key_instructions(Some("https://demo.envhaven.app")),
            "Add key: https://demo.envhaven.app → Remote Access"
        );
        assert!(key_instructions(None).contains("open in browser"));
    }

    #[test]
    fn test_step_runs_without_terminal() {
        let step = Step::start("Testing connection");
        step.update("Still testing");
        step.succeed("SSH connection successful");
    }
}
