//! Progress display for `devbox apply`.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{ProgressCallback, StepOutcome};
use std::time::Duration;

/// Spinner for a single slow call (provider listings)
pub fn spinner(msg: &str) -> ProgressBar {
    if !console::user_attended() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// One line per finished step
pub fn outcome_line(label: &str, outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Done { detail: Some(detail) } => {
            format!("{} {} {}", "✓".green(), label, format!("({detail})").dimmed())
        }
        StepOutcome::Done { detail: None } => format!("{} {}", "✓".green(), label),
        StepOutcome::Skipped { reason } => {
            format!("{} {} {}", "→".dimmed(), label, format!("skipped: {reason}").dimmed())
        }
        StepOutcome::Failed { error, .. } => format!("{} {}: {}", "✗".red(), label, error),
    }
}

/// Batch progress bar; steps are printed above it as they finish
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(bar) if !bar.is_hidden() => bar.println(line),
            _ => println!("{line}"),
        }
    }
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, total: usize) {
        let bar = if console::user_attended() {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        self.bar = Some(bar);
    }

    fn on_step_start(&mut self, _index: usize, _total: usize, label: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(label.to_string());
        }
    }

    fn on_step_complete(&mut self, label: &str, outcome: &StepOutcome) {
        self.println(outcome_line(label, outcome));
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_lines() {
        colored::control::set_override(false);
        assert_eq!(
            outcome_line("VPS created (id: 1)", &StepOutcome::Done { detail: Some("10.0.0.1".into()) }),
            "✓ VPS created (id: 1) (10.0.0.1)"
        );
        assert_eq!(
            outcome_line("x", &StepOutcome::Skipped { reason: "Dry run".into() }),
            "→ x skipped: Dry run"
        );
        assert_eq!(
            outcome_line("x", &StepOutcome::Failed { error: "boom".into(), blocking: true }),
            "✗ x: boom"
        );
    }

    #[test]
    fn test_callback_without_terminal() {
        let mut progress = BarProgress::new();
        progress.on_batch_start(2);
        progress.on_step_start(0, 2, "a");
        progress.on_step_complete("a", &StepOutcome::done());
        progress.on_batch_complete();
        assert!(progress.bar.is_none());
    }
}
