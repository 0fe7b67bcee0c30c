//! CLI output formatting

use crate::{
    core::{ExecutionStatus, PipelineResult, StepOutcome, StepRecord},
    execution::ExecutionEvent,
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a spinner for a running step
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(spinner_style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::NotStarted => style("NOT STARTED").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a step outcome for display
pub fn format_outcome(outcome: StepOutcome) -> String {
    match outcome {
        StepOutcome::Skipped => style("SKIPPED").dim().to_string(),
        StepOutcome::Applied => style("APPLIED").green().to_string(),
        StepOutcome::Failed => style("FAILED").red().to_string(),
    }
}

/// First eight hex digits of an execution id
pub fn short_id(id: &Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_steps,
        } => format!(
            "{} Provisioning {} ({} steps, {})",
            ROCKET,
            style(pipeline_name).bold(),
            total_steps,
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::StepStarted { .. } => return None,
        ExecutionEvent::StepCheckIndeterminate { step, error } => format!(
            "{} {}: could not determine state, applying ({})",
            WARN,
            style(step).yellow(),
            style(error).dim()
        ),
        ExecutionEvent::StepSkipped { step, .. } => {
            format!("{} {} {}", SKIP, style(step).dim(), format_outcome(StepOutcome::Skipped))
        }
        ExecutionEvent::StepApplied { step, duration_ms } => format!(
            "{} {} {} {}",
            CHECK,
            style(step).green(),
            format_outcome(StepOutcome::Applied),
            style(format_duration(Duration::from_millis(*duration_ms))).dim()
        ),
        ExecutionEvent::StepWarning { step, warning } => {
            format!("{} {}: {}", WARN, style(step).yellow(), style(warning).dim())
        }
        ExecutionEvent::StepFailed { step, failure, .. } => {
            let mut line = format!("{} {}: {}", CROSS, style(step).red(), failure);
            if let Some(diagnostic) = &failure.diagnostic {
                line.push('\n');
                line.push_str(&indent(&format_output(diagnostic, 20), "    "));
            }
            line
        }
        ExecutionEvent::PipelineCompleted { status, exit_code, .. } => format!(
            "{} Run {} (exit code {})",
            INFO,
            format_status(*status),
            style(exit_code).bold()
        ),
    };
    Some(line)
}

/// Console reporter: one line per finished step, a spinner while a step runs
pub struct ConsoleReporter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
        }
    }

    pub fn handle(&self, event: &ExecutionEvent) {
        let Ok(mut spinner) = self.spinner.lock() else {
            return;
        };

        if let ExecutionEvent::StepStarted { index, total, step } = event {
            *spinner = Some(create_spinner(format!(
                "[{}/{}] {}",
                style(index).cyan(),
                style(total).dim(),
                style(step).bold()
            )));
            return;
        }

        if let Some(line) = format_execution_event(event) {
            match spinner.as_ref() {
                Some(bar) => bar.println(line),
                None => println!("{}", line),
            }
        }

        if matches!(
            event,
            ExecutionEvent::StepSkipped { .. }
                | ExecutionEvent::StepApplied { .. }
                | ExecutionEvent::StepFailed { .. }
        ) {
            if let Some(bar) = spinner.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Print a separator line spanning the terminal
pub fn print_separator() {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    println!("{}", "─".repeat(width.min(120)));
}

/// Format one row of the per-step table
pub fn format_step_row(record: &StepRecord) -> String {
    let mut row = format!(
        "  {:<14} {:<8} {:>8}",
        record.step_name,
        format_outcome(record.outcome),
        format_duration(Duration::from_millis(record.duration_ms))
    );
    if let Some(error) = &record.error {
        row.push_str(&format!("  {}", style(error).red()));
    } else if let Some(warning) = &record.warning {
        row.push_str(&format!("  {}", style(warning).yellow()));
    }
    row
}

/// Row for a step that never started
pub fn format_not_run_row(step_name: &str) -> String {
    format!("  {:<14} {:<8}", step_name, style("NOT RUN").dim())
}

/// One row per pipeline step, in run order
pub fn format_result_rows(result: &PipelineResult) -> Vec<String> {
    if result.step_names().is_empty() {
        return result.records().iter().map(format_step_row).collect();
    }
    result
        .step_names()
        .iter()
        .map(|name| match result.record(name) {
            Some(record) => format_step_row(record),
            None => format_not_run_row(name),
        })
        .collect()
}

/// Print the final run summary
pub fn print_run_result(result: &PipelineResult) {
    println!();
    print_separator();
    for row in format_result_rows(result) {
        println!("{}", row);
    }
    if let Some(failure) = result.failure() {
        println!("  {}", style(failure).red());
    }
    print_separator();

    let duration = format_duration(Duration::from_millis(result.duration_ms()));
    if result.is_success() {
        println!(
            "{} {} provisioned {} ({} applied, {} skipped) in {}",
            CHECK,
            style(result.pipeline_name()).bold(),
            style("successfully").green(),
            result.count(StepOutcome::Applied),
            result.count(StepOutcome::Skipped),
            duration
        );
    } else {
        let failed = result
            .failed_step()
            .map(|r| r.step_name.clone())
            .unwrap_or_else(|| "run".to_string());
        println!(
            "{} {} {} at {} (exit code {}) after {}",
            CROSS,
            style(result.pipeline_name()).bold(),
            style("failed").red(),
            style(failed).bold(),
            result.exit_code(),
            duration
        );
    }
}

/// Format a history entry for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::NotStarted => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} - {} ({} applied, {} skipped of {})",
        status_icon,
        style(short_id(&summary.execution_id)).dim(),
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.applied_steps,
        summary.skipped_steps,
        summary.total_steps
    );
    if let Some(step) = &summary.failed_step {
        line.push_str(&format!(" - failed at {} (exit {})", style(step).red(), summary.exit_code));
    }
    line
}

/// Format command output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", millis)
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
