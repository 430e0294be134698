//! Human-readable run summary, printed to stderr.

use colored::Colorize;
use privpack_events::{RunSummary, StopReason};
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,

    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Debug, Clone, Tabled)]
struct RejectionRow {
    #[tabled(rename = "Reason")]
    reason: String,

    #[tabled(rename = "Tasks")]
    count: u64,
}

fn rows(summary: &RunSummary) -> Vec<SummaryRow> {
    let row = |metric, value: String| SummaryRow { metric, value };
    vec![
        row("Policy", summary.policy.clone()),
        row("Stop reason", summary.stop_reason.to_string()),
        row("Final sim time", format!("{:.3}", summary.final_sim_time.value())),
        row("Wall time (s)", format!("{:.3}", summary.wall_time_seconds)),
        row("Blocks created", summary.blocks_created.to_string()),
        row("Tasks", summary.total_tasks.to_string()),
        row("Allocated", summary.allocated.to_string()),
        row("Rejected", summary.rejected.to_string()),
        row("Acceptance rate", format!("{:.4}", summary.acceptance_rate)),
        row("Realized profit", format!("{:.4}", summary.realized_profit)),
        row(
            "Fairness (Jain)",
            summary
                .fairness
                .map(|f| format!("{f:.4}"))
                .unwrap_or_else(|| "-".to_string()),
        ),
        row("Config", summary.config_fingerprint.chars().take(12).collect()),
    ]
}

pub fn print_summary(summary: &RunSummary) {
    match summary.stop_reason {
        StopReason::Completed => eprintln!("{} Simulation completed", "Success:".green().bold()),
        StopReason::SchedulerTimeout => eprintln!(
            "{} Scheduler timeout, results are partial",
            "Warning:".yellow().bold()
        ),
        StopReason::Aborted => eprintln!(
            "{} Simulation aborted, results are partial",
            "Error:".red().bold()
        ),
    }
    eprintln!("{}", Table::new(rows(summary)));

    if !summary.rejections_by_reason.is_empty() {
        let rejections: Vec<RejectionRow> = summary
            .rejections_by_reason
            .iter()
            .map(|(reason, count)| RejectionRow {
                reason: reason.clone(),
                count: *count,
            })
            .collect();
        eprintln!("{}", Table::new(rejections));
    }
}

pub fn print_error(err: &dyn std::error::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);
}
