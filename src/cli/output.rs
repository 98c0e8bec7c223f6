//! Output formatting for CLI results.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::rl::training::{AgentCheckpoint, EvaluationReport, TrainingSummary};

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// One labelled value
#[derive(Debug, Serialize, Tabled)]
pub struct MetricRow {
    pub metric: String,
    pub value: String,
}

impl MetricRow {
    fn new(metric: &str, value: impl ToString) -> Self {
        Self {
            metric: metric.to_string(),
            value: value.to_string(),
        }
    }
}

/// Per-episode row of a training run
#[derive(Debug, Serialize, Tabled)]
pub struct EpisodeRow {
    pub episode: usize,
    pub portfolio_value: String,
    pub epsilon: String,
    pub reward: String,
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                let table = Table::new(items).to_string();
                println!("{table}");
            }
        }
        OutputMode::Json => {
            let json = serde_json::to_string_pretty(items)?;
            println!("{json}");
        }
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

pub fn summary_rows(summary: &TrainingSummary) -> Vec<MetricRow> {
    vec![
        MetricRow::new("Episodes completed", summary.num_episodes),
        MetricRow::new("Interrupted", yes_no(summary.interrupted)),
        MetricRow::new("Last portfolio value", format!("{:.2}", summary.last_final_value)),
        MetricRow::new("Best portfolio value", format!("{:.2}", summary.best_final_value)),
        MetricRow::new("Average portfolio value", format!("{:.2}", summary.avg_final_value)),
        MetricRow::new("Final epsilon", format!("{:.4}", summary.final_epsilon)),
        MetricRow::new("Final checkpoint saved", yes_no(summary.final_checkpoint_saved)),
        MetricRow::new("Checkpoint failures", summary.checkpoint_failures),
    ]
}

pub fn episode_rows(summary: &TrainingSummary) -> Vec<EpisodeRow> {
    summary
        .episodes
        .iter()
        .map(|m| EpisodeRow {
            episode: m.episode,
            portfolio_value: format!("{:.2}", m.final_portfolio_value),
            epsilon: format!("{:.2}", m.epsilon),
            reward: format!("{:.2}", m.total_reward),
        })
        .collect()
}

pub fn report_rows(report: &EvaluationReport) -> Vec<MetricRow> {
    vec![
        MetricRow::new("Starting balance", format!("{:.2}", report.starting_balance)),
        MetricRow::new("Agent portfolio value", format!("{:.2}", report.final_portfolio_value)),
        MetricRow::new("Agent return", format!("{:+.2}%", report.agent_return_pct)),
        MetricRow::new("Buy & hold value", format!("{:.2}", report.buy_and_hold_value)),
        MetricRow::new("Buy & hold return", format!("{:+.2}%", report.buy_and_hold_return_pct)),
        MetricRow::new(
            "Actions (buy/sell/hold)",
            format!("{}/{}/{}", report.buy_count, report.sell_count, report.hold_count),
        ),
        MetricRow::new("Beat buy & hold", yes_no(report.beat_buy_and_hold)),
    ]
}

pub fn checkpoint_rows(checkpoint: &AgentCheckpoint) -> Vec<MetricRow> {
    let layers: Vec<String> = std::iter::once(checkpoint.network.input_dim)
        .chain(checkpoint.network.layers.iter().map(|l| l.out_dim()))
        .map(|d| d.to_string())
        .collect();

    vec![
        MetricRow::new("Format version", checkpoint.version),
        MetricRow::new("Saved at", checkpoint.saved_at.to_rfc3339()),
        MetricRow::new("Episodes trained", checkpoint.episodes_trained),
        MetricRow::new("Epsilon at save", format!("{:.4}", checkpoint.epsilon_at_save)),
        MetricRow::new("Network", layers.join(" -> ")),
        MetricRow::new("Scaler stored", yes_no(checkpoint.scaler.is_some())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_rows() {
        let report = EvaluationReport {
            starting_balance: 100_000.0,
            final_portfolio_value: 101_000.0,
            agent_return_pct: 1.0,
            buy_and_hold_value: 99_000.0,
            buy_and_hold_return_pct: -1.0,
            buy_count: 2,
            sell_count: 1,
            hold_count: 7,
            beat_buy_and_hold: true,
            actions: Vec::new(),
        };
        let rows = report_rows(&report);
        assert_eq!(rows[2].value, "+1.00%");
        assert_eq!(rows[4].value, "-1.00%");
        assert_eq!(rows[5].value, "2/1/7");
        assert_eq!(rows[6].value, "yes");

        let table = Table::new(&rows).to_string();
        assert!(table.contains("Beat buy & hold"));
    }
}
