//! Run progress events and the console listener

use crate::driver::TabId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::run::CASE_COUNT;

/// Events emitted while a run progresses
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
    },
    CaseLaunched {
        case_number: u32,
        tab: TabId,
    },
    CaseFailed {
        case_number: u32,
        error: String,
    },
    Draining {
        wait_ms: u64,
    },
    CaseRecorded {
        case_number: u32,
        transaction_id: String,
        late: bool,
    },
    ReconcileStarted {
        missing: Vec<u32>,
    },
    DebugOpened {
        case_number: u32,
        has_token: bool,
    },
    DeferredDebugFilled {
        case_number: u32,
    },
    RunFinished {
        summary: RunSummary,
    },
    Log {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub total_cases: u32,
    pub tokens_found: u32,
    pub not_found: u32,
}

/// Broadcast emitter for run events
pub struct EventEmitter {
    sender: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<RunEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Console listener printing real-time run progress
pub struct ConsoleRunListener;

impl ConsoleRunListener {
    pub async fn listen(mut receiver: broadcast::Receiver<RunEvent>) {
        let mut launch_bar: Option<ProgressBar> = None;

        while let Ok(event) = receiver.recv().await {
            match event {
                RunEvent::RunStarted { run_id } => {
                    println!("\n{} Run started: {}", "▶".green().bold(), run_id.cyan());
                }

                RunEvent::CaseLaunched { case_number, tab } => {
                    let bar = launch_bar.get_or_insert_with(|| {
                        let bar = ProgressBar::new(CASE_COUNT as u64);
                        bar.set_style(
                            ProgressStyle::default_bar()
                                .template("  {bar:20.cyan/blue} {pos}/{len} {msg}")
                                .unwrap_or_else(|_| ProgressStyle::default_bar()),
                        );
                        bar
                    });
                    bar.set_message(format!("case #{case_number} launched (tab {tab})"));
                    bar.inc(1);
                }

                RunEvent::CaseFailed { case_number, error } => {
                    println!("  {} case #{case_number}: {error}", "✗".red());
                }

                RunEvent::Draining { wait_ms } => {
                    if let Some(bar) = launch_bar.take() {
                        bar.finish_and_clear();
                    }
                    println!(
                        "  {} all form tabs open; waiting {}s for submissions",
                        "⏳".yellow(),
                        wait_ms / 1000
                    );
                }

                RunEvent::CaseRecorded {
                    case_number,
                    transaction_id,
                    late,
                } => {
                    let suffix = if late { " (late)".dimmed().to_string() } else { String::new() };
                    println!(
                        "  {} case #{case_number} → {}{suffix}",
                        "✓".green(),
                        transaction_id.cyan()
                    );
                }

                RunEvent::ReconcileStarted { missing } => {
                    let cases: Vec<String> = missing.iter().map(|n| format!("#{n}")).collect();
                    println!(
                        "  {} re-checking form tabs for cases {}",
                        "↻".yellow(),
                        cases.join(", ")
                    );
                }

                RunEvent::DebugOpened {
                    case_number,
                    has_token,
                } => {
                    if has_token {
                        println!("  {} debug lookup for case #{case_number}", "🔍".blue());
                    } else {
                        println!(
                            "  {} debug tab for case #{case_number} opened without lookup (will fill when available)",
                            "⚠".yellow()
                        );
                    }
                }

                RunEvent::DeferredDebugFilled { case_number } => {
                    println!(
                        "  {} late transaction id injected into debug tab for case #{case_number}",
                        "✓".green()
                    );
                }

                RunEvent::RunFinished { summary } => {
                    if let Some(bar) = launch_bar.take() {
                        bar.finish_and_clear();
                    }
                    println!("\n{} Run finished: {}", "■".blue().bold(), summary.run_id);
                    println!(
                        "  {} token(s) found, {} not found, {} case(s)",
                        summary.tokens_found.to_string().green(),
                        summary.not_found.to_string().red(),
                        summary.total_cases
                    );
                }

                RunEvent::Log { message } => {
                    println!("      {message}");
                }
            }
        }
    }
}
