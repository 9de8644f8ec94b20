//! Run orchestration
//!
//! The controller owns the browser session and the run state. It opens the
//! five form tabs strictly sequentially with pacing delays, hands each page
//! to its agent as fire-and-forget work, then joins the fan-out with a drain
//! wait, a reconciliation re-poll for the stragglers, and the debug replay.
//! A failed case never aborts the run; it ends as a sentinel entry.

pub mod events;
pub mod run;

use crate::agent::{self, AgentHandle, FillJob, SubmissionReport, NOT_FOUND};
use crate::driver::web::{TabId, WebSession};
use crate::store::{keys, KvStore};
use crate::utils::config::Pacing;
use anyhow::Result;
use events::{ConsoleRunListener, EventEmitter, RunEvent, RunSummary};
use run::{push_history, update_history, ResultEntry, RunConfig, RunRecord, TabMap, CASE_COUNT};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct Controller {
    session: WebSession,
    store: KvStore,
    pacing: Pacing,
    emitter: EventEmitter,
    reports_tx: mpsc::Sender<SubmissionReport>,
    reports_rx: mpsc::Receiver<SubmissionReport>,
    agents: HashMap<TabId, AgentHandle>,
    form_tabs: TabMap,
    debug_tabs: TabMap,
}

impl Controller {
    pub fn new(session: WebSession, store: KvStore, pacing: Pacing) -> Self {
        let (reports_tx, reports_rx) = mpsc::channel(32);
        let (emitter, receiver) = EventEmitter::new();
        tokio::spawn(ConsoleRunListener::listen(receiver));

        Self {
            session,
            store,
            pacing,
            emitter,
            reports_tx,
            reports_rx,
            agents: HashMap::new(),
            form_tabs: TabMap::new(),
            debug_tabs: TabMap::new(),
        }
    }

    /// Execute one full run: launch, drain, reconcile, debug replay
    pub async fn start_run(&mut self, config: RunConfig) -> Result<RunRecord> {
        // clear prior in-memory and persisted correlation state
        self.agents.clear();
        self.form_tabs.clear();
        self.debug_tabs.clear();
        clear_correlation_state(&self.store).await;
        while self.reports_rx.try_recv().is_ok() {}

        let mut record = RunRecord::new(&config);
        self.emitter.emit(RunEvent::RunStarted {
            run_id: record.run_id.clone(),
        });
        log::info!("run {} started", record.run_id);
        self.store.set(keys::RUN_CURRENT, &record).await;
        let mut history = self
            .store
            .get::<Vec<RunRecord>>(keys::RUN_HISTORY)
            .await
            .unwrap_or_default();
        push_history(&mut history, record.clone());
        self.store.set(keys::RUN_HISTORY, &history).await;

        // open form tabs sequentially; pacing keeps the target site happy
        for case_number in 1..=CASE_COUNT as u32 {
            if let Err(e) = self.launch_case(&config, &record.run_id, case_number).await {
                log::error!("failed to launch case #{case_number}: {e:#}");
                self.emitter.emit(RunEvent::CaseFailed {
                    case_number,
                    error: format!("{e:#}"),
                });
            }
            if (case_number as usize) < CASE_COUNT {
                tokio::time::sleep(self.pacing.tab_open_interval).await;
            }
        }

        self.emitter.emit(RunEvent::Draining {
            wait_ms: self.pacing.drain_wait.as_millis() as u64,
        });
        let drain_wait = self.pacing.drain_wait;
        self.drain_reports(&mut record, drain_wait, false).await;

        self.reconcile(&mut record).await;
        self.debug_replay(&config, &mut record).await;

        // grace window for stragglers and deferred debug fills
        let linger = self.pacing.linger_wait;
        self.drain_reports(&mut record, linger, true).await;

        self.persist_record(&record).await;
        let summary = RunSummary {
            run_id: record.run_id.clone(),
            total_cases: CASE_COUNT as u32,
            tokens_found: record.tokens_found() as u32,
            not_found: (record.results.len() - record.tokens_found()) as u32,
        };
        self.emitter.emit(RunEvent::RunFinished { summary });
        // let the console listener flush before the process moves on
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(record)
    }

    async fn launch_case(
        &mut self,
        config: &RunConfig,
        run_id: &str,
        case_number: u32,
    ) -> Result<()> {
        let tab = self.session.open_tab(&config.interface_url).await?;
        tokio::time::sleep(self.pacing.page_settle).await;

        let handle = agent::spawn(
            tab.clone(),
            self.store.clone(),
            self.pacing.clone(),
            self.reports_tx.clone(),
        );
        handle
            .fill_form(FillJob {
                run_id: run_id.to_string(),
                test_case_number: case_number,
                test_case_value: config.case_value(case_number).to_string(),
                field_to_test: config.field_to_test.clone(),
                country: config.country.clone(),
                sandbox_field_key: config.sandbox_field_key.clone(),
                sandbox_value: config.sandbox_value.clone(),
                run_test_transaction: config.run_test_transaction,
            })
            .await?;

        self.agents.insert(tab.id(), handle);
        self.form_tabs.insert(case_number, tab.id());
        self.store
            .set(keys::FORM_TABS_BY_CASE, &self.form_tabs)
            .await;
        self.emitter.emit(RunEvent::CaseLaunched {
            case_number,
            tab: tab.id(),
        });
        Ok(())
    }

    /// Consume submission reports until the budget elapses
    async fn drain_reports(&mut self, record: &mut RunRecord, budget: Duration, late: bool) {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            let report = tokio::select! {
                r = self.reports_rx.recv() => match r {
                    Some(r) => r,
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => break,
            };
            self.handle_report(record, report, late).await;
        }
    }

    /// Consume whatever reports are already queued, without waiting
    async fn drain_pending(&mut self, record: &mut RunRecord) {
        while let Ok(report) = self.reports_rx.try_recv() {
            self.handle_report(record, report, true).await;
        }
    }

    async fn handle_report(&mut self, record: &mut RunRecord, report: SubmissionReport, late: bool) {
        if report.run_id != record.run_id {
            log::debug!(
                "dropping report for stale run {} (case #{})",
                report.run_id,
                report.test_case_number
            );
            return;
        }
        if !report.has_token() {
            // sentinel reports are not recorded here; reconciliation decides
            log::warn!(
                "case #{}: no usable transaction id reported",
                report.test_case_number
            );
            return;
        }

        let entry = ResultEntry {
            test_case: report.test_case.clone(),
            test_case_number: report.test_case_number,
            transaction_id: report.transaction_id.clone(),
            field_tested: report.field_tested.clone(),
        };
        if record.push_result(entry) {
            self.persist_record(record).await;
            self.emitter.emit(RunEvent::CaseRecorded {
                case_number: report.test_case_number,
                transaction_id: report.transaction_id.clone(),
                late,
            });
        } else {
            log::debug!(
                "case #{}: result already recorded, keeping the first",
                report.test_case_number
            );
        }

        self.deferred_debug_fill(report.test_case_number, &report.transaction_id)
            .await;
    }

    /// If a debug tab was opened for this case before its token arrived,
    /// inject the token now and consume the mapping (one-shot).
    async fn deferred_debug_fill(&mut self, case_number: u32, transaction_id: &str) {
        // pick up mappings persisted by a previous process
        if let Some(map) = self.store.get::<TabMap>(keys::DEBUG_TABS_BY_CASE).await {
            self.debug_tabs = map;
        }
        let Some(&tab_id) = self.debug_tabs.get(&case_number) else {
            return;
        };

        match self.agent_for(tab_id).await {
            Some(handle) => {
                if let Err(e) = handle.debug_transaction(transaction_id).await {
                    log::warn!("deferred debug lookup failed for case #{case_number}: {e:#}");
                } else {
                    self.emitter
                        .emit(RunEvent::DeferredDebugFilled { case_number });
                }
            }
            None => log::warn!(
                "debug tab {tab_id} for case #{case_number} is gone; dropping the mapping"
            ),
        }

        self.debug_tabs.remove(&case_number);
        self.store
            .set(keys::DEBUG_TABS_BY_CASE, &self.debug_tabs)
            .await;
    }

    /// Resolve the agent for a tab, spawning one for pages adopted from a
    /// reattached browser.
    async fn agent_for(&mut self, tab_id: TabId) -> Option<AgentHandle> {
        if let Some(handle) = self.agents.get(&tab_id) {
            return Some(handle.clone());
        }
        let tab = self.session.tab(tab_id).await?;
        let handle = agent::spawn(
            tab,
            self.store.clone(),
            self.pacing.clone(),
            self.reports_tx.clone(),
        );
        self.agents.insert(tab_id, handle.clone());
        Some(handle)
    }

    /// Re-query the form tabs of every case still lacking a result; cases
    /// that stay empty are closed out with the sentinel.
    async fn reconcile(&mut self, record: &mut RunRecord) {
        if let Some(map) = self.store.get::<TabMap>(keys::FORM_TABS_BY_CASE).await {
            for (case, tab) in map {
                self.form_tabs.entry(case).or_insert(tab);
            }
        }

        self.drain_pending(record).await;
        let missing: Vec<u32> = (1..=CASE_COUNT as u32)
            .filter(|n| record.result_for(*n).is_none())
            .collect();
        if missing.is_empty() {
            return;
        }
        self.emitter.emit(RunEvent::ReconcileStarted {
            missing: missing.clone(),
        });

        for case_number in missing {
            self.drain_pending(record).await;
            if record.result_for(case_number).is_some() {
                continue;
            }

            let transaction_id = match self.form_tabs.get(&case_number).copied() {
                Some(tab_id) => match self.agent_for(tab_id).await {
                    Some(handle) => {
                        handle
                            .get_transaction(
                                self.pacing.recheck_timeout,
                                self.pacing.recheck_interval,
                            )
                            .await
                    }
                    None => NOT_FOUND.to_string(),
                },
                None => NOT_FOUND.to_string(),
            };

            let entry = ResultEntry {
                test_case: record
                    .test_cases
                    .get(case_number as usize - 1)
                    .cloned()
                    .unwrap_or_default(),
                test_case_number: case_number,
                transaction_id: transaction_id.clone(),
                field_tested: record.field_to_test.clone(),
            };
            let found = entry.has_token();
            if record.push_result(entry) && found {
                log::info!("retrieved late transaction id for case #{case_number}: {transaction_id}");
                self.emitter.emit(RunEvent::CaseRecorded {
                    case_number,
                    transaction_id,
                    late: true,
                });
            } else if !found {
                log::warn!("still no transaction id for case #{case_number} after re-check");
            }
            self.persist_record(record).await;
        }
    }

    /// Open one debug tab per case; with a token in hand trigger the lookup,
    /// otherwise remember the tab for deferred fill-in.
    async fn debug_replay(&mut self, config: &RunConfig, record: &mut RunRecord) {
        log::info!("opening debug tabs at {}", config.debug_url);
        for case_number in 1..=CASE_COUNT as u32 {
            self.drain_pending(record).await;
            let token = record
                .result_for(case_number)
                .filter(|e| e.has_token())
                .map(|e| e.transaction_id.clone());

            let tab = match self.session.open_tab(&config.debug_url).await {
                Ok(tab) => tab,
                Err(e) => {
                    log::error!("failed to open debug tab for case #{case_number}: {e:#}");
                    continue;
                }
            };
            tokio::time::sleep(self.pacing.page_settle).await;

            let handle = agent::spawn(
                tab.clone(),
                self.store.clone(),
                self.pacing.clone(),
                self.reports_tx.clone(),
            );
            self.agents.insert(tab.id(), handle.clone());

            match token {
                Some(transaction_id) => {
                    self.emitter.emit(RunEvent::DebugOpened {
                        case_number,
                        has_token: true,
                    });
                    if let Err(e) = handle.debug_transaction(&transaction_id).await {
                        log::warn!("debug lookup failed for case #{case_number}: {e:#}");
                    }
                }
                None => {
                    self.emitter.emit(RunEvent::DebugOpened {
                        case_number,
                        has_token: false,
                    });
                    self.debug_tabs.insert(case_number, tab.id());
                    self.store
                        .set(keys::DEBUG_TABS_BY_CASE, &self.debug_tabs)
                        .await;
                }
            }
        }
    }

    /// Write the record back as the current run and into its history slot
    async fn persist_record(&self, record: &RunRecord) {
        self.store.set(keys::RUN_CURRENT, record).await;
        let mut history = self
            .store
            .get::<Vec<RunRecord>>(keys::RUN_HISTORY)
            .await
            .unwrap_or_default();
        update_history(&mut history, record);
        self.store.set(keys::RUN_HISTORY, &history).await;
    }
}

/// Drop both persisted tab-correlation maps (start-of-run reset)
pub async fn clear_correlation_state(store: &KvStore) {
    store.remove(keys::FORM_TABS_BY_CASE).await;
    store.remove(keys::DEBUG_TABS_BY_CASE).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn correlation_state_is_cleared_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path().join("store.json"));

        let mut stale = TabMap::new();
        stale.insert(2, 7);
        store.set(keys::FORM_TABS_BY_CASE, &stale).await;
        store.set(keys::DEBUG_TABS_BY_CASE, &stale).await;

        clear_correlation_state(&store).await;
        assert!(store.get::<TabMap>(keys::FORM_TABS_BY_CASE).await.is_none());
        assert!(store.get::<TabMap>(keys::DEBUG_TABS_BY_CASE).await.is_none());
    }

    #[test]
    fn tab_maps_serialize_with_string_keys() {
        // the persisted shape must match a JSON object of case -> tab id
        let mut map = TabMap::new();
        map.insert(1, 4);
        map.insert(3, 9);
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json, serde_json::json!({"1": 4, "3": 9}));
        let back: TabMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }
}
