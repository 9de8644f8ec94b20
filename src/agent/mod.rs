//! Per-page automation agent
//!
//! Each open tab gets a [`PageAgent`]: an actor that owns the page and
//! executes requests from the controller. The message contract mirrors the
//! four actions of the page protocol — `FILL_FORM`, `DEBUG_TRANSACTION`,
//! `GET_TRANSACTION` (single response) and the `FORM_SUBMITTED` report sent
//! back on the shared report channel.
//!
//! One fill invocation walks the whole pipeline: select country, generate
//! data, apply overrides, fill fields, custom fields, sandbox DOM override,
//! optional consent checkbox, click verify, poll for the transaction id,
//! report. No step failure aborts the run; a case that cannot submit or
//! yields no token reports the [`token::NOT_FOUND`] sentinel.

pub mod data;
pub mod debug;
pub mod forms;
pub mod locator;
pub mod token;

use crate::driver::common::{poll_value, PollConfig};
use crate::driver::PageDriver;
use crate::store::{fields, KvStore};
use crate::utils::config::Pacing;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub use token::NOT_FOUND;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("verify control not found or not clickable")]
    SubmitNotFound,

    #[error("transaction id not detected within the budget")]
    TokenTimeout,

    #[error("page error: {0}")]
    Page(String),
}

/// Payload of a `FILL_FORM` request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillJob {
    pub run_id: String,
    pub test_case_number: u32,
    /// Override for the field under test; blank means "submit generated data"
    pub test_case_value: String,
    pub field_to_test: String,
    pub country: String,
    pub sandbox_field_key: String,
    pub sandbox_value: String,
    pub run_test_transaction: bool,
}

/// Requests a controller can send to a page agent
#[derive(Debug)]
pub enum AgentRequest {
    /// `FILL_FORM`: fire-and-forget fill + submit + token report
    FillForm(FillJob),
    /// `DEBUG_TRANSACTION`: inject a token into a debug page and look it up
    DebugTransaction { transaction_id: String },
    /// `GET_TRANSACTION`: re-poll the page for a token, single response
    GetTransaction {
        timeout: Duration,
        interval: Duration,
        reply: oneshot::Sender<String>,
    },
}

/// `FORM_SUBMITTED`: outcome of a fill job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub run_id: String,
    pub test_case_number: u32,
    pub test_case: String,
    pub field_tested: String,
    pub transaction_id: String,
}

impl SubmissionReport {
    pub fn has_token(&self) -> bool {
        !self.transaction_id.trim().is_empty() && self.transaction_id != NOT_FOUND
    }
}

/// Handle for talking to a spawned [`PageAgent`]
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentRequest>,
}

impl AgentHandle {
    pub async fn fill_form(&self, job: FillJob) -> Result<()> {
        self.tx
            .send(AgentRequest::FillForm(job))
            .await
            .map_err(|_| anyhow::anyhow!("page agent is gone"))
    }

    pub async fn debug_transaction(&self, transaction_id: &str) -> Result<()> {
        self.tx
            .send(AgentRequest::DebugTransaction {
                transaction_id: transaction_id.to_string(),
            })
            .await
            .map_err(|_| anyhow::anyhow!("page agent is gone"))
    }

    /// Ask the page for its transaction id again. Collapses every failure
    /// mode (agent gone, reply dropped, timeout) to the sentinel.
    pub async fn get_transaction(&self, timeout: Duration, interval: Duration) -> String {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .tx
            .send(AgentRequest::GetTransaction {
                timeout,
                interval,
                reply: reply_tx,
            })
            .await;
        if sent.is_err() {
            return NOT_FOUND.to_string();
        }
        // outer bound: the request may sit queued behind a fill job still
        // polling for its own token
        match tokio::time::timeout(timeout * 2, reply_rx).await {
            Ok(Ok(id)) => id,
            _ => NOT_FOUND.to_string(),
        }
    }
}

/// Actor owning one page
pub struct PageAgent {
    page: Arc<dyn PageDriver>,
    store: KvStore,
    pacing: Pacing,
    reports: mpsc::Sender<SubmissionReport>,
}

/// Spawn an agent for a page and return its handle
pub fn spawn(
    page: Arc<dyn PageDriver>,
    store: KvStore,
    pacing: Pacing,
    reports: mpsc::Sender<SubmissionReport>,
) -> AgentHandle {
    let (tx, rx) = mpsc::channel(8);
    let agent = PageAgent {
        page,
        store,
        pacing,
        reports,
    };
    tokio::spawn(agent.run(rx));
    AgentHandle { tx }
}

impl PageAgent {
    async fn run(self, mut rx: mpsc::Receiver<AgentRequest>) {
        while let Some(request) = rx.recv().await {
            match request {
                AgentRequest::FillForm(job) => self.handle_fill(job).await,
                AgentRequest::DebugTransaction { transaction_id } => {
                    if let Err(e) =
                        debug::debug_transaction(self.page.as_ref(), &self.pacing, &transaction_id)
                            .await
                    {
                        log::warn!("debug lookup failed: {e}");
                    }
                }
                AgentRequest::GetTransaction {
                    timeout,
                    interval,
                    reply,
                } => {
                    let poll = PollConfig::new(timeout, interval);
                    let outcome = match self.recheck_transaction(&poll).await {
                        Ok(id) => id,
                        Err(e) => {
                            log::debug!("transaction re-check: {e}");
                            NOT_FOUND.to_string()
                        }
                    };
                    let _ = reply.send(outcome);
                }
            }
        }
    }

    async fn handle_fill(&self, job: FillJob) {
        log::info!(
            "case {}: filling form (field {}, value {:?})",
            job.test_case_number,
            job.field_to_test,
            job.test_case_value
        );
        let transaction_id = match self.fill_and_submit(&job).await {
            Ok(id) => id,
            Err(e) => {
                log::error!("case {}: {e}", job.test_case_number);
                NOT_FOUND.to_string()
            }
        };
        let report = SubmissionReport {
            run_id: job.run_id.clone(),
            test_case_number: job.test_case_number,
            test_case: job.test_case_value.clone(),
            field_tested: job.field_to_test.clone(),
            transaction_id,
        };
        if self.reports.send(report).await.is_err() {
            log::warn!("controller is gone; submission report dropped");
        }
    }

    async fn fill_and_submit(&self, job: &FillJob) -> Result<String, AgentError> {
        let page = self.page.as_ref();
        let pacing = &self.pacing;

        // country first: the field set re-renders when it changes
        if let Err(e) = forms::select_country(page, pacing, &job.country).await {
            log::warn!("country selection failed: {e:#}");
        }
        tokio::time::sleep(pacing.country_settle).await;

        let mut form = data::generate(&self.store).await;
        log::debug!("case {}: generated data {form:?}", job.test_case_number);
        form.apply_sandbox(&job.sandbox_field_key, &job.sandbox_value);
        let explicit_case = form.apply_case_override(&job.field_to_test, &job.test_case_value);

        self.fill_text_fields(&form).await;
        self.fill_state_select(job, explicit_case).await;
        forms::set_field(
            page,
            data::builtin_selector("gender").unwrap_or_default(),
            "gender",
            &form.gender,
        )
        .await;

        self.fill_custom_fields().await;
        self.apply_sandbox_to_dom(&job.sandbox_field_key, &job.sandbox_value)
            .await;

        if job.run_test_transaction {
            tokio::time::sleep(pacing.checkbox_settle).await;
            forms::set_consent_checkbox(page, pacing).await;
        }

        tokio::time::sleep(pacing.pre_submit).await;
        if !forms::click_verify(page, pacing).await {
            return Err(AgentError::SubmitNotFound);
        }

        tokio::time::sleep(pacing.post_submit).await;
        let poll = PollConfig::new(pacing.token_timeout, pacing.token_interval);
        Ok(token::extract_transaction_id(page, &poll).await)
    }

    async fn fill_text_fields(&self, form: &data::FormData) {
        let page = self.page.as_ref();
        let fields: [(&str, &str); 12] = [
            ("firstName", &form.first_name),
            ("lastName", &form.last_name),
            ("day", &form.day),
            ("month", &form.month),
            ("year", &form.year),
            ("houseNumber", &form.house_number),
            ("streetName", &form.street_name),
            ("city", &form.city),
            ("postalCode", &form.postal_code),
            ("telephone", &form.telephone),
            ("cellNumber", &form.cell_number),
            ("email", &form.email),
        ];
        for (key, value) in fields {
            if let Some(selector) = data::builtin_selector(key) {
                forms::set_field(page, selector, key, value).await;
            }
        }
    }

    /// State/Province is a select whose options vary by country, so it is
    /// picked from the live DOM instead of the generated value.
    async fn fill_state_select(&self, job: &FillJob, explicit_case: bool) {
        let page = self.page.as_ref();
        let selector = data::builtin_selector("state").unwrap_or_default();
        if job.field_to_test == "StateProvince" {
            if explicit_case {
                forms::set_field(page, selector, "state", job.test_case_value.trim()).await;
            } else {
                log::warn!(
                    "case {}: no explicit State/Province; using a random option",
                    job.test_case_number
                );
                forms::set_select_random(page, selector).await;
            }
        } else {
            forms::set_select_random(page, selector).await;
        }
    }

    /// Fill user-defined fields with a random value from their stored lists
    async fn fill_custom_fields(&self) {
        let custom = fields::load_custom_fields(&self.store).await;
        if custom.is_empty() {
            return;
        }
        let page = self.page.as_ref();
        for (key, meta) in custom {
            if meta.selector.is_empty() {
                continue;
            }
            let value = fields::random_value(&self.store, &key, "").await;
            if value.is_empty() {
                continue;
            }
            let value = data::resolve_value(&value);
            if !forms::set_field(page, &meta.selector, &meta.label, &value).await {
                log::warn!("custom field target not found for \"{}\"", meta.label);
            }
        }
    }

    /// Force the sandbox field on the actual DOM, overriding any earlier
    /// random fill of the same control.
    async fn apply_sandbox_to_dom(&self, field_key: &str, value: &str) {
        if field_key.is_empty() {
            return;
        }
        let page = self.page.as_ref();
        if let Some(selector) = data::builtin_selector(field_key) {
            forms::set_field(page, selector, field_key, value).await;
            return;
        }
        let custom = fields::load_custom_fields(&self.store).await;
        if let Some(meta) = custom.get(field_key) {
            if !meta.selector.is_empty()
                && forms::set_field(page, &meta.selector, &meta.label, value).await
            {
                return;
            }
        }
        // last resort: treat the key itself as an id / label hint
        forms::set_field(page, &format!("#{field_key}"), field_key, value).await;
    }

    async fn recheck_transaction(&self, poll: &PollConfig) -> Result<String, AgentError> {
        let page = self.page.as_ref();
        match poll_value(|| token::try_extract_once(page), poll).await {
            Some(id) => Ok(id),
            None => Err(AgentError::TokenTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Scripted page: answers eval calls by JS content and records them
    struct FakePage {
        calls: Mutex<Vec<String>>,
        respond: fn(&str) -> Value,
    }

    impl FakePage {
        fn new(respond: fn(&str) -> Value) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageDriver for FakePage {
        async fn goto(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn eval(&self, js: &str) -> Result<Value> {
            self.calls.lock().unwrap().push(js.to_string());
            Ok((self.respond)(js))
        }
    }

    /// A cooperative page: everything succeeds and the token shows up
    fn happy_responder(js: &str) -> Value {
        if js.contains("country-picker") {
            json!("selected")
        } else if js.contains("matchButton") {
            json!("clicked")
        } else if js.contains("span.label") {
            json!("TXN-0123456789ABCDEFGHIJ")
        } else if js.contains("innerText") {
            json!("")
        } else {
            json!(true)
        }
    }

    /// No verify control anywhere, and no form to fall back to
    fn no_submit_responder(js: &str) -> Value {
        if js.contains("country-picker") {
            json!("selected")
        } else if js.contains("matchButton") {
            json!("missing")
        } else if js.contains("requestSubmit") {
            json!(false)
        } else if js.contains("span.label") || js.contains("innerText") {
            json!(Value::Null)
        } else {
            json!(true)
        }
    }

    /// Page that never shows a transaction id
    fn tokenless_responder(js: &str) -> Value {
        if js.contains("span.label") {
            Value::Null
        } else if js.contains("innerText") {
            json!("nothing to see")
        } else if js.contains("country-picker") {
            json!("selected")
        } else if js.contains("matchButton") {
            json!("clicked")
        } else {
            json!(true)
        }
    }

    fn seeded_store(dir: &tempfile::TempDir) -> KvStore {
        KvStore::new(dir.path().join("store.json"))
    }

    fn job(case: u32, value: &str) -> FillJob {
        FillJob {
            run_id: "run_test".to_string(),
            test_case_number: case,
            test_case_value: value.to_string(),
            field_to_test: "PostalCode".to_string(),
            country: "Netherlands".to_string(),
            sandbox_field_key: String::new(),
            sandbox_value: String::new(),
            run_test_transaction: false,
        }
    }

    #[tokio::test]
    async fn fill_reports_extracted_token() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new(happy_responder);
        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn(page.clone(), seeded_store(&dir), Pacing::fast(), tx);

        handle.fill_form(job(1, "")).await.unwrap();
        let report = rx.recv().await.unwrap();
        assert_eq!(report.test_case_number, 1);
        assert_eq!(report.transaction_id, "TXN-0123456789ABCDEFGHIJ");
        assert!(report.has_token());
    }

    #[tokio::test]
    async fn explicit_case_value_reaches_the_tested_field() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new(happy_responder);
        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn(page.clone(), seeded_store(&dir), Pacing::fast(), tx);

        handle.fill_form(job(2, "BADVALUE")).await.unwrap();
        rx.recv().await.unwrap();

        let postal_fill = page
            .calls()
            .into_iter()
            .find(|js| js.contains("textarea-field-PostalCode"))
            .expect("postal code fill script");
        assert!(postal_fill.contains("\"BADVALUE\""));
    }

    #[tokio::test]
    async fn blank_case_value_submits_generated_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        // pin the generated postal code to a single known value
        let mut values = fields::FieldValues::new();
        values.insert("postalCode".to_string(), vec!["9999ZZ".to_string()]);
        store.set(keys::FIELD_VALUES, &values).await;

        let page = FakePage::new(happy_responder);
        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn(page.clone(), store, Pacing::fast(), tx);

        handle.fill_form(job(1, "")).await.unwrap();
        rx.recv().await.unwrap();

        let postal_fill = page
            .calls()
            .into_iter()
            .find(|js| js.contains("textarea-field-PostalCode"))
            .expect("postal code fill script");
        assert!(postal_fill.contains("\"9999ZZ\""));
    }

    #[tokio::test]
    async fn missing_submit_reports_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new(no_submit_responder);
        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn(page.clone(), seeded_store(&dir), Pacing::fast(), tx);

        handle.fill_form(job(3, "x")).await.unwrap();
        let report = rx.recv().await.unwrap();
        assert_eq!(report.transaction_id, NOT_FOUND);
        assert!(!report.has_token());
        // extraction never ran: submit failure short-circuits
        assert!(!page.calls().iter().any(|js| js.contains("span.label")));
    }

    #[tokio::test]
    async fn token_timeout_reports_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new(tokenless_responder);
        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn(page.clone(), seeded_store(&dir), Pacing::fast(), tx);

        handle.fill_form(job(4, "")).await.unwrap();
        let report = rx.recv().await.unwrap();
        assert_eq!(report.transaction_id, NOT_FOUND);
    }

    #[tokio::test]
    async fn get_transaction_collapses_timeout_to_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new(tokenless_responder);
        let (tx, _rx) = mpsc::channel(8);
        let handle = spawn(page, seeded_store(&dir), Pacing::fast(), tx);

        let got = handle
            .get_transaction(Duration::from_millis(30), Duration::from_millis(10))
            .await;
        assert_eq!(got, NOT_FOUND);
    }

    #[tokio::test]
    async fn get_transaction_returns_live_token() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new(happy_responder);
        let (tx, _rx) = mpsc::channel(8);
        let handle = spawn(page, seeded_store(&dir), Pacing::fast(), tx);

        let got = handle
            .get_transaction(Duration::from_millis(100), Duration::from_millis(10))
            .await;
        assert_eq!(got, "TXN-0123456789ABCDEFGHIJ");
    }
}
