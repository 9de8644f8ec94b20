use std::time::Duration;

/// Pacing configuration for a run
///
/// The target site gives no readiness signal for most of its re-renders, so
/// the orchestration interleaves real waits (navigation, element visibility)
/// with fixed settle delays. All of them live here so a slow deployment can
/// be accommodated without touching the flow code.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Delay between opening successive form tabs
    pub tab_open_interval: Duration,

    /// Settle delay after a page reports load-complete
    pub page_settle: Duration,

    /// How long to wait for in-flight submissions after all tabs are open
    pub drain_wait: Duration,

    /// Grace window after debug replay for late submission reports
    pub linger_wait: Duration,

    /// Settle delay after the country changes (page re-renders its fields)
    pub country_settle: Duration,

    /// Wait for the country picker modal to appear after clicking
    pub picker_wait: Duration,

    /// Wait for the selection to apply and the modal to close
    pub picker_apply: Duration,

    /// Settle delay before touching the consent checkbox
    pub checkbox_settle: Duration,

    /// Wait before re-checking the checkbox state after a click
    pub checkbox_verify: Duration,

    /// Pause between form fill and the verify click
    pub pre_submit: Duration,

    /// Pause after the verify click before token extraction starts
    pub post_submit: Duration,

    /// Total budget for the verify control to appear and become clickable
    pub submit_timeout: Duration,

    /// Poll interval while waiting for the verify control
    pub submit_poll: Duration,

    /// Total budget for the transaction id to appear on the page
    pub token_timeout: Duration,

    /// Poll interval for token extraction
    pub token_interval: Duration,

    /// Token budget when re-querying a form tab during reconciliation
    pub recheck_timeout: Duration,

    /// Poll interval during reconciliation re-query
    pub recheck_interval: Duration,

    /// Settle delay after a debug page loads, before locating its input
    pub debug_settle: Duration,

    /// Pause between filling the debug input and clicking Lookup
    pub lookup_click_delay: Duration,

    /// Wait for lookup results to render before expanding sections
    pub post_lookup_wait: Duration,

    /// Attempts per result section when expanding
    pub expand_attempts: u32,

    /// Pause between expansion attempts
    pub expand_interval: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            tab_open_interval: Duration::from_millis(2000),
            page_settle: Duration::from_millis(1000),
            drain_wait: Duration::from_millis(10_000),
            linger_wait: Duration::from_millis(10_000),
            country_settle: Duration::from_millis(2000),
            picker_wait: Duration::from_millis(1500),
            picker_apply: Duration::from_millis(2000),
            checkbox_settle: Duration::from_millis(1500),
            checkbox_verify: Duration::from_millis(300),
            pre_submit: Duration::from_millis(1000),
            post_submit: Duration::from_millis(2000),
            submit_timeout: Duration::from_millis(8000),
            submit_poll: Duration::from_millis(250),
            token_timeout: Duration::from_millis(30_000),
            token_interval: Duration::from_millis(800),
            recheck_timeout: Duration::from_millis(20_000),
            recheck_interval: Duration::from_millis(800),
            debug_settle: Duration::from_millis(1000),
            lookup_click_delay: Duration::from_millis(1000),
            post_lookup_wait: Duration::from_millis(5000),
            expand_attempts: 4,
            expand_interval: Duration::from_millis(350),
        }
    }
}

impl Pacing {
    /// A compressed schedule for tests and dry runs
    pub fn fast() -> Self {
        Self {
            tab_open_interval: Duration::from_millis(10),
            page_settle: Duration::from_millis(5),
            drain_wait: Duration::from_millis(50),
            linger_wait: Duration::from_millis(50),
            country_settle: Duration::from_millis(5),
            picker_wait: Duration::from_millis(5),
            picker_apply: Duration::from_millis(5),
            checkbox_settle: Duration::from_millis(5),
            checkbox_verify: Duration::from_millis(5),
            pre_submit: Duration::from_millis(5),
            post_submit: Duration::from_millis(5),
            submit_timeout: Duration::from_millis(40),
            submit_poll: Duration::from_millis(10),
            token_timeout: Duration::from_millis(60),
            token_interval: Duration::from_millis(10),
            recheck_timeout: Duration::from_millis(40),
            recheck_interval: Duration::from_millis(10),
            debug_settle: Duration::from_millis(5),
            lookup_click_delay: Duration::from_millis(5),
            post_lookup_wait: Duration::from_millis(5),
            expand_attempts: 2,
            expand_interval: Duration::from_millis(5),
        }
    }
}
