//! Browser session driven through Playwright
//!
//! One [`WebSession`] owns the browser and its context; every "tab" of the
//! orchestration is a Playwright page addressed by a [`TabId`] (its creation
//! index within the context). In persistent mode the session connects to an
//! already-running browser over CDP and adopts its pages, which is what lets
//! the persisted tab-correlation maps survive a process restart.

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use playwright::api::{Browser, BrowserContext, Page, Viewport};
use playwright::Playwright;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Creation index of a page within the browser context
pub type TabId = u32;

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub headless: bool,
    /// CDP endpoint of an existing browser (e.g. http://localhost:9222)
    pub cdp_endpoint: Option<String>,
    /// Leave the browser running when the session is dropped
    pub keep_browser: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for WebConfig {
    fn default() -> Self {
        let headless = std::env::var("TXPROBE_HEADLESS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let cdp_endpoint = std::env::var("TXPROBE_CDP_ENDPOINT").ok();

        Self {
            headless,
            cdp_endpoint,
            keep_browser: false,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

/// The page-level operations the agent needs. A trait seam so agent logic
/// can run against a scripted page in tests.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for the load event
    async fn goto(&self, url: &str) -> Result<()>;

    /// Evaluate a JS function expression, returning its JSON value
    async fn eval(&self, js: &str) -> Result<serde_json::Value>;
}

/// One open page
pub struct Tab {
    id: TabId,
    page: Mutex<Page>,
}

impl Tab {
    pub fn id(&self) -> TabId {
        self.id
    }
}

#[async_trait]
impl PageDriver for Tab {
    async fn goto(&self, url: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.goto_builder(url)
            .goto()
            .await
            .with_context(|| format!("failed to navigate tab {} to {url}", self.id))?;
        Ok(())
    }

    async fn eval(&self, js: &str) -> Result<serde_json::Value> {
        let page = self.page.lock().await;
        let value: serde_json::Value = page
            .evaluate(js, ())
            .await
            .with_context(|| format!("script evaluation failed in tab {}", self.id))?;
        Ok(value)
    }
}

/// Browser session owning the context and its tabs
pub struct WebSession {
    #[allow(dead_code)]
    playwright: Playwright,
    #[allow(dead_code)]
    browser: Browser,
    context: BrowserContext,
    config: WebConfig,
    tabs: Mutex<Vec<Arc<Tab>>>,
}

impl WebSession {
    pub async fn launch(config: WebConfig) -> Result<Self> {
        let playwright = Playwright::initialize()
            .await
            .context("failed to initialize Playwright")?;
        let chromium = playwright.chromium();

        let browser = if let Some(ref endpoint) = config.cdp_endpoint {
            println!("{} Connecting to browser at {}", "🔌".blue(), endpoint);
            match chromium
                .connect_over_cdp_builder(endpoint)
                .connect_over_cdp()
                .await
            {
                Ok(b) => {
                    println!("{} Connected to existing browser", "✅".green());
                    b
                }
                Err(e) => {
                    log::warn!("CDP connect to {endpoint} failed: {e}; launching a fresh browser");
                    chromium
                        .launcher()
                        .headless(config.headless)
                        .launch()
                        .await
                        .context("failed to launch Chromium")?
                }
            }
        } else {
            chromium
                .launcher()
                .headless(config.headless)
                .launch()
                .await
                .context("failed to launch Chromium")?
        };

        // In persistent mode reuse the browser's context so previously opened
        // pages stay addressable.
        let reuse = config.keep_browser || config.cdp_endpoint.is_some();
        let existing = if reuse {
            browser.contexts()?.into_iter().next()
        } else {
            None
        };
        let context = match existing {
            Some(ctx) => {
                println!("{} Reusing existing browser context", "♻️".green());
                ctx
            }
            None => browser.context_builder().build().await?,
        };

        let session = Self {
            playwright,
            browser,
            context,
            config,
            tabs: Mutex::new(Vec::new()),
        };
        session.adopt_existing_pages().await;
        Ok(session)
    }

    /// Register pages that already exist in the context (CDP reattach) as
    /// tabs, in context order, so persisted tab ids resolve again.
    async fn adopt_existing_pages(&self) {
        let pages = self.context.pages().unwrap_or_default();
        if pages.is_empty() {
            return;
        }
        let mut tabs = self.tabs.lock().await;
        for page in pages {
            let id = tabs.len() as TabId;
            tabs.push(Arc::new(Tab {
                id,
                page: Mutex::new(page),
            }));
        }
        log::debug!("adopted {} existing page(s)", tabs.len());
    }

    /// Open a new tab, navigate it, and wait for the load event
    pub async fn open_tab(&self, url: &str) -> Result<Arc<Tab>> {
        let page = self
            .context
            .new_page()
            .await
            .context("failed to open a new page")?;
        page.set_viewport_size(Viewport {
            width: self.config.viewport_width as i32,
            height: self.config.viewport_height as i32,
        })
        .await?;

        let tab = {
            let mut tabs = self.tabs.lock().await;
            let tab = Arc::new(Tab {
                id: tabs.len() as TabId,
                page: Mutex::new(page),
            });
            tabs.push(Arc::clone(&tab));
            tab
        };
        tab.goto(url).await?;
        Ok(tab)
    }

    /// Look up an already-opened tab by id
    pub async fn tab(&self, id: TabId) -> Option<Arc<Tab>> {
        self.tabs.lock().await.get(id as usize).cloned()
    }

    pub async fn tab_count(&self) -> usize {
        self.tabs.lock().await.len()
    }
}
