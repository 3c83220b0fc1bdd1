use super::{ElementInfo, Launcher, PortalBrowser, PortalPage, TableSnapshot};
use crate::config::BrowserConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use eoka::{Browser, Page, StealthConfig};
use serde::Deserialize;
use tracing::{debug, warn};

/// Shared helpers injected ahead of every snapshot script.
const HELPERS_JS: &str = r#"
    function selectorOf(el) {
        if (el.id) return '#' + CSS.escape(el.id);
        const path = [];
        let n = el;
        while (n && n.nodeType === 1) {
            let s = n.tagName.toLowerCase();
            if (n.id) { path.unshift('#' + CSS.escape(n.id)); break; }
            const p = n.parentElement;
            if (p) {
                const sibs = [...p.children].filter(c => c.tagName === n.tagName);
                if (sibs.length > 1) s += ':nth-of-type(' + (sibs.indexOf(n) + 1) + ')';
            }
            path.unshift(s);
            n = p;
        }
        return path.join(' > ');
    }
    function textOf(el) {
        return (el.innerText || el.textContent || el.value || '').replace(/\s+/g, ' ').trim();
    }
    function isVisible(el) {
        const r = el.getBoundingClientRect();
        const s = getComputedStyle(el);
        return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none' && s.opacity !== '0';
    }
"#;

const QUERY_JS: &str = r#"
((css) => {
    HELPERS
    let found;
    try { found = [...document.querySelectorAll(css)]; }
    catch (e) { return { error: String(e && e.message || e) }; }
    return { elements: found.slice(0, 200).map(el => {
        const r = el.getBoundingClientRect();
        const link = el.closest('a[href]');
        return {
            selector: selectorOf(el),
            tag: el.tagName.toLowerCase(),
            text: textOf(el).slice(0, 500),
            class: typeof el.className === 'string' ? el.className : (el.getAttribute('class') || ''),
            title: el.title || '',
            aria_label: el.getAttribute('aria-label') || '',
            placeholder: el.getAttribute('placeholder') || '',
            href: link ? link.href : null,
            visible: isVisible(el),
            bbox: { x: r.x, y: r.y, width: r.width, height: r.height },
        };
    }) };
})
"#;

const READ_TABLE_JS: &str = r#"
((sel) => {
    HELPERS
    const root = document.querySelector(sel);
    if (!root) return null;
    const cellsOf = (row, css) => [...row.children].filter(c => c.matches(css)).map(textOf);
    const rows = [...root.querySelectorAll('tr, [role="row"]')];
    const anyCell = 'th, td, [role="columnheader"], [role="gridcell"], [role="cell"]';
    let header = [];
    let labelRow = null;
    const headRow = root.querySelector('thead tr');
    if (headRow) {
        header = cellsOf(headRow, anyCell);
    } else if (rows.length && rows[0].querySelector('th, [role="columnheader"]')) {
        header = cellsOf(rows[0], anyCell);
    } else if (rows.length && !/\d/.test(textOf(rows[0]))) {
        // td-only label row: data rows always carry a number or a date
        labelRow = rows[0];
        header = cellsOf(labelRow, anyCell);
    }
    return {
        header,
        rows: rows.filter(r => r !== headRow).map(r => {
            const data = cellsOf(r, 'td, [role="gridcell"], [role="cell"]');
            const heads = cellsOf(r, 'th, [role="columnheader"]');
            const a = r.querySelector('a[href], a');
            return {
                selector: selectorOf(r),
                cells: data.length ? data : heads,
                text: textOf(r),
                link: a ? selectorOf(a) : null,
                header: r === labelRow || (data.length === 0 && heads.length > 0),
            };
        }),
    };
})
"#;

const HIT_TEST_JS: &str = r#"
((x, y) => document.elementFromPoint(x, y) !== null)
"#;

fn script(body: &str, args: &[String]) -> String {
    format!(
        "{}({})",
        body.replace("HELPERS", HELPERS_JS),
        args.join(",")
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryReply {
    Elements { elements: Vec<ElementInfo> },
    Failed { error: String },
}

/// Launches Chrome through `eoka` with stealth settings.
#[derive(Debug, Clone)]
pub struct EokaLauncher {
    config: BrowserConfig,
}

impl EokaLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait(?Send)]
impl Launcher for EokaLauncher {
    type Browser = EokaBrowser;

    async fn launch(&self) -> Result<EokaBrowser> {
        let stealth = StealthConfig {
            headless: self.config.headless,
            proxy: self.config.proxy.clone(),
            user_agent: self.config.user_agent.clone(),
            viewport_width: self.config.viewport.width,
            viewport_height: self.config.viewport.height,
            ..Default::default()
        };
        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            self.config.headless, self.config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        // Keeps the process alive while run tabs come and go.
        let home = browser.new_page("about:blank").await?;
        Ok(EokaBrowser { browser, home })
    }
}

/// A running Chrome process.
pub struct EokaBrowser {
    browser: Browser,
    home: Page,
}

#[async_trait(?Send)]
impl PortalBrowser for EokaBrowser {
    type Page = EokaPage;

    async fn open_page(&self) -> Result<EokaPage> {
        let page = self.browser.new_blank_page().await?;
        let target_id = page.target_id().to_string();
        debug!("opened tab {}", target_id);
        Ok(EokaPage { page, target_id })
    }

    async fn close_page(&self, page: EokaPage) -> Result<()> {
        debug!("closing tab {}", page.target_id);
        self.browser.close_tab(&page.target_id).await?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        debug!("closing browser (home tab {})", self.home.target_id());
        self.browser.close().await?;
        Ok(())
    }
}

/// One portal tab.
pub struct EokaPage {
    page: Page,
    target_id: String,
}

impl EokaPage {
    /// Underlying `eoka` page.
    pub fn inner(&self) -> &Page {
        &self.page
    }
}

#[async_trait(?Send)]
impl PortalPage for EokaPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        if let Err(e) = self.page.wait_for_network_idle(500, 10_000).await {
            debug!("network did not go idle after {}: {}", url, e);
        }
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.page.url().await?)
    }

    async fn query_all(&self, css: &str) -> Result<Vec<ElementInfo>> {
        let js = script(QUERY_JS, &[serde_json::to_string(css)?]);
        match self.page.evaluate::<QueryReply>(&js).await? {
            QueryReply::Elements { elements } => Ok(elements),
            QueryReply::Failed { error } => {
                Err(Error::Page(format!("query '{}' failed: {}", css, error)))
            }
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page.click(selector).await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.page.fill(selector, value).await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.page.human().press_key(key).await?;
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        let js = script(HIT_TEST_JS, &[x.to_string(), y.to_string()]);
        let hit: bool = self.page.evaluate(&js).await?;
        if !hit {
            warn!("nothing under ({:.0}, {:.0})", x, y);
            return Err(Error::Page(format!("no element at ({:.0}, {:.0})", x, y)));
        }
        self.page
            .session()
            .dispatch_mouse_event(eoka::cdp::MouseEventType::MouseMoved, x, y, None, None)
            .await?;
        self.page.click_at(x, y).await?;
        Ok(())
    }

    async fn read_table(&self, selector: &str) -> Result<Option<TableSnapshot>> {
        let js = script(READ_TABLE_JS, &[serde_json::to_string(selector)?]);
        Ok(self.page.evaluate(&js).await?)
    }

    async fn wait(&self, ms: u64) {
        self.page.wait(ms).await;
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }
}
