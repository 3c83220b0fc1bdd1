mod step;
mod workflow;

pub use step::{AuditTrail, ChannelObserver, StepObserver, StepPolicy};
pub use workflow::{Step, Workflow, WorkflowReport, WORKFLOW};

use crate::config::ScraperConfig;
use crate::model::{OutcomeStatus, PermitResult, StepRecord, StepStatus, Target};
use crate::outcome::{classify, Terminal};
use crate::page::{EokaLauncher, Launcher, PortalBrowser, PortalPage};
use crate::Result;
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Step name used when no page could be opened for a run.
pub const OPEN_SESSION_STEP: &str = "Open browser session";

/// Progress callbacks for [`PermitScraper::scrape_batch`].
///
/// Every method has an empty default so callers implement only what they
/// care about.
pub trait BatchObserver {
    /// A target is about to run. `index` is zero-based.
    fn on_start(&self, _index: usize, _total: usize, _target: &Target) {}

    /// A step of the running target produced a record.
    fn on_step(&self, _index: usize, _record: &StepRecord) {}

    /// A target finished.
    fn on_result(&self, _index: usize, _result: &PermitResult) {}
}

/// Percentage reported when target `index` of `total` starts.
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (((index + 1) * 100) / total).min(100) as u8
}

/// Adapts a batch observer to the per-step observer of one target.
struct IndexedSteps<'b> {
    index: usize,
    batch: &'b dyn BatchObserver,
}

impl StepObserver for IndexedSteps<'_> {
    fn on_step(&self, record: &StepRecord) {
        self.batch.on_step(self.index, record);
    }
}

/// Scraper backed by a real Chrome instance.
pub type ChromeScraper = PermitScraper<EokaLauncher>;

impl ChromeScraper {
    pub fn chrome(config: ScraperConfig) -> Self {
        let launcher = EokaLauncher::new(config.browser.clone());
        Self::new(launcher, config)
    }
}

/// Owns the browser process and runs the portal workflow per target.
pub struct PermitScraper<L: Launcher> {
    launcher: L,
    config: ScraperConfig,
    browser: Option<L::Browser>,
}

impl<L: Launcher> PermitScraper<L> {
    pub fn new(launcher: L, config: ScraperConfig) -> Self {
        Self {
            launcher,
            config,
            browser: None,
        }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.browser.is_some()
    }

    /// Launch the browser. Does nothing when it is already running.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.browser.is_some() {
            debug!("browser already running");
            return Ok(());
        }
        info!("Launching browser");
        self.browser = Some(self.launcher.launch().await?);
        Ok(())
    }

    /// Shut the browser down. Safe to call when it never started.
    pub async fn close(&mut self) -> Result<()> {
        match self.browser.take() {
            Some(browser) => {
                info!("Closing browser");
                browser.close().await
            }
            None => Ok(()),
        }
    }

    /// Look up one target. Always yields a result, whatever happens.
    ///
    /// The browser is launched on first use. Each run gets its own page,
    /// which is closed before returning.
    pub async fn scrape_permit(
        &mut self,
        target: &Target,
        observer: Option<&dyn StepObserver>,
    ) -> PermitResult {
        info!("Scraping {}", target);
        let started = Instant::now();
        let page = match self.open_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!("{}: could not open a page: {}", target, e);
                return self.session_failure(target, observer, e.detail());
            }
        };

        let trail = AuditTrail::new(observer);
        let report = Workflow::new(&page, &self.config, target, trail).run().await;
        let result = self.shape(target, report);

        if matches!(
            result.resolution,
            OutcomeStatus::Error | OutcomeStatus::AddressNotFound
        ) {
            self.save_failure_screenshot(&page, target).await;
        }
        if let Some(ref browser) = self.browser {
            if let Err(e) = browser.close_page(page).await {
                warn!("{}: failed to close page: {}", target, e);
            }
        }

        info!(
            "{} -> {} in {}ms",
            target,
            result.status,
            started.elapsed().as_millis()
        );
        result
    }

    /// Run targets one after another with `pacing_ms` between them.
    ///
    /// The browser stays open afterwards; call [`close`](Self::close).
    pub async fn scrape_batch(
        &mut self,
        targets: &[Target],
        observer: Option<&dyn BatchObserver>,
    ) -> Result<Vec<PermitResult>> {
        self.initialize().await?;
        let total = targets.len();
        let mut results = Vec::with_capacity(total);
        for (index, target) in targets.iter().enumerate() {
            if index > 0 && self.config.pacing_ms > 0 {
                debug!("pacing {}ms before next target", self.config.pacing_ms);
                tokio::time::sleep(Duration::from_millis(self.config.pacing_ms)).await;
            }
            info!(
                "[{}/{}] {}% {}",
                index + 1,
                total,
                progress_percent(index, total),
                target
            );
            let result = match observer {
                Some(batch) => {
                    batch.on_start(index, total, target);
                    let steps = IndexedSteps { index, batch };
                    let steps: &dyn StepObserver = &steps;
                    let result = self.scrape_permit(target, Some(steps)).await;
                    batch.on_result(index, &result);
                    result
                }
                None => self.scrape_permit(target, None).await,
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn open_page(&mut self) -> Result<<L::Browser as PortalBrowser>::Page> {
        self.initialize().await?;
        match self.browser {
            Some(ref browser) => browser.open_page().await,
            None => Err(crate::Error::Config("browser is not running".into())),
        }
    }

    fn shape(&self, target: &Target, report: WorkflowReport) -> PermitResult {
        let latest = report
            .state
            .extraction
            .as_ref()
            .and_then(|e| e.latest.as_ref());
        let multiple = report
            .state
            .parcel_count
            .is_some_and(|n| n > self.config.parcel_threshold);
        let classification = classify(&report.terminal, latest, multiple);
        PermitResult {
            company: target.company.clone(),
            address: target.address.clone(),
            latest_permit_date: latest.map(|d| d.raw.clone()),
            permit_page_link: report.state.permit_page_link,
            status: classification.status,
            resolution: classification.resolution,
            parcel_count: report.state.parcel_count,
            error_message: classification.error_message,
            steps: report.steps,
        }
    }

    fn session_failure(
        &self,
        target: &Target,
        observer: Option<&dyn StepObserver>,
        message: String,
    ) -> PermitResult {
        let mut trail = AuditTrail::new(observer);
        trail.begin(OPEN_SESSION_STEP);
        trail.finish(OPEN_SESSION_STEP, StepStatus::Error, message.clone());
        let classification = classify(&Terminal::Crashed { message }, None, false);
        PermitResult {
            company: target.company.clone(),
            address: target.address.clone(),
            latest_permit_date: None,
            permit_page_link: None,
            status: classification.status,
            resolution: classification.resolution,
            parcel_count: None,
            error_message: classification.error_message,
            steps: trail.into_records(),
        }
    }

    async fn save_failure_screenshot<P: PortalPage>(&self, page: &P, target: &Target) {
        let Some(ref on_failure) = self.config.on_failure else {
            return;
        };
        let path = on_failure.screenshot_path(&target.company, Utc::now());
        info!("Saving failure screenshot to: {}", path.display());
        match page.screenshot().await {
            Ok(data) => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    if let Err(e) = tokio::fs::create_dir_all(dir).await {
                        warn!("Failed to create screenshot directory: {}", e);
                        return;
                    }
                }
                if let Err(e) = tokio::fs::write(&path, data).await {
                    warn!("Failed to save screenshot: {}", e);
                }
            }
            Err(e) => warn!("Failed to take screenshot: {}", e),
        }
    }
}
