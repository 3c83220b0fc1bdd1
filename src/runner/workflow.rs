//! The twelve portal steps, run in order against one page.

use super::step::{AuditTrail, Flow, StepOutcome, StepPolicy};
use crate::config::ScraperConfig;
use crate::extract::{self, Extraction};
use crate::locator::{fold, locate, locate_within, Located, Strategy};
use crate::model::{OutcomeStatus, StepRecord, Target};
use crate::outcome::{Terminal, NO_DELIVERED_PERMIT};
use crate::page::{ElementInfo, PortalPage, TableRow};
use crate::{Error, Result};
use std::fmt;
use tracing::{debug, info, warn};

/// One stage of the portal workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Navigate,
    DismissTerms,
    DismissHelp,
    LocateAddressField,
    SubmitAddress,
    SelectSuggestion,
    ActivateIdentifyTool,
    ClickMap,
    ReadIdentificationResults,
    SelectParcel,
    OpenProceduresTab,
    ExtractProcedures,
}

/// Steps in execution order.
pub const WORKFLOW: [Step; 12] = [
    Step::Navigate,
    Step::DismissTerms,
    Step::DismissHelp,
    Step::LocateAddressField,
    Step::SubmitAddress,
    Step::SelectSuggestion,
    Step::ActivateIdentifyTool,
    Step::ClickMap,
    Step::ReadIdentificationResults,
    Step::SelectParcel,
    Step::OpenProceduresTab,
    Step::ExtractProcedures,
];

impl Step {
    /// Name used in step records.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Navigate => "Navigate to portal",
            Self::DismissTerms => "Dismiss terms dialog",
            Self::DismissHelp => "Dismiss help dialog",
            Self::LocateAddressField => "Locate address field",
            Self::SubmitAddress => "Submit address",
            Self::SelectSuggestion => "Select address suggestion",
            Self::ActivateIdentifyTool => "Activate identify tool",
            Self::ClickMap => "Click map",
            Self::ReadIdentificationResults => "Read identification results",
            Self::SelectParcel => "Select parcel",
            Self::OpenProceduresTab => "Open procedures tab",
            Self::ExtractProcedures => "Extract procedures",
        }
    }

    /// What happens when the step misses its target.
    pub fn policy(&self) -> StepPolicy {
        match self {
            Self::Navigate => StepPolicy::Fatal(OutcomeStatus::Error),
            Self::DismissTerms | Self::DismissHelp | Self::ReadIdentificationResults => {
                StepPolicy::Tolerant
            }
            Self::LocateAddressField
            | Self::SubmitAddress
            | Self::SelectSuggestion
            | Self::ActivateIdentifyTool
            | Self::ClickMap
            | Self::SelectParcel => StepPolicy::Fatal(OutcomeStatus::AddressNotFound),
            Self::OpenProceduresTab | Self::ExtractProcedures => {
                StepPolicy::Fatal(OutcomeStatus::NoPermitData)
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How an element was activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Technique {
    Click,
    CoordinateClick,
}

/// Native click on the element's selector, then a mouse click at its centre.
pub async fn activate<P>(page: &P, element: &ElementInfo) -> Option<Technique>
where
    P: PortalPage + ?Sized,
{
    match page.click(&element.selector).await {
        Ok(()) => return Some(Technique::Click),
        Err(e) => warn!("click on {} failed: {}", element.selector, e),
    }
    if element.bbox.is_empty() {
        return None;
    }
    let (x, y) = element.bbox.center();
    match page.click_at(x, y).await {
        Ok(()) => Some(Technique::CoordinateClick),
        Err(e) => {
            warn!("coordinate click on {} failed: {}", element.selector, e);
            None
        }
    }
}

/// Words that only show up in header rows of the parcel table.
const HEADER_WORDS: &[&str] = &[
    "parcelle",
    "capakey",
    "resultat",
    "identifiant",
    "division",
    "section",
    "surface",
    "superficie",
];

/// A data row describing a parcel, as opposed to a header or caption row.
pub fn is_parcel_row(row: &TableRow) -> bool {
    if row.header {
        return false;
    }
    let text = fold(&row.text);
    if text.chars().count() < 6 {
        return false;
    }
    !row
        .cells
        .iter()
        .map(|c| fold(c))
        .any(|c| HEADER_WORDS.iter().any(|word| c.contains(word)))
}

/// Facts gathered while the steps run.
#[derive(Debug, Default)]
pub struct RunState {
    pub address_field: Option<ElementInfo>,
    pub parcel_count: Option<usize>,
    pub permit_page_link: Option<String>,
    pub extraction: Option<Extraction>,
}

/// Everything a finished run hands back.
#[derive(Debug)]
pub struct WorkflowReport {
    pub terminal: Terminal,
    pub state: RunState,
    pub steps: Vec<StepRecord>,
}

/// Drives one target through [`WORKFLOW`] on a single page.
pub struct Workflow<'a, 'o, P: PortalPage + ?Sized> {
    page: &'a P,
    config: &'a ScraperConfig,
    target: &'a Target,
    trail: AuditTrail<'o>,
    state: RunState,
}

impl<'a, 'o, P> Workflow<'a, 'o, P>
where
    P: PortalPage + ?Sized,
{
    pub fn new(
        page: &'a P,
        config: &'a ScraperConfig,
        target: &'a Target,
        trail: AuditTrail<'o>,
    ) -> Self {
        Self {
            page,
            config,
            target,
            trail,
            state: RunState::default(),
        }
    }

    /// Run every step until one stops the run.
    pub async fn run(mut self) -> WorkflowReport {
        let mut terminal = Terminal::Completed;
        for step in WORKFLOW {
            self.trail.begin(step.label());
            let outcome = self.perform(step).await;
            match self.trail.settle(step.label(), step.policy(), outcome) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop { status, message }) => {
                    info!("{} stopped at '{}': {}", self.target, step, message);
                    terminal = Terminal::Stopped { status, message };
                    break;
                }
                Err(e) => {
                    warn!("{} failed at '{}': {}", self.target, step, e);
                    terminal = Terminal::Crashed {
                        message: e.detail(),
                    };
                    break;
                }
            }
        }
        WorkflowReport {
            terminal,
            state: self.state,
            steps: self.trail.into_records(),
        }
    }

    async fn perform(&mut self, step: Step) -> Result<StepOutcome> {
        match step {
            Step::Navigate => self.navigate().await,
            Step::DismissTerms => self.dismiss_terms().await,
            Step::DismissHelp => self.dismiss_help().await,
            Step::LocateAddressField => self.locate_address_field().await,
            Step::SubmitAddress => self.submit_address().await,
            Step::SelectSuggestion => self.select_suggestion().await,
            Step::ActivateIdentifyTool => self.activate_identify_tool().await,
            Step::ClickMap => self.click_map().await,
            Step::ReadIdentificationResults => self.read_identification_results().await,
            Step::SelectParcel => self.select_parcel().await,
            Step::OpenProceduresTab => self.open_procedures_tab().await,
            Step::ExtractProcedures => self.extract_procedures().await,
        }
    }

    async fn find(&self, strategies: &[Strategy], timeout_ms: u64) -> Option<Located> {
        locate_within(self.page, strategies, timeout_ms, self.config.timings.poll_ms).await
    }

    async fn navigate(&mut self) -> Result<StepOutcome> {
        let url = &self.config.portal.url;
        self.page.goto(url).await?;
        self.page.wait(self.config.timings.settle_ms).await;
        Ok(StepOutcome::done())
    }

    async fn dismiss_terms(&mut self) -> Result<StepOutcome> {
        let profile = &self.config.strategies;
        // Without an accept button there is no dialog to tick anything in.
        let Some(accept) = locate(self.page, &profile.terms_accept).await else {
            return Ok(StepOutcome::Missed("No terms dialog".into()));
        };
        if let Some(checkbox) = locate(self.page, &profile.terms_checkbox).await {
            if activate(self.page, &checkbox.element).await.is_none() {
                debug!("terms checkbox could not be ticked");
            }
        }
        match activate(self.page, &accept.element).await {
            Some(_) => {
                self.page.wait(self.config.timings.dialog_ms).await;
                Ok(StepOutcome::Done("Terms accepted".into()))
            }
            None => Ok(StepOutcome::Missed("Terms dialog could not be dismissed".into())),
        }
    }

    async fn dismiss_help(&mut self) -> Result<StepOutcome> {
        let Some(close) = locate(self.page, &self.config.strategies.help_close).await else {
            return Ok(StepOutcome::Missed("No help dialog".into()));
        };
        match activate(self.page, &close.element).await {
            Some(_) => {
                self.page.wait(self.config.timings.dialog_ms).await;
                Ok(StepOutcome::Done("Help dialog closed".into()))
            }
            None => Ok(StepOutcome::Missed("Help dialog could not be closed".into())),
        }
    }

    async fn locate_address_field(&mut self) -> Result<StepOutcome> {
        let timeout = self.config.timings.field_timeout_ms;
        match self.find(&self.config.strategies.address_field, timeout).await {
            Some(found) => {
                let message = format!("Found via {}", found.strategy);
                self.state.address_field = Some(found.element);
                Ok(StepOutcome::Done(message))
            }
            None => Ok(StepOutcome::Missed("Address search field not found".into())),
        }
    }

    async fn submit_address(&mut self) -> Result<StepOutcome> {
        let Some(field) = self.state.address_field.clone() else {
            return Ok(StepOutcome::Missed("Address search field not found".into()));
        };
        let timings = &self.config.timings;
        if let Err(e) = self.page.click(&field.selector).await {
            debug!("focus click on address field failed: {}", e);
        }
        self.page.fill(&field.selector, &self.target.address).await?;
        self.page.wait(timings.fill_ms).await;

        let via_icon = match locate(self.page, &self.config.strategies.search_button).await {
            Some(icon) => activate(self.page, &icon.element).await.is_some(),
            None => false,
        };
        if !via_icon {
            self.page.press_key("Enter").await?;
        }
        self.page.wait(timings.search_ms).await;
        Ok(StepOutcome::Done(
            if via_icon {
                "Search submitted with the search icon"
            } else {
                "Search submitted with Enter"
            }
            .into(),
        ))
    }

    async fn select_suggestion(&mut self) -> Result<StepOutcome> {
        let timeout = self.config.timings.suggestion_timeout_ms;
        let Some(suggestion) = self.find(&self.config.strategies.suggestion, timeout).await else {
            return Ok(StepOutcome::Missed("No address suggestions found".into()));
        };
        if activate(self.page, &suggestion.element).await.is_none() {
            return Ok(StepOutcome::Missed("Address suggestion could not be selected".into()));
        }
        self.page.wait(self.config.timings.settle_ms).await;
        Ok(StepOutcome::Done(format!("Selected '{}'", suggestion.element.text)))
    }

    async fn activate_identify_tool(&mut self) -> Result<StepOutcome> {
        let timeout = self.config.timings.tool_timeout_ms;
        let Some(tool) = self.find(&self.config.strategies.identify_tool, timeout).await else {
            return Ok(StepOutcome::Missed("Identify tool not found".into()));
        };
        match activate(self.page, &tool.element).await {
            Some(_) => {
                self.page.wait(self.config.timings.dialog_ms).await;
                Ok(StepOutcome::Done(format!("Activated via {}", tool.strategy)))
            }
            None => Ok(StepOutcome::Missed("Identify tool could not be activated".into())),
        }
    }

    async fn click_map(&mut self) -> Result<StepOutcome> {
        let timeout = self.config.timings.tool_timeout_ms;
        let Some(map) = self.find(&self.config.strategies.map, timeout).await else {
            return Ok(StepOutcome::Missed("Map not found".into()));
        };
        if map.element.bbox.is_empty() {
            return Ok(StepOutcome::Missed("Map has no visible area".into()));
        }
        let (x, y) = map.element.bbox.center();
        if let Err(e) = self.page.click_at(x, y).await {
            warn!("map click failed: {}", e);
            return Ok(StepOutcome::Missed("Could not click the map".into()));
        }
        self.page.wait(self.config.timings.map_settle_ms).await;
        Ok(StepOutcome::Done(format!("Clicked map at ({:.0}, {:.0})", x, y)))
    }

    async fn read_identification_results(&mut self) -> Result<StepOutcome> {
        let timings = &self.config.timings;
        if self
            .find(&self.config.strategies.results_panel, timings.results_timeout_ms)
            .await
            .is_some()
        {
            return Ok(StepOutcome::Done("Results panel visible".into()));
        }
        self.page.wait(timings.results_grace_ms).await;
        Ok(StepOutcome::Missed(format!(
            "Results panel not detected, waited {}ms more",
            timings.results_grace_ms
        )))
    }

    async fn select_parcel(&mut self) -> Result<StepOutcome> {
        const NO_PARCELS: &str = "No parcels found for this address";
        let timeout = self.config.timings.parcel_timeout_ms;
        let Some(table) = self.find(&self.config.strategies.parcel_table, timeout).await else {
            return Ok(StepOutcome::Missed(NO_PARCELS.into()));
        };
        let Some(snapshot) = self.page.read_table(&table.element.selector).await? else {
            return Ok(StepOutcome::Missed(NO_PARCELS.into()));
        };
        let parcels: Vec<&TableRow> = snapshot.rows.iter().filter(|r| is_parcel_row(r)).collect();
        self.state.parcel_count = Some(parcels.len());
        let Some(first) = parcels.first() else {
            return Ok(StepOutcome::Missed(NO_PARCELS.into()));
        };
        if parcels.len() > self.config.parcel_threshold {
            info!("{}: {} parcels match this address", self.target, parcels.len());
        }

        if !self.open_parcel(first).await? {
            return Ok(StepOutcome::Missed("Could not open parcel details".into()));
        }
        self.state.permit_page_link = Some(self.page.url().await?);
        Ok(StepOutcome::Done(format!(
            "Opened '{}' ({} parcel rows)",
            first.text,
            parcels.len()
        )))
    }

    /// Row click with a URL-change check, then the row's first link.
    async fn open_parcel(&self, row: &TableRow) -> Result<bool> {
        let before = self.page.url().await?;
        match self.page.click(&row.selector).await {
            Ok(()) => {
                self.page.wait(self.config.timings.settle_ms).await;
                if self.page.url().await? != before {
                    return Ok(true);
                }
                debug!("row click did not navigate");
            }
            Err(e) => debug!("row click failed: {}", e),
        }
        let Some(ref link) = row.link else {
            return Ok(false);
        };
        match self.page.click(link).await {
            Ok(()) => {
                self.page.wait(self.config.timings.settle_ms).await;
                Ok(true)
            }
            Err(e) => {
                warn!("parcel link click failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn open_procedures_tab(&mut self) -> Result<StepOutcome> {
        const NOT_FOUND: &str = "Procédures tab not found";
        let timeout = self.config.timings.tab_timeout_ms;
        let Some(tab) = self.find(&self.config.strategies.procedures_tab, timeout).await else {
            return Ok(StepOutcome::Missed(NOT_FOUND.into()));
        };
        if activate(self.page, &tab.element).await.is_none() {
            return Ok(StepOutcome::Missed(NOT_FOUND.into()));
        }
        self.page.wait(self.config.timings.settle_ms).await;
        Ok(StepOutcome::Done(format!("Opened '{}'", tab.element.text)))
    }

    /// A table that never shows up is a timeout, not an empty result.
    async fn extract_procedures(&mut self) -> Result<StepOutcome> {
        let timeout = self.config.timings.table_timeout_ms;
        let no_table = || Error::Page(format!("Procedures table not found after {}ms", timeout));
        let Some(table) = self.find(&self.config.strategies.procedures_table, timeout).await else {
            return Err(no_table());
        };
        let Some(snapshot) = self.page.read_table(&table.element.selector).await? else {
            return Err(no_table());
        };
        let extraction = extract::latest_delivered(&snapshot);
        debug!(
            "{} delivered rows via {:?}",
            extraction.delivered_rows, extraction.method
        );
        let outcome = match extraction.latest {
            Some(ref latest) => StepOutcome::Done(format!("Latest delivered permit: {}", latest.raw)),
            None => StepOutcome::Missed(NO_DELIVERED_PERMIT.into()),
        };
        self.state.extraction = Some(extraction);
        Ok(outcome)
    }
}
