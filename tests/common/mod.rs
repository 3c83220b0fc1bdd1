//! Scripted stand-in for the portal, driven through the page seam.

#![allow(dead_code)]

use async_trait::async_trait;
use permit_scout::config::Timings;
use permit_scout::page::{
    BBox, ElementInfo, Launcher, PortalBrowser, PortalPage, TableRow, TableSnapshot,
};
use permit_scout::{Error, Matcher, PortalProfile, Result, ScraperConfig, Strategy};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use tokio::time::{Duration, Instant};

pub const PORTAL_URL: &str = "https://portal.test/carte";

pub fn parcel_url(n: usize) -> String {
    format!("https://portal.test/parcelle/{}", n)
}

/// How the fake portal behaves for one run.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub fail_navigation: bool,
    pub terms_dialog: bool,
    pub help_dialog: bool,
    pub address_field: bool,
    pub search_icon: bool,
    pub suggestions: usize,
    pub identify_tool: bool,
    pub map: bool,
    pub results_panel: bool,
    pub parcels: usize,
    /// Extra label row made of plain cells above the parcels.
    pub td_label_row: bool,
    pub parcel_click_navigates: bool,
    pub parcel_link: bool,
    pub procedures_tab: bool,
    pub procedures: Option<TableSnapshot>,
}

impl Scenario {
    /// Everything present; the procedures table is the given one.
    pub fn happy(procedures: TableSnapshot) -> Self {
        Self {
            fail_navigation: false,
            terms_dialog: true,
            help_dialog: true,
            address_field: true,
            search_icon: true,
            suggestions: 3,
            identify_tool: true,
            map: true,
            results_panel: true,
            parcels: 1,
            td_label_row: false,
            parcel_click_navigates: true,
            parcel_link: true,
            procedures_tab: true,
            procedures: Some(procedures),
        }
    }
}

/// Procedures table with a header row and the given (date, status) rows.
pub fn procedures(rows: &[(&str, &str)]) -> TableSnapshot {
    TableSnapshot {
        header: vec!["Référence".into(), "Date de début".into(), "Statut".into()],
        rows: rows
            .iter()
            .enumerate()
            .map(|(i, (date, status))| {
                TableRow::from_cells(
                    format!("#procedures-table tr:nth-of-type({})", i + 1),
                    &[format!("P/{}", i + 1), date.to_string(), status.to_string()],
                )
            })
            .collect(),
    }
}

/// Two delivered permits and a refusal; the latest delivery is 15/06/2022.
pub fn scenario_a_table() -> TableSnapshot {
    procedures(&[
        ("01/03/2020", "Permis délivré"),
        ("15/06/2022", "Permis délivré"),
        ("01/01/2023", "Refusé"),
    ])
}

/// Strategy lists keyed on the fake portal's markup.
pub fn test_profile() -> PortalProfile {
    let one = |css: &str| vec![Strategy::css(css, css)];
    PortalProfile {
        terms_checkbox: one("#terms input[type=checkbox]"),
        terms_accept: vec![Strategy::css("accept", "#terms button").matching(Matcher::text("Accepter"))],
        help_close: one("#help .close"),
        address_field: vec![
            Strategy::css("legacy field", "#legacy-search input"),
            Strategy::css("search field", "#search input"),
        ],
        search_button: one("#search .icon"),
        suggestion: one("#suggestions li"),
        identify_tool: vec![Strategy::css("identify", "#toolbar button").matching(Matcher::hint(["identif"]))],
        map: vec![Strategy::css("map", "#map").matching(Matcher::MinSize {
            width: 100.0,
            height: 100.0,
        })],
        results_panel: vec![Strategy::css("results", "#results").matching(Matcher::text("resultat"))],
        parcel_table: one("#results table"),
        procedures_tab: vec![Strategy::css("tab", "[role=tab]").matching(Matcher::text("procedures"))],
        procedures_table: one("#procedures table"),
    }
}

/// Config with no waits, pointed at the fake portal.
pub fn test_config() -> ScraperConfig {
    let mut config = ScraperConfig::default();
    config.portal.url = PORTAL_URL.into();
    config.timings = Timings::instant();
    config.strategies = test_profile();
    config
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Launch,
    Open(usize),
    Close(usize),
    BrowserClosed,
}

/// State shared between the launcher, its browsers and their pages.
#[derive(Clone, Default)]
pub struct Shared {
    pub events: Rc<RefCell<Vec<(Event, Instant)>>>,
    scenarios: Rc<RefCell<VecDeque<Scenario>>>,
    pages: Rc<Cell<usize>>,
    /// Every selector clicked on any page, in order.
    pub clicks: Rc<RefCell<Vec<String>>>,
}

impl Shared {
    pub fn push_scenario(&self, scenario: Scenario) {
        self.scenarios.borrow_mut().push_back(scenario);
    }

    fn log(&self, event: Event) {
        self.events.borrow_mut().push((event, Instant::now()));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().iter().map(|(e, _)| *e).collect()
    }

    pub fn count(&self, wanted: fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| wanted(e)).count()
    }

    pub fn clicked(&self, selector: &str) -> bool {
        self.clicks.borrow().iter().any(|c| c == selector)
    }
}

pub struct FakeLauncher {
    pub shared: Shared,
    pub fail_launch: bool,
}

impl FakeLauncher {
    pub fn new(shared: Shared) -> Self {
        Self {
            shared,
            fail_launch: false,
        }
    }
}

#[async_trait(?Send)]
impl Launcher for FakeLauncher {
    type Browser = FakeBrowser;

    async fn launch(&self) -> Result<FakeBrowser> {
        if self.fail_launch {
            return Err(Error::Page("chrome binary not found".into()));
        }
        self.shared.log(Event::Launch);
        Ok(FakeBrowser {
            shared: self.shared.clone(),
        })
    }
}

pub struct FakeBrowser {
    shared: Shared,
}

#[async_trait(?Send)]
impl PortalBrowser for FakeBrowser {
    type Page = FakePage;

    async fn open_page(&self) -> Result<FakePage> {
        let id = self.shared.pages.get() + 1;
        self.shared.pages.set(id);
        let scenario = self
            .shared
            .scenarios
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Scenario::happy(scenario_a_table()));
        self.shared.log(Event::Open(id));
        Ok(FakePage::new(id, scenario, self.shared.clicks.clone()))
    }

    async fn close_page(&self, page: FakePage) -> Result<()> {
        self.shared.log(Event::Close(page.id));
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.shared.log(Event::BrowserClosed);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    navigated: bool,
    terms_open: bool,
    help_open: bool,
    filled: Option<String>,
    searched: bool,
    suggestion_picked: bool,
    tool_active: bool,
    map_clicked: bool,
    parcel_opened: bool,
    tab_opened: bool,
}

pub struct FakePage {
    pub id: usize,
    scenario: Scenario,
    state: RefCell<PageState>,
    clicks: Rc<RefCell<Vec<String>>>,
}

const MAP_BOX: BBox = BBox {
    x: 100.0,
    y: 100.0,
    width: 800.0,
    height: 600.0,
};

fn element(selector: &str, tag: &str, text: &str) -> ElementInfo {
    ElementInfo {
        selector: selector.into(),
        tag: tag.into(),
        text: text.into(),
        visible: true,
        bbox: BBox::new(10.0, 10.0, 80.0, 24.0),
        ..Default::default()
    }
}

fn parcel_row(n: usize, link: bool) -> TableRow {
    let mut row = TableRow::from_cells(
        format!("#parcels tr:nth-of-type({})", n + 1),
        &[format!("HERVE {} DIV", n), format!("A {}0{} B", n, n), "812 m²".into()],
    );
    if link {
        row.link = Some(format!("#parcels tr:nth-of-type({}) a", n + 1));
    }
    row
}

impl FakePage {
    fn new(id: usize, scenario: Scenario, clicks: Rc<RefCell<Vec<String>>>) -> Self {
        let state = PageState {
            url: "about:blank".into(),
            ..Default::default()
        };
        Self {
            id,
            scenario,
            state: RefCell::new(state),
            clicks,
        }
    }

    fn open_parcel(&self, n: usize) {
        let mut state = self.state.borrow_mut();
        state.url = parcel_url(n);
        state.parcel_opened = true;
    }
}

#[async_trait(?Send)]
impl PortalPage for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        if self.scenario.fail_navigation {
            return Err(Error::Page(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)));
        }
        let mut state = self.state.borrow_mut();
        state.url = url.into();
        state.navigated = true;
        state.terms_open = self.scenario.terms_dialog;
        state.help_open = self.scenario.help_dialog;
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.state.borrow().url.clone())
    }

    async fn query_all(&self, css: &str) -> Result<Vec<ElementInfo>> {
        let s = &self.scenario;
        let state = self.state.borrow();
        if !state.navigated {
            return Ok(Vec::new());
        }
        let found = match css {
            "#terms input[type=checkbox]" if state.terms_open => {
                vec![element("#terms-check", "input", "")]
            }
            "#terms button" if state.terms_open => vec![
                element("#terms-cancel", "button", "Annuler"),
                element("#terms-accept", "button", "Accepter"),
            ],
            // map layer switch, always on the page
            "input[type=checkbox]" => vec![element("#layer-cadastre-toggle", "input", "")],
            "#help .close" if state.help_open => vec![element("#help-close", "span", "")],
            "#search input" if s.address_field => {
                let mut field = element("#address", "input", "");
                field.placeholder = "Rechercher une adresse".into();
                vec![field]
            }
            "#search .icon" if s.search_icon => vec![element("#search-icon", "div", "")],
            "#suggestions li" if state.searched => (1..=s.suggestions)
                .map(|i| element(&format!("#suggestion-{}", i), "li", &format!("Rue de la Station {}, Herve", i)))
                .collect(),
            "#toolbar button" if s.identify_tool => {
                let mut zoom = element("#zoom", "button", "");
                zoom.title = "Zoom avant".into();
                let mut identify = element("#identify", "button", "");
                identify.title = "Identifier une parcelle".into();
                vec![zoom, identify]
            }
            "#map" if s.map => {
                let mut map = element("#map", "div", "");
                map.bbox = MAP_BOX;
                vec![map]
            }
            "#results" if s.results_panel && results_ready(&state) => {
                vec![element("#results", "div", "Résultats de l'identification")]
            }
            "#results table" if s.parcels > 0 && results_ready(&state) => {
                vec![element("#parcels", "table", "Parcelle Capakey Surface")]
            }
            "[role=tab]" if s.procedures_tab && state.parcel_opened => vec![
                element("#tab-info", "div", "Informations"),
                element("#tab-procedures", "div", "Procédures"),
            ],
            "#procedures table" if s.procedures.is_some() && state.tab_opened => {
                vec![element("#procedures-table", "table", "Statut")]
            }
            _ => Vec::new(),
        };
        Ok(found)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.clicks.borrow_mut().push(selector.to_string());
        match selector {
            "#terms-check" | "#address" | "#zoom" | "#tab-info" | "#layer-cadastre-toggle" => {}
            "#terms-accept" => self.state.borrow_mut().terms_open = false,
            "#help-close" => self.state.borrow_mut().help_open = false,
            "#search-icon" => {
                let mut state = self.state.borrow_mut();
                state.searched = state.filled.is_some();
            }
            "#identify" => self.state.borrow_mut().tool_active = true,
            "#tab-procedures" => self.state.borrow_mut().tab_opened = true,
            s if s.starts_with("#suggestion-") => self.state.borrow_mut().suggestion_picked = true,
            s if s.starts_with("#parcels tr:nth-of-type(") => {
                let n: usize = s
                    .trim_start_matches("#parcels tr:nth-of-type(")
                    .split(')')
                    .next()
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(1)
                    - 1;
                if s.ends_with(" a") || self.scenario.parcel_click_navigates {
                    self.open_parcel(n);
                }
            }
            other => return Err(Error::Page(format!("no node matches {}", other))),
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        if selector != "#address" {
            return Err(Error::Page(format!("cannot type into {}", selector)));
        }
        self.state.borrow_mut().filled = Some(value.to_string());
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        if key == "Enter" {
            let mut state = self.state.borrow_mut();
            state.searched = state.filled.is_some();
        }
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        let inside = x >= MAP_BOX.x
            && x <= MAP_BOX.x + MAP_BOX.width
            && y >= MAP_BOX.y
            && y <= MAP_BOX.y + MAP_BOX.height;
        if self.scenario.map && inside {
            self.state.borrow_mut().map_clicked = true;
            Ok(())
        } else {
            Err(Error::Page(format!("nothing at ({}, {})", x, y)))
        }
    }

    async fn read_table(&self, selector: &str) -> Result<Option<TableSnapshot>> {
        match selector {
            "#parcels" if results_ready(&self.state.borrow()) => {
                let mut rows = vec![TableRow {
                    selector: "#parcels tr:nth-of-type(1)".into(),
                    cells: vec!["Parcelle".into(), "Capakey".into(), "Surface".into()],
                    text: "Parcelle Capakey Surface".into(),
                    link: None,
                    header: true,
                }];
                if self.scenario.td_label_row {
                    rows.push(TableRow::from_cells(
                        "#parcels tr.labels",
                        &["N° de parcelle", "Superficie (m²)", "Nature"],
                    ));
                }
                rows.extend((1..=self.scenario.parcels).map(|n| parcel_row(n, self.scenario.parcel_link)));
                Ok(Some(TableSnapshot {
                    header: Vec::new(),
                    rows,
                }))
            }
            "#procedures-table" => Ok(self.scenario.procedures.clone()),
            _ => Ok(None),
        }
    }

    async fn wait(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

/// The identify click has landed on the map.
fn results_ready(state: &PageState) -> bool {
    state.suggestion_picked && state.tool_active && state.map_clicked
}
