//! Browser seam: the few page operations the workflow needs.
//!
//! The workflow only talks to [`PortalPage`]; the `eoka` implementation
//! lives in `chrome.rs` and evaluates small scripts that return element
//! and table snapshots.

mod chrome;

pub use self::chrome::{EokaBrowser, EokaLauncher, EokaPage};

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Bounding box in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Snapshot of one DOM element taken at query time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Unique CSS selector used for follow-up interactions.
    pub selector: String,
    pub tag: String,
    /// Whitespace-collapsed visible text.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub aria_label: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub href: Option<String>,
    /// Rendered with a non-zero box and not hidden by style.
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub bbox: BBox,
}

impl ElementInfo {
    /// Attribute texts used by hint matching.
    pub fn hints(&self) -> [&str; 4] {
        [&self.class, &self.title, &self.aria_label, &self.placeholder]
    }
}

/// One row of a table snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub selector: String,
    /// Data cell texts (header cell texts for header-only rows).
    #[serde(default)]
    pub cells: Vec<String>,
    /// Whole-row text content.
    #[serde(default)]
    pub text: String,
    /// Selector of the first link inside the row.
    #[serde(default)]
    pub link: Option<String>,
    /// Row is made of header cells only.
    #[serde(default)]
    pub header: bool,
}

impl TableRow {
    /// Build a data row from cell texts; mostly useful for fixtures.
    pub fn from_cells<S: AsRef<str>>(selector: impl Into<String>, cells: &[S]) -> Self {
        let cells: Vec<String> = cells.iter().map(|c| c.as_ref().to_string()).collect();
        Self {
            selector: selector.into(),
            text: cells.join(" "),
            cells,
            link: None,
            header: false,
        }
    }
}

/// Header and body rows of a table-like element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    #[serde(default)]
    pub header: Vec<String>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

/// Page operations used by the workflow.
///
/// Every call may fail transiently; callers decide whether a failure is
/// fatal. Nothing here retries.
#[async_trait(?Send)]
pub trait PortalPage {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn url(&self) -> Result<String>;

    /// Snapshot every element matching `css`, in document order.
    async fn query_all(&self, css: &str) -> Result<Vec<ElementInfo>>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn press_key(&self, key: &str) -> Result<()>;

    /// Mouse click at viewport coordinates.
    async fn click_at(&self, x: f64, y: f64) -> Result<()>;

    /// Snapshot the table rooted at `selector`, `None` if it is gone.
    async fn read_table(&self, selector: &str) -> Result<Option<TableSnapshot>>;

    async fn wait(&self, ms: u64);

    async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// A running browser process that hands out one page per run.
#[async_trait(?Send)]
pub trait PortalBrowser: Sized {
    type Page: PortalPage;

    async fn open_page(&self) -> Result<Self::Page>;

    async fn close_page(&self, page: Self::Page) -> Result<()>;

    async fn close(self) -> Result<()>;
}

/// Starts browser processes on demand.
#[async_trait(?Send)]
pub trait Launcher {
    type Browser: PortalBrowser;

    async fn launch(&self) -> Result<Self::Browser>;
}
