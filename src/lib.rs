//! # permit-scout
//!
//! Drives the BDES cadastral map portal to find the most recent delivered
//! building permit ("Permis délivré") for a company address.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use permit_scout::{ChromeScraper, ScraperConfig, Target};
//!
//! # #[tokio::main]
//! # async fn main() -> permit_scout::Result<()> {
//! let config = ScraperConfig::load("configs/portal.yaml")?;
//! let mut scraper = ChromeScraper::chrome(config);
//! scraper.initialize().await?;
//! let result = scraper
//!     .scrape_permit(&Target::new("Acme", "Rue de la Station 1, 4650 Herve"), None)
//!     .await;
//! println!("{}: {:?}", result.status, result.latest_permit_date);
//! scraper.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod extract;
pub mod input;
pub mod locator;
pub mod model;
pub mod outcome;
pub mod page;
pub mod report;
mod runner;

pub use config::{BrowserConfig, OnFailure, PortalProfile, ScraperConfig, Timings, Viewport};
pub use locator::{Matcher, Strategy};
pub use model::{OutcomeStatus, PermitResult, StepRecord, StepStatus, Target};
pub use runner::{
    progress_percent, BatchObserver, ChannelObserver, ChromeScraper, PermitScraper, Step,
    StepObserver, StepPolicy, OPEN_SESSION_STEP, WORKFLOW,
};

/// Result type for permit-scout operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading inputs or driving the portal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("page error: {0}")]
    Page(String),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("input error: {0}")]
    Input(String),
}

impl Error {
    /// The underlying message, without the category prefix of `Display`.
    pub fn detail(&self) -> String {
        match self {
            Self::Config(message) | Self::Page(message) | Self::Input(message) => message.clone(),
            Self::Yaml(e) => e.to_string(),
            Self::Json(e) => e.to_string(),
            Self::Csv(e) => e.to_string(),
            Self::Io(e) => e.to_string(),
            Self::Browser(e) => e.to_string(),
            Self::Spreadsheet(e) => e.to_string(),
            Self::Xlsx(e) => e.to_string(),
        }
    }
}
