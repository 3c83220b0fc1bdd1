pub mod profile;
pub mod schema;

pub use profile::PortalProfile;
pub use schema::{BrowserConfig, OnFailure, Portal, ScraperConfig, Timings, Viewport};
