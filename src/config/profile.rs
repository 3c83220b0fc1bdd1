//! Built-in locator strategies for the BDES map portal.
//!
//! The portal is a Dojo/Esri application whose markup shifts between
//! releases, so each target lists several selectors from most to least
//! specific. Any list can be replaced from YAML.

use crate::locator::{Matcher, Strategy};
use serde::{Deserialize, Serialize};

/// Ordered strategy lists, one per page target the workflow needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortalProfile {
    pub terms_checkbox: Vec<Strategy>,
    pub terms_accept: Vec<Strategy>,
    pub help_close: Vec<Strategy>,
    pub address_field: Vec<Strategy>,
    pub search_button: Vec<Strategy>,
    pub suggestion: Vec<Strategy>,
    pub identify_tool: Vec<Strategy>,
    pub map: Vec<Strategy>,
    pub results_panel: Vec<Strategy>,
    pub parcel_table: Vec<Strategy>,
    pub procedures_tab: Vec<Strategy>,
    pub procedures_table: Vec<Strategy>,
}

impl PortalProfile {
    /// Every list with its YAML key.
    pub fn lists(&self) -> [(&'static str, &[Strategy]); 12] {
        [
            ("terms_checkbox", self.terms_checkbox.as_slice()),
            ("terms_accept", self.terms_accept.as_slice()),
            ("help_close", self.help_close.as_slice()),
            ("address_field", self.address_field.as_slice()),
            ("search_button", self.search_button.as_slice()),
            ("suggestion", self.suggestion.as_slice()),
            ("identify_tool", self.identify_tool.as_slice()),
            ("map", self.map.as_slice()),
            ("results_panel", self.results_panel.as_slice()),
            ("parcel_table", self.parcel_table.as_slice()),
            ("procedures_tab", self.procedures_tab.as_slice()),
            ("procedures_table", self.procedures_table.as_slice()),
        ]
    }
}

fn clickable(name: &str, css: &str, text: &str) -> Strategy {
    Strategy::css(name, css).matching(Matcher::text(text))
}

impl Default for PortalProfile {
    fn default() -> Self {
        let identify_hints = || Matcher::hint(["identif", "stethoscope"]);
        Self {
            terms_checkbox: vec![
                Strategy::css("dojo dialog checkbox", ".dijitDialog input[type='checkbox']"),
                Strategy::css("aria dialog checkbox", "[role='dialog'] input[type='checkbox']"),
                clickable("read confirmation label", ".dijitDialog label", "J'ai lu"),
            ],
            terms_accept: vec![
                clickable("accept button", "button", "Accepter"),
                clickable("dojo accept label", ".dijitButtonText", "Accepter"),
                clickable("accept span", "span", "Accepter"),
                clickable("aria accept", "[role='button']", "Accepter"),
            ],
            help_close: vec![
                Strategy::css("dojo close icon", ".dijitDialogCloseIcon"),
                Strategy::css("close by title", "button[title*='Fermer']"),
                Strategy::css("jquery close", ".ui-dialog-titlebar-close"),
            ],
            address_field: vec![
                Strategy::css("address placeholder", "input[placeholder*='Adresse']"),
                Strategy::css("address placeholder lower", "input[placeholder*='adresse']"),
                Strategy::css("street placeholder", "input[placeholder*='rue']"),
                Strategy::css("first text input", "input[type='text']"),
            ],
            search_button: vec![
                Strategy::css("geolocation search", "div.SpwGeolocalisationSearchInputButton"),
                Strategy::css(
                    "geolocation search partial",
                    "[class*='SpwGeolocalisationSearchInputButton']",
                ),
                Strategy::css("geolocation button", "[class*='SpwGeolocalisationSearchInput'] button"),
            ],
            suggestion: vec![
                Strategy::css("combo menu item", ".dijitComboBoxMenu .dijitMenuItem"),
                Strategy::css("menu item", ".dijitMenuItem"),
                Strategy::css("aria option", "[role='option']"),
            ],
            identify_tool: vec![
                Strategy::css("advanced identify", ".myCustomAdvancedIdentifyButton"),
                Strategy::css("advanced identify partial", "[class*='myCustomAdvancedIdentify']"),
                Strategy::css("identify hint button", "button").matching(identify_hints()),
                Strategy::css("identify hint role", "[role='button']").matching(identify_hints()),
                Strategy::css("toolbar slot 6", ".dijitToolbar button:nth-child(6)"),
                Strategy::css("toolbar slot 7", ".dijitToolbar button:nth-child(7)"),
                Strategy::css(
                    "soil state info",
                    "button[title=\"Informations sur l'état des sols\"]",
                ),
            ],
            map: vec![
                Strategy::css("esri map", "#esri\\.Map_0_container"),
                Strategy::css("esri container", ".esriMapContainer"),
                Strategy::css("leaflet", ".leaflet-container"),
                Strategy::css("map by id", "[id*='map']").matching(Matcher::MinSize {
                    width: 50.0,
                    height: 50.0,
                }),
            ],
            results_panel: vec![
                clickable("result panel", "[class*='result']", "resultat"),
                clickable("result panel parcels", "[class*='result']", "parcelle"),
                clickable("parcel dialog", "[role='dialog']", "parcelle"),
            ],
            parcel_table: vec![
                clickable("parcel table", "table", "parcelle"),
                Strategy::css("result table", "[class*='result'] table"),
                Strategy::css("grid", "[role='grid']"),
            ],
            procedures_tab: vec![
                clickable("aria tab", "[role='tab']", "procedures"),
                clickable("tab button", "button", "procedures"),
                clickable("tab link", "a", "procedures"),
                clickable("tab class", "[class*='tab']", "procedures"),
            ],
            procedures_table: vec![
                clickable("status table", "table", "statut"),
                Strategy::css("any table", "table"),
                Strategy::css("aria table", "[role='table']"),
                Strategy::css("table class", "[class*='table']"),
            ],
        }
    }
}
