//! Maps how a workflow run ended to the reported status.

use crate::extract::PermitDate;
use crate::model::OutcomeStatus;

/// How a workflow run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// Every step ran to the end.
    Completed,
    /// A fatal step missed its target.
    Stopped {
        status: OutcomeStatus,
        message: String,
    },
    /// Something unexpected went wrong.
    Crashed { message: String },
}

/// Final status, the status before the parcel overlay, and the error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: OutcomeStatus,
    pub resolution: OutcomeStatus,
    pub error_message: Option<String>,
}

/// Message reported when the procedures table holds no delivered permit.
pub const NO_DELIVERED_PERMIT: &str = "No 'Permis délivré' entries found";

/// Classify a run.
///
/// A completed run is SUCCESS when a date was found and NO_PERMIT_DATA
/// otherwise. When more parcel rows than expected were seen, the status is
/// overwritten with MULTIPLE_PARCELS; the underlying resolution and its
/// message are kept so neither fact is lost. Crashes are never overwritten.
pub fn classify(
    terminal: &Terminal,
    latest: Option<&PermitDate>,
    multiple_parcels: bool,
) -> Classification {
    let (resolution, error_message) = match terminal {
        Terminal::Completed => match latest {
            Some(_) => (OutcomeStatus::Success, None),
            None => (
                OutcomeStatus::NoPermitData,
                Some(NO_DELIVERED_PERMIT.to_string()),
            ),
        },
        Terminal::Stopped { status, message } => (*status, Some(message.clone())),
        Terminal::Crashed { message } => (OutcomeStatus::Error, Some(message.clone())),
    };
    let status = if multiple_parcels && resolution != OutcomeStatus::Error {
        OutcomeStatus::MultipleParcels
    } else {
        resolution
    };
    Classification {
        status,
        resolution,
        error_message,
    }
}
