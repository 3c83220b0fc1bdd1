//! Data model shared by the engine, the batch driver and the reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One company/address pair to look up on the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub company: String,
    pub address: String,
}

impl Target {
    pub fn new(company: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.company, self.address)
    }
}

/// Final classification of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    /// A delivered-permit date was found.
    Success,
    /// Search, tool activation, map click or parcel selection failed.
    AddressNotFound,
    /// More parcel rows than expected were present.
    MultipleParcels,
    /// Procedures tab missing, or no delivered-permit row in the table.
    NoPermitData,
    /// Unexpected failure during the run.
    Error,
}

impl OutcomeStatus {
    pub const ALL: [OutcomeStatus; 5] = [
        OutcomeStatus::Success,
        OutcomeStatus::AddressNotFound,
        OutcomeStatus::MultipleParcels,
        OutcomeStatus::NoPermitData,
        OutcomeStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::AddressNotFound => "ADDRESS_NOT_FOUND",
            Self::MultipleParcels => "MULTIPLE_PARCELS",
            Self::NoPermitData => "NO_PERMIT_DATA",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a workflow step as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Success,
    Error,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Audit entry for one workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Human-readable stage name.
    pub step: String,
    pub status: StepStatus,
    /// Detail message, empty when there is nothing to add.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(step: impl Into<String>, status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn pending(step: impl Into<String>) -> Self {
        Self::new(step, StepStatus::Pending, "")
    }
}

/// Outcome of one engine run for a single target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitResult {
    pub company: String,
    pub address: String,
    /// Latest delivered permit date, kept as the portal wrote it (`DD/MM/YYYY`).
    pub latest_permit_date: Option<String>,
    pub permit_page_link: Option<String>,
    pub status: OutcomeStatus,
    /// Status the run resolved to before the multiple-parcels overlay.
    pub resolution: OutcomeStatus,
    /// Genuine parcel rows seen on the identification results, if that step ran.
    pub parcel_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub steps: Vec<StepRecord>,
}

impl PermitResult {
    pub fn target(&self) -> Target {
        Target::new(self.company.clone(), self.address.clone())
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
