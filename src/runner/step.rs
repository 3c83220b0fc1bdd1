//! Step executor and audit trail.

use crate::model::{OutcomeStatus, StepRecord, StepStatus};
use crate::Result;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Receives step records as they are produced.
///
/// Called synchronously: a `pending` record when a step starts, then its
/// terminal record.
pub trait StepObserver {
    fn on_step(&self, record: &StepRecord);
}

impl<F> StepObserver for F
where
    F: Fn(&StepRecord),
{
    fn on_step(&self, record: &StepRecord) {
        self(record)
    }
}

/// Forwards step records into a channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver(pub UnboundedSender<StepRecord>);

impl StepObserver for ChannelObserver {
    fn on_step(&self, record: &StepRecord) {
        // receiver gone means nobody is listening any more
        let _ = self.0.send(record.clone());
    }
}

/// What a step does when its target cannot be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Absence counts as success; errors are logged and skipped.
    Tolerant,
    /// Absence ends the run with this status; errors abort the run.
    Fatal(OutcomeStatus),
}

/// What a step's action reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done(String),
    Missed(String),
}

impl StepOutcome {
    pub fn done() -> Self {
        Self::Done(String::new())
    }
}

/// Whether the workflow keeps going after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop {
        status: OutcomeStatus,
        message: String,
    },
}

/// Ordered step records of one run, mirrored to an optional observer.
pub struct AuditTrail<'o> {
    records: Vec<StepRecord>,
    observer: Option<&'o dyn StepObserver>,
}

impl<'o> AuditTrail<'o> {
    pub fn new(observer: Option<&'o dyn StepObserver>) -> Self {
        Self {
            records: Vec::new(),
            observer,
        }
    }

    /// Announce a step. Only the observer sees the pending record.
    pub fn begin(&mut self, step: &str) {
        info!("{}...", step);
        if let Some(observer) = self.observer {
            observer.on_step(&StepRecord::pending(step));
        }
    }

    /// Record the terminal state of a step.
    pub fn finish(&mut self, step: &str, status: StepStatus, message: impl Into<String>) {
        let record = StepRecord::new(step, status, message);
        if let Some(observer) = self.observer {
            observer.on_step(&record);
        }
        self.records.push(record);
    }

    /// Settle a step's action result into exactly one terminal record.
    ///
    /// `Err` from a fatal step is recorded and then handed back so the run
    /// can abort.
    pub fn settle(
        &mut self,
        step: &str,
        policy: StepPolicy,
        outcome: Result<StepOutcome>,
    ) -> Result<Flow> {
        match (outcome, policy) {
            (Ok(StepOutcome::Done(message)), _) => {
                self.finish(step, StepStatus::Success, message);
                Ok(Flow::Continue)
            }
            (Ok(StepOutcome::Missed(message)), StepPolicy::Tolerant) => {
                self.finish(step, StepStatus::Success, message);
                Ok(Flow::Continue)
            }
            (Ok(StepOutcome::Missed(message)), StepPolicy::Fatal(status)) => {
                warn!("{}: {}", step, message);
                self.finish(step, StepStatus::Error, message.clone());
                Ok(Flow::Stop { status, message })
            }
            (Err(e), StepPolicy::Tolerant) => {
                warn!("{} skipped: {}", step, e);
                self.finish(step, StepStatus::Success, format!("skipped: {}", e));
                Ok(Flow::Continue)
            }
            (Err(e), StepPolicy::Fatal(_)) => {
                self.finish(step, StepStatus::Error, e.detail());
                Err(e)
            }
        }
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StepRecord> {
        self.records
    }
}
