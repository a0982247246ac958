//! Experiment lifecycle state machine
//!
//! ```text
//! draft ──start──▶ running ──stop──▶ paused
//!                     │
//!                     └──selectWinner──▶ completed
//! ```
//!
//! `select_winner` is not gated by status. Paused has no way back to running.
//! The guard returned by [`Transition::required_status`] is handed to the
//! store, which checks it inside the same atomic update that writes the new
//! status.

use crate::model::ExperimentStatus;
use std::fmt;

/// Minimum number of variants an experiment needs before it can start
pub const MIN_VARIANTS_TO_START: usize = 2;

/// Operations that mutate an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    AddVariant,
    Start,
    Stop,
    SelectWinner,
    Extend,
    Delete,
}

impl Transition {
    /// Status the experiment must be in, or None when the transition is ungated
    pub fn required_status(&self) -> Option<ExperimentStatus> {
        match self {
            Transition::AddVariant | Transition::Start | Transition::Delete => {
                Some(ExperimentStatus::Draft)
            }
            Transition::Stop | Transition::Extend => Some(ExperimentStatus::Running),
            Transition::SelectWinner => None,
        }
    }

    /// Status after the transition, None when the status does not change
    pub fn target_status(&self) -> Option<ExperimentStatus> {
        match self {
            Transition::Start => Some(ExperimentStatus::Running),
            Transition::Stop => Some(ExperimentStatus::Paused),
            Transition::SelectWinner => Some(ExperimentStatus::Completed),
            Transition::AddVariant | Transition::Extend | Transition::Delete => None,
        }
    }

    /// Whether the transition may run from `status`
    pub fn is_allowed_from(&self, status: ExperimentStatus) -> bool {
        self.required_status()
            .map_or(true, |required| required == status)
    }

    /// Human-readable guard failure for `status`
    pub fn rejection_message(&self, status: ExperimentStatus) -> String {
        match self {
            Transition::AddVariant => format!(
                "Cannot add variants to an experiment in {} status; only draft experiments accept variants",
                status
            ),
            Transition::Start => format!(
                "Experiment can only be started from draft status (current: {})",
                status
            ),
            Transition::Stop => format!(
                "Only running experiments can be stopped (current: {})",
                status
            ),
            Transition::Extend => format!(
                "Only running experiments can be extended (current: {})",
                status
            ),
            Transition::Delete => format!(
                "Only draft experiments can be deleted (current: {})",
                status
            ),
            Transition::SelectWinner => {
                format!("Winner selection rejected in {} status", status)
            }
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::AddVariant => "add_variant",
            Transition::Start => "start",
            Transition::Stop => "stop",
            Transition::SelectWinner => "select_winner",
            Transition::Extend => "extend",
            Transition::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Check the start guard's variant requirement
pub fn has_enough_variants(variant_count: usize) -> bool {
    variant_count >= MIN_VARIANTS_TO_START
}
