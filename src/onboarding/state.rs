//! Onboarding state: step identifiers and the engine's mutable position.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::model::ProfileDraft;

/// One screen of data collection in the onboarding flow.
///
/// Order among steps is not fixed; the workflow graph decides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepId {
    AccountType,
    UserDetails,
    BusinessDetails,
    Portfolio,
    Address,
    VerificationDocument,
}

impl StepId {
    pub const ALL: [StepId; 6] = [
        StepId::AccountType,
        StepId::UserDetails,
        StepId::BusinessDetails,
        StepId::Portfolio,
        StepId::Address,
        StepId::VerificationDocument,
    ];
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AccountType => "AccountType",
            Self::UserDetails => "UserDetails",
            Self::BusinessDetails => "BusinessDetails",
            Self::Portfolio => "Portfolio",
            Self::Address => "Address",
            Self::VerificationDocument => "VerificationDocument",
        };
        write!(f, "{s}")
    }
}

/// Where the user is in the flow, as seen by the UI shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum Position {
    /// Render the screen for this step.
    Step(StepId),
    /// Onboarding finished; the remote account is fully onboarded.
    Complete,
}

impl Position {
    pub fn step(&self) -> Option<StepId> {
        match self {
            Self::Step(id) => Some(*id),
            Self::Complete => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Persisted engine state for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    pub current_step_id: StepId,
    pub draft: ProfileDraft,
    pub completed_step_ids: BTreeSet<StepId>,
    /// Visited steps, oldest first. The last entry is always the current step.
    pub history: Vec<StepId>,
    /// Set once `set_account_type` has succeeded; freezes the account type.
    #[serde(default)]
    pub account_type_committed: bool,
}

impl EngineState {
    /// Fresh state positioned at `initial` with an empty draft.
    pub fn new(initial: StepId) -> Self {
        Self {
            current_step_id: initial,
            draft: ProfileDraft::default(),
            completed_step_ids: BTreeSet::new(),
            history: vec![initial],
            account_type_committed: false,
        }
    }

    /// Move forward to `next`, recording it in the history.
    pub fn move_to(&mut self, next: StepId) {
        if self.history.last() != Some(&next) {
            self.history.push(next);
        }
        self.current_step_id = next;
    }

    /// Step back to the previous history entry. Returns the new current step.
    pub fn step_back(&mut self) -> Option<StepId> {
        if self.history.len() < 2 {
            return None;
        }
        self.history.pop();
        let previous = *self.history.last()?;
        self.current_step_id = previous;
        Some(previous)
    }

    pub fn can_go_back(&self) -> bool {
        self.history.len() > 1
    }

    pub fn is_completed(&self, step: StepId) -> bool {
        self.completed_step_ids.contains(&step)
    }
}
