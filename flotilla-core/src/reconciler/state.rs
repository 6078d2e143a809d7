//! Lifecycle states and reconcile actions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a resource is in its lifecycle, as last seen by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    #[default]
    Absent,
    Creating,
    Active,
    Updating,
    Deleting,
    /// Non-terminal. The next pass re-evaluates from observed state.
    Failed,
}

impl LifecycleState {
    /// Action that was in flight while in this state.
    pub fn in_flight_action(self) -> Action {
        match self {
            LifecycleState::Creating => Action::Create,
            LifecycleState::Updating => Action::Update,
            LifecycleState::Deleting => Action::Delete,
            _ => Action::None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Absent => "ABSENT",
            LifecycleState::Creating => "CREATING",
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Updating => "UPDATING",
            LifecycleState::Deleting => "DELETING",
            LifecycleState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Mutation a reconcile pass decided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    None,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::None => "none",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(s)
    }
}
