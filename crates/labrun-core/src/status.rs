//! Run status and its transition rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Status of a Run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run recorded, process not yet spawned.
    #[default]
    Pending,
    /// External process spawned and not yet observed to exit.
    Running,
    /// Process exited with code 0.
    Success,
    /// Process exited non-zero, or could not be launched.
    Failed,
}

impl RunStatus {
    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Success)
                | (Self::Running, Self::Failed)
        )
    }

    /// Stable string form, used for storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// All statuses, in lifecycle order.
    pub fn all() -> &'static [RunStatus] {
        &[Self::Pending, Self::Running, Self::Success, Self::Failed]
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(CoreError::InvalidInput(format!("unknown run status '{}'", other))),
        }
    }
}
