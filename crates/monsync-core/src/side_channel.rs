// # Side-Channel State
//
// Some kinds have an operational state (paused or active) that the general
// update endpoint ignores. It can only be changed through dedicated pause and
// resume actions.
//
// ## State machine
//
// ```text
//            pause
//   Active ---------> Paused
//          <---------
//            resume
// ```
//
// There is no self-transition. The declared state is always compared with
// the last-synced state (from the previous snapshot, or `Active` right after
// a create), never with the response of a general update.
//
// ## Failure policy
//
// A failed action does not fail the surrounding operation. The caller gets
// the state actually achieved plus a warning, and since that achieved state
// is what gets persisted, the next pass plans the same action again.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Operation, Warning};
use crate::traits::{ResourceKind, Transport};

/// Operational state reachable only through pause/resume actions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalState {
    /// State every create produces
    #[default]
    Active,
    Paused,
}

impl OperationalState {
    pub fn from_paused(paused: bool) -> Self {
        if paused {
            OperationalState::Paused
        } else {
            OperationalState::Active
        }
    }

    pub fn is_paused(&self) -> bool {
        *self == OperationalState::Paused
    }
}

impl fmt::Display for OperationalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationalState::Active => f.write_str("active"),
            OperationalState::Paused => f.write_str("paused"),
        }
    }
}

/// A side-channel action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Pause,
    Resume,
}

impl Transition {
    pub fn target(&self) -> OperationalState {
        match self {
            Transition::Pause => OperationalState::Paused,
            Transition::Resume => OperationalState::Active,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Transition::Pause => Operation::Pause,
            Transition::Resume => Operation::Resume,
        }
    }
}

/// Decide which action, if any, moves `last_synced` to `declared`
///
/// `None` for `declared` means the operator left the state unmanaged.
pub fn plan(declared: Option<OperationalState>, last_synced: OperationalState) -> Option<Transition> {
    match (declared?, last_synced) {
        (OperationalState::Paused, OperationalState::Active) => Some(Transition::Pause),
        (OperationalState::Active, OperationalState::Paused) => Some(Transition::Resume),
        _ => None,
    }
}

/// Result of one synchronization attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// State the remote is in after the attempt
    pub achieved: OperationalState,
    /// Action that was attempted, if any
    pub attempted: Option<Transition>,
    pub warning: Option<Warning>,
}

impl SyncOutcome {
    pub fn succeeded(&self) -> bool {
        self.warning.is_none()
    }
}

/// Bring the remote operational state in line with the declaration
///
/// Issues at most one action, and only when [`plan`] asks for one.
pub async fn sync(
    transport: &dyn Transport,
    kind: ResourceKind,
    id: &str,
    declared: Option<OperationalState>,
    last_synced: OperationalState,
) -> SyncOutcome {
    let Some(transition) = plan(declared, last_synced) else {
        return SyncOutcome {
            achieved: last_synced,
            attempted: None,
            warning: None,
        };
    };

    let result = match transition {
        Transition::Pause => transport.pause(kind, id).await,
        Transition::Resume => transport.resume(kind, id).await,
    };

    match result {
        Ok(()) => {
            tracing::info!("{} {} is now {}", kind, id, transition.target());
            SyncOutcome {
                achieved: transition.target(),
                attempted: Some(transition),
                warning: None,
            }
        }
        Err(e) => {
            let warning = Warning::new(
                format!("{} {} could not be set to {}", kind, id, transition.target()),
                format!(
                    "the {} action failed ({}). The resource exists and is otherwise up to date, \
                     but it is {} while {} was requested. The next pass retries the {} action only.",
                    transition.operation(),
                    e,
                    last_synced,
                    transition.target(),
                    transition.operation()
                ),
            );
            tracing::warn!("{}", warning);
            SyncOutcome {
                achieved: last_synced,
                attempted: Some(transition),
                warning: Some(warning),
            }
        }
    }
}
