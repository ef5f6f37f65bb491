//! Relay lifecycle state machine.
//!
//! The durable state of a relay only changes through [`transition`]:
//!
//! | Current | Init | Update | Shutdown |
//! |---------|------|--------|----------|
//! | `Enabled` | `Enabled` | `Enabled` | `Maintenance` |
//! | `Quarantine` | rejected | rejected | unchanged |
//! | `Decommissioned` | rejected | rejected | unchanged |
//! | any other | `Enabled` | rejected | unchanged |
//!
//! Quarantine is lifted by an operator only; protocol traffic never leaves it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Durable relay state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RelayState {
    /// Participating in the mesh
    Enabled = 0,
    /// Taken out of service, may come back
    Maintenance = 1,
    /// Administratively disabled
    Disabled = 2,
    /// Blocked until an operator clears it
    Quarantine = 3,
    /// Permanently retired
    Decommissioned = 4,
    /// Known but not running
    Offline = 5,
    /// Announced shutdown in progress
    ShuttingDown = 6,
}

impl RelayState {
    /// Every state, in discriminant order.
    pub const ALL: [RelayState; 7] = [
        Self::Enabled,
        Self::Maintenance,
        Self::Disabled,
        Self::Quarantine,
        Self::Decommissioned,
        Self::Offline,
        Self::ShuttingDown,
    ];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Maintenance => "maintenance",
            Self::Disabled => "disabled",
            Self::Quarantine => "quarantine",
            Self::Decommissioned => "decommissioned",
            Self::Offline => "offline",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown relay state name
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid relay state '{0}'")]
pub struct ParseRelayStateError(String);

impl FromStr for RelayState {
    type Err = ParseRelayStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseRelayStateError(s.to_string()))
    }
}

/// Protocol event driving a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Authenticated init request
    Init,
    /// Authenticated update request
    Update,
    /// Update request carrying the shutdown flag
    Shutdown,
}

/// Transition refused by the lifecycle rules
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// Relay is quarantined
    #[error("relay is quarantined")]
    Quarantined,

    /// Relay is decommissioned
    #[error("relay is decommissioned")]
    Decommissioned,

    /// Relay is not enabled
    #[error("relay is not enabled (state: {0})")]
    NotEnabled(RelayState),
}

/// Next durable state for `current` after `event`.
///
/// # Errors
///
/// Returns [`LifecycleError`] when the event is not allowed from `current`;
/// nothing may be mutated in that case.
pub fn transition(current: RelayState, event: LifecycleEvent) -> Result<RelayState, LifecycleError> {
    match (current, event) {
        (RelayState::Quarantine, LifecycleEvent::Init | LifecycleEvent::Update) => {
            Err(LifecycleError::Quarantined)
        }
        (RelayState::Decommissioned, LifecycleEvent::Init | LifecycleEvent::Update) => {
            Err(LifecycleError::Decommissioned)
        }
        (_, LifecycleEvent::Init) => Ok(RelayState::Enabled),
        (RelayState::Enabled, LifecycleEvent::Update) => Ok(RelayState::Enabled),
        (state, LifecycleEvent::Update) => Err(LifecycleError::NotEnabled(state)),
        (RelayState::Enabled, LifecycleEvent::Shutdown) => Ok(RelayState::Maintenance),
        (state, LifecycleEvent::Shutdown) => Ok(state),
    }
}
