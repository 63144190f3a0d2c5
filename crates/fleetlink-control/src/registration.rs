//! Console registration state machine.
//!
//! This module defines the valid registration state transitions and the
//! thread-safe tracker the retry scheduler and the `manage` RPC share.
//!
//! # State Machine
//!
//! ```text
//!     ┌───────────────┐  tick   ┌─────────────┐
//!     │ NotRegistered │────────▶│ Registering │
//!     └───────────────┘◀────────└─────────────┘
//!        ▲      │     attempt done     │
//!        │      │ manage()             │ manage()
//!        │      ▼                      ▼
//!        │   ┌──────────────────────────────┐
//!        └───│          Registered          │
//!   manage() └──────────────────────────────┘
//!   (peer gone)            │ unmanage()
//!                          ▼
//!                  ┌──────────────┐
//!                  │ Unregistered │
//!                  └──────────────┘
//! ```
//!
//! Losing the console connection never moves the state by itself; the next
//! `manage()` call decides.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Registration of this platform with the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationState {
    /// Not registered; the retry scheduler will attempt registration.
    NotRegistered,
    /// Explicitly unmanaged by the console.
    Unregistered,
    /// A registration call is in flight.
    Registering,
    /// The console has confirmed management.
    Registered,
}

impl RegistrationState {
    /// Return the display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotRegistered => "NotRegistered",
            Self::Unregistered => "Unregistered",
            Self::Registering => "Registering",
            Self::Registered => "Registered",
        }
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: RegistrationState, to: RegistrationState) -> bool {
    use RegistrationState::{NotRegistered, Registered, Registering, Unregistered};

    matches!(
        (from, to),
        // A tick starts an attempt from NotRegistered only
        (NotRegistered, Registering)
            // The attempt finished without manage() arriving
            | (Registering, NotRegistered)
            // manage() decides from any state
            | (NotRegistered | Registering | Registered | Unregistered, Registered)
            | (Registered | Unregistered, NotRegistered)
            // unmanage()
            | (NotRegistered | Registering | Registered, Unregistered)
    )
}

/// Validates a state transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(
    from: RegistrationState,
    to: RegistrationState,
) -> Result<RegistrationState> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidTransition { from, to })
    }
}

/// Shared registration state.
#[derive(Debug)]
pub struct Registration {
    state: Mutex<RegistrationState>,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            state: Mutex::new(RegistrationState::NotRegistered),
        }
    }
}

impl Registration {
    /// Create a tracker in the `NotRegistered` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> RegistrationState {
        *self.state.lock()
    }

    /// Move to `to` if the transition is valid. Moving to the current state
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidTransition` if the transition is not allowed.
    pub fn transition(&self, to: RegistrationState) -> Result<RegistrationState> {
        let mut state = self.state.lock();
        if *state == to {
            return Ok(to);
        }
        *state = validate_transition(*state, to)?;
        tracing::debug!(state = %to, "Registration state changed");
        Ok(to)
    }

    /// Start a registration attempt. Returns false unless the state was
    /// `NotRegistered`.
    pub fn begin_attempt(&self) -> bool {
        let mut state = self.state.lock();
        if *state == RegistrationState::NotRegistered {
            *state = RegistrationState::Registering;
            true
        } else {
            false
        }
    }

    /// Finish a registration attempt. The state returns to `NotRegistered`
    /// unless `manage()` or `unmanage()` moved it meanwhile.
    pub fn finish_attempt(&self) {
        let mut state = self.state.lock();
        if *state == RegistrationState::Registering {
            *state = RegistrationState::NotRegistered;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RegistrationState::{NotRegistered, Registered, Registering, Unregistered};

    #[test]
    fn valid_transitions() {
        assert!(is_valid_transition(NotRegistered, Registering));
        assert!(is_valid_transition(Registering, NotRegistered));
        assert!(is_valid_transition(Registering, Registered));
        assert!(is_valid_transition(Registered, NotRegistered));
        assert!(is_valid_transition(Registered, Unregistered));
        assert!(is_valid_transition(Unregistered, Registered));
    }

    #[test]
    fn invalid_transitions() {
        assert!(!is_valid_transition(Registered, Registering));
        assert!(!is_valid_transition(Unregistered, Registering));
        assert!(!is_valid_transition(NotRegistered, NotRegistered));
    }

    #[test]
    fn validate_transition_error() {
        let err = validate_transition(Registered, Registering).unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition { .. }));
    }

    #[test]
    fn attempt_reverts_unless_managed() {
        let reg = Registration::new();
        assert!(reg.begin_attempt());
        assert_eq!(reg.state(), Registering);
        assert!(!reg.begin_attempt());
        reg.finish_attempt();
        assert_eq!(reg.state(), NotRegistered);

        assert!(reg.begin_attempt());
        reg.transition(Registered).unwrap();
        reg.finish_attempt();
        assert_eq!(reg.state(), Registered);
    }

    #[test]
    fn unregistered_blocks_attempts() {
        let reg = Registration::new();
        reg.transition(Unregistered).unwrap();
        assert!(!reg.begin_attempt());
        assert_eq!(reg.state(), Unregistered);
    }
}
