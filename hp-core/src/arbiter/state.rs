//! Single-driver state transitions
//!
//! The only place the arbiter calls into a controller's `set_state`. The
//! caller is expected to hold the registry lock.

use hp_error::ControllerError;
use tracing::debug;

use crate::driver::{ControllerDescriptor, DescriptorRef};

/// Why a transition was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The target is the driver that asked for the change
    Requester,
    /// The target cannot change state
    NoCapability,
    /// The target already is in the requested state
    AlreadyInState,
}

/// Outcome of a successful [`change_state`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    NotApplicable(SkipReason),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// Move `target` to `enabled` on behalf of `requester`.
///
/// Skipped transitions are successes. A controller failure is returned as-is
/// and never retried.
pub fn change_state(
    requester: Option<&DescriptorRef>,
    target: &DescriptorRef,
    enabled: bool,
) -> Result<Transition, ControllerError> {
    if requester.is_some_and(|r| ControllerDescriptor::same(r, target)) {
        return Ok(Transition::NotApplicable(SkipReason::Requester));
    }
    if !target.can_transition() {
        return Ok(Transition::NotApplicable(SkipReason::NoCapability));
    }
    if target.is_enabled() == enabled {
        return Ok(Transition::NotApplicable(SkipReason::AlreadyInState));
    }

    debug!(
        "{} \"{}\" driver",
        if enabled { "enabling" } else { "disabling" },
        target.name()
    );
    target.set_state(enabled)?;
    Ok(Transition::Applied)
}
