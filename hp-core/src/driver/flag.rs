//! In-memory controllers backed by an atomic flag
//!
//! For drivers whose whole state is one switch variable. An inverted flag
//! reads as enabled while the variable is off, for drivers that expose a
//! "disabled" knob instead of an "enabled" one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hp_error::ControllerError;

use super::descriptor::Controller;

/// Cloning shares the underlying flag
#[derive(Debug, Clone, Default)]
pub struct FlagController {
    raw: Arc<AtomicBool>,
    inverted: bool,
}

impl FlagController {
    /// Flag reading as `enabled`
    pub fn new(enabled: bool) -> Self {
        Self {
            raw: Arc::new(AtomicBool::new(enabled)),
            inverted: false,
        }
    }

    /// Flag that reads as enabled while the raw variable is false
    pub fn inverted(enabled: bool) -> Self {
        Self {
            raw: Arc::new(AtomicBool::new(!enabled)),
            inverted: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.raw() != self.inverted
    }

    /// Raw variable value
    pub fn raw(&self) -> bool {
        self.raw.load(Ordering::SeqCst)
    }

    /// Change the raw variable behind the arbiter's back, like hardware or
    /// another subsystem would
    pub fn set_raw(&self, value: bool) {
        self.raw.store(value, Ordering::SeqCst);
    }
}

impl Controller for FlagController {
    fn set_state(&self, enabled: bool) -> Result<(), ControllerError> {
        self.raw.store(enabled != self.inverted, Ordering::SeqCst);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        FlagController::is_enabled(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_flag() {
        let f = FlagController::new(false);
        assert!(!f.is_enabled());
        f.set_state(true).unwrap();
        assert!(f.is_enabled());
        assert!(f.raw());
    }

    #[test]
    fn test_inverted_flag() {
        let f = FlagController::inverted(true);
        assert!(f.is_enabled());
        assert!(!f.raw());

        f.set_state(false).unwrap();
        assert!(!f.is_enabled());
        assert!(f.raw());

        f.set_raw(false);
        assert!(f.is_enabled());
    }

    #[test]
    fn test_clones_share_state() {
        let f = FlagController::new(false);
        let handle = f.clone();
        f.set_state(true).unwrap();
        assert!(handle.is_enabled());
    }
}
