//! Process-wide kill switch for mutating operations
//!
//! Lives outside the registry lock so it can be flipped while a resolution
//! walk holds that lock.

use std::sync::atomic::{AtomicBool, Ordering};

use hp_error::{HotplugError, Result};
use tracing::{debug, info};

#[derive(Debug)]
pub struct ArbitrationGate {
    open: AtomicBool,
}

impl ArbitrationGate {
    pub fn new(open: bool) -> Self {
        Self {
            open: AtomicBool::new(open),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Returns the previous state
    pub fn set_open(&self, open: bool) -> bool {
        let prev = self.open.swap(open, Ordering::SeqCst);
        if prev != open {
            info!("Hotplugger {}", if open { "enabled" } else { "disabled" });
        }
        prev
    }

    /// `Disabled` unless the gate is open
    pub fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            debug!("{}: hotplugger is disabled", operation);
            Err(HotplugError::Disabled)
        }
    }
}

impl Default for ArbitrationGate {
    fn default() -> Self {
        Self::new(true)
    }
}
