//! Controllers backed by a sysfs attribute
//!
//! Many hotplug and power drivers expose a single knob such as
//! `/sys/module/<driver>/parameters/enabled`. A [`SysfsController`] writes
//! the configured on/off value to that file and reads it back to report the
//! current state.

use std::fs;
use std::path::{Path, PathBuf};

use hp_error::ControllerError;
use tracing::trace;

use super::descriptor::Controller;
use crate::constants::sysfs::{DEFAULT_OFF_VALUE, DEFAULT_ON_VALUE};

#[derive(Debug, Clone)]
pub struct SysfsController {
    path: PathBuf,
    on_value: String,
    off_value: String,
}

impl SysfsController {
    /// Controller writing "1"/"0" to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_values(path, DEFAULT_ON_VALUE, DEFAULT_OFF_VALUE)
    }

    pub fn with_values(
        path: impl Into<PathBuf>,
        on_value: impl Into<String>,
        off_value: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            on_value: on_value.into().trim().to_string(),
            off_value: off_value.into().trim().to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Controller for SysfsController {
    fn set_state(&self, enabled: bool) -> Result<(), ControllerError> {
        let value = if enabled { &self.on_value } else { &self.off_value };
        fs::write(&self.path, value).map_err(|e| {
            ControllerError::Io(format!(
                "failed to write '{}' to {}: {}",
                value,
                self.path.display(),
                e
            ))
        })
    }

    fn is_enabled(&self) -> bool {
        match fs::read_to_string(&self.path) {
            Ok(content) => content.trim() == self.on_value,
            Err(e) => {
                trace!("Cannot read {}: {}", self.path.display(), e);
                false
            }
        }
    }

    fn can_transition(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let knob = dir.path().join("enabled");
        fs::write(&knob, "0\n").unwrap();

        let c = SysfsController::new(&knob);
        assert!(c.can_transition());
        assert!(!c.is_enabled());

        c.set_state(true).unwrap();
        assert!(c.is_enabled());
        assert_eq!(fs::read_to_string(&knob).unwrap(), "1");

        c.set_state(false).unwrap();
        assert!(!c.is_enabled());
    }

    #[test]
    fn test_custom_values() {
        let dir = TempDir::new().unwrap();
        let knob = dir.path().join("mode");
        fs::write(&knob, "Y\n").unwrap();

        let c = SysfsController::with_values(&knob, "Y", "N");
        assert!(c.is_enabled());
        c.set_state(false).unwrap();
        assert_eq!(fs::read_to_string(&knob).unwrap(), "N");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let c = SysfsController::new(dir.path().join("missing/enabled"));
        assert!(!c.can_transition());
        assert!(!c.is_enabled());
        assert!(matches!(c.set_state(true), Err(ControllerError::Io(_))));
    }
}
