//! Arbiter Settings
//!
//! Persistent settings stored as JSON, by default in
//! /etc/hotplugger/settings.json. The registry itself is never persisted;
//! settings only describe how the arbiter behaves and which sysfs-backed
//! drivers the daemon registers at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use hp_error::{HotplugError, Result};

use crate::arbiter::LockPolicy;
use crate::constants::{lock, paths, surface, sysfs};
use crate::driver::{ControllerDescriptor, DescriptorRef, DriverName, SysfsController};

/// A driver switched through a sysfs attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSettings {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_on_value")]
    pub on_value: String,
    #[serde(default = "default_off_value")]
    pub off_value: String,
    #[serde(default)]
    pub whitelist: Vec<String>,
}

fn default_on_value() -> String {
    sysfs::DEFAULT_ON_VALUE.to_string()
}

fn default_off_value() -> String {
    sysfs::DEFAULT_OFF_VALUE.to_string()
}

impl ControllerSettings {
    /// Build the descriptor the daemon registers for this entry
    pub fn build(&self) -> DescriptorRef {
        let controller =
            SysfsController::with_values(&self.path, self.on_value.as_str(), self.off_value.as_str());
        ControllerDescriptor::new(&self.name, controller)
            .with_whitelist(&self.whitelist)
            .into_ref()
    }
}

/// Arbiter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterSettings {
    /// Whether mutating operations are allowed right after startup
    #[serde(default = "default_gate_open")]
    pub gate_open_on_start: bool,
    /// Try-lock attempts before a conflict resolution reports busy
    #[serde(default = "default_retry_budget")]
    pub lock_retry_budget: u32,
    /// Pause between contended attempts, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub lock_retry_backoff_ms: u64,
    /// Byte budget for rendered driver listings
    #[serde(default = "default_show_buffer_len")]
    pub show_buffer_len: usize,
    /// Sysfs-backed drivers registered by the daemon
    #[serde(default)]
    pub controllers: Vec<ControllerSettings>,
}

fn default_gate_open() -> bool {
    true
}

fn default_retry_budget() -> u32 {
    lock::DEFAULT_RETRY_BUDGET
}

fn default_backoff_ms() -> u64 {
    lock::DEFAULT_BACKOFF_MS
}

fn default_show_buffer_len() -> usize {
    surface::DEFAULT_SHOW_BUFFER_LEN
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            gate_open_on_start: default_gate_open(),
            lock_retry_budget: default_retry_budget(),
            lock_retry_backoff_ms: default_backoff_ms(),
            show_buffer_len: default_show_buffer_len(),
            controllers: Vec::new(),
        }
    }
}

impl ArbiterSettings {
    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            retry_budget: self.lock_retry_budget,
            backoff: Duration::from_millis(self.lock_retry_backoff_ms),
        }
    }

    /// Check ranges and controller definitions
    pub fn validate(&self) -> Result<()> {
        if self.lock_retry_budget == 0 || self.lock_retry_budget > lock::MAX_RETRY_BUDGET {
            return Err(HotplugError::invalid_config(
                "lock_retry_budget",
                format!("must be 1-{}", lock::MAX_RETRY_BUDGET),
            ));
        }
        if self.lock_retry_backoff_ms > lock::MAX_BACKOFF_MS {
            return Err(HotplugError::invalid_config(
                "lock_retry_backoff_ms",
                format!("must be at most {}", lock::MAX_BACKOFF_MS),
            ));
        }
        if !(surface::MIN_SHOW_BUFFER_LEN..=surface::MAX_SHOW_BUFFER_LEN)
            .contains(&self.show_buffer_len)
        {
            return Err(HotplugError::invalid_config(
                "show_buffer_len",
                format!(
                    "must be {}-{}",
                    surface::MIN_SHOW_BUFFER_LEN,
                    surface::MAX_SHOW_BUFFER_LEN
                ),
            ));
        }

        let mut seen = HashSet::new();
        for c in &self.controllers {
            let name = DriverName::new(&c.name);
            if name.is_empty() {
                return Err(HotplugError::invalid_config("controllers.name", "must not be empty"));
            }
            if !seen.insert(name.clone()) {
                return Err(HotplugError::invalid_config(
                    "controllers.name",
                    format!("duplicate driver name \"{}\"", name),
                ));
            }
            if !c.path.is_absolute() {
                return Err(HotplugError::invalid_config(
                    "controllers.path",
                    format!("{} is not absolute", c.path.display()),
                ));
            }
            if c.on_value.trim() == c.off_value.trim() {
                return Err(HotplugError::invalid_config(
                    "controllers.on_value",
                    format!("on and off values of \"{}\" are identical", name),
                ));
            }
        }
        Ok(())
    }
}

/// Settings file location: `$HOTPLUGGER_CONFIG`, then the system directory,
/// then the user's config directory
pub fn get_settings_path() -> PathBuf {
    if let Ok(p) = std::env::var(paths::CONFIG_ENV) {
        return PathBuf::from(p);
    }
    let system = Path::new(paths::CONFIG_DIR).join(paths::SETTINGS_FILE);
    if system.exists() {
        return system;
    }
    dirs::config_dir()
        .map(|d| d.join("hotplugger").join(paths::SETTINGS_FILE))
        .unwrap_or(system)
}

/// Load settings from the default location
pub fn load_settings() -> Result<ArbiterSettings> {
    load_settings_from(&get_settings_path())
}

/// Load and validate settings. A missing file yields defaults.
pub fn load_settings_from(path: &Path) -> Result<ArbiterSettings> {
    if !path.exists() {
        debug!("No settings at {}, using defaults", path.display());
        return Ok(ArbiterSettings::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        HotplugError::config(format!("Failed to read settings file {}: {}", path.display(), e))
    })?;
    let settings: ArbiterSettings = serde_json::from_str(&content).map_err(|e| {
        HotplugError::config(format!("Failed to parse settings JSON: {}", e))
    })?;
    settings.validate()?;

    info!(
        "Loaded settings from {} ({} controller(s))",
        path.display(),
        settings.controllers.len()
    );
    Ok(settings)
}

/// Validate and write settings as pretty JSON (temp file, then rename)
pub fn save_settings_to(settings: &ArbiterSettings, path: &Path) -> Result<()> {
    settings.validate()?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                HotplugError::config(format!("Failed to create config directory: {}", e))
            })?;
        }
    }

    let json = serde_json::to_string_pretty(settings)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)?;

    debug!("Settings written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn knob(name: &str) -> ControllerSettings {
        ControllerSettings {
            name: name.to_string(),
            path: PathBuf::from(format!("/sys/module/{}/parameters/enabled", name)),
            on_value: "1".into(),
            off_value: "0".into(),
            whitelist: Vec::new(),
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let s = load_settings_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(s, ArbiterSettings::default());
        assert!(s.gate_open_on_start);
        assert_eq!(s.lock_retry_budget, 2);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf/settings.json");
        let mut s = ArbiterSettings::default();
        s.gate_open_on_start = false;
        s.controllers.push(ControllerSettings {
            whitelist: vec!["msm_hotplug".into()],
            ..knob("intelli_plug")
        });

        save_settings_to(&s, &path).unwrap();
        assert_eq!(load_settings_from(&path).unwrap(), s);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"controllers":[{"name":"alucard","path":"/sys/alucard/enabled"}]}"#,
        )
        .unwrap();

        let s = load_settings_from(&path).unwrap();
        assert_eq!(s.lock_retry_budget, lock::DEFAULT_RETRY_BUDGET);
        assert_eq!(s.controllers[0].on_value, "1");
        assert_eq!(s.controllers[0].off_value, "0");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut s = ArbiterSettings::default();
        s.lock_retry_budget = 0;
        assert!(s.validate().is_err());

        let mut s = ArbiterSettings::default();
        s.show_buffer_len = 8;
        assert!(s.validate().is_err());

        let mut s = ArbiterSettings::default();
        s.show_buffer_len = 65536;
        assert!(s.validate().is_err());
        s.show_buffer_len = surface::MAX_SHOW_BUFFER_LEN;
        assert!(s.validate().is_ok());

        let mut s = ArbiterSettings::default();
        s.controllers = vec![knob("dup"), knob("DUP")];
        assert!(matches!(s.validate(), Err(HotplugError::InvalidConfig { .. })));

        let mut s = ArbiterSettings::default();
        s.controllers = vec![ControllerSettings {
            path: PathBuf::from("relative/enabled"),
            ..knob("rel")
        }];
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_build_registers_sysfs_driver() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("enabled");
        fs::write(&path, "1").unwrap();
        let c = ControllerSettings {
            path: path.clone(),
            whitelist: vec!["peer".into()],
            ..knob("thermal")
        };

        let d = c.build();
        assert_eq!(d.name().as_str(), "thermal");
        assert!(d.is_enabled());
        assert!(d.declares("peer"));
    }
}
