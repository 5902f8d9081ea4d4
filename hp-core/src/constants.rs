//! Constants and configuration values for Hotplugger
//!
//! Centralizes all magic numbers, paths, and configuration defaults.
//! Never use magic numbers in other files - add them here first.

use std::time::Duration;

/// Driver name limits
pub mod names {
    /// Size of a driver name slot, terminator included
    pub const NAME_BUFFER_LEN: usize = 32;

    /// Longest driver name kept; longer input is truncated, never rejected
    pub const MAX_NAME_LEN: usize = NAME_BUFFER_LEN - 1;

    /// Longest name token accepted from a control-surface write
    pub const STORE_NAME_MAX: usize = 30;
}

/// Registry lock acquisition for conflict resolution
pub mod lock {
    use super::Duration;

    /// Attempts made before a resolution reports `Busy`
    pub const DEFAULT_RETRY_BUDGET: u32 = 2;

    /// Upper bound accepted from settings
    pub const MAX_RETRY_BUDGET: u32 = 16;

    /// Pause between contended attempts
    pub const DEFAULT_BACKOFF_MS: u64 = 1;

    /// Upper bound accepted from settings
    pub const MAX_BACKOFF_MS: u64 = 100;

    pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(DEFAULT_BACKOFF_MS);
}

/// Control surface rendering
pub mod surface {
    use super::names::NAME_BUFFER_LEN;

    /// Name of the attribute group
    pub const GROUP_NAME: &str = "hotplugger";

    pub const PAGE_SIZE: usize = 4096;

    /// Rendering budget: one page, minus room for a bracketed name
    pub const DEFAULT_SHOW_BUFFER_LEN: usize = PAGE_SIZE - (NAME_BUFFER_LEN + 2);

    pub const MIN_SHOW_BUFFER_LEN: usize = 64;

    /// A rendered attribute must fit one IPC frame together with its envelope
    pub const MAX_SHOW_BUFFER_LEN: usize = PAGE_SIZE;

    /// Rendered when a listing is empty
    pub const NONE_SENTINEL: &str = "[none]";

    /// Permission bits of read-only attributes
    pub const MODE_READ_ONLY: u32 = 0o444;

    /// Permission bits of read-write attributes
    pub const MODE_READ_WRITE: u32 = 0o644;
}

/// Sysfs-backed controllers
pub mod sysfs {
    pub const DEFAULT_ON_VALUE: &str = "1";
    pub const DEFAULT_OFF_VALUE: &str = "0";
}

/// System paths
pub mod paths {
    /// System configuration directory
    pub const CONFIG_DIR: &str = "/etc/hotplugger";

    /// Settings file name inside the configuration directory
    pub const SETTINGS_FILE: &str = "settings.json";

    /// Environment variable overriding the settings file location
    pub const CONFIG_ENV: &str = "HOTPLUGGER_CONFIG";

    /// Default daemon socket
    pub const SOCKET_PATH: &str = "/run/hotplugger.sock";

    /// Fallback socket when /run is missing
    pub const SOCKET_PATH_FALLBACK: &str = "/var/run/hotplugger.sock";

    /// Environment variable overriding the socket location
    pub const SOCKET_ENV: &str = "HOTPLUGGER_SOCKET";

    /// Resolve the daemon socket path
    pub fn socket_path() -> String {
        if let Ok(path) = std::env::var(SOCKET_ENV) {
            return path;
        }
        if std::path::Path::new("/run").exists() {
            SOCKET_PATH.to_string()
        } else {
            SOCKET_PATH_FALLBACK.to_string()
        }
    }
}
