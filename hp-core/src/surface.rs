//! Operator control surface
//!
//! A show/store attribute group in the style of sysfs. Four attributes:
//!
//! | attribute           | mode | show                         | store                      |
//! |---------------------|------|------------------------------|----------------------------|
//! | `available_drivers` | 0444 | all names, `[name]` if on    | -                          |
//! | `disable_driver`    | 0644 | names currently off          | switch one driver off      |
//! | `enable_driver`     | 0644 | names currently on           | switch one driver on       |
//! | `enabled`           | 0644 | gate state, `1` or `0`       | leading unsigned, >0 opens |
//!
//! Stores on `*_driver` request exactly one transition and never run
//! conflict resolution.

use std::fmt;
use std::str::FromStr;

use hp_error::{HotplugError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arbiter::Hotplugger;
use crate::constants::names::STORE_NAME_MAX;
use crate::constants::surface::{
    DEFAULT_SHOW_BUFFER_LEN, GROUP_NAME, MODE_READ_ONLY, MODE_READ_WRITE, NONE_SENTINEL,
};
use crate::driver::truncate_bounded;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    AvailableDrivers,
    DisableDriver,
    EnableDriver,
    Enabled,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::AvailableDrivers,
        Attribute::DisableDriver,
        Attribute::EnableDriver,
        Attribute::Enabled,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::AvailableDrivers => "available_drivers",
            Attribute::DisableDriver => "disable_driver",
            Attribute::EnableDriver => "enable_driver",
            Attribute::Enabled => "enabled",
        }
    }

    pub fn mode(&self) -> u32 {
        match self {
            Attribute::AvailableDrivers => MODE_READ_ONLY,
            _ => MODE_READ_WRITE,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.mode() & 0o200 != 0
    }

    /// Path of the attribute inside the group, e.g. `hotplugger/enabled`
    pub fn path(&self) -> String {
        format!("{}/{}", GROUP_NAME, self.name())
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = HotplugError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix(GROUP_NAME)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(s);
        Attribute::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| HotplugError::UnknownAttribute(s.to_string()))
    }
}

/// Which drivers a listing includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    All,
    Enabled,
    Disabled,
}

pub struct ControlSurface<'a> {
    hotplugger: &'a Hotplugger,
    buffer_len: usize,
}

impl<'a> ControlSurface<'a> {
    pub fn new(hotplugger: &'a Hotplugger) -> Self {
        Self::with_buffer_len(hotplugger, DEFAULT_SHOW_BUFFER_LEN)
    }

    pub fn with_buffer_len(hotplugger: &'a Hotplugger, buffer_len: usize) -> Self {
        Self {
            hotplugger,
            buffer_len,
        }
    }

    /// Render an attribute
    pub fn show(&self, attr: Attribute) -> String {
        match attr {
            Attribute::AvailableDrivers => self.render(Listing::All),
            Attribute::EnableDriver => self.render(Listing::Enabled),
            Attribute::DisableDriver => self.render(Listing::Disabled),
            Attribute::Enabled => format!("{}\n", u8::from(self.hotplugger.is_open())),
        }
    }

    /// Write `input` to an attribute. Returns the number of bytes consumed.
    pub fn store(&self, attr: Attribute, input: &str) -> Result<usize> {
        match attr {
            Attribute::AvailableDrivers => Err(HotplugError::ReadOnly(attr.name().to_string())),
            Attribute::EnableDriver => self.store_state_by_name(input, true),
            Attribute::DisableDriver => self.store_state_by_name(input, false),
            Attribute::Enabled => {
                let open = parse_gate_value(input)?;
                debug!(
                    "setting {} interface's state",
                    if open { "enabled" } else { "disabled" }
                );
                self.hotplugger.set_open(open);
                Ok(input.len())
            }
        }
    }

    fn store_state_by_name(&self, input: &str, enabled: bool) -> Result<usize> {
        self.hotplugger
            .gate()
            .ensure_open(if enabled { "enable_driver" } else { "disable_driver" })?;

        let name = parse_name(input)?;
        if enabled {
            self.hotplugger.enable_one(name)?;
        } else {
            self.hotplugger.disable_one(name)?;
        }
        Ok(input.len())
    }

    fn render(&self, listing: Listing) -> String {
        let mut out = String::new();
        let mut full = false;

        self.hotplugger.registry().for_each(
            |d| match listing {
                Listing::All => true,
                Listing::Enabled => d.is_enabled(),
                Listing::Disabled => !d.is_enabled(),
            },
            |d| {
                if full {
                    return;
                }
                let piece = if listing == Listing::All && d.is_enabled() {
                    format!("[{}] ", d.name())
                } else {
                    format!("{} ", d.name())
                };
                if out.len() + piece.len() > self.buffer_len {
                    full = true;
                    return;
                }
                out.push_str(&piece);
            },
        );

        if out.is_empty() {
            out.push_str(NONE_SENTINEL);
        }
        out.push('\n');
        out
    }
}

/// First whitespace-separated token, truncated to [`STORE_NAME_MAX`]
fn parse_name(input: &str) -> Result<&str> {
    input
        .split_whitespace()
        .next()
        .map(|token| truncate_bounded(token, STORE_NAME_MAX))
        .ok_or_else(|| HotplugError::invalid_input("expected a driver name"))
}

/// Leading unsigned integer of `input`; anything after the digits is
/// ignored. Returns whether the value is non-zero.
fn parse_gate_value(input: &str) -> Result<bool> {
    let trimmed = input.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits_len = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    if digits_len == 0 {
        return Err(HotplugError::invalid_input(format!(
            "expected an unsigned integer, got \"{}\"",
            input.trim()
        )));
    }
    Ok(unsigned[..digits_len].bytes().any(|b| b != b'0'))
}
