/*
 * This file is part of Hotplugger.
 *
 * Copyright (C) 2025 Hotplugger contributors
 *
 * Hotplugger is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Hotplugger is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Hotplugger. If not, see <https://www.gnu.org/licenses/>.
 */

//! JSON-lines audit log of the mutating commands hotplugctl issues

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use serde_json::{json, Value};

pub const DEFAULT_LOG_PATH: &str = "/var/log/hotplugger/audit.json";
const FALLBACK_LOG_PATH: &str = "/tmp/hotplugger_audit.json";

lazy_static! {
    static ref LOG_FILE: Mutex<Option<(PathBuf, File)>> = Mutex::new(None);
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Open the audit log, falling back to /tmp when `path` is not writable.
/// Returns the path actually in use.
pub fn init_logging(path: Option<&Path>) -> Option<PathBuf> {
    let wanted = path.unwrap_or_else(|| Path::new(DEFAULT_LOG_PATH));
    let opened = open_append(wanted)
        .map(|f| (wanted.to_path_buf(), f))
        .or_else(|| {
            let fallback = Path::new(FALLBACK_LOG_PATH);
            open_append(fallback).map(|f| (fallback.to_path_buf(), f))
        })?;

    let in_use = opened.0.clone();
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(opened);
    }
    Some(in_use)
}

/// Close the audit log; later events are dropped
pub fn shutdown_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = None;
    }
}

pub fn is_enabled() -> bool {
    LOG_FILE.lock().map(|g| g.is_some()).unwrap_or(false)
}

/// Append one event. A no-op until [`init_logging`] succeeded.
pub fn log_event(event: &str, data: Value) {
    let line = json!({
        "ts_ms": now_millis(),
        "event": event,
        "data": data,
    })
    .to_string();

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some((_, f)) = guard.as_mut() {
            let _ = writeln!(f, "{}", line);
        }
    }
}
