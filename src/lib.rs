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

//! Hotplugger - operator tooling for the hotplug driver arbiter
//!
//! The arbitration engine lives in `hp-core`; this crate holds the
//! `hotplugctl` command line, its blocking daemon client and the audit log.

pub mod cli;
pub mod client;
pub mod logger;

pub use client::DaemonClient;
