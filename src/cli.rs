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

//! Command Line Interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use hp_protocol::{DriverInfo, ResolutionSummary};

use crate::client::DaemonClient;
use crate::logger;

#[derive(Parser)]
#[command(name = "hotplugctl")]
#[command(version)]
#[command(about = "Operate the hotplug driver arbiter")]
#[command(long_about = "Operate the hotplug driver arbiter

Talks to hotpluggerd over its Unix socket. Attribute commands mirror the
hotplugger/ control group: available_drivers, enable_driver,
disable_driver and enabled.

EXAMPLES:
    hotplugctl list                      List registered drivers
    hotplugctl show available_drivers    Raw attribute contents
    hotplugctl enable alucard            Switch one driver on
    hotplugctl resolve alucard           Switch off every conflicting peer
    hotplugctl gate off                  Freeze all driver state changes
    hotplugctl settings check            Validate the settings file

ENVIRONMENT VARIABLES:
    HOTPLUGGER_SOCKET      Daemon socket path
    HOTPLUGGER_CONFIG      Settings file path")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Daemon socket path
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    /// Append mutating commands to the JSON audit log
    #[arg(long, global = true)]
    pub logging: bool,

    /// Audit log path (implies --logging)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Daemon version, gate state and driver count
    Status,
    /// Read a control attribute
    Show {
        /// available_drivers, enable_driver, disable_driver or enabled
        attribute: String,
    },
    /// Write a control attribute
    Store {
        attribute: String,
        value: String,
    },
    /// List registered drivers
    List,
    /// Switch one driver on without touching its peers
    Enable { name: String },
    /// Switch one driver off
    Disable { name: String },
    /// Switch off every running peer that conflicts with NAME
    Resolve { name: String },
    /// Show or set the arbitration gate
    Gate {
        #[arg(value_enum)]
        state: Option<GateState>,
    },
    /// Local settings file management
    #[command(subcommand)]
    Settings(SettingsCommands),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GateState {
    On,
    Off,
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print the settings file location
    Path,
    /// Print the effective settings as JSON
    Show {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Load and validate a settings file
    Check {
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

pub fn run_cli(cli: &Cli) -> anyhow::Result<()> {
    if cli.logging || cli.log_file.is_some() {
        if logger::init_logging(cli.log_file.as_deref()).is_none() {
            eprintln!("warning: audit log unavailable");
        }
    }

    if let Commands::Settings(sub) = &cli.command {
        return cmd_settings(sub, cli.json);
    }

    let mut client = match &cli.socket {
        Some(path) => DaemonClient::connect_to(path)?,
        None => DaemonClient::connect()?,
    };
    execute_command(&mut client, cli)
}

fn execute_command(client: &mut DaemonClient, cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Status => {
            let version = client.version()?;
            let gate = client.gate()?;
            let drivers = client.list_drivers()?;
            if cli.json {
                println!(
                    "{}",
                    json!({"version": version, "enabled": gate, "drivers": drivers.len()})
                );
            } else {
                println!("Hotplugger Status");
                println!("=================");
                println!("Daemon:      {} ({})", version, client.socket_path().display());
                println!("Arbitration: {}", if gate { "enabled" } else { "disabled" });
                println!(
                    "Drivers:     {} registered, {} on",
                    drivers.len(),
                    drivers.iter().filter(|d| d.enabled).count()
                );
            }
        }
        Commands::Show { attribute } => {
            print!("{}", client.show(attribute)?);
        }
        Commands::Store { attribute, value } => {
            let result = client.store(attribute, value);
            audit("store", json!({"attribute": attribute, "value": value}), &result);
            let consumed = result?;
            if cli.json {
                println!("{}", json!({"consumed": consumed}));
            }
        }
        Commands::List => {
            let drivers = client.list_drivers()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&drivers)?);
            } else {
                print!("{}", format_driver_table(&drivers));
            }
        }
        Commands::Enable { name } => {
            let result = client.enable_driver(name);
            audit("enable", json!({"name": name}), &result);
            report_transition(name, true, result?);
        }
        Commands::Disable { name } => {
            let result = client.disable_driver(name);
            audit("disable", json!({"name": name}), &result);
            report_transition(name, false, result?);
        }
        Commands::Resolve { name } => {
            let result = client.resolve_conflicts(name);
            audit("resolve", json!({"name": name}), &result);
            let summary = result?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", format_resolution(&summary));
            }
        }
        Commands::Gate { state: None } => {
            let open = client.gate()?;
            println!("{}", if open { "on" } else { "off" });
        }
        Commands::Gate { state: Some(state) } => {
            let open = *state == GateState::On;
            let result = client.set_gate(open);
            audit("gate", json!({"open": open}), &result);
            result?;
        }
        Commands::Settings(_) => {}
    }
    Ok(())
}

fn cmd_settings(cmd: &SettingsCommands, as_json: bool) -> anyhow::Result<()> {
    match cmd {
        SettingsCommands::Path => {
            println!("{}", hp_core::get_settings_path().display());
        }
        SettingsCommands::Show { file } => {
            let path = file.clone().unwrap_or_else(hp_core::get_settings_path);
            let settings = hp_core::load_settings_from(&path)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsCommands::Check { file } => {
            let path = file.clone().unwrap_or_else(hp_core::get_settings_path);
            let settings = hp_core::load_settings_from(&path)?;
            if as_json {
                println!(
                    "{}",
                    json!({"path": path, "valid": true, "controllers": settings.controllers.len()})
                );
            } else {
                println!(
                    "{}: ok ({} controller(s))",
                    path.display(),
                    settings.controllers.len()
                );
            }
        }
    }
    Ok(())
}

fn audit<T>(event: &str, mut data: serde_json::Value, result: &hp_error::Result<T>) {
    if !logger::is_enabled() {
        return;
    }
    data["ok"] = json!(result.is_ok());
    if let Err(e) = result {
        data["error"] = json!(e.to_string());
    }
    logger::log_event(event, data);
}

fn report_transition(name: &str, enabled: bool, applied: bool) {
    let state = if enabled { "on" } else { "off" };
    if applied {
        println!("{}: switched {}", name, state);
    } else {
        println!("{}: already {}", name, state);
    }
}

pub fn format_driver_table(drivers: &[DriverInfo]) -> String {
    if drivers.is_empty() {
        return "no drivers registered\n".to_string();
    }
    let width = drivers.iter().map(|d| d.name.len()).max().unwrap_or(0).max(4);
    let mut out = format!("{:<width$}  STATE  WHITELIST\n", "NAME", width = width);
    for d in drivers {
        let state = match (d.enabled, d.can_transition) {
            (true, _) => "on",
            (false, true) => "off",
            (false, false) => "n/a",
        };
        let whitelist = if d.whitelist.is_empty() {
            "-".to_string()
        } else {
            d.whitelist.join(",")
        };
        out.push_str(&format!(
            "{:<width$}  {:<5}  {}\n",
            d.name,
            state,
            whitelist,
            width = width
        ));
    }
    out
}

pub fn format_resolution(summary: &ResolutionSummary) -> String {
    fn list(names: &[String]) -> String {
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    }
    format!(
        "{} now has the hardware\n  disabled:  {}\n  exempt:    {}\n  untouched: {}\n",
        summary.requester,
        list(&summary.disabled),
        list(&summary.exempt),
        list(&summary.untouched)
    )
}
