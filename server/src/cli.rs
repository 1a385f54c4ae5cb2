//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Command line options

use clap::{ArgAction, Parser};
use nix::sys::signal::Signal;
use procserv_service::{
    DEFAULT_HOLDOFF, DEFAULT_LOG_CAPACITY, DEFAULT_TIMESTAMP_FORMAT, Endpoint, KeyBindings,
    LogDestination, ProcServConfig, ProcServError, RestartMode, TimestampFormat,
    parse_control_key,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Run a command on a pseudo-terminal and share it over telnet
#[derive(Parser, Debug, Clone)]
#[command(name = "procserv", version, about, trailing_var_arg = true)]
pub struct Cli {
    /// Control endpoint: PORT, HOST:PORT, unix:[USER:GROUP:PERM:]PATH or unix:@NAME
    pub endpoint: Endpoint,

    /// Command to run, followed by its arguments
    #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Read-only log endpoint; clients connecting here cannot type
    #[arg(short = 'l', long = "logport")]
    pub log_endpoint: Option<Endpoint>,

    /// Allow TCP connections from other hosts
    #[arg(long)]
    pub allow: bool,

    /// Name shown for the child (defaults to the command's file name)
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Name shown as the server identity
    #[arg(long, default_value = "procserv")]
    pub server_name: String,

    /// Restart mode: on, off or oneshot
    #[arg(long, value_name = "MODE", default_value = "on")]
    pub restart_mode: RestartMode,

    /// Do not restart the child when it exits
    #[arg(long, conflicts_with_all = ["oneshot", "restart_mode"])]
    pub noautorestart: bool,

    /// Exit when the child exits
    #[arg(long, conflicts_with = "restart_mode")]
    pub oneshot: bool,

    /// Minimum seconds between child starts
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_HOLDOFF.as_secs())]
    pub holdoff: u64,

    /// Wait for a restart command before starting the child
    #[arg(short = 'w', long)]
    pub wait: bool,

    /// Signal sent by the kill command (name or number)
    #[arg(long, value_name = "SIGNAL", default_value = "SIGKILL", value_parser = parse_signal)]
    pub killsig: Signal,

    /// Characters stripped from client input, in caret notation (e.g. ^D^C)
    #[arg(short = 'i', long, value_name = "CHARS", value_parser = parse_ignore)]
    pub ignore: Option<CharList>,

    /// Kill command key
    #[arg(short = 'x', long, value_name = "KEY", default_value = "^X", value_parser = parse_control_key)]
    pub killcmd: u8,

    /// Restart command key
    #[arg(long, value_name = "KEY", default_value = "^R", value_parser = parse_control_key)]
    pub restartcmd: u8,

    /// Restart-mode toggle key
    #[arg(long, value_name = "KEY", default_value = "^T", value_parser = parse_control_key)]
    pub togglecmd: u8,

    /// Shutdown command key
    #[arg(long, value_name = "KEY", default_value = "^Q", value_parser = parse_control_key)]
    pub quitcmd: u8,

    /// Logout command key (disabled by default)
    #[arg(long, value_name = "KEY", default_value = "", value_parser = parse_control_key)]
    pub logoutcmd: u8,

    /// Core file size limit for the child, in bytes
    #[arg(long, value_name = "BYTES")]
    pub coresize: Option<u64>,

    /// Working directory for the child
    #[arg(short = 'c', long, value_name = "DIR")]
    pub chdir: Option<PathBuf>,

    /// Log file, or - for standard output
    #[arg(short = 'L', long, value_name = "FILE")]
    pub logfile: Option<LogDestination>,

    /// Prefix each log line with a timestamp
    #[arg(long)]
    pub timestamp: bool,

    /// strftime format for log timestamps
    #[arg(long, value_name = "FORMAT", default_value = DEFAULT_TIMESTAMP_FORMAT, value_parser = TimestampFormat::new)]
    pub timefmt: TimestampFormat,

    /// Log buffer size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_LOG_CAPACITY)]
    pub log_capacity: usize,

    /// Write the server PID to this file
    #[arg(short = 'p', long, value_name = "FILE")]
    pub pidfile: Option<PathBuf>,

    /// Write the discovery line (PID and endpoints) to this file
    #[arg(short = 'I', long, value_name = "FILE")]
    pub info_file: Option<PathBuf>,

    /// Stay attached to the terminal instead of daemonizing
    #[arg(short = 'f', long)]
    pub foreground: bool,

    /// Extra environment variable for the child
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// More diagnostics on stderr (repeat for more)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only report warnings and errors on stderr
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Default tracing filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    fn restart(&self) -> RestartMode {
        if self.noautorestart {
            RestartMode::NoRestart
        } else if self.oneshot {
            RestartMode::OneShot
        } else {
            self.restart_mode
        }
    }

    /// Builds the service configuration.
    pub fn to_config(&self) -> ProcServConfig {
        let (program, args) = self
            .command
            .split_first()
            .map(|(program, args)| (program.clone(), args.to_vec()))
            .unwrap_or_default();
        let mut config = ProcServConfig::new(program, args)
            .with_control(self.endpoint.clone())
            .with_allow_remote(self.allow)
            .with_restart_mode(self.restart())
            .with_holdoff(Duration::from_secs(self.holdoff))
            .with_manual_start(self.wait)
            .with_keys(KeyBindings {
                kill: self.killcmd,
                restart: self.restartcmd,
                toggle: self.togglecmd,
                quit: self.quitcmd,
                logout: self.logoutcmd,
            })
            .with_kill_signal(self.killsig)
            .with_log_capacity(self.log_capacity);
        config.server_name = self.server_name.clone();
        if let Some(name) = &self.name {
            config = config.with_child_name(name.clone());
        }
        if let Some(endpoint) = &self.log_endpoint {
            config = config.with_log_endpoint(endpoint.clone());
        }
        if let Some(CharList(chars)) = &self.ignore {
            config = config.with_ignore_chars(chars.clone());
        }
        if let Some(limit) = self.coresize {
            config = config.with_core_limit(limit);
        }
        if let Some(dir) = &self.chdir {
            config = config.with_chdir(dir.clone());
        }
        if let Some(destination) = &self.logfile {
            config = config.with_log_destination(destination.clone());
        }
        if self.timestamp {
            config = config.with_timestamp(self.timefmt.clone());
        }
        for (key, value) in &self.env {
            config = config.with_env(key.clone(), value.clone());
        }
        config
    }
}

/// Accepts `SIGTERM`, `TERM` or `15`.
fn parse_signal(s: &str) -> Result<Signal, String> {
    if let Ok(number) = s.parse::<i32>() {
        return Signal::try_from(number).map_err(|_| format!("unknown signal number {number}"));
    }
    let name = s.to_ascii_uppercase();
    let name = if name.starts_with("SIG") { name } else { format!("SIG{name}") };
    Signal::from_str(&name).map_err(|_| format!("unknown signal '{s}'"))
}

/// Bytes given in caret notation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharList(pub Vec<u8>);

/// Splits a caret-notation string such as `^D^C#` into bytes.
fn parse_ignore(s: &str) -> Result<CharList, ProcServError> {
    let mut chars = Vec::new();
    let mut rest = s;
    while let Some(first) = rest.chars().next() {
        let mut len = first.len_utf8();
        if first == '^' {
            len += rest[len..].chars().next().map_or(0, char::len_utf8);
        }
        let (token, tail) = rest.split_at(len);
        chars.push(parse_control_key(token)?);
        rest = tail;
    }
    Ok(CharList(chars))
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
