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

//! Process server configuration

use crate::{ProcServError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use nix::sys::signal::Signal;
use procserv_telnetcodec::{DEFAULT_INITIAL_STANCE, TelnetCommand};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default minimum time between two spawns of the child
pub const DEFAULT_HOLDOFF: Duration = Duration::from_secs(15);

/// Default capacity of the log ring buffer
pub const DEFAULT_LOG_CAPACITY: usize = 64 * 1024;

/// Default strftime format for log timestamps
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%c";

/// What happens when the child exits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RestartMode {
    /// Respawn after the holdoff
    #[default]
    Restart,
    /// Stay down until a client asks for a restart
    NoRestart,
    /// Exit the server once the first child has exited
    OneShot,
}

impl RestartMode {
    /// Next mode in the toggle cycle: restart, no-restart, one-shot, restart.
    pub fn next(self) -> Self {
        match self {
            RestartMode::Restart => RestartMode::NoRestart,
            RestartMode::NoRestart => RestartMode::OneShot,
            RestartMode::OneShot => RestartMode::Restart,
        }
    }
}

impl fmt::Display for RestartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartMode::Restart => write!(f, "ON"),
            RestartMode::NoRestart => write!(f, "OFF"),
            RestartMode::OneShot => write!(f, "ONESHOT"),
        }
    }
}

impl FromStr for RestartMode {
    type Err = ProcServError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "restart" | "on" => Ok(RestartMode::Restart),
            "norestart" | "no-restart" | "off" => Ok(RestartMode::NoRestart),
            "oneshot" | "one-shot" => Ok(RestartMode::OneShot),
            _ => Err(ProcServError::Config(format!("unknown restart mode '{s}'"))),
        }
    }
}

/// In-band command recognized in client input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientCommand {
    /// Send the kill signal to the child's process group
    Kill,
    /// Start the child now if it is not running
    Restart,
    /// Cycle the restart mode
    ToggleRestart,
    /// Shut the server down
    Quit,
    /// Disconnect the issuing client
    Logout,
}

/// Single-character command keys. A value of 0 disables the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBindings {
    /// Kill the child (default `^X`)
    pub kill: u8,
    /// Restart the child (default `^R`)
    pub restart: u8,
    /// Toggle the restart mode (default `^T`)
    pub toggle: u8,
    /// Quit the server (default `^Q`)
    pub quit: u8,
    /// Log out the current client (disabled by default)
    pub logout: u8,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            kill: control(b'X'),
            restart: control(b'R'),
            toggle: control(b'T'),
            quit: control(b'Q'),
            logout: 0,
        }
    }
}

const fn control(letter: u8) -> u8 {
    letter & 0x1f
}

impl KeyBindings {
    /// Command bound to `byte`, if any.
    pub fn command_for(&self, byte: u8) -> Option<ClientCommand> {
        if byte == 0 {
            return None;
        }
        if byte == self.kill {
            Some(ClientCommand::Kill)
        } else if byte == self.restart {
            Some(ClientCommand::Restart)
        } else if byte == self.toggle {
            Some(ClientCommand::ToggleRestart)
        } else if byte == self.quit {
            Some(ClientCommand::Quit)
        } else if byte == self.logout {
            Some(ClientCommand::Logout)
        } else {
            None
        }
    }

    /// Commands found in `data`, in input order.
    pub fn scan(&self, data: &[u8]) -> Vec<ClientCommand> {
        data.iter().filter_map(|byte| self.command_for(*byte)).collect()
    }

    /// All enabled command keys.
    pub fn enabled(&self) -> impl Iterator<Item = u8> {
        [self.kill, self.restart, self.toggle, self.quit, self.logout]
            .into_iter()
            .filter(|key| *key != 0)
    }
}

/// Parses a command key: `^X` caret notation, a single literal character, or `^@`/empty
/// for a disabled key.
pub fn parse_control_key(s: &str) -> Result<u8> {
    let bytes = s.as_bytes();
    match bytes {
        [] => Ok(0),
        [b'^', b'?'] => Ok(0x7f),
        [b'^', c] if c.to_ascii_uppercase() >= b'@' && c.to_ascii_uppercase() <= b'_' => {
            Ok(c.to_ascii_uppercase() ^ 0x40)
        }
        [c] if c.is_ascii() => Ok(*c),
        _ => Err(ProcServError::Config(format!("invalid command key '{s}'"))),
    }
}

/// Human-readable form of a command key, `None` when disabled.
pub fn describe_key(key: u8) -> Option<String> {
    match key {
        0 => None,
        0x7f => Some("^?".to_string()),
        k if k < 0x20 => Some(format!("^{}", char::from(k ^ 0x40))),
        k => Some(char::from(k).to_string()),
    }
}

/// Compact set of byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteSet([u64; 4]);

impl ByteSet {
    /// Adds `byte` to the set.
    pub fn insert(&mut self, byte: u8) {
        self.0[usize::from(byte >> 6)] |= 1 << (byte & 63);
    }

    /// True if `byte` is in the set.
    pub fn contains(&self, byte: u8) -> bool {
        self.0[usize::from(byte >> 6)] & (1 << (byte & 63)) != 0
    }

    /// True if the set holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|word| *word == 0)
    }
}

impl FromIterator<u8> for ByteSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = ByteSet::default();
        for byte in iter {
            set.insert(byte);
        }
        set
    }
}

/// Ownership and permissions applied to a UNIX socket path after binding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnixSocketOptions {
    /// Owner user name
    pub user: Option<String>,
    /// Owner group name
    pub group: Option<String>,
    /// Permission bits
    pub mode: Option<u32>,
}

impl UnixSocketOptions {
    /// True when nothing needs to be applied.
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.group.is_none() && self.mode.is_none()
    }
}

/// Address a listener binds to
///
/// | Form                         | Meaning                                    |
/// |------------------------------|--------------------------------------------|
/// | `4051`                       | TCP port, loopback unless remote allowed   |
/// | `10.0.0.5:4051`              | explicit TCP address                       |
/// | `/run/ioc.sock`              | UNIX socket path                           |
/// | `unix:user:group:660:/path`  | UNIX path with owner, group and mode       |
/// | `@name`, `unix:@name`        | Linux abstract socket                      |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Bare port number
    TcpPort(u16),
    /// Explicit socket address
    Tcp(SocketAddr),
    /// Filesystem socket
    Unix {
        /// Socket path
        path: PathBuf,
        /// Owner and permission changes
        options: UnixSocketOptions,
    },
    /// Abstract socket name, without the leading `@`
    Abstract(String),
}

impl Endpoint {
    /// TCP address to bind, `None` for UNIX endpoints.
    pub fn socket_addr(&self, allow_remote: bool) -> Option<SocketAddr> {
        match self {
            Endpoint::TcpPort(port) => {
                let ip = if allow_remote {
                    Ipv4Addr::UNSPECIFIED
                } else {
                    Ipv4Addr::LOCALHOST
                };
                Some(SocketAddr::V4(SocketAddrV4::new(ip, *port)))
            }
            Endpoint::Tcp(addr) => Some(*addr),
            Endpoint::Unix { .. } | Endpoint::Abstract(_) => None,
        }
    }

    fn parse_unix(rest: &str, original: &str) -> Result<Self> {
        if let Some(name) = rest.strip_prefix('@') {
            if name.is_empty() {
                return Err(ProcServError::InvalidEndpoint(original.to_string()));
            }
            return Ok(Endpoint::Abstract(name.to_string()));
        }
        let parts: Vec<&str> = rest.splitn(4, ':').collect();
        let (options, path) = match parts.as_slice() {
            [user, group, mode, path] if !format!("{user}{group}{mode}").contains('/') => {
                let mode = if mode.is_empty() {
                    None
                } else {
                    Some(u32::from_str_radix(mode, 8).map_err(|_| {
                        ProcServError::InvalidEndpoint(original.to_string())
                    })?)
                };
                let options = UnixSocketOptions {
                    user: (!user.is_empty()).then(|| (*user).to_string()),
                    group: (!group.is_empty()).then(|| (*group).to_string()),
                    mode,
                };
                (options, *path)
            }
            _ => (UnixSocketOptions::default(), rest),
        };
        if path.is_empty() {
            return Err(ProcServError::InvalidEndpoint(original.to_string()));
        }
        Ok(Endpoint::Unix {
            path: PathBuf::from(path),
            options,
        })
    }
}

impl FromStr for Endpoint {
    type Err = ProcServError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix("unix:") {
            return Endpoint::parse_unix(rest, s);
        }
        if s.starts_with('@') || s.contains('/') {
            return Endpoint::parse_unix(s, s);
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(Endpoint::TcpPort)
                .map_err(|_| ProcServError::InvalidEndpoint(s.to_string()));
        }
        s.parse()
            .map(Endpoint::Tcp)
            .map_err(|_| ProcServError::InvalidEndpoint(s.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::TcpPort(port) => write!(f, "{port}"),
            Endpoint::Tcp(addr) => write!(f, "{addr}"),
            Endpoint::Unix { path, .. } => write!(f, "unix:{}", path.display()),
            Endpoint::Abstract(name) => write!(f, "unix:@{name}"),
        }
    }
}

/// Validated strftime format for log line prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampFormat(String);

impl TimestampFormat {
    /// Checks `format` for unknown specifiers.
    pub fn new(format: &str) -> Result<Self> {
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(ProcServError::InvalidTimestampFormat(format.to_string()));
        }
        Ok(Self(format.to_string()))
    }

    /// The format string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Formats `now` with this format.
    pub fn render(&self, now: &DateTime<Local>) -> String {
        now.format(&self.0).to_string()
    }
}

impl Default for TimestampFormat {
    fn default() -> Self {
        Self(DEFAULT_TIMESTAMP_FORMAT.to_string())
    }
}

/// Where log output is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// Append to a file, reopened on SIGHUP
    File(PathBuf),
    /// The server's standard output
    Stdout,
}

impl FromStr for LogDestination {
    type Err = ProcServError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Err(ProcServError::Config("empty log file name".to_string())),
            "-" => Ok(LogDestination::Stdout),
            path => Ok(LogDestination::File(PathBuf::from(path))),
        }
    }
}

/// Process server configuration
///
/// Use the builder methods to customize the configuration.
///
/// # Example
///
/// ```
/// use procserv_service::{ProcServConfig, RestartMode};
/// use std::time::Duration;
///
/// let config = ProcServConfig::new("/bin/sh", ["-i"])
///     .with_restart_mode(RestartMode::OneShot)
///     .with_holdoff(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ProcServConfig {
    /// Server identity shown in banners
    pub server_name: String,
    /// Child name used in status lines
    pub child_name: String,
    /// Executable to run
    pub program: PathBuf,
    /// Arguments after the program name
    pub args: Vec<String>,
    /// Control endpoint
    pub control: Endpoint,
    /// Optional read-only endpoint
    pub log_endpoint: Option<Endpoint>,
    /// Permit binding TCP endpoints to non-loopback addresses
    pub allow_remote: bool,
    /// Restart policy at startup
    pub restart_mode: RestartMode,
    /// Minimum time between spawns
    pub holdoff: Duration,
    /// Do not spawn until a client sends the restart key
    pub wait_for_manual_start: bool,
    /// Command keys
    pub keys: KeyBindings,
    /// Characters never forwarded to the child
    pub ignore_chars: Vec<u8>,
    /// Signal sent by the kill key
    pub kill_signal: Signal,
    /// Core file size limit applied to the child
    pub core_limit: Option<u64>,
    /// Working directory of the child
    pub chdir: Option<PathBuf>,
    /// Log output destination
    pub log_destination: Option<LogDestination>,
    /// Timestamp prefix for log lines
    pub timestamp: Option<TimestampFormat>,
    /// Capacity of the log ring buffer in bytes
    pub log_capacity: usize,
    /// Stance announced to each client on connect
    pub telnet_stance: Vec<TelnetCommand>,
    /// Extra environment for the child
    pub environment: Vec<(String, String)>,
    /// Files removed when the server exits
    pub cleanup_files: Vec<PathBuf>,
}

impl Default for ProcServConfig {
    fn default() -> Self {
        Self {
            server_name: format!("procserv {}", env!("CARGO_PKG_VERSION")),
            child_name: String::new(),
            program: PathBuf::new(),
            args: Vec::new(),
            control: Endpoint::TcpPort(0),
            log_endpoint: None,
            allow_remote: false,
            restart_mode: RestartMode::Restart,
            holdoff: DEFAULT_HOLDOFF,
            wait_for_manual_start: false,
            keys: KeyBindings::default(),
            ignore_chars: Vec::new(),
            kill_signal: Signal::SIGKILL,
            core_limit: None,
            chdir: None,
            log_destination: None,
            timestamp: None,
            log_capacity: DEFAULT_LOG_CAPACITY,
            telnet_stance: DEFAULT_INITIAL_STANCE.to_vec(),
            environment: Vec::new(),
            cleanup_files: Vec::new(),
        }
    }
}

impl ProcServConfig {
    /// Create a configuration for `program` with the given arguments
    ///
    /// The child name defaults to the program's file name.
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.as_ref().to_path_buf();
        let child_name = program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            child_name,
            program,
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the child name shown in status lines
    pub fn with_child_name(mut self, name: impl Into<String>) -> Self {
        self.child_name = name.into();
        self
    }

    /// Set the control endpoint
    pub fn with_control(mut self, endpoint: Endpoint) -> Self {
        self.control = endpoint;
        self
    }

    /// Set the read-only log endpoint
    pub fn with_log_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.log_endpoint = Some(endpoint);
        self
    }

    /// Allow non-loopback TCP endpoints
    pub fn with_allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Set the restart mode
    pub fn with_restart_mode(mut self, mode: RestartMode) -> Self {
        self.restart_mode = mode;
        self
    }

    /// Set the restart holdoff
    pub fn with_holdoff(mut self, holdoff: Duration) -> Self {
        self.holdoff = holdoff;
        self
    }

    /// Wait for a manual restart before the first spawn
    pub fn with_manual_start(mut self, wait: bool) -> Self {
        self.wait_for_manual_start = wait;
        self
    }

    /// Set the command keys
    pub fn with_keys(mut self, keys: KeyBindings) -> Self {
        self.keys = keys;
        self
    }

    /// Set the characters stripped from client input
    pub fn with_ignore_chars(mut self, chars: impl Into<Vec<u8>>) -> Self {
        self.ignore_chars = chars.into();
        self
    }

    /// Set the signal sent by the kill key
    pub fn with_kill_signal(mut self, signal: Signal) -> Self {
        self.kill_signal = signal;
        self
    }

    /// Limit the child's core file size
    pub fn with_core_limit(mut self, limit: u64) -> Self {
        self.core_limit = Some(limit);
        self
    }

    /// Set the child's working directory
    pub fn with_chdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chdir = Some(dir.into());
        self
    }

    /// Write log output to `destination`
    pub fn with_log_destination(mut self, destination: LogDestination) -> Self {
        self.log_destination = Some(destination);
        self
    }

    /// Prefix each log line with a timestamp
    pub fn with_timestamp(mut self, format: TimestampFormat) -> Self {
        self.timestamp = Some(format);
        self
    }

    /// Set the log ring buffer capacity
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Set the telnet stance announced on connect
    pub fn with_telnet_stance(mut self, stance: Vec<TelnetCommand>) -> Self {
        self.telnet_stance = stance;
        self
    }

    /// Add a variable to the child's environment
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    /// Remove `path` when the server exits
    pub fn with_cleanup_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cleanup_files.push(path.into());
        self
    }

    /// Characters removed from input before it reaches the child: every enabled command
    /// key plus the ignore set.
    pub fn stripped_chars(&self) -> ByteSet {
        self.keys
            .enabled()
            .chain(self.ignore_chars.iter().copied())
            .collect()
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.program.as_os_str().is_empty() {
            return Err(ProcServError::Config("no child program given".to_string()));
        }
        if self.log_capacity == 0 {
            return Err(ProcServError::Config(
                "log_capacity must be greater than 0".to_string(),
            ));
        }
        for endpoint in std::iter::once(&self.control).chain(self.log_endpoint.as_ref()) {
            let remote = endpoint
                .socket_addr(self.allow_remote)
                .is_some_and(|addr| !addr.ip().is_loopback());
            if remote && !self.allow_remote {
                return Err(ProcServError::Config(format!(
                    "{endpoint} is not a loopback address; remote access must be allowed explicitly"
                )));
            }
        }
        let keys: Vec<u8> = self.keys.enabled().collect();
        for (i, key) in keys.iter().enumerate() {
            if keys[i + 1..].contains(key) {
                return Err(ProcServError::Config(format!(
                    "command key {} is bound twice",
                    describe_key(*key).unwrap_or_default()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProcServConfig::new("/usr/bin/softIoc", ["st.cmd"]);
        assert_eq!(config.child_name, "softIoc");
        assert_eq!(config.holdoff, Duration::from_secs(15));
        assert_eq!(config.restart_mode, RestartMode::Restart);
        assert_eq!(config.kill_signal, Signal::SIGKILL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ProcServConfig::new("/bin/cat", Vec::<String>::new())
            .with_child_name("echo")
            .with_holdoff(Duration::from_secs(1))
            .with_restart_mode(RestartMode::NoRestart)
            .with_manual_start(true)
            .with_ignore_chars(b"\x04".to_vec());

        assert_eq!(config.child_name, "echo");
        assert_eq!(config.holdoff, Duration::from_secs(1));
        assert!(config.wait_for_manual_start);
        assert!(config.stripped_chars().contains(0x04));
        assert!(config.stripped_chars().contains(0x18));
    }

    #[test]
    fn test_validation() {
        assert!(ProcServConfig::default().validate().is_err());

        let remote = ProcServConfig::new("/bin/cat", Vec::<String>::new())
            .with_control("0.0.0.0:4051".parse().unwrap());
        assert!(remote.validate().is_err());
        assert!(remote.with_allow_remote(true).validate().is_ok());

        let clash = ProcServConfig::new("/bin/cat", Vec::<String>::new()).with_keys(KeyBindings {
            quit: control(b'X'),
            ..KeyBindings::default()
        });
        assert!(clash.validate().is_err());
    }

    #[test]
    fn test_restart_mode_cycle() {
        let mode = RestartMode::Restart;
        assert_eq!(mode.next(), RestartMode::NoRestart);
        assert_eq!(mode.next().next(), RestartMode::OneShot);
        assert_eq!(mode.next().next().next(), RestartMode::Restart);
        assert_eq!("oneshot".parse::<RestartMode>().unwrap(), RestartMode::OneShot);
        assert!("sometimes".parse::<RestartMode>().is_err());
    }

    #[test]
    fn test_parse_control_key() {
        assert_eq!(parse_control_key("^X").unwrap(), 0x18);
        assert_eq!(parse_control_key("^x").unwrap(), 0x18);
        assert_eq!(parse_control_key("^@").unwrap(), 0);
        assert_eq!(parse_control_key("").unwrap(), 0);
        assert_eq!(parse_control_key("^[").unwrap(), 0x1b);
        assert_eq!(parse_control_key("q").unwrap(), b'q');
        assert!(parse_control_key("^").is_ok());
        assert!(parse_control_key("abc").is_err());
    }

    #[test]
    fn test_describe_key() {
        assert_eq!(describe_key(0x18).as_deref(), Some("^X"));
        assert_eq!(describe_key(0x7f).as_deref(), Some("^?"));
        assert_eq!(describe_key(b'z').as_deref(), Some("z"));
        assert_eq!(describe_key(0), None);
    }

    #[test]
    fn test_key_scan() {
        let keys = KeyBindings::default();
        let commands = keys.scan(b"a\x14b\x18\x00\x11");
        assert_eq!(
            commands,
            vec![ClientCommand::ToggleRestart, ClientCommand::Kill, ClientCommand::Quit]
        );
        assert_eq!(keys.command_for(0), None);
    }

    #[test]
    fn test_endpoint_parsing() {
        assert_eq!("4051".parse::<Endpoint>().unwrap(), Endpoint::TcpPort(4051));
        assert_eq!(
            "127.0.0.1:4051".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("127.0.0.1:4051".parse().unwrap())
        );
        assert_eq!(
            "/run/ioc.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix {
                path: PathBuf::from("/run/ioc.sock"),
                options: UnixSocketOptions::default()
            }
        );
        assert_eq!(
            "unix:ioc:softioc:660:/run/ioc.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix {
                path: PathBuf::from("/run/ioc.sock"),
                options: UnixSocketOptions {
                    user: Some("ioc".to_string()),
                    group: Some("softioc".to_string()),
                    mode: Some(0o660),
                }
            }
        );
        assert_eq!(
            "unix:::600:/tmp/x".parse::<Endpoint>().unwrap(),
            Endpoint::Unix {
                path: PathBuf::from("/tmp/x"),
                options: UnixSocketOptions {
                    user: None,
                    group: None,
                    mode: Some(0o600),
                }
            }
        );
        assert_eq!(
            "@procserv".parse::<Endpoint>().unwrap(),
            Endpoint::Abstract("procserv".to_string())
        );
        assert_eq!(
            "unix:@procserv".parse::<Endpoint>().unwrap(),
            Endpoint::Abstract("procserv".to_string())
        );
        assert!("unix:".parse::<Endpoint>().is_err());
        assert!("@".parse::<Endpoint>().is_err());
        assert!("99999".parse::<Endpoint>().is_err());
        assert!("nowhere".parse::<Endpoint>().is_err());
        assert!("unix:a:b:9z:/tmp/x".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_socket_addr() {
        let port = Endpoint::TcpPort(4051);
        assert_eq!(port.socket_addr(false).unwrap().to_string(), "127.0.0.1:4051");
        assert_eq!(port.socket_addr(true).unwrap().to_string(), "0.0.0.0:4051");
        assert!(Endpoint::Abstract("x".into()).socket_addr(false).is_none());
    }

    #[test]
    fn test_timestamp_format() {
        assert!(TimestampFormat::new("%Y-%m-%d %H:%M:%S").is_ok());
        assert!(TimestampFormat::new("%Q").is_err());
        assert_eq!(TimestampFormat::default().as_str(), "%c");
    }

    #[test]
    fn test_log_destination() {
        assert_eq!("-".parse::<LogDestination>().unwrap(), LogDestination::Stdout);
        assert_eq!(
            "/var/log/ioc.log".parse::<LogDestination>().unwrap(),
            LogDestination::File(PathBuf::from("/var/log/ioc.log"))
        );
        assert!("".parse::<LogDestination>().is_err());
    }

    #[test]
    fn test_byte_set() {
        let set: ByteSet = [0u8, 63, 64, 255].into_iter().collect();
        assert!(set.contains(0));
        assert!(set.contains(63));
        assert!(set.contains(64));
        assert!(set.contains(255));
        assert!(!set.contains(1));
        assert!(ByteSet::default().is_empty());
    }
}
