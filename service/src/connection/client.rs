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

//! Telnet client sessions

use super::{InputFuture, read_when_ready};
use crate::config::{ClientCommand, KeyBindings, RestartMode, describe_key};
use crate::types::ConnectionId;
use bytes::BytesMut;
use nix::unistd::Pid;
use procserv_telnetcodec::{TelnetCommand, TelnetNegotiator};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use tokio::io::unix::AsyncFd;
use tracing::{debug, trace};

/// An accepted socket, TCP or UNIX domain
#[derive(Debug)]
pub enum ClientStream {
    /// TCP peer
    Tcp(TcpStream),
    /// UNIX domain peer
    Unix(UnixStream),
}

impl ClientStream {
    /// Switches the socket to non-blocking mode.
    pub fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            ClientStream::Tcp(stream) => stream.set_nonblocking(true),
            ClientStream::Unix(stream) => stream.set_nonblocking(true),
        }
    }

    /// Human readable peer description for logs
    pub fn peer(&self) -> String {
        match self {
            ClientStream::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:unknown".to_string()),
            ClientStream::Unix(_) => "unix".to_string(),
        }
    }
}

impl AsRawFd for ClientStream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            ClientStream::Tcp(stream) => stream.as_raw_fd(),
            ClientStream::Unix(stream) => stream.as_raw_fd(),
        }
    }
}

impl Read for &ClientStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ClientStream::Tcp(stream) => (&*stream).read(buf),
            ClientStream::Unix(stream) => (&*stream).read(buf),
        }
    }
}

impl Write for &ClientStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ClientStream::Tcp(stream) => (&*stream).write(buf),
            ClientStream::Unix(stream) => (&*stream).write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ClientStream::Tcp(stream) => (&*stream).flush(),
            ClientStream::Unix(stream) => (&*stream).flush(),
        }
    }
}

/// Result of feeding one read through a session
#[derive(Debug, Default)]
pub struct ClientInput {
    /// Application data with telnet framing removed
    pub payload: BytesMut,
    /// In-band commands found in the payload, in order
    pub commands: Vec<ClientCommand>,
}

/// One connected telnet client
///
/// Logger sessions receive everything the child prints but their input is discarded
/// after telnet negotiation, so they can neither type nor issue commands.
pub struct ClientSession {
    id: ConnectionId,
    stream: AsyncFd<ClientStream>,
    negotiator: TelnetNegotiator,
    logger: bool,
    peer: String,
    dead: bool,
}

impl ClientSession {
    /// Wraps an accepted stream and sends the opening negotiation requests.
    ///
    /// Must be called inside the runtime.
    pub fn new(
        id: ConnectionId,
        stream: ClientStream,
        logger: bool,
        stance: &[TelnetCommand],
    ) -> io::Result<Self> {
        stream.set_nonblocking()?;
        let peer = stream.peer();
        let mut session = Self {
            id,
            stream: AsyncFd::new(stream)?,
            negotiator: TelnetNegotiator::new(stance),
            logger,
            peer,
            dead: false,
        };
        let mut requests = BytesMut::new();
        session.negotiator.initial_requests(&mut requests);
        session.send(&requests);
        debug!(id = %session.id, peer = %session.peer, logger, "Client connected");
        Ok(session)
    }

    /// Registry identifier
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// True for read-only sessions
    pub fn is_logger(&self) -> bool {
        self.logger
    }

    /// Peer address description
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Telnet state for this session
    pub fn negotiator(&self) -> &TelnetNegotiator {
        &self.negotiator
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead
    }

    pub(crate) fn mark_dead(&mut self) {
        self.dead = true;
    }

    /// Strips telnet framing from `raw` and picks out command keys.
    pub fn receive(&mut self, mut raw: BytesMut, keys: &KeyBindings) -> ClientInput {
        let kept = self.negotiator.on_receive(&mut raw);
        raw.truncate(kept);
        if self.logger {
            trace!(id = %self.id, bytes = kept, "Discarding logger input");
            return ClientInput::default();
        }
        let commands = keys.scan(&raw);
        ClientInput {
            payload: raw,
            commands,
        }
    }

    /// Writes without blocking. A full socket buffer drops the rest of `data`;
    /// any other failure marks the session dead.
    pub fn send(&mut self, data: &[u8]) {
        if self.dead {
            return;
        }
        let mut remaining = data;
        while !remaining.is_empty() {
            match self.stream.get_ref().write(remaining) {
                Ok(0) => {
                    self.dead = true;
                    return;
                }
                Ok(n) => remaining = &remaining[n..],
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    debug!(id = %self.id, dropped = remaining.len(), "Client too slow, output dropped");
                    return;
                }
                Err(err) => {
                    debug!(id = %self.id, error = %err, "Client write failed");
                    self.dead = true;
                    return;
                }
            }
        }
    }

    pub(crate) fn wait_input(&self) -> InputFuture<'_> {
        let id = self.id;
        let stream = &self.stream;
        Box::pin(async move { (id, read_when_ready(stream).await) })
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("logger", &self.logger)
            .field("state", &self.negotiator.state())
            .field("dead", &self.dead)
            .finish()
    }
}

/// Greeting sent to each client as it connects
#[derive(Debug, Clone)]
pub struct Banner<'a> {
    /// Server identity
    pub server_name: &'a str,
    /// Child display name
    pub child_name: &'a str,
    /// Live child, if any
    pub child_pid: Option<Pid>,
    /// Current restart mode
    pub restart_mode: RestartMode,
    /// Enabled command keys
    pub keys: &'a KeyBindings,
    /// Interactive sessions already connected
    pub users: usize,
    /// Logger sessions already connected
    pub loggers: usize,
    /// Render the read-only variant
    pub logger: bool,
}

impl Banner<'_> {
    /// Renders the banner with `\r\n` line endings.
    pub fn render(&self) -> String {
        let mut out = format!(
            "@@@ Welcome to {} ({} {})\r\n",
            self.server_name,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
        match self.child_pid {
            Some(pid) => out.push_str(&format!(
                "@@@ Child \"{}\" PID: {}\r\n",
                self.child_name, pid
            )),
            None => out.push_str(&format!(
                "@@@ Child \"{}\" is not running\r\n",
                self.child_name
            )),
        }
        if self.logger {
            out.push_str("@@@ This is a read-only logger connection\r\n");
            return out;
        }
        out.push_str(&format!("@@@ Auto restart mode is {}\r\n", self.restart_mode));
        for (key, what) in [
            (self.keys.kill, "kill the child"),
            (self.keys.restart, "restart the child"),
            (self.keys.toggle, "toggle auto restart"),
            (self.keys.quit, "shut down the server"),
            (self.keys.logout, "log out"),
        ] {
            if let Some(name) = describe_key(key) {
                out.push_str(&format!("@@@ Use {name} to {what}\r\n"));
            }
        }
        out.push_str(&format!(
            "@@@ {} user(s) and {} logger(s) connected (plus you)\r\n",
            self.users, self.loggers
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procserv_telnetcodec::{TelnetOption, consts::IAC, consts::WILL};

    fn banner<'a>(keys: &'a KeyBindings, logger: bool) -> Banner<'a> {
        Banner {
            server_name: "procserv",
            child_name: "ioc",
            child_pid: Some(Pid::from_raw(4242)),
            restart_mode: RestartMode::OneShot,
            keys,
            users: 2,
            loggers: 1,
            logger,
        }
    }

    #[test]
    fn test_banner_lists_enabled_keys() {
        let keys = KeyBindings::default();
        let text = banner(&keys, false).render();
        assert!(text.contains("Child \"ioc\" PID: 4242"));
        assert!(text.contains("Auto restart mode is ONESHOT"));
        assert!(text.contains("Use ^X to kill the child"));
        assert!(text.contains("Use ^T to toggle auto restart"));
        assert!(!text.contains("log out"));
        assert!(text.contains("2 user(s) and 1 logger(s)"));
        assert!(text.lines().all(|line| line.ends_with('\r')));
    }

    #[test]
    fn test_logger_banner_is_short() {
        let keys = KeyBindings::default();
        let text = banner(&keys, true).render();
        assert!(text.contains("read-only"));
        assert!(!text.contains("Use ^X"));
    }

    #[tokio::test]
    async fn test_session_negotiates_and_scans_commands() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let mut session = ClientSession::new(
            ConnectionId::new(1),
            ClientStream::Unix(ours),
            false,
            &[TelnetCommand::Will(TelnetOption::Echo)],
        )
        .unwrap();

        let mut greeting = [0u8; 3];
        theirs.read_exact(&mut greeting).unwrap();
        assert_eq!(greeting, [IAC, WILL, 1]);

        let keys = KeyBindings::default();
        let input = session.receive(BytesMut::from(&b"ab\x18c"[..]), &keys);
        assert_eq!(&input.payload[..], b"ab\x18c");
        assert_eq!(input.commands, vec![ClientCommand::Kill]);
    }

    #[tokio::test]
    async fn test_logger_input_is_discarded() {
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let mut session =
            ClientSession::new(ConnectionId::new(2), ClientStream::Unix(ours), true, &[]).unwrap();
        let input = session.receive(BytesMut::from(&b"\x18typed"[..]), &KeyBindings::default());
        assert!(input.payload.is_empty());
        assert!(input.commands.is_empty());
    }

    #[tokio::test]
    async fn test_send_after_peer_close_marks_dead() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let mut session =
            ClientSession::new(ConnectionId::new(3), ClientStream::Unix(ours), false, &[]).unwrap();
        drop(theirs);
        session.send(b"hello");
        assert!(session.is_dead());
    }
}
