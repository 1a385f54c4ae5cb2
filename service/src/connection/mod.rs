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

//! Connection taxonomy driven by the event loop
//!
//! Every live handle is one [`Connection`]: a listening socket, a client session or the
//! child's pseudo-terminal. They share one capability set (wait for input, send, mark
//! dead, report variant) and the event loop switches on the variant only where behavior
//! truly differs.

mod client;
mod listener;
mod process;
mod pty;

pub use client::{Banner, ClientInput, ClientSession, ClientStream};
pub use listener::{BoundListener, Listener};
pub use process::ChildProcess;
pub use pty::{
    ChildHandle, INFO_VARIABLE, SpawnRequest, resolve_program, spawn_on_pty,
};

use crate::router::RouteTarget;
use crate::types::{ConnectionId, ConnectionKind};
use bytes::BytesMut;
use nix::unistd::Pid;
use std::future::Future;
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::pin::Pin;
use tokio::io::unix::AsyncFd;

/// Bytes requested from a handle per readiness event
pub(crate) const READ_CHUNK: usize = 4096;

/// Outcome of waiting on one connection
#[derive(Debug)]
pub enum Readiness {
    /// Bytes read from a client or the child
    Data(BytesMut),
    /// A listener accepted a connection
    Accepted(ClientStream),
    /// End of stream
    Closed,
    /// The handle failed
    Failed(io::Error),
}

/// Future resolving when a connection has something for the event loop
pub(crate) type InputFuture<'a> =
    Pin<Box<dyn Future<Output = (ConnectionId, Readiness)> + Send + 'a>>;

/// Waits until `fd` is readable and reads one chunk.
///
/// The read happens under the readiness guard, so a spurious wakeup clears the cached
/// readiness instead of spinning.
pub(crate) async fn read_when_ready<T>(fd: &AsyncFd<T>) -> Readiness
where
    T: AsRawFd,
    for<'b> &'b T: Read,
{
    let mut buf = BytesMut::zeroed(READ_CHUNK);
    loop {
        let mut guard = match fd.readable().await {
            Ok(guard) => guard,
            Err(err) => return Readiness::Failed(err),
        };
        match guard.try_io(|inner| Read::read(&mut inner.get_ref(), &mut buf)) {
            Ok(Ok(0)) => return Readiness::Closed,
            Ok(Ok(n)) => {
                buf.truncate(n);
                return Readiness::Data(buf);
            }
            Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => {}
            Ok(Err(err)) => return Readiness::Failed(err),
            Err(_would_block) => {}
        }
    }
}

/// A registered connection
#[derive(Debug)]
pub enum Connection {
    /// Listening socket
    Listener(Listener),
    /// Interactive or logger client
    Client(ClientSession),
    /// The child's terminal
    Process(ChildProcess),
}

impl Connection {
    /// Registry identifier
    pub fn id(&self) -> ConnectionId {
        match self {
            Connection::Listener(listener) => listener.id(),
            Connection::Client(session) => session.id(),
            Connection::Process(child) => child.id(),
        }
    }

    /// Variant, with loggers told apart from users
    pub fn kind(&self) -> ConnectionKind {
        match self {
            Connection::Listener(_) => ConnectionKind::Listener,
            Connection::Client(session) if session.is_logger() => ConnectionKind::Logger,
            Connection::Client(_) => ConnectionKind::User,
            Connection::Process(_) => ConnectionKind::Process,
        }
    }

    /// True for the child's terminal
    pub fn is_process(&self) -> bool {
        matches!(self, Connection::Process(_))
    }

    /// True for read-only clients
    pub fn is_logger(&self) -> bool {
        matches!(self, Connection::Client(session) if session.is_logger())
    }

    /// True once flagged for removal
    pub fn is_dead(&self) -> bool {
        match self {
            Connection::Listener(listener) => listener.is_dead(),
            Connection::Client(session) => session.is_dead(),
            Connection::Process(child) => child.is_dead(),
        }
    }

    /// Flags the connection for removal at the next sweep.
    pub fn mark_dead(&mut self) {
        match self {
            Connection::Listener(listener) => listener.mark_dead(),
            Connection::Client(session) => session.mark_dead(),
            Connection::Process(child) => child.mark_dead(),
        }
    }

    /// Flags the child connection dead if it belongs to `pid`.
    pub fn mark_dead_if_child_is(&mut self, pid: Pid) -> bool {
        match self {
            Connection::Process(child) => child.mark_dead_if_child_is(pid),
            _ => false,
        }
    }

    /// Writes `data` to the connection. Listeners ignore it.
    pub fn send(&mut self, data: &[u8]) {
        match self {
            Connection::Listener(_) => {}
            Connection::Client(session) => session.send(data),
            Connection::Process(child) => child.send(data),
        }
    }

    /// Future for the next input event, `None` when the connection has nothing to wait on.
    pub(crate) fn wait_input(&self) -> Option<InputFuture<'_>> {
        if self.is_dead() {
            return None;
        }
        match self {
            Connection::Listener(listener) => listener.wait_input(),
            Connection::Client(session) => Some(session.wait_input()),
            Connection::Process(child) => Some(child.wait_input()),
        }
    }
}

impl RouteTarget for Connection {
    fn is_process(&self) -> bool {
        Connection::is_process(self)
    }

    fn is_dead(&self) -> bool {
        Connection::is_dead(self)
    }

    fn deliver(&mut self, data: &[u8]) {
        self.send(data);
    }
}
