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

//! The child's side of the party line

use super::{ChildHandle, InputFuture, READ_CHUNK, read_when_ready};
use crate::config::ByteSet;
use crate::types::ConnectionId;
use bytes::BytesMut;
use metrics::counter;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::fs::File;
use std::io::{self, Read, Write};
use std::time::Instant;
use tokio::io::unix::AsyncFd;
use tracing::{debug, trace};

const DRAIN_LIMIT: usize = 16;

/// Connection wrapping the pty master of a running child
///
/// Dropping it sends `SIGKILL` to the child's process group.
#[derive(Debug)]
pub struct ChildProcess {
    id: ConnectionId,
    pid: Pid,
    master: AsyncFd<File>,
    started: Instant,
    strip: ByteSet,
    dead: bool,
}

impl ChildProcess {
    /// Registers the master of a forked child. Must run inside the runtime.
    pub fn new(id: ConnectionId, handle: ChildHandle, strip: ByteSet) -> io::Result<Self> {
        Ok(Self {
            id,
            pid: handle.pid,
            master: AsyncFd::new(handle.master)?,
            started: Instant::now(),
            strip,
            dead: false,
        })
    }

    /// Registry identifier
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Child PID
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Time of the fork
    pub fn started(&self) -> Instant {
        self.started
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead
    }

    pub(crate) fn mark_dead(&mut self) {
        self.dead = true;
    }

    /// Marks the connection dead if it belongs to `pid`.
    pub fn mark_dead_if_child_is(&mut self, pid: Pid) -> bool {
        if self.pid == pid {
            self.dead = true;
        }
        self.pid == pid
    }

    /// Writes client input to the terminal after removing command and ignored bytes.
    ///
    /// A full terminal buffer drops the input; any other error marks the child dead.
    pub fn send(&mut self, data: &[u8]) {
        if self.dead {
            return;
        }
        let filtered: Vec<u8> = if self.strip.is_empty() {
            data.to_vec()
        } else {
            data.iter().copied().filter(|b| !self.strip.contains(*b)).collect()
        };
        let mut remaining = &filtered[..];
        while !remaining.is_empty() {
            match self.master.get_ref().write(remaining) {
                Ok(n) => {
                    counter!("procserv.bytes.to_child").increment(n as u64);
                    remaining = &remaining[n..];
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    debug!(pid = self.pid.as_raw(), dropped = remaining.len(), "Child input dropped");
                    return;
                }
                Err(err) => {
                    debug!(pid = self.pid.as_raw(), error = %err, "Write to child failed");
                    self.dead = true;
                    return;
                }
            }
        }
    }

    /// Reads whatever the child left in the terminal, without blocking.
    ///
    /// Called before the connection is dropped so the last lines of a child that just
    /// exited still reach the clients and the log.
    pub fn drain_output(&mut self) -> BytesMut {
        let mut output = BytesMut::new();
        let mut chunk = [0u8; READ_CHUNK];
        for _ in 0..DRAIN_LIMIT {
            match self.master.get_ref().read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => output.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                // EIO once the terminal is hung up, WouldBlock once it is empty
                Err(_) => break,
            }
        }
        if !output.is_empty() {
            counter!("procserv.bytes.from_child").increment(output.len() as u64);
        }
        output
    }

    pub(crate) fn wait_input(&self) -> InputFuture<'_> {
        let id = self.id;
        let master = &self.master;
        Box::pin(async move { (id, read_when_ready(master).await) })
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        trace!(pid = self.pid.as_raw(), "Killing child process group");
        let _ = kill(Pid::from_raw(-self.pid.as_raw()), Signal::SIGKILL);
    }
}
