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

//! Process signals observed by the event loop
//!
//! Handlers only record that a signal arrived; the loop acts on the record during
//! housekeeping.

use std::fmt;
use std::io;
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Signals the server reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerSignal {
    /// `SIGCHLD`
    ChildExited,
    /// `SIGPIPE`
    BrokenPipe,
    /// `SIGTERM`
    Terminate,
    /// `SIGINT`
    Interrupt,
    /// `SIGHUP`
    HangUp,
}

impl fmt::Display for ServerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerSignal::ChildExited => "SIGCHLD",
            ServerSignal::BrokenPipe => "SIGPIPE",
            ServerSignal::Terminate => "SIGTERM",
            ServerSignal::Interrupt => "SIGINT",
            ServerSignal::HangUp => "SIGHUP",
        };
        f.write_str(name)
    }
}

/// Signals received since the last housekeeping pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSignals {
    /// `SIGCHLD` deliveries
    pub child: u32,
    /// `SIGPIPE` deliveries
    pub pipe: u32,
    /// `SIGTERM` and `SIGINT` deliveries
    pub terminate: u32,
    /// `SIGHUP` deliveries
    pub hangup: u32,
}

impl PendingSignals {
    /// Counts one delivery of `signal`.
    pub fn record(&mut self, signal: ServerSignal) {
        let counter = match signal {
            ServerSignal::ChildExited => &mut self.child,
            ServerSignal::BrokenPipe => &mut self.pipe,
            ServerSignal::Terminate | ServerSignal::Interrupt => &mut self.terminate,
            ServerSignal::HangUp => &mut self.hangup,
        };
        *counter = counter.saturating_add(1);
    }

    /// Returns the counts and resets them.
    pub fn take(&mut self) -> PendingSignals {
        std::mem::take(self)
    }

    /// True if nothing arrived
    pub fn is_empty(&self) -> bool {
        *self == PendingSignals::default()
    }
}

/// Signal streams registered with the runtime
#[derive(Debug)]
pub struct SignalWatcher {
    child: Signal,
    pipe: Signal,
    terminate: Signal,
    interrupt: Signal,
    hangup: Signal,
}

impl SignalWatcher {
    /// Installs the handlers. Must be called inside the runtime.
    ///
    /// Installing a `SIGPIPE` handler also keeps a closed client from killing the server.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            child: signal(SignalKind::child())?,
            pipe: signal(SignalKind::pipe())?,
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Waits for the next signal.
    pub async fn recv(&mut self) -> ServerSignal {
        tokio::select! {
            _ = self.child.recv() => ServerSignal::ChildExited,
            _ = self.pipe.recv() => ServerSignal::BrokenPipe,
            _ = self.terminate.recv() => ServerSignal::Terminate,
            _ = self.interrupt.recv() => ServerSignal::Interrupt,
            _ = self.hangup.recv() => ServerSignal::HangUp,
        }
    }
}
