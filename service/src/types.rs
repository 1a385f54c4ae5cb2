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

//! Core types for the party line

use std::fmt;

/// Unique identifier for a connection (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Origin of a routed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    /// Generated by the server itself (status lines, notices)
    System,
    /// Output read from the child's terminal
    Process,
    /// Input typed by an interactive client
    Client(ConnectionId),
}

impl Sender {
    /// True for messages that are mirrored to clients and the log.
    pub fn is_broadcast(self) -> bool {
        matches!(self, Sender::System | Sender::Process)
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::System => write!(f, "system"),
            Sender::Process => write!(f, "process"),
            Sender::Client(id) => write!(f, "client {id}"),
        }
    }
}

/// Connection variant, for logging and counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Listening socket
    Listener,
    /// Interactive client session
    User,
    /// Read-only client session
    Logger,
    /// The child's pseudo-terminal
    Process,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKind::Listener => write!(f, "listener"),
            ConnectionKind::User => write!(f, "user"),
            ConnectionKind::Logger => write!(f, "logger"),
            ConnectionKind::Process => write!(f, "process"),
        }
    }
}
