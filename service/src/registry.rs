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

//! Connection registry
//!
//! Owns every live connection. Connections are added and removed only from the loop,
//! so a plain vector is enough; iteration order is insertion order.

use crate::connection::{Connection, InputFuture};
use crate::types::{ConnectionId, ConnectionKind};
use tracing::debug;

/// The set of live connections plus the user and logger counters
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Vec<Connection>,
    next_id: u64,
    users: usize,
    loggers: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next connection identifier. Identifiers are never reused.
    pub fn next_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId::new(self.next_id)
    }

    /// Registers a connection.
    pub fn add(&mut self, connection: Connection) {
        match connection.kind() {
            ConnectionKind::User => self.users += 1,
            ConnectionKind::Logger => self.loggers += 1,
            _ => {}
        }
        debug!(id = %connection.id(), kind = ?connection.kind(), "Registered connection");
        self.connections.push(connection);
        self.publish_counts();
    }

    /// Unregisters and returns the connection with `id`.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let index = self.connections.iter().position(|c| c.id() == id)?;
        let connection = self.connections.remove(index);
        self.forget(&connection);
        Some(connection)
    }

    /// Unregisters every connection flagged dead and hands them to the caller.
    pub fn take_dead(&mut self) -> Vec<Connection> {
        let (dead, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(Connection::is_dead);
        self.connections = live;
        for connection in &dead {
            self.forget(connection);
        }
        dead
    }

    /// Unregisters everything, for teardown.
    pub fn drain(&mut self) -> Vec<Connection> {
        self.users = 0;
        self.loggers = 0;
        self.publish_counts();
        std::mem::take(&mut self.connections)
    }

    /// Mutable access by identifier
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.id() == id)
    }

    /// Iterate over all connections
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    /// Iterate mutably over all connections
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.iter_mut()
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Interactive sessions
    pub fn users(&self) -> usize {
        self.users
    }

    /// Read-only sessions
    pub fn loggers(&self) -> usize {
        self.loggers
    }

    /// One input future per connection that has something to wait on.
    pub(crate) fn wait_set(&self) -> Vec<InputFuture<'_>> {
        self.connections
            .iter()
            .filter_map(Connection::wait_input)
            .collect()
    }

    fn forget(&mut self, connection: &Connection) {
        match connection.kind() {
            ConnectionKind::User => self.users = self.users.saturating_sub(1),
            ConnectionKind::Logger => self.loggers = self.loggers.saturating_sub(1),
            _ => {}
        }
        debug!(id = %connection.id(), kind = ?connection.kind(), "Removed connection");
        self.publish_counts();
    }

    fn publish_counts(&self) {
        metrics::gauge!("procserv.clients.users").set(self.users as f64);
        metrics::gauge!("procserv.clients.loggers").set(self.loggers as f64);
    }
}
