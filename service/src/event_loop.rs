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

//! The reactor
//!
//! One task drives everything: it waits for any connection to become readable, a
//! signal to arrive, or the housekeeping timer to fire, dispatches whatever is ready,
//! and then runs housekeeping. All state lives in the [`EventLoop`] and is only touched
//! between waits, so nothing is shared and nothing is locked.

use crate::config::{ClientCommand, ProcServConfig, describe_key};
use crate::connection::{
    Banner, BoundListener, ClientSession, ClientStream, Connection, InputFuture, Listener,
    Readiness, SpawnRequest,
};
use crate::logsink::LogSink;
use crate::registry::ConnectionRegistry;
use crate::router::BroadcastRouter;
use crate::signals::{PendingSignals, SignalWatcher};
use crate::supervisor::ProcessSupervisor;
use crate::types::{ConnectionId, Sender};
use crate::Result;
use bytes::BytesMut;
use futures_util::FutureExt;
use futures_util::future::select_all;
use metrics::counter;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on the time between housekeeping passes
pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(500);

const SIGPIPE_NOTICE: &str = "@@@ Got a sigPipe signal: Did the child close its tty?\r\n";

async fn next_ready(waiters: Vec<InputFuture<'_>>) -> Vec<(ConnectionId, Readiness)> {
    if waiters.is_empty() {
        return std::future::pending().await;
    }
    let (first, _, rest) = select_all(waiters).await;
    let mut ready = vec![first];
    ready.extend(rest.into_iter().filter_map(|waiter| waiter.now_or_never()));
    ready
}

/// Single-threaded server loop owning every connection and the child
///
/// Construct it inside a Tokio runtime, then drive [`run`](EventLoop::run) to
/// completion. The loop ends on a quit command, `SIGTERM`/`SIGINT`, or when a one-shot
/// child has finished.
#[derive(Debug)]
pub struct EventLoop {
    config: ProcServConfig,
    registry: ConnectionRegistry,
    supervisor: ProcessSupervisor,
    log: LogSink,
    signals: SignalWatcher,
    pending: PendingSignals,
    endpoints: Vec<String>,
    shutdown: bool,
}

impl EventLoop {
    /// Registers the bound listeners and prepares the child. Must be called inside the
    /// runtime that will drive [`run`](EventLoop::run).
    pub fn new(config: ProcServConfig, listeners: Vec<BoundListener>) -> Result<Self> {
        config.validate()?;
        let log = match &config.log_destination {
            Some(destination) => {
                LogSink::open(destination, config.log_capacity, config.timestamp.clone())?
            }
            None => LogSink::disabled(),
        };

        let mut registry = ConnectionRegistry::new();
        let mut endpoints = Vec::with_capacity(listeners.len());
        for bound in listeners {
            endpoints.push(bound.local_endpoint().to_string());
            let id = registry.next_id();
            registry.add(Connection::Listener(Listener::register(id, bound)?));
        }

        let info = info_line(&endpoints);
        let request = SpawnRequest::from_config(&config, &info)?;
        let supervisor = ProcessSupervisor::new(&config, request, Instant::now());
        Ok(Self {
            config,
            registry,
            supervisor,
            log,
            signals: SignalWatcher::new()?,
            pending: PendingSignals::default(),
            endpoints,
            shutdown: false,
        })
    }

    /// Addresses the listeners are bound to
    pub fn local_endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Discovery line, also exported to the child as `PROCSERV_INFO`
    pub fn info_line(&self) -> String {
        info_line(&self.endpoints)
    }

    /// Live connections
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Child lifecycle state
    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Makes [`run`](EventLoop::run) return after its next housekeeping pass.
    pub fn request_shutdown(&mut self) {
        self.shutdown = true;
    }

    /// True once shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown
    }

    /// Runs until shutdown, then closes every connection and removes transient files.
    pub async fn run(mut self) -> Result<()> {
        info!(
            child = %self.supervisor.child_name(),
            endpoints = ?self.endpoints,
            "procserv running"
        );
        self.housekeeping();
        while !self.shutdown {
            for (id, readiness) in self.wait().await {
                self.dispatch(id, readiness);
            }
            self.housekeeping();
        }
        self.teardown();
        Ok(())
    }

    fn next_timeout(&self, now: Instant) -> Duration {
        match self.supervisor.next_restart_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(now)
                .min(HOUSEKEEPING_INTERVAL),
            None => HOUSEKEEPING_INTERVAL,
        }
    }

    async fn wait(&mut self) -> Vec<(ConnectionId, Readiness)> {
        let timeout = self.next_timeout(Instant::now());
        let Self {
            registry,
            signals,
            pending,
            ..
        } = self;
        tokio::select! {
            signal = signals.recv() => {
                debug!(%signal, "Signal received");
                pending.record(signal);
                Vec::new()
            }
            _ = tokio::time::sleep(timeout) => Vec::new(),
            ready = next_ready(registry.wait_set()) => ready,
        }
    }

    fn dispatch(&mut self, id: ConnectionId, readiness: Readiness) {
        match readiness {
            Readiness::Data(data) => self.on_data(id, data),
            Readiness::Accepted(stream) => {
                let logger = match self.registry.get_mut(id) {
                    Some(Connection::Listener(listener)) => listener.is_logger(),
                    _ => return,
                };
                self.accept(stream, logger);
            }
            Readiness::Closed => {
                if let Some(connection) = self.registry.get_mut(id) {
                    debug!(%id, "End of stream");
                    connection.mark_dead();
                }
            }
            Readiness::Failed(err) => match self.registry.get_mut(id) {
                Some(Connection::Listener(listener)) => {
                    warn!(endpoint = %listener.local_endpoint(), error = %err, "Accept failed, rebinding");
                    if let Err(err) = listener.rebind() {
                        warn!(error = %err, "Rebind failed, will retry");
                    }
                }
                Some(connection) => {
                    debug!(%id, error = %err, "Read failed");
                    connection.mark_dead();
                }
                None => {}
            },
        }
    }

    fn on_data(&mut self, id: ConnectionId, data: BytesMut) {
        let input = match self.registry.get_mut(id) {
            Some(Connection::Process(_)) => {
                counter!("procserv.bytes.from_child").increment(data.len() as u64);
                self.route(&data, Sender::Process);
                return;
            }
            Some(Connection::Client(session)) => session.receive(data, &self.config.keys),
            _ => return,
        };
        for command in input.commands {
            self.apply_command(id, command);
        }
        self.route(&input.payload, Sender::Client(id));
    }

    fn accept(&mut self, stream: ClientStream, logger: bool) {
        let id = self.registry.next_id();
        let mut session =
            match ClientSession::new(id, stream, logger, &self.config.telnet_stance) {
                Ok(session) => session,
                Err(err) => {
                    warn!(error = %err, "Cannot set up client session");
                    return;
                }
            };
        counter!("procserv.connections.accepted").increment(1);
        let banner = Banner {
            server_name: &self.config.server_name,
            child_name: self.supervisor.child_name(),
            child_pid: self.supervisor.current_pid(),
            restart_mode: self.supervisor.mode(),
            keys: &self.config.keys,
            users: self.registry.users(),
            loggers: self.registry.loggers(),
            logger,
        };
        session.send(banner.render().as_bytes());
        info!(%id, peer = %session.peer(), logger, "Client connected");
        self.registry.add(Connection::Client(session));
    }

    fn apply_command(&mut self, id: ConnectionId, command: ClientCommand) {
        info!(%id, ?command, "Client command");
        match command {
            ClientCommand::Kill => {
                let signal = self.supervisor.kill_signal();
                if self.supervisor.kill() {
                    let notice = format!(
                        "@@@ Killing child \"{}\" with signal {}\r\n",
                        self.supervisor.child_name(),
                        signal
                    );
                    self.route(notice.as_bytes(), Sender::System);
                } else {
                    self.send_to(id, b"@@@ No child is running\r\n");
                }
            }
            ClientCommand::Restart => {
                if self.supervisor.request_restart(Instant::now()) {
                    let notice = format!(
                        "@@@ Got a restart command, starting child \"{}\"\r\n",
                        self.supervisor.child_name()
                    );
                    self.route(notice.as_bytes(), Sender::System);
                } else {
                    let note = match describe_key(self.config.keys.kill) {
                        Some(key) => format!("@@@ Child is running, use {key} to kill it\r\n"),
                        None => "@@@ Child is running\r\n".to_string(),
                    };
                    self.send_to(id, note.as_bytes());
                }
            }
            ClientCommand::ToggleRestart => {
                let mode = self.supervisor.toggle_mode();
                let notice = format!("@@@ Toggled auto restart mode to {mode}\r\n");
                self.route(notice.as_bytes(), Sender::System);
            }
            ClientCommand::Quit => {
                self.route(
                    b"@@@ Got a shutdown command, exiting procserv\r\n",
                    Sender::System,
                );
                self.shutdown = true;
            }
            ClientCommand::Logout => {
                self.send_to(id, b"@@@ Logging out\r\n");
                if let Some(connection) = self.registry.get_mut(id) {
                    connection.mark_dead();
                }
            }
        }
    }

    fn route(&mut self, message: &[u8], sender: Sender) -> usize {
        BroadcastRouter::new(&mut self.log).route(self.registry.iter_mut(), message, sender)
    }

    fn send_to(&mut self, id: ConnectionId, message: &[u8]) {
        if let Some(connection) = self.registry.get_mut(id) {
            connection.send(message);
        }
    }

    fn housekeeping(&mut self) {
        let now = Instant::now();
        let signals = self.pending.take();
        if signals.pipe > 0 {
            warn!("Received SIGPIPE");
            self.route(SIGPIPE_NOTICE.as_bytes(), Sender::System);
        }
        if signals.hangup > 0 {
            if let Err(err) = self.log.reopen() {
                warn!(error = %err, "Cannot reopen log");
            }
        }
        if signals.terminate > 0 {
            info!("Termination requested");
            self.shutdown = true;
        }

        self.reap_children();
        self.retry_listeners();
        self.sweep(now);
        self.reap_children();

        if !self.shutdown && self.supervisor.needs_restart_at(now) {
            self.spawn_child(now);
        }
        if self.supervisor.should_exit() {
            info!("One-shot child finished");
            self.shutdown = true;
        }
        self.log.flush();
    }

    fn reap_children(&mut self) {
        for report in self.supervisor.reap() {
            for connection in self.registry.iter_mut() {
                connection.mark_dead_if_child_is(report.pid);
            }
            self.route(report.message().as_bytes(), Sender::System);
        }
    }

    fn retry_listeners(&mut self) {
        for connection in self.registry.iter_mut() {
            if let Connection::Listener(listener) = connection {
                if listener.needs_rebind() {
                    if let Err(err) = listener.rebind() {
                        debug!(error = %err, "Rebind failed, will retry");
                    }
                }
            }
        }
    }

    fn sweep(&mut self, now: Instant) {
        for mut connection in self.registry.take_dead() {
            if let Connection::Process(child) = &mut connection {
                let tail = child.drain_output();
                self.route(&tail, Sender::Process);
                if let Some(notice) = self.supervisor.child_removed(child.id(), now) {
                    self.route(notice.as_bytes(), Sender::System);
                }
            }
        }
    }

    fn spawn_child(&mut self, now: Instant) {
        let id = self.registry.next_id();
        match self.supervisor.spawn(id, now) {
            Ok(child) => {
                let notice = self.supervisor.spawn_notice(child.pid());
                self.registry.add(Connection::Process(child));
                self.route(notice.as_bytes(), Sender::System);
            }
            Err(err) => {
                error!(error = %err, "Cannot spawn child");
                let notice = format!(
                    "@@@ Cannot start child \"{}\": {}\r\n",
                    self.supervisor.child_name(),
                    err
                );
                self.route(notice.as_bytes(), Sender::System);
            }
        }
    }

    fn teardown(&mut self) {
        info!("Shutting down");
        let now = Instant::now();
        for connection in self.registry.drain() {
            if let Connection::Process(child) = &connection {
                self.supervisor.child_removed(child.id(), now);
            }
        }
        self.supervisor.reap();
        for path in &self.config.cleanup_files {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), error = %err, "Cannot remove file"),
            }
        }
        self.log.flush();
    }
}

/// `pid:<server pid> <endpoint> ...`
fn info_line(endpoints: &[String]) -> String {
    let mut line = format!("pid:{}", std::process::id());
    for endpoint in endpoints {
        line.push(' ');
        line.push_str(endpoint);
    }
    line
}
