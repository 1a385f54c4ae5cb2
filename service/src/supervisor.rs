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

//! Child lifecycle policy
//!
//! The supervisor decides when a child is spawned, signalled and replaced. It never
//! owns the child's connection: the registry does, and tells the supervisor when the
//! connection goes away through [`ProcessSupervisor::child_removed`].

use crate::config::{ByteSet, ProcServConfig, RestartMode, TimestampFormat, describe_key};
use crate::connection::{ChildProcess, SpawnRequest, spawn_on_pty};
use crate::types::ConnectionId;
use crate::Result;
use chrono::Local;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How a child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Returned from `main` or called `exit`
    Exited(i32),
    /// Terminated by a signal
    Signaled(Signal),
    /// Reaped elsewhere; the status is unknown
    Vanished,
}

/// An observed child exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// The child that exited
    pub pid: Pid,
    /// How it ended
    pub status: ExitStatus,
}

impl ExitReport {
    /// Broadcast line announcing the exit
    pub fn message(&self) -> String {
        match self.status {
            ExitStatus::Exited(code) => format!(
                "@@@ Received a sigChild for process {}. Normal exit status = {}\r\n",
                self.pid, code
            ),
            ExitStatus::Signaled(signal) => format!(
                "@@@ Received a sigChild for process {}. The process was killed by signal = {}\r\n",
                self.pid, signal as i32
            ),
            ExitStatus::Vanished => format!("@@@ Lost track of process {}\r\n", self.pid),
        }
    }
}

/// Coarse lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Nothing running; a spawn may be pending
    NoChild,
    /// A child is live
    Running(Pid),
    /// The child exited but its connection has not been swept yet
    Exited(Pid),
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::NoChild => write!(f, "no child"),
            SupervisorState::Running(pid) => write!(f, "running (pid {pid})"),
            SupervisorState::Exited(pid) => write!(f, "exited (pid {pid})"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LiveChild {
    id: ConnectionId,
    pid: Pid,
    started: Instant,
    exit_observed: bool,
}

/// Spawn, restart and kill policy for the single child
#[derive(Debug)]
pub struct ProcessSupervisor {
    child_name: String,
    request: SpawnRequest,
    strip: ByteSet,
    mode: RestartMode,
    holdoff: Duration,
    kill_signal: Signal,
    restart_key: Option<String>,
    timestamp: TimestampFormat,
    wait_for_manual_start: bool,
    restart_requested: bool,
    spawns: u64,
    runs_completed: u64,
    one_shot_finished: bool,
    live: Option<LiveChild>,
    restart_after: Instant,
    zombies: Vec<Pid>,
}

impl ProcessSupervisor {
    /// The first spawn is due at `now` unless the configuration asks to wait.
    pub fn new(config: &ProcServConfig, request: SpawnRequest, now: Instant) -> Self {
        Self {
            child_name: config.child_name.clone(),
            request,
            strip: config.stripped_chars(),
            mode: config.restart_mode,
            holdoff: config.holdoff,
            kill_signal: config.kill_signal,
            restart_key: describe_key(config.keys.restart),
            timestamp: config.timestamp.clone().unwrap_or_default(),
            wait_for_manual_start: config.wait_for_manual_start,
            restart_requested: false,
            spawns: 0,
            runs_completed: 0,
            one_shot_finished: false,
            live: None,
            restart_after: now,
            zombies: Vec::new(),
        }
    }

    /// Display name of the child
    pub fn child_name(&self) -> &str {
        &self.child_name
    }

    /// Current restart mode
    pub fn mode(&self) -> RestartMode {
        self.mode
    }

    /// Number of children forked so far
    pub fn spawns(&self) -> u64 {
        self.spawns
    }

    /// Number of children whose connection has been torn down
    pub fn runs_completed(&self) -> u64 {
        self.runs_completed
    }

    /// True while spawning waits for a manual restart
    pub fn is_waiting_for_manual_start(&self) -> bool {
        self.wait_for_manual_start
    }

    /// PID of the live child
    pub fn current_pid(&self) -> Option<Pid> {
        self.live.map(|child| child.pid)
    }

    /// Time the live child was forked
    pub fn started(&self) -> Option<Instant> {
        self.live.map(|child| child.started)
    }

    /// Coarse lifecycle state
    pub fn state(&self) -> SupervisorState {
        match self.live {
            None => SupervisorState::NoChild,
            Some(child) if child.exit_observed => SupervisorState::Exited(child.pid),
            Some(child) => SupervisorState::Running(child.pid),
        }
    }

    fn restart_permitted(&self) -> bool {
        if self.live.is_some() || self.wait_for_manual_start {
            return false;
        }
        match self.mode {
            RestartMode::Restart => true,
            RestartMode::NoRestart => self.runs_completed == 0 || self.restart_requested,
            RestartMode::OneShot => self.runs_completed == 0 || self.restart_requested,
        }
    }

    /// True when a replacement child should be spawned at `now`.
    pub fn needs_restart_at(&self, now: Instant) -> bool {
        self.restart_permitted() && now >= self.restart_after
    }

    /// When the pending spawn becomes due, if one is pending at all.
    pub fn next_restart_deadline(&self) -> Option<Instant> {
        self.restart_permitted().then_some(self.restart_after)
    }

    /// True once a child has gone while the mode was one-shot.
    ///
    /// Toggling into one-shot while no child is live does not end the server; the
    /// decision is taken when a child connection is removed.
    pub fn should_exit(&self) -> bool {
        self.one_shot_finished && self.live.is_none()
    }

    /// Forks a new child on a fresh pty.
    ///
    /// The holdoff starts before the fork, so a failing spawn is retried no sooner
    /// than a child that exits immediately.
    pub fn spawn(&mut self, id: ConnectionId, now: Instant) -> Result<ChildProcess> {
        self.restart_after = now + self.holdoff;
        self.restart_requested = false;
        let handle = spawn_on_pty(&self.request)?;
        let pid = handle.pid;
        let child = match ChildProcess::new(id, handle, self.strip) {
            Ok(child) => child,
            Err(err) => {
                let _ = kill(Pid::from_raw(-pid.as_raw()), Signal::SIGKILL);
                self.zombies.push(pid);
                return Err(err.into());
            }
        };
        self.record_spawn(id, pid, now);
        info!(pid = pid.as_raw(), name = %self.child_name, "Spawned child");
        Ok(child)
    }

    /// Bookkeeping for a successful fork.
    pub fn record_spawn(&mut self, id: ConnectionId, pid: Pid, now: Instant) {
        self.live = Some(LiveChild {
            id,
            pid,
            started: now,
            exit_observed: false,
        });
        self.spawns += 1;
        self.restart_after = now + self.holdoff;
        self.restart_requested = false;
        metrics::counter!("procserv.child.spawns").increment(1);
    }

    /// Broadcast lines announcing a spawn.
    pub fn spawn_notice(&self, pid: Pid) -> String {
        let mut notice = String::new();
        if self.spawns > 1 {
            notice.push_str(&format!("@@@ Restarting child \"{}\"\r\n", self.child_name));
        }
        notice.push_str(&format!(
            "@@@ The PID of new child \"{}\" is: {}\r\n",
            self.child_name, pid
        ));
        notice
    }

    /// Sends `signal` to the live child's process group. A no-op without a child.
    pub fn send_signal(&self, signal: Signal) -> bool {
        let Some(child) = self.live.filter(|child| !child.exit_observed) else {
            debug!(%signal, "No child to signal");
            return false;
        };
        match kill(Pid::from_raw(-child.pid.as_raw()), signal) {
            Ok(()) => {
                info!(pid = child.pid.as_raw(), %signal, "Signalled child");
                true
            }
            Err(errno) => {
                warn!(pid = child.pid.as_raw(), %signal, error = %errno, "Cannot signal child");
                false
            }
        }
    }

    /// Sends the configured kill signal.
    pub fn kill(&self) -> bool {
        self.send_signal(self.kill_signal)
    }

    /// Configured kill signal
    pub fn kill_signal(&self) -> Signal {
        self.kill_signal
    }

    /// Collects exits without blocking, for the live child and any child whose
    /// connection went away before its exit was seen.
    pub fn reap(&mut self) -> Vec<ExitReport> {
        let mut reports = Vec::new();
        if let Some(child) = self.live.as_mut().filter(|child| !child.exit_observed) {
            if let Some(status) = poll_exit(child.pid) {
                child.exit_observed = true;
                reports.push(ExitReport {
                    pid: child.pid,
                    status,
                });
            }
        }
        self.zombies.retain(|&pid| match poll_exit(pid) {
            Some(status) => {
                reports.push(ExitReport { pid, status });
                false
            }
            None => true,
        });
        for report in &reports {
            metrics::counter!("procserv.child.exits").increment(1);
            info!(pid = report.pid.as_raw(), status = ?report.status, "Child exited");
        }
        reports
    }

    /// Called when the child connection `id` is destroyed. Returns the shutdown notice.
    pub fn child_removed(&mut self, id: ConnectionId, now: Instant) -> Option<String> {
        let child = self.live.filter(|child| child.id == id)?;
        self.live = None;
        if !child.exit_observed {
            self.zombies.push(child.pid);
        }
        self.runs_completed += 1;
        if self.mode == RestartMode::OneShot {
            self.one_shot_finished = true;
        }
        Some(self.shutdown_notice(now))
    }

    fn shutdown_notice(&self, now: Instant) -> String {
        let mut notice = format!(
            "@@@ Child \"{}\" shut down at {}\r\n",
            self.child_name,
            self.timestamp.render(&Local::now())
        );
        let explanation = match self.mode {
            RestartMode::Restart => {
                let wait = self.restart_after.saturating_duration_since(now);
                format!(
                    "@@@ Restarting child in {} seconds\r\n",
                    wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
                )
            }
            RestartMode::NoRestart => match &self.restart_key {
                Some(key) => format!("@@@ Auto restart is OFF, use {key} to restart\r\n"),
                None => "@@@ Auto restart is OFF\r\n".to_string(),
            },
            RestartMode::OneShot => "@@@ One-shot mode, procserv is exiting\r\n".to_string(),
        };
        notice.push_str(&explanation);
        notice
    }

    /// Advances the restart mode one step and returns the new mode.
    pub fn toggle_mode(&mut self) -> RestartMode {
        self.mode = self.mode.next();
        info!(mode = %self.mode, "Restart mode changed");
        self.mode
    }

    /// Arms a one-time spawn at `now` when no child is live. Returns false otherwise.
    pub fn request_restart(&mut self, now: Instant) -> bool {
        if self.live.is_some() {
            return false;
        }
        self.restart_requested = true;
        self.wait_for_manual_start = false;
        self.restart_after = now;
        true
    }
}

fn poll_exit(pid: Pid) -> Option<ExitStatus> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::Exited(_, code)) => Some(ExitStatus::Exited(code)),
        Ok(WaitStatus::Signaled(_, signal, _)) => Some(ExitStatus::Signaled(signal)),
        Ok(_) => None,
        Err(Errno::EINTR) => None,
        Err(errno) => {
            debug!(pid = pid.as_raw(), error = %errno, "waitpid failed");
            Some(ExitStatus::Vanished)
        }
    }
}
