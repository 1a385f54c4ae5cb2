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

//! procserv Service
//!
//! Supervises one child process on a pseudo-terminal and shares that terminal with any
//! number of telnet clients. Everything the child prints goes to every client and to
//! the optional log; everything an interactive client types goes to the child. Logger
//! clients only listen.
//!
//! # Architecture
//!
//! ```text
//! EventLoop
//!     ├── ConnectionRegistry ── Listener / ClientSession / ChildProcess
//!     ├── ProcessSupervisor  ── spawn, restart holdoff, kill
//!     ├── BroadcastRouter    ── party-line delivery rule
//!     └── LogSink            ── LogRingBuffer → log file
//! ```
//!
//! The loop is single threaded. Sockets and the pty master are registered with the
//! Tokio reactor through `AsyncFd`; the loop waits on all of them at once, dispatches
//! what is ready and then runs housekeeping (signals, child reaping, restarts, sweeping
//! dead connections).
//!
//! # Example
//!
//! ```no_run
//! use procserv_service::{BoundListener, Endpoint, EventLoop, ProcServConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcServConfig::new("/usr/bin/softIoc", ["st.cmd"])
//!         .with_control("4051".parse::<Endpoint>()?);
//!     let control = BoundListener::bind(&config.control, config.allow_remote, false)?;
//!
//!     let runtime = tokio::runtime::Builder::new_current_thread()
//!         .enable_all()
//!         .build()?;
//!     runtime.block_on(async move { EventLoop::new(config, vec![control])?.run().await })?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;
mod event_loop;
mod logsink;
mod registry;
mod ringbuffer;
mod router;
mod signals;
mod supervisor;
mod types;

pub use config::{
    ByteSet, ClientCommand, DEFAULT_HOLDOFF, DEFAULT_LOG_CAPACITY, DEFAULT_TIMESTAMP_FORMAT,
    Endpoint, KeyBindings, LogDestination, ProcServConfig, RestartMode, TimestampFormat,
    UnixSocketOptions, describe_key, parse_control_key,
};
pub use connection::{
    Banner, BoundListener, ChildHandle, ChildProcess, ClientInput, ClientSession, ClientStream,
    Connection, INFO_VARIABLE, Listener, Readiness, SpawnRequest, resolve_program,
    spawn_on_pty,
};
pub use error::{ProcServError, Result};
pub use event_loop::{EventLoop, HOUSEKEEPING_INTERVAL};
pub use logsink::LogSink;
pub use registry::ConnectionRegistry;
pub use ringbuffer::LogRingBuffer;
pub use router::{BroadcastRouter, RouteTarget, should_deliver};
pub use signals::{PendingSignals, ServerSignal, SignalWatcher};
pub use supervisor::{ExitReport, ExitStatus, ProcessSupervisor, SupervisorState};
pub use types::{ConnectionId, ConnectionKind, Sender};
