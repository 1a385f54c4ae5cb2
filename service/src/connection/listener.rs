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

//! Listening sockets for the control and log endpoints

use super::{ClientStream, InputFuture, Readiness};
use crate::config::{Endpoint, UnixSocketOptions};
use crate::types::ConnectionId;
use crate::{ProcServError, Result};
use nix::unistd::{Group, User};
use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::linux::net::SocketAddrExt;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixListener;
use std::path::Path;
use tokio::io::unix::AsyncFd;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum BoundSocket {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl BoundSocket {
    fn accept(&self) -> io::Result<ClientStream> {
        match self {
            BoundSocket::Tcp(listener) => listener
                .accept()
                .map(|(stream, _)| ClientStream::Tcp(stream)),
            BoundSocket::Unix(listener) => listener
                .accept()
                .map(|(stream, _)| ClientStream::Unix(stream)),
        }
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            BoundSocket::Tcp(listener) => listener.set_nonblocking(true),
            BoundSocket::Unix(listener) => listener.set_nonblocking(true),
        }
    }
}

impl AsRawFd for BoundSocket {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            BoundSocket::Tcp(listener) => listener.as_raw_fd(),
            BoundSocket::Unix(listener) => listener.as_raw_fd(),
        }
    }
}

fn bind_error(endpoint: &Endpoint, source: io::Error) -> ProcServError {
    ProcServError::Bind {
        endpoint: endpoint.to_string(),
        source,
    }
}

fn bind_socket(endpoint: &Endpoint, allow_remote: bool) -> Result<BoundSocket> {
    let socket = match endpoint {
        Endpoint::TcpPort(_) | Endpoint::Tcp(_) => {
            let addr = endpoint
                .socket_addr(allow_remote)
                .ok_or_else(|| ProcServError::InvalidEndpoint(endpoint.to_string()))?;
            if !allow_remote && !addr.ip().is_loopback() {
                return Err(ProcServError::Config(format!(
                    "refusing to listen on non-loopback address {addr}"
                )));
            }
            BoundSocket::Tcp(TcpListener::bind(addr).map_err(|err| bind_error(endpoint, err))?)
        }
        Endpoint::Unix { path, options } => {
            remove_stale_socket(path);
            let listener = UnixListener::bind(path).map_err(|err| bind_error(endpoint, err))?;
            apply_socket_options(path, options)?;
            BoundSocket::Unix(listener)
        }
        Endpoint::Abstract(name) => {
            let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())
                .map_err(|err| bind_error(endpoint, err))?;
            BoundSocket::Unix(
                UnixListener::bind_addr(&addr).map_err(|err| bind_error(endpoint, err))?,
            )
        }
    };
    socket.set_nonblocking()?;
    Ok(socket)
}

fn remove_stale_socket(path: &Path) {
    let is_socket = std::fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_socket())
        .unwrap_or(false);
    if is_socket {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed stale socket"),
            Err(err) => warn!(path = %path.display(), error = %err, "Cannot remove stale socket"),
        }
    }
}

fn apply_socket_options(path: &Path, options: &UnixSocketOptions) -> Result<()> {
    if options.is_empty() {
        return Ok(());
    }
    let uid = match &options.user {
        Some(name) => Some(
            User::from_name(name)?
                .ok_or_else(|| ProcServError::UnknownUser(name.clone()))?
                .uid
                .as_raw(),
        ),
        None => None,
    };
    let gid = match &options.group {
        Some(name) => Some(
            Group::from_name(name)?
                .ok_or_else(|| ProcServError::UnknownGroup(name.clone()))?
                .gid
                .as_raw(),
        ),
        None => None,
    };
    if uid.is_some() || gid.is_some() {
        std::os::unix::fs::chown(path, uid, gid)?;
    }
    if let Some(mode) = options.mode {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

fn describe_local(socket: &BoundSocket, endpoint: &Endpoint) -> String {
    match (socket, endpoint) {
        (BoundSocket::Tcp(listener), _) => match listener.local_addr() {
            Ok(addr) => format!("tcp:{addr}"),
            Err(_) => format!("tcp:{endpoint}"),
        },
        (BoundSocket::Unix(_), endpoint) => endpoint.to_string(),
    }
}

/// A socket bound before the event loop starts
///
/// Binding happens outside the runtime so startup failures surface before the server
/// detaches from its terminal. [`Listener::register`] hands the socket to the reactor.
#[derive(Debug)]
pub struct BoundListener {
    endpoint: Endpoint,
    allow_remote: bool,
    logger: bool,
    socket: BoundSocket,
    local: String,
}

impl BoundListener {
    /// Binds `endpoint`; `logger` marks every session it accepts as read-only.
    pub fn bind(endpoint: &Endpoint, allow_remote: bool, logger: bool) -> Result<Self> {
        let socket = bind_socket(endpoint, allow_remote)?;
        let local = describe_local(&socket, endpoint);
        info!(endpoint = %local, logger, "Listening");
        Ok(Self {
            endpoint: endpoint.clone(),
            allow_remote,
            logger,
            socket,
            local,
        })
    }

    /// Address actually bound, for discovery (`tcp:127.0.0.1:4051`, `unix:/path`, ...)
    pub fn local_endpoint(&self) -> &str {
        &self.local
    }

    /// Bound TCP address, `None` for UNIX sockets
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.socket {
            BoundSocket::Tcp(listener) => listener.local_addr().ok(),
            BoundSocket::Unix(_) => None,
        }
    }

    /// True if sessions accepted here are read-only
    pub fn is_logger(&self) -> bool {
        self.logger
    }
}

/// A listening connection in the registry
pub struct Listener {
    id: ConnectionId,
    endpoint: Endpoint,
    allow_remote: bool,
    logger: bool,
    local: String,
    socket: Option<AsyncFd<BoundSocket>>,
    dead: bool,
}

impl Listener {
    /// Registers a bound socket with the reactor. Must run inside the runtime.
    pub fn register(id: ConnectionId, bound: BoundListener) -> io::Result<Self> {
        Ok(Self {
            id,
            endpoint: bound.endpoint,
            allow_remote: bound.allow_remote,
            logger: bound.logger,
            local: bound.local,
            socket: Some(AsyncFd::new(bound.socket)?),
            dead: false,
        })
    }

    /// Registry identifier
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// True if accepted sessions are read-only
    pub fn is_logger(&self) -> bool {
        self.logger
    }

    /// Bound address, for discovery
    pub fn local_endpoint(&self) -> &str {
        &self.local
    }

    /// True while the socket is closed after a failed rebind
    pub fn needs_rebind(&self) -> bool {
        self.socket.is_none()
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead
    }

    pub(crate) fn mark_dead(&mut self) {
        self.dead = true;
    }

    /// Closes the socket and binds the endpoint again.
    ///
    /// On failure the listener stays registered without a socket, and the caller is
    /// expected to retry later.
    pub fn rebind(&mut self) -> Result<()> {
        self.socket = None;
        let socket = bind_socket(&self.endpoint, self.allow_remote)?;
        self.local = describe_local(&socket, &self.endpoint);
        self.socket = Some(AsyncFd::new(socket)?);
        info!(endpoint = %self.local, "Listener rebound");
        Ok(())
    }

    pub(crate) fn wait_input(&self) -> Option<InputFuture<'_>> {
        let socket = self.socket.as_ref()?;
        let id = self.id;
        Some(Box::pin(async move {
            loop {
                let mut guard = match socket.readable().await {
                    Ok(guard) => guard,
                    Err(err) => return (id, Readiness::Failed(err)),
                };
                match guard.try_io(|inner| inner.get_ref().accept()) {
                    Ok(Ok(stream)) => return (id, Readiness::Accepted(stream)),
                    Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => {}
                    Ok(Err(err)) => return (id, Readiness::Failed(err)),
                    Err(_would_block) => {}
                }
            }
        }))
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Endpoint::Unix { path, .. } = &self.endpoint {
            self.socket = None;
            if let Err(err) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %err, "Socket file not removed");
            }
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("endpoint", &self.local)
            .field("logger", &self.logger)
            .field("open", &self.socket.is_some())
            .field("dead", &self.dead)
            .finish()
    }
}
