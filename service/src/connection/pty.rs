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

//! Forking the child onto a fresh pseudo-terminal
//!
//! Everything the child half needs, down to the null-terminated pointer arrays handed
//! to `execve`, is built before `fork`. The child half never allocates, so a fork taken
//! while another thread holds the allocator lock cannot deadlock.

use crate::config::ProcServConfig;
use crate::{ProcServError, Result};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::libc;
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt};
use nix::sys::resource::{Resource, setrlimit};
use nix::sys::signal::{SigHandler, SigSet, SigmaskHow, Signal, signal, sigprocmask};
use nix::sys::stat::Mode;
use nix::unistd::{ForkResult, Pid, chdir, close, dup2, fork, setsid};
use std::ffi::{CString, OsStr, c_char};
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{FromRawFd, IntoRawFd, RawFd};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable carrying the discovery line to the child
pub const INFO_VARIABLE: &str = "PROCSERV_INFO";

fn c_string(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|_| {
        ProcServError::Config(format!(
            "embedded NUL in '{}'",
            String::from_utf8_lossy(bytes)
        ))
    })
}

fn env_entry(key: &OsStr, value: &OsStr) -> Result<CString> {
    let mut entry = Vec::with_capacity(key.len() + value.len() + 1);
    entry.extend_from_slice(key.as_bytes());
    entry.push(b'=');
    entry.extend_from_slice(value.as_bytes());
    c_string(&entry)
}

/// Finds `program` on `PATH` unless it already names a path.
pub fn resolve_program(program: &Path) -> PathBuf {
    if program.as_os_str().as_bytes().contains(&b'/') {
        return program.to_path_buf();
    }
    let Some(search) = std::env::var_os("PATH") else {
        return program.to_path_buf();
    };
    std::env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| {
            std::fs::metadata(candidate)
                .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        })
        .unwrap_or_else(|| program.to_path_buf())
}

/// Everything needed to exec the child, prepared ahead of `fork`
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    chdir: Option<CString>,
    core_limit: Option<u64>,
}

impl SpawnRequest {
    /// Builds the request from the configuration; `info` becomes `PROCSERV_INFO`.
    pub fn from_config(config: &ProcServConfig, info: &str) -> Result<Self> {
        let path = c_string(resolve_program(&config.program).as_os_str().as_bytes())?;
        let argv = std::iter::once(config.program.as_os_str().as_bytes())
            .chain(config.args.iter().map(|arg| arg.as_bytes()))
            .map(c_string)
            .collect::<Result<Vec<_>>>()?;

        let overridden = |key: &OsStr| {
            key == INFO_VARIABLE || config.environment.iter().any(|(k, _)| key == k.as_str())
        };
        let mut envp = std::env::vars_os()
            .filter(|(key, _)| !overridden(key.as_os_str()))
            .map(|(key, value)| env_entry(&key, &value))
            .collect::<Result<Vec<_>>>()?;
        for (key, value) in &config.environment {
            envp.push(env_entry(key.as_ref(), value.as_ref())?);
        }
        envp.push(env_entry(INFO_VARIABLE.as_ref(), info.as_ref())?);

        let chdir = match &config.chdir {
            Some(dir) => Some(c_string(dir.as_os_str().as_bytes())?),
            None => None,
        };
        Ok(Self {
            path,
            argv,
            envp,
            chdir,
            core_limit: config.core_limit,
        })
    }

    /// Resolved executable
    pub fn path(&self) -> &CString {
        &self.path
    }

    /// Argument vector, `argv[0]` first
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// Value of `key` in the child environment
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envp.iter().rev().find_map(|entry| {
            let entry = entry.to_str().ok()?;
            let (k, v) = entry.split_once('=')?;
            (k == key).then_some(v)
        })
    }
}

/// Null-terminated pointer array over `strings`, valid while `strings` lives.
fn pointer_array(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Parent half of a freshly forked child
#[derive(Debug)]
pub struct ChildHandle {
    /// Child PID, also its process group
    pub pid: Pid,
    /// Non-blocking pty master
    pub master: File,
}

/// Allocates a pty, forks, and execs `request` on the slave side.
///
/// The child leads a new session with the pty as controlling terminal, so signalling
/// `-pid` reaches everything it starts.
pub fn spawn_on_pty(request: &SpawnRequest) -> Result<ChildHandle> {
    let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_CLOEXEC)?;
    grantpt(&master)?;
    unlockpt(&master)?;
    let slave = c_string(ptsname_r(&master)?.as_bytes())?;
    let argv = pointer_array(&request.argv);
    let envp = pointer_array(&request.envp);

    // SAFETY: the child half only makes system calls on data prepared above, then
    // execs or _exits.
    match unsafe { fork() }? {
        ForkResult::Child => exec_child(request, &slave, &argv, &envp),
        ForkResult::Parent { child } => {
            let fd = master.into_raw_fd();
            // SAFETY: ownership of the descriptor moves from the PtyMaster to the File.
            let master = unsafe { File::from_raw_fd(fd) };
            let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
            fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
            debug!(pid = child.as_raw(), slave = ?slave, "Forked child");
            Ok(ChildHandle { pid: child, master })
        }
    }
}

fn fail(step: &[u8], errno: Errno) -> ! {
    let desc = errno.desc().as_bytes();
    // SAFETY: plain writes of borrowed buffers followed by _exit.
    unsafe {
        libc::write(2, step.as_ptr().cast(), step.len());
        libc::write(2, desc.as_ptr().cast(), desc.len());
        libc::write(2, b"\r\n".as_ptr().cast(), 2);
        libc::_exit(127)
    }
}

fn exec_child(
    request: &SpawnRequest,
    slave: &CString,
    argv: &[*const c_char],
    envp: &[*const c_char],
) -> ! {
    // SAFETY: restoring default dispositions in the freshly forked child.
    unsafe {
        let _ = signal(Signal::SIGPIPE, SigHandler::SigDfl);
    }
    let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);

    if let Err(errno) = setsid() {
        fail(b"procserv: setsid: ", errno);
    }
    let fd: RawFd = match nix::fcntl::open(slave.as_c_str(), OFlag::O_RDWR, Mode::empty()) {
        Ok(fd) => fd,
        Err(errno) => fail(b"procserv: open pty: ", errno),
    };
    // SAFETY: fd is a terminal we just opened.
    unsafe {
        libc::ioctl(fd, libc::TIOCSCTTY as _, 0);
    }
    for target in 0..=2 {
        if let Err(errno) = dup2(fd, target) {
            fail(b"procserv: dup2: ", errno);
        }
    }
    if fd > 2 {
        let _ = close(fd);
    }
    if let Some(limit) = request.core_limit {
        if let Err(errno) = setrlimit(Resource::RLIMIT_CORE, limit, limit) {
            fail(b"procserv: setrlimit: ", errno);
        }
    }
    if let Some(dir) = &request.chdir {
        if let Err(errno) = chdir(dir.as_c_str()) {
            fail(b"procserv: chdir: ", errno);
        }
    }
    // SAFETY: both arrays are null-terminated and point into strings owned by `request`.
    unsafe {
        libc::execve(request.path.as_ptr(), argv.as_ptr(), envp.as_ptr());
    }
    fail(b"procserv: exec: ", Errno::last())
}
