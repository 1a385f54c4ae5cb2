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

//! Detaching from the terminal, PID and info files

use crate::error::LaunchResult;
use nix::fcntl::{OFlag, open};
use nix::sys::stat::Mode;
use nix::unistd::{ForkResult, dup2, fork, setsid};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Forks into the background and starts a new session.
///
/// The parent exits at once; the child returns with its standard streams on
/// `/dev/null`. Must run before any runtime threads exist.
pub fn daemonize() -> LaunchResult<()> {
    // SAFETY: called while the process is still single threaded.
    match unsafe { fork() }? {
        ForkResult::Parent { child } => {
            debug!(pid = child.as_raw(), "Detached");
            std::process::exit(0);
        }
        ForkResult::Child => {}
    }
    setsid()?;
    let null = open("/dev/null", OFlag::O_RDWR, Mode::empty())?;
    for fd in 0..=2 {
        dup2(null, fd)?;
    }
    if null > 2 {
        nix::unistd::close(null)?;
    }
    Ok(())
}

fn write_atomically(path: &Path, contents: &str) -> LaunchResult<()> {
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Writes this process's PID followed by a newline.
pub fn write_pid_file(path: &Path) -> LaunchResult<()> {
    write_atomically(path, &format!("{}\n", std::process::id()))
}

/// Writes the discovery line followed by a newline.
pub fn write_info_file(path: &Path, info: &str) -> LaunchResult<()> {
    write_atomically(path, &format!("{info}\n"))
}
