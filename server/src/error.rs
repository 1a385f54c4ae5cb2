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

//! Startup errors

use procserv_service::ProcServError;
use thiserror::Error;

/// Result alias for startup steps
pub type LaunchResult<T> = std::result::Result<T, LaunchError>;

/// Anything that stops the server from starting
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration, binding or event loop failure
    #[error(transparent)]
    Service(#[from] ProcServError),

    /// Writing PID or info files, building the runtime
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Forking or detaching
    #[error("System error: {0}")]
    Sys(#[from] nix::Error),
}

impl LaunchError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::Service(err) => err.exit_code(),
            LaunchError::Io(err) => err.raw_os_error().unwrap_or(1),
            LaunchError::Sys(errno) => *errno as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let bind = LaunchError::from(ProcServError::Bind {
            endpoint: "4051".to_string(),
            source: std::io::Error::from_raw_os_error(nix::libc::EADDRINUSE),
        });
        assert_eq!(bind.exit_code(), nix::libc::EADDRINUSE);
        assert!(bind.to_string().contains("4051"));
        assert_eq!(LaunchError::from(nix::Error::EPERM).exit_code(), nix::libc::EPERM);
        let config = LaunchError::from(ProcServError::Config("bad".to_string()));
        assert_eq!(config.exit_code(), 1);
    }
}
