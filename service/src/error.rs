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

//! Error types for the process server

use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, ProcServError>;

/// Process server error types
#[derive(Debug, Error)]
pub enum ProcServError {
    /// I/O error from a socket, terminal or file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A listening endpoint could not be bound
    #[error("Cannot bind {endpoint}: {source}")]
    Bind {
        /// Endpoint that failed, as written in the configuration
        endpoint: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Endpoint string could not be parsed
    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Timestamp format contains an invalid strftime specifier
    #[error("Invalid timestamp format '{0}'")]
    InvalidTimestampFormat(String),

    /// Socket owner does not exist
    #[error("Unknown user '{0}'")]
    UnknownUser(String),

    /// Socket group does not exist
    #[error("Unknown group '{0}'")]
    UnknownGroup(String),

    /// Pseudo-terminal allocation, fork or signal delivery failed
    #[error("System call failed: {0}")]
    Sys(#[from] nix::Error),
}

impl ProcServError {
    /// Process exit code to use when this error aborts the server.
    ///
    /// Bind failures exit with the OS error number so launchers can tell an address
    /// conflict from other failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcServError::Bind { source, .. } => source.raw_os_error().unwrap_or(1),
            ProcServError::Io(err) => err.raw_os_error().unwrap_or(1),
            ProcServError::Sys(errno) => *errno as i32,
            _ => 1,
        }
    }

    /// Check if the error comes from a malformed configuration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ProcServError::InvalidEndpoint(_)
                | ProcServError::Config(_)
                | ProcServError::InvalidTimestampFormat(_)
                | ProcServError::UnknownUser(_)
                | ProcServError::UnknownGroup(_)
        )
    }

    /// Check if the error is a bind failure
    pub fn is_bind_error(&self) -> bool {
        matches!(self, ProcServError::Bind { .. })
    }
}
