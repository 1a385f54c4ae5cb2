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

//! procserv: run a program on a pseudo-terminal and share its console

mod cli;
mod daemon;
mod error;

use crate::cli::Cli;
use crate::error::{LaunchError, LaunchResult};
use clap::Parser;
use procserv_service::{BoundListener, EventLoop};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match launch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("procserv: {err}");
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

fn launch(cli: &Cli) -> LaunchResult<()> {
    let mut config = cli.to_config();
    config.validate()?;

    // Bind before detaching so address conflicts reach the caller's terminal.
    let mut listeners = vec![BoundListener::bind(&config.control, config.allow_remote, false)?];
    if let Some(endpoint) = &config.log_endpoint {
        listeners.push(BoundListener::bind(endpoint, config.allow_remote, true)?);
    }

    if !cli.foreground {
        daemon::daemonize()?;
    }

    if let Some(path) = &cli.pidfile {
        daemon::write_pid_file(path)?;
        config = config.with_cleanup_file(path.clone());
    }
    if let Some(path) = &cli.info_file {
        config = config.with_cleanup_file(path.clone());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let event_loop = EventLoop::new(config, listeners)?;
        let info = event_loop.info_line();
        info!(%info, "Server ready");
        if let Some(path) = &cli.info_file {
            daemon::write_info_file(path, &info)?;
        }
        event_loop.run().await?;
        Ok::<(), LaunchError>(())
    })
}
