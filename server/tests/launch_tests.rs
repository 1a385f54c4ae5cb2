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

use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};

fn procserv() -> Command {
    Command::new(env!("CARGO_BIN_EXE_procserv"))
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            panic!("procserv did not exit within {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn first_line(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.lines().next().map(str::to_string))
}

#[test]
fn oneshot_exits_and_removes_its_files() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("procserv.pid");
    let infofile = dir.path().join("procserv.info");
    let mut child = procserv()
        .args(["--foreground", "--oneshot", "--quiet", "--holdoff", "0"])
        .arg("--pidfile")
        .arg(&pidfile)
        .arg("--info-file")
        .arg(&infofile)
        .args(["0", "sleep", "1"])
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let info = loop {
        if let Some(line) = first_line(&infofile) {
            break line;
        }
        assert!(Instant::now() < deadline, "info file never appeared");
        std::thread::sleep(Duration::from_millis(20));
    };
    assert!(info.starts_with(&format!("pid:{} tcp:127.0.0.1:", child.id())));
    assert_eq!(first_line(&pidfile), Some(child.id().to_string()));

    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert!(status.success());
    assert!(!pidfile.exists());
    assert!(!infofile.exists());
}

#[test]
fn address_conflict_sets_exit_status() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let mut child = procserv()
        .args(["--foreground", "--quiet", &port.to_string(), "true"])
        .spawn()
        .unwrap();
    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert_eq!(status.code(), Some(nix::libc::EADDRINUSE));
}

#[test]
fn missing_command_is_a_usage_error() {
    let output = procserv().arg("4051").output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}
