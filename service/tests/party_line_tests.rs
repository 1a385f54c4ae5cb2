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

//! End-to-end tests: a real child on a pty, real sockets, the real loop

use procserv_service::{
    BoundListener, Endpoint, EventLoop, LogDestination, ProcServConfig, ProcServError,
    RestartMode,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};

const PATIENCE: Duration = Duration::from_secs(10);

fn loopback() -> Endpoint {
    "127.0.0.1:0".parse().unwrap()
}

fn serve(
    config: ProcServConfig,
    listeners: Vec<BoundListener>,
) -> JoinHandle<procserv_service::Result<()>> {
    tokio::spawn(async move { EventLoop::new(config, listeners)?.run().await })
}

fn start(config: ProcServConfig) -> (SocketAddr, JoinHandle<procserv_service::Result<()>>) {
    let control = BoundListener::bind(&loopback(), false, false).unwrap();
    let addr = control.local_addr().unwrap();
    (addr, serve(config, vec![control]))
}

/// Accumulates everything read from a client socket.
struct Transcript<S> {
    stream: S,
    text: String,
}

impl<S: AsyncRead + Unpin> Transcript<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            text: String::new(),
        }
    }

    /// Reads until `needle` appears after byte offset `from`; returns its end offset.
    async fn expect_after(&mut self, from: usize, needle: &str) -> usize {
        let found = timeout(PATIENCE, async {
            let mut buf = [0u8; 1024];
            loop {
                if let Some(at) = self.text[from.min(self.text.len())..].find(needle) {
                    return from + at + needle.len();
                }
                let n = self.stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed while waiting for {needle:?}: {}", self.text);
                self.text.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        })
        .await;
        match found {
            Ok(end) => end,
            Err(_) => panic!("timed out waiting for {needle:?}; saw {:?}", self.text),
        }
    }

    async fn expect(&mut self, needle: &str) -> usize {
        self.expect_after(0, needle).await
    }
}

async fn connect(addr: SocketAddr) -> Transcript<TcpStream> {
    Transcript::new(TcpStream::connect(addr).await.unwrap())
}

#[tokio::test]
async fn exiting_child_is_restarted_after_holdoff() {
    let config = ProcServConfig::new("/bin/sh", ["-c", "exit 3"])
        .with_child_name("quitter")
        .with_holdoff(Duration::from_secs(1));
    let (addr, server) = start(config);

    let mut client = connect(addr).await;
    client.expect("Welcome").await;
    let exit = client.expect("exit status = 3").await;
    let exit_seen = Instant::now();
    client
        .expect_after(exit, "@@@ The PID of new child \"quitter\" is:")
        .await;
    assert!(exit_seen.elapsed() <= Duration::from_millis(1500));
    assert!(client.text[exit..].contains("@@@ Restarting child \"quitter\""));

    server.abort();
}

#[tokio::test]
async fn child_output_reaches_every_client_and_logger_input_is_dropped() {
    let control = BoundListener::bind(&loopback(), false, false).unwrap();
    let logs = BoundListener::bind(&loopback(), false, true).unwrap();
    let (control_addr, log_addr) = (control.local_addr().unwrap(), logs.local_addr().unwrap());
    let server = serve(ProcServConfig::new("/bin/cat", Vec::<String>::new()), vec![control, logs]);

    let mut logger = connect(log_addr).await;
    logger.expect("read-only").await;
    let mut user = connect(control_addr).await;
    user.expect("Welcome").await;

    logger.stream.write_all(b"from-the-logger\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    user.stream.write_all(b"from-the-user\n").await.unwrap();

    user.expect("from-the-user").await;
    logger.expect("from-the-user").await;
    assert!(!logger.text.contains("from-the-logger"));
    assert!(!user.text.contains("from-the-logger"));

    server.abort();
}

#[tokio::test]
async fn kill_key_signals_the_child() {
    let config = ProcServConfig::new("sleep", ["30"]).with_holdoff(Duration::from_secs(30));
    let (addr, server) = start(config);

    let mut client = connect(addr).await;
    client.expect("PID:").await;
    client.stream.write_all(&[0x18]).await.unwrap();
    client.expect("Killing child \"sleep\" with signal SIGKILL").await;
    client.expect("killed by signal = 9").await;
    client.expect("Restarting child in").await;

    server.abort();
}

#[tokio::test]
async fn toggle_key_cycles_restart_mode() {
    let (addr, server) = start(ProcServConfig::new("/bin/cat", Vec::<String>::new()));

    let mut client = connect(addr).await;
    client.expect("Auto restart mode is ON").await;
    client.stream.write_all(&[0x14]).await.unwrap();
    let at = client.expect("Toggled auto restart mode to OFF").await;
    client.stream.write_all(&[0x14]).await.unwrap();
    client
        .expect_after(at, "Toggled auto restart mode to ONESHOT")
        .await;

    server.abort();
}

#[tokio::test]
async fn quit_key_stops_the_server() {
    let (addr, server) = start(ProcServConfig::new("/bin/cat", Vec::<String>::new()));

    let mut client = connect(addr).await;
    client.expect("Welcome").await;
    client.stream.write_all(&[0x11]).await.unwrap();
    client.expect("Got a shutdown command").await;

    let result = timeout(PATIENCE, server).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn one_shot_child_ends_the_server_and_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("child.log");
    let config = ProcServConfig::new("/bin/sh", ["-c", "echo logged-line"])
        .with_restart_mode(RestartMode::OneShot)
        .with_log_destination(LogDestination::File(log.clone()));
    let (_addr, server) = start(config);

    let result = timeout(PATIENCE, server).await.unwrap().unwrap();
    assert!(result.is_ok());

    let written = std::fs::read_to_string(&log).unwrap();
    assert!(written.contains("@@@ The PID of new child \"sh\" is:"));
    assert!(written.contains("logged-line"));
    assert!(written.contains("One-shot mode"));
}

#[tokio::test]
async fn manual_start_waits_for_restart_key() {
    let config = ProcServConfig::new("/bin/cat", Vec::<String>::new()).with_manual_start(true);
    let (addr, server) = start(config);

    let mut client = connect(addr).await;
    let at = client.expect("is not running").await;
    client.stream.write_all(&[0x12]).await.unwrap();
    client
        .expect_after(at, "@@@ The PID of new child \"cat\" is:")
        .await;

    server.abort();
}

#[tokio::test]
async fn unix_socket_control_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control.sock");
    let endpoint: Endpoint = format!("unix:{}", path.display()).parse().unwrap();
    let control = BoundListener::bind(&endpoint, false, false).unwrap();
    assert_eq!(control.local_endpoint(), format!("unix:{}", path.display()));
    let server = serve(ProcServConfig::new("/bin/cat", Vec::<String>::new()), vec![control]);

    let mut client = Transcript::new(UnixStream::connect(&path).await.unwrap());
    client.expect("Welcome").await;
    client.stream.write_all(&[0x11]).await.unwrap();
    timeout(PATIENCE, server).await.unwrap().unwrap().unwrap();
    assert!(!path.exists());
}

#[test]
fn bind_conflict_reports_os_error() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = Endpoint::Tcp(taken.local_addr().unwrap());
    let err = BoundListener::bind(&endpoint, false, false).unwrap_err();
    assert!(matches!(err, ProcServError::Bind { .. }));
    assert_eq!(err.exit_code(), nix::libc::EADDRINUSE);
}

#[test]
fn remote_endpoint_requires_permission() {
    let endpoint: Endpoint = "0.0.0.0:0".parse().unwrap();
    let err = BoundListener::bind(&endpoint, false, false).unwrap_err();
    assert!(err.is_config_error());
}
