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

//! Log output: timestamping, ring buffering and non-blocking drain

use crate::config::{LogDestination, TimestampFormat};
use crate::ringbuffer::LogRingBuffer;
use crate::Result;
use bytes::{Buf, BytesMut};
use chrono::Local;
use metrics::counter;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DRAIN_CHUNK: usize = 4096;

enum LogTarget {
    File { path: PathBuf, file: File },
    /// Standard output, duplicated and switched to non-blocking writes. The flag lives
    /// on the shared open file, so fd 1 itself becomes non-blocking too.
    Stream { name: &'static str, file: File },
}

impl LogTarget {
    fn open(destination: &LogDestination) -> io::Result<Self> {
        match destination {
            LogDestination::Stdout => Ok(LogTarget::Stream {
                name: "stdout",
                file: nonblocking_dup(io::stdout().as_fd())?,
            }),
            LogDestination::File(path) => Ok(LogTarget::File {
                path: path.clone(),
                file: open_log_file(path)?,
            }),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            LogTarget::File { file, .. } | LogTarget::Stream { file, .. } => file.write(data),
        }
    }
}

fn nonblocking_dup(fd: BorrowedFd<'_>) -> io::Result<File> {
    let owned = fd.try_clone_to_owned()?;
    let raw = owned.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(File::from(owned))
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .custom_flags(nix::libc::O_NONBLOCK)
        .open(path)
}

/// Destination for everything broadcast by the server or the child
///
/// Appended data goes into a [`LogRingBuffer`] first and is drained to the target by
/// [`flush`](LogSink::flush) without blocking, so a stalled log file never stalls the
/// party line. When the target falls behind, the ring drops the oldest whole lines.
///
/// With a timestamp format set, each physical line gets a `[<time>] ` prefix. Line
/// position is tracked across calls, so a line split over several messages is prefixed
/// once.
pub struct LogSink {
    target: Option<LogTarget>,
    ring: LogRingBuffer,
    pending: BytesMut,
    timestamp: Option<TimestampFormat>,
    at_line_start: bool,
}

impl LogSink {
    /// A sink that discards everything
    pub fn disabled() -> Self {
        Self {
            target: None,
            ring: LogRingBuffer::new(1),
            pending: BytesMut::new(),
            timestamp: None,
            at_line_start: true,
        }
    }

    /// Opens `destination` for appending.
    pub fn open(
        destination: &LogDestination,
        capacity: usize,
        timestamp: Option<TimestampFormat>,
    ) -> Result<Self> {
        let target = LogTarget::open(destination)?;
        info!(destination = ?destination, capacity, "Log output opened");
        Ok(Self::with_target(target, capacity, timestamp))
    }

    fn with_target(target: LogTarget, capacity: usize, timestamp: Option<TimestampFormat>) -> Self {
        Self {
            target: Some(target),
            ring: LogRingBuffer::new(capacity),
            pending: BytesMut::with_capacity(DRAIN_CHUNK),
            timestamp,
            at_line_start: true,
        }
    }

    /// True if output is written anywhere.
    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Bytes waiting to be written.
    pub fn backlog(&self) -> usize {
        self.ring.len() + self.pending.len()
    }

    /// Queues `data` for the log.
    pub fn append(&mut self, data: &[u8]) {
        if self.target.is_none() || data.is_empty() {
            return;
        }
        let Some(format) = &self.timestamp else {
            self.write_ring(data);
            return;
        };
        let stamp = format!("[{}] ", format.render(&Local::now()));
        let mut rest = data;
        while !rest.is_empty() {
            let end = rest
                .iter()
                .position(|b| *b == b'\n')
                .map_or(rest.len(), |i| i + 1);
            let (line, tail) = rest.split_at(end);
            if self.at_line_start {
                self.ring.write(stamp.as_bytes());
            }
            self.ring.write(line);
            self.at_line_start = line.ends_with(b"\n");
            rest = tail;
        }
        self.record_drops();
    }

    fn write_ring(&mut self, data: &[u8]) {
        self.ring.write(data);
        self.at_line_start = data.ends_with(b"\n");
        self.record_drops();
    }

    fn record_drops(&self) {
        let dropped = self.ring.skipped_lines();
        if dropped > 0 {
            debug!(dropped, "Log buffer overflow");
        }
    }

    /// Writes as much buffered output as the target accepts without blocking.
    pub fn flush(&mut self) {
        let Some(target) = self.target.as_mut() else {
            return;
        };
        loop {
            if self.pending.is_empty() {
                let dropped = self.ring.skipped_lines();
                let mut chunk = [0u8; DRAIN_CHUNK];
                let n = self.ring.read(&mut chunk);
                if n == 0 {
                    return;
                }
                if dropped > 0 {
                    counter!("procserv.log.lines_dropped").increment(dropped as u64);
                }
                self.pending.extend_from_slice(&chunk[..n]);
            }
            match target.write(&self.pending) {
                Ok(0) => return,
                Ok(n) => self.pending.advance(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(error = %err, "Log write failed, discarding {} bytes", self.pending.len());
                    self.pending.clear();
                    return;
                }
            }
        }
    }

    /// Closes and reopens a log file, for external rotation. Stdout is left alone.
    pub fn reopen(&mut self) -> Result<()> {
        if let Some(LogTarget::File { path, file }) = self.target.as_mut() {
            *file = open_log_file(path)?;
            info!(path = %path.display(), "Log file reopened");
        }
        Ok(())
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.target {
            None => "none".to_string(),
            Some(LogTarget::Stream { name, .. }) => name.to_string(),
            Some(LogTarget::File { path, .. }) => path.display().to_string(),
        };
        f.debug_struct("LogSink")
            .field("target", &target)
            .field("ring", &self.ring)
            .field("pending", &self.pending.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_sink(dir: &tempfile::TempDir, timestamp: Option<TimestampFormat>) -> (LogSink, PathBuf) {
        let path = dir.path().join("child.log");
        let sink = LogSink::open(&LogDestination::File(path.clone()), 1024, timestamp).unwrap();
        (sink, path)
    }

    #[test]
    fn test_disabled_sink_discards() {
        let mut sink = LogSink::disabled();
        sink.append(b"nothing\n");
        sink.flush();
        assert!(!sink.is_enabled());
        assert_eq!(sink.backlog(), 0);
    }

    #[test]
    fn test_append_and_flush() {
        let dir = tempfile::tempdir().unwrap();
        let (mut sink, path) = file_sink(&dir, None);
        sink.append(b"hello ");
        sink.append(b"world\n");
        assert_eq!(sink.backlog(), 12);
        sink.flush();
        assert_eq!(sink.backlog(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world\n");
    }

    #[test]
    fn test_timestamp_once_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let format = TimestampFormat::new("T").unwrap();
        let (mut sink, path) = file_sink(&dir, Some(format));
        sink.append(b"par");
        sink.append(b"tial\nnext\nla");
        sink.append(b"st\n");
        sink.flush();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[T] partial\n[T] next\n[T] last\n"
        );
    }

    #[test]
    fn test_reopen_after_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut sink, path) = file_sink(&dir, None);
        sink.append(b"before\n");
        sink.flush();
        let rotated = dir.path().join("child.log.1");
        std::fs::rename(&path, &rotated).unwrap();
        sink.reopen().unwrap();
        sink.append(b"after\n");
        sink.flush();
        assert_eq!(std::fs::read(&rotated).unwrap(), b"before\n");
        assert_eq!(std::fs::read(&path).unwrap(), b"after\n");
    }

    #[test]
    fn test_overflow_notice_reaches_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.log");
        let mut sink = LogSink::open(&LogDestination::File(path.clone()), 8, None).unwrap();
        sink.append(b"aaa\n");
        sink.append(b"bbb\n");
        sink.append(b"ccc\n");
        sink.flush();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("1 lines missing"));
        assert!(text.ends_with("bbb\nccc\n"));
    }

    #[test]
    fn test_full_pipe_does_not_block_flush() {
        use std::io::Read;

        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let target = LogTarget::Stream {
            name: "pipe",
            file: nonblocking_dup(write_end.as_fd()).unwrap(),
        };
        drop(write_end);
        let mut sink = LogSink::with_target(target, 1 << 20, None);
        let line = [b'x'; 99];
        for _ in 0..4096 {
            sink.append(&line);
            sink.append(b"\n");
        }
        sink.flush();
        let stalled = sink.backlog();
        assert!(stalled > 0);
        assert!(stalled < 4096 * 100);

        let mut reader = File::from(read_end);
        let mut buf = vec![0u8; 16 * 1024];
        let n = reader.read(&mut buf).unwrap();
        assert!(n > 0);
        sink.flush();
        assert!(sink.backlog() < stalled);
    }
}
