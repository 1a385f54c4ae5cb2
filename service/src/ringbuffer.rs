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

//! Bounded byte ring that drops whole lines on overflow

use std::fmt;

/// Fixed-capacity log ring buffer
///
/// Writes never block and never grow the buffer. When new data does not fit, the oldest
/// buffered lines are discarded to make room, and each discarded newline is counted. The
/// next [`read`](LogRingBuffer::read) reports the count with a one-line notice before the
/// remaining data.
///
/// The readable data always starts at the beginning of a line, or at the very first byte
/// ever written when nothing has been dropped yet.
pub struct LogRingBuffer {
    buf: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    len: usize,
    skipped_lines: usize,
    // The last skip ended inside a line whose tail has not arrived yet.
    broken_line: bool,
}

impl LogRingBuffer {
    /// Creates an empty buffer holding at most `capacity` bytes (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            len: 0,
            skipped_lines: 0,
            broken_line: false,
        }
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Buffered, unread bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Free space in bytes
    pub fn writable(&self) -> usize {
        self.capacity() - self.len
    }

    /// Lines dropped since the last read
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Text emitted ahead of the data after `count` lines were dropped.
    pub fn overflow_notice(count: usize) -> String {
        format!("\r\n[ procserv: {count} lines missing due to log buffer overflow ]\r\n")
    }

    /// Appends `data`, discarding the oldest whole lines if it does not fit.
    pub fn write(&mut self, data: &[u8]) {
        let mut data = data;
        if self.broken_line {
            data = self.drop_broken_line(data);
        }
        if data.len() > self.capacity() {
            data = self.keep_newest_lines(data);
        }
        if data.len() > self.writable() {
            self.skip_at_least(data.len() - self.writable());
            if self.broken_line {
                data = self.drop_broken_line(data);
            }
        }
        debug_assert!(data.len() <= self.writable());

        let mut done = 0;
        while done < data.len() {
            let contiguous = self.capacity() - self.write_pos;
            let n = contiguous.min(data.len() - done);
            self.buf[self.write_pos..self.write_pos + n].copy_from_slice(&data[done..done + n]);
            self.write_pos = (self.write_pos + n) % self.capacity();
            self.len += n;
            done += n;
        }
        debug_assert_eq!(self.writable() + self.len(), self.capacity());
    }

    /// Copies up to `out.len()` bytes into `out` and returns the count.
    ///
    /// If lines were dropped since the previous read, the overflow notice is produced
    /// first, trimmed to fit `out`.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut written = 0;
        if self.skipped_lines > 0 {
            let notice = Self::overflow_notice(self.skipped_lines);
            let n = notice.len().min(out.len());
            out[..n].copy_from_slice(&notice.as_bytes()[..n]);
            written = n;
            self.skipped_lines = 0;
        }
        while written < out.len() && self.len > 0 {
            let n = self.contiguous_readable().min(out.len() - written);
            out[written..written + n].copy_from_slice(&self.buf[self.read_pos..self.read_pos + n]);
            self.consume(n);
            written += n;
        }
        written
    }

    /// Discards at least `n` buffered bytes, then the rest of the line they end in.
    ///
    /// Stops right after a newline, or when the buffer runs empty. Every discarded newline
    /// is counted. Returns the number of bytes discarded.
    pub fn skip_at_least(&mut self, n: usize) -> usize {
        if n == 0 || self.len == 0 {
            return 0;
        }
        let target = n.min(self.len);
        let mut skipped = 0;
        let mut last = b'\n';
        while skipped < target {
            let chunk = self.contiguous_readable().min(target - skipped);
            let slice = &self.buf[self.read_pos..self.read_pos + chunk];
            self.skipped_lines += count_newlines(slice);
            last = slice[chunk - 1];
            self.consume(chunk);
            skipped += chunk;
        }
        if last == b'\n' {
            return skipped;
        }
        while self.len > 0 {
            let chunk = self.contiguous_readable();
            let slice = &self.buf[self.read_pos..self.read_pos + chunk];
            if let Some(i) = slice.iter().position(|b| *b == b'\n') {
                self.skipped_lines += 1;
                self.consume(i + 1);
                return skipped + i + 1;
            }
            self.consume(chunk);
            skipped += chunk;
        }
        self.broken_line = true;
        skipped
    }

    fn contiguous_readable(&self) -> usize {
        (self.capacity() - self.read_pos).min(self.len)
    }

    fn consume(&mut self, n: usize) {
        self.read_pos = (self.read_pos + n) % self.capacity();
        self.len -= n;
    }

    /// Drops incoming bytes up to and including the newline ending an interrupted line.
    fn drop_broken_line<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        match data.iter().position(|b| *b == b'\n') {
            Some(i) => {
                self.skipped_lines += 1;
                self.broken_line = false;
                &data[i + 1..]
            }
            None => &[],
        }
    }

    /// Empties the buffer and keeps only the newest whole lines of an oversized write.
    fn keep_newest_lines<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        self.skip_at_least(self.len);
        let from = data.len() - self.capacity() - 1;
        match data[from..].iter().position(|b| *b == b'\n') {
            Some(i) => {
                let cut = from + i + 1;
                self.skipped_lines += count_newlines(&data[..cut]);
                self.broken_line = false;
                &data[cut..]
            }
            None => {
                self.skipped_lines += count_newlines(data);
                self.broken_line = true;
                &[]
            }
        }
    }
}

fn count_newlines(data: &[u8]) -> usize {
    data.iter().filter(|b| **b == b'\n').count()
}

impl fmt::Debug for LogRingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("read_pos", &self.read_pos)
            .field("write_pos", &self.write_pos)
            .field("skipped_lines", &self.skipped_lines)
            .finish()
    }
}
