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

//! Property tests for the log ring buffer

use procserv_service::LogRingBuffer;
use proptest::prelude::*;

fn read_all(ring: &mut LogRingBuffer) -> Vec<u8> {
    let mut out = vec![0; ring.capacity() + 128];
    let n = ring.read(&mut out);
    out.truncate(n);
    out
}

fn line() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(b'a'..=b'z', 0..24).prop_map(|mut text| {
        text.push(b'\n');
        text
    })
}

/// Writes made of whole lines, grouped one to four lines per write.
fn line_writes() -> impl Strategy<Value = Vec<Vec<u8>>> {
    proptest::collection::vec(proptest::collection::vec(line(), 1..4), 0..40)
        .prop_map(|writes| writes.into_iter().map(|lines| lines.concat()).collect())
}

fn newlines(data: &[u8]) -> usize {
    data.iter().filter(|b| **b == b'\n').count()
}

proptest! {
    #[test]
    fn data_that_fits_reads_back_unchanged(
        capacity in 1usize..256,
        chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 0..16),
    ) {
        let mut ring = LogRingBuffer::new(capacity);
        let mut expected = Vec::new();
        for chunk in chunks {
            if expected.len() + chunk.len() > capacity {
                break;
            }
            ring.write(&chunk);
            expected.extend_from_slice(&chunk);
        }
        prop_assert_eq!(ring.skipped_lines(), 0);
        prop_assert_eq!(read_all(&mut ring), expected);
        prop_assert!(ring.is_empty());
    }

    #[test]
    fn overflow_drops_only_whole_oldest_lines(
        capacity in 1usize..96,
        writes in line_writes(),
    ) {
        let mut ring = LogRingBuffer::new(capacity);
        let mut stream = Vec::new();
        for data in &writes {
            ring.write(data);
            stream.extend_from_slice(data);
            prop_assert!(ring.len() <= capacity);
        }

        let skipped = ring.skipped_lines();
        let out = read_all(&mut ring);
        let kept = if skipped > 0 {
            let notice = LogRingBuffer::overflow_notice(skipped);
            prop_assert!(out.starts_with(notice.as_bytes()));
            &out[notice.len()..]
        } else {
            &out[..]
        };

        prop_assert!(stream.ends_with(kept));
        let start = stream.len() - kept.len();
        prop_assert!(start == 0 || stream[start - 1] == b'\n');
        prop_assert_eq!(skipped + newlines(kept), newlines(&stream));
    }

    #[test]
    fn skip_stops_after_a_newline(
        writes in line_writes(),
        n in 1usize..64,
    ) {
        let mut ring = LogRingBuffer::new(4096);
        let stream: Vec<u8> = writes.concat();
        ring.write(&stream);
        let before = ring.len();
        let skipped = ring.skip_at_least(n);
        prop_assert!(skipped >= n.min(before));
        prop_assert_eq!(ring.len(), before - skipped);
        if skipped > 0 {
            prop_assert_eq!(stream[skipped - 1], b'\n');
            prop_assert_eq!(ring.skipped_lines(), newlines(&stream[..skipped]));
        }
    }
}

#[test]
fn notice_is_reported_once() {
    let mut ring = LogRingBuffer::new(8);
    ring.write(b"one\n");
    ring.write(b"two\n");
    ring.write(b"three\n");
    assert_eq!(ring.skipped_lines(), 2);

    let first = read_all(&mut ring);
    let notice = LogRingBuffer::overflow_notice(2);
    assert_eq!(&first[..notice.len()], notice.as_bytes());
    assert_eq!(&first[notice.len()..], b"three\n");

    ring.write(b"four\n");
    assert_eq!(read_all(&mut ring), b"four\n");
}
