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

//! Benchmarks for the log ring buffer

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use procserv_service::LogRingBuffer;

fn console_lines(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size + 64);
    let mut n = 0;
    while data.len() < size {
        data.extend_from_slice(format!("epics> dbpf ioc:record{n} 42\r\n").as_bytes());
        n += 1;
    }
    data.truncate(size);
    data
}

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_read");

    for size in [64, 1024, 16384] {
        group.throughput(Throughput::Bytes(size as u64));
        let data = console_lines(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            let mut ring = LogRingBuffer::new(64 * 1024);
            let mut out = vec![0u8; size + 128];
            b.iter(|| {
                ring.write(black_box(data));
                black_box(ring.read(&mut out));
            });
        });
    }

    group.finish();
}

fn bench_overflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("overflow");

    for capacity in [256, 4096] {
        let data = console_lines(1024);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &data, |b, data| {
            let mut ring = LogRingBuffer::new(capacity);
            b.iter(|| ring.write(black_box(data)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write_read, bench_overflow);
criterion_main!(benches);
