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

//! Benchmarks for the telnet negotiator

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use procserv_telnetcodec::{TelnetNegotiator, consts};
use tokio_util::codec::Decoder;

// ============================================================================
// Payload Builders
// ============================================================================

fn plain_payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| b' ' + (i % 94) as u8).collect()
}

fn negotiation_heavy_payload(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(b"status\r\n");
        data.extend_from_slice(&[consts::IAC, consts::WILL, consts::option::NAWS]);
        data.extend_from_slice(&[
            consts::IAC,
            consts::SB,
            consts::option::NAWS,
            0,
            80,
            0,
            24,
            consts::IAC,
            consts::SE,
        ]);
    }
    data.truncate(size);
    data
}

// ============================================================================
// On-Receive Benchmarks
// ============================================================================

fn bench_on_receive(c: &mut Criterion) {
    let mut group = c.benchmark_group("on_receive");

    for size in [64, 1024, 16384] {
        group.throughput(Throughput::Bytes(size as u64));

        let plain = plain_payload(size);
        group.bench_with_input(BenchmarkId::new("plain", size), &plain, |b, data| {
            let mut negotiator = TelnetNegotiator::default();
            let mut buf = data.clone();
            b.iter(|| {
                buf.copy_from_slice(data);
                black_box(negotiator.on_receive(black_box(&mut buf)));
            });
        });

        let mixed = negotiation_heavy_payload(size);
        group.bench_with_input(BenchmarkId::new("negotiation", size), &mixed, |b, data| {
            let mut negotiator = TelnetNegotiator::default();
            let mut buf = data.clone();
            b.iter(|| {
                buf.copy_from_slice(data);
                black_box(negotiator.on_receive(black_box(&mut buf)));
            });
        });
    }

    group.finish();
}

fn bench_decoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoder");
    let data = negotiation_heavy_payload(4096);
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("chunk_4k", |b| {
        let mut negotiator = TelnetNegotiator::default();
        let mut src = BytesMut::with_capacity(data.len());
        b.iter(|| {
            src.extend_from_slice(&data);
            while let Ok(Some(chunk)) = negotiator.decode(&mut src) {
                black_box(chunk);
            }
        });
    });

    group.finish();
}

criterion_group!(negotiator_benches, bench_on_receive, bench_decoder);

criterion_main!(negotiator_benches);
