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

//! Party-line delivery rule across arbitrary connection sets

use procserv_service::{BroadcastRouter, ConnectionId, LogSink, RouteTarget, Sender};
use proptest::prelude::*;

#[derive(Debug)]
struct FakeConnection {
    id: ConnectionId,
    process: bool,
    dead: bool,
    received: Vec<u8>,
}

impl RouteTarget for FakeConnection {
    fn is_process(&self) -> bool {
        self.process
    }

    fn is_dead(&self) -> bool {
        self.dead
    }

    fn deliver(&mut self, data: &[u8]) {
        self.received.extend_from_slice(data);
    }
}

fn connections(layout: &[(bool, bool)]) -> Vec<FakeConnection> {
    layout
        .iter()
        .enumerate()
        .map(|(i, &(process, dead))| FakeConnection {
            id: ConnectionId::new(i as u64 + 1),
            process,
            dead,
            received: Vec::new(),
        })
        .collect()
}

fn sender(choice: usize, targets: &[FakeConnection]) -> Sender {
    match choice % (targets.len() + 2) {
        0 => Sender::System,
        1 => Sender::Process,
        n => Sender::Client(targets[n - 2].id),
    }
}

proptest! {
    #[test]
    fn client_input_reaches_only_the_process(
        layout in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..12),
        choice in any::<usize>(),
        message in proptest::collection::vec(any::<u8>(), 1..64),
    ) {
        let mut targets = connections(&layout);
        let from = sender(choice, &targets);
        let mut log = LogSink::disabled();
        let delivered = BroadcastRouter::new(&mut log).route(targets.iter_mut(), &message, from);

        let mut expected = 0;
        for target in &targets {
            let wanted = !target.dead && match from {
                Sender::Client(_) => target.process,
                Sender::System | Sender::Process => !target.process,
            };
            if wanted {
                expected += 1;
                prop_assert_eq!(&target.received, &message);
            } else {
                prop_assert!(target.received.is_empty());
            }
        }
        prop_assert_eq!(delivered, expected);
    }
}

#[test]
fn empty_messages_are_not_delivered() {
    let mut targets = connections(&[(true, false), (false, false)]);
    let mut log = LogSink::disabled();
    let delivered = BroadcastRouter::new(&mut log).route(targets.iter_mut(), b"", Sender::System);
    assert_eq!(delivered, 0);
}
