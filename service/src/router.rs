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

//! Party-line routing policy

use crate::logsink::LogSink;
use crate::types::Sender;
use tracing::trace;

/// Anything a message can be routed to
pub trait RouteTarget {
    /// True for the child's terminal
    fn is_process(&self) -> bool;

    /// True once the target is waiting to be reaped
    fn is_dead(&self) -> bool;

    /// Delivers `data`. Failures are the target's own business.
    fn deliver(&mut self, data: &[u8]);
}

/// Delivery rule for one target.
///
/// The child only hears what clients type. Everyone else only hears the child and the
/// server itself, so a client's keystrokes are never echoed to other clients by routing.
pub fn should_deliver(target_is_process: bool, sender: Sender) -> bool {
    if target_is_process {
        matches!(sender, Sender::Client(_))
    } else {
        sender.is_broadcast()
    }
}

/// Fans a message out across the live connection set
///
/// Holds no state of its own; it borrows the targets and the log sink for one call.
pub struct BroadcastRouter<'a> {
    log: &'a mut LogSink,
}

impl<'a> BroadcastRouter<'a> {
    /// Routes through `log`.
    pub fn new(log: &'a mut LogSink) -> Self {
        Self { log }
    }

    /// Delivers `message` from `sender` to every live target the rule selects, and logs
    /// it when it comes from the server or the child. Returns the number of deliveries.
    pub fn route<'t, T, I>(&mut self, targets: I, message: &[u8], sender: Sender) -> usize
    where
        T: RouteTarget + ?Sized + 't,
        I: IntoIterator<Item = &'t mut T>,
    {
        if message.is_empty() {
            return 0;
        }
        let mut delivered = 0;
        for target in targets {
            if !target.is_dead() && should_deliver(target.is_process(), sender) {
                target.deliver(message);
                delivered += 1;
            }
        }
        if sender.is_broadcast() {
            self.log.append(message);
        }
        trace!(%sender, bytes = message.len(), delivered, "Routed message");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionId;

    #[derive(Default)]
    struct Probe {
        process: bool,
        dead: bool,
        received: Vec<u8>,
    }

    impl RouteTarget for Probe {
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

    #[test]
    fn test_delivery_rule() {
        let client = Sender::Client(ConnectionId::new(3));
        assert!(should_deliver(true, client));
        assert!(!should_deliver(true, Sender::Process));
        assert!(!should_deliver(true, Sender::System));
        assert!(!should_deliver(false, client));
        assert!(should_deliver(false, Sender::Process));
        assert!(should_deliver(false, Sender::System));
    }

    #[test]
    fn test_dead_targets_skipped() {
        let mut log = LogSink::disabled();
        let mut targets = vec![
            Probe::default(),
            Probe {
                dead: true,
                ..Probe::default()
            },
        ];
        let delivered = BroadcastRouter::new(&mut log).route(&mut targets, b"x", Sender::System);
        assert_eq!(delivered, 1);
        assert_eq!(targets[0].received, b"x");
        assert!(targets[1].received.is_empty());
    }

    #[test]
    fn test_empty_message_not_routed() {
        let mut log = LogSink::disabled();
        let mut targets = vec![Probe::default()];
        assert_eq!(
            BroadcastRouter::new(&mut log).route(&mut targets, b"", Sender::Process),
            0
        );
    }
}
