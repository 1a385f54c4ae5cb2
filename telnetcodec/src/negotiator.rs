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

//! Byte-at-a-time telnet negotiation parser.

use crate::consts;
use crate::options::{OptionTable, Stance, TelnetCommand, TelnetOption};
use crate::result::CodecError;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

/// Stance a fresh negotiator announces on attach: ask the peer for linemode and offer to
/// echo on its behalf.
pub const DEFAULT_INITIAL_STANCE: [TelnetCommand; 2] = [
    TelnetCommand::Do(TelnetOption::Linemode),
    TelnetCommand::Will(TelnetOption::Echo),
];

/// Parser position within a telnet command sequence.
///
/// The subnegotiation states carry the option code the payload belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NegotiatorState {
    /// Plain data
    Idle,
    /// After `IAC`
    SawIac,
    /// After `IAC DO`
    SawDo,
    /// After `IAC DONT`
    SawDont,
    /// After `IAC WILL`
    SawWill,
    /// After `IAC WONT`
    SawWont,
    /// After `IAC SB`
    SawSb,
    /// Collecting the payload of `IAC SB <option>`
    InSubnegData(u8),
    /// After the `IAC` that ends a subnegotiation payload
    SawSubnegIac(u8),
}

/// Per-connection telnet negotiator.
///
/// Strips every telnet command sequence from the inbound octet stream, records the
/// negotiation verbs it sees, and keeps a bounded copy of each subnegotiation payload.
/// Received `DO`/`DONT` land in the local table (what this side is asked to do) and
/// received `WILL`/`WONT` land in the remote table (what the peer offers).
///
/// Malformed input never fails: every sequence ends back in [`NegotiatorState::Idle`].
#[derive(Debug)]
pub struct TelnetNegotiator {
    state: NegotiatorState,
    local: OptionTable,
    remote: OptionTable,
    subneg: Vec<BytesMut>,
    truncated: usize,
}

impl Default for TelnetNegotiator {
    fn default() -> Self {
        TelnetNegotiator::new(&DEFAULT_INITIAL_STANCE)
    }
}

impl TelnetNegotiator {
    /// Creates a negotiator seeded with the stance it will announce on attach.
    ///
    /// `WILL`/`WONT` entries seed the local table, `DO`/`DONT` entries seed the remote
    /// table. Commands for untracked options are ignored.
    pub fn new(initial: &[TelnetCommand]) -> TelnetNegotiator {
        let mut local = OptionTable::default();
        let mut remote = OptionTable::default();
        for command in initial {
            let table = if command.is_peer_directed() {
                &mut remote
            } else {
                &mut local
            };
            table.set(command.option(), command.stance());
        }
        TelnetNegotiator {
            state: NegotiatorState::Idle,
            local,
            remote,
            subneg: (0..consts::NTELOPTS)
                .map(|_| BytesMut::with_capacity(consts::SUBNEG_CAPACITY))
                .collect(),
            truncated: 0,
        }
    }

    /// Current parser state.
    pub fn state(&self) -> NegotiatorState {
        self.state
    }

    /// Stance recorded for this side of `option`.
    pub fn local_stance(&self, option: TelnetOption) -> Stance {
        self.local.get(option)
    }

    /// Stance recorded for the peer's side of `option`.
    pub fn remote_stance(&self, option: TelnetOption) -> Stance {
        self.remote.get(option)
    }

    /// Last subnegotiation payload received for `option`, at most
    /// [`consts::SUBNEG_CAPACITY`] bytes.
    pub fn subnegotiation(&self, option: TelnetOption) -> &[u8] {
        self.subneg
            .get(usize::from(option.to_u8()))
            .map_or(&[][..], |payload| &payload[..])
    }

    /// Number of subnegotiation bytes dropped because a payload exceeded its cap.
    pub fn truncated_bytes(&self) -> usize {
        self.truncated
    }

    /// Writes the announcement for every option with a configured stance.
    ///
    /// Peer-directed requests (`DO`/`DONT`) go first, then this side's offers
    /// (`WILL`/`WONT`).
    pub fn initial_requests(&self, dst: &mut BytesMut) {
        let peer = self.remote.iter().filter_map(|(option, stance)| match stance {
            Stance::Do => Some(TelnetCommand::Do(option)),
            Stance::Dont => Some(TelnetCommand::Dont(option)),
            _ => None,
        });
        let mine = self.local.iter().filter_map(|(option, stance)| match stance {
            Stance::Will => Some(TelnetCommand::Will(option)),
            Stance::Wont => Some(TelnetCommand::Wont(option)),
            _ => None,
        });
        for command in peer.chain(mine) {
            trace!("SEND {}", command);
            command.encode_into(dst);
        }
    }

    /// Strips telnet framing from `buf` in place.
    ///
    /// Forwarded bytes are compacted to the front of `buf` and their count is returned.
    /// Bytes past the returned length are stale and must not be used.
    pub fn on_receive(&mut self, buf: &mut [u8]) -> usize {
        let mut kept = 0;
        let mut read = 0;
        while read < buf.len() {
            let byte = buf[read];
            if self.on_byte(byte) {
                buf[kept] = byte;
                kept += 1;
            }
            read += 1;
        }
        kept
    }

    /// Advances the parser by one byte, returning true if the byte is payload.
    fn on_byte(&mut self, byte: u8) -> bool {
        let mut forward = false;
        self.state = match (self.state, byte) {
            (NegotiatorState::Idle, consts::IAC) => NegotiatorState::SawIac,
            (NegotiatorState::Idle, _) => {
                forward = true;
                NegotiatorState::Idle
            }
            (NegotiatorState::SawIac, consts::DO) => NegotiatorState::SawDo,
            (NegotiatorState::SawIac, consts::DONT) => NegotiatorState::SawDont,
            (NegotiatorState::SawIac, consts::WILL) => NegotiatorState::SawWill,
            (NegotiatorState::SawIac, consts::WONT) => NegotiatorState::SawWont,
            (NegotiatorState::SawIac, consts::SB) => NegotiatorState::SawSb,
            (NegotiatorState::SawIac, command) => {
                trace!("RCVD IAC {command:#04X}, discarded");
                NegotiatorState::Idle
            }
            (NegotiatorState::SawDo, code) => {
                self.record(TelnetCommand::Do(TelnetOption::from_u8(code)));
                NegotiatorState::Idle
            }
            (NegotiatorState::SawDont, code) => {
                self.record(TelnetCommand::Dont(TelnetOption::from_u8(code)));
                NegotiatorState::Idle
            }
            (NegotiatorState::SawWill, code) => {
                self.record(TelnetCommand::Will(TelnetOption::from_u8(code)));
                NegotiatorState::Idle
            }
            (NegotiatorState::SawWont, code) => {
                self.record(TelnetCommand::Wont(TelnetOption::from_u8(code)));
                NegotiatorState::Idle
            }
            (NegotiatorState::SawSb, code) => {
                if let Some(payload) = self.subneg.get_mut(usize::from(code)) {
                    payload.clear();
                }
                NegotiatorState::InSubnegData(code)
            }
            (NegotiatorState::InSubnegData(code), consts::IAC) => {
                NegotiatorState::SawSubnegIac(code)
            }
            (NegotiatorState::InSubnegData(code), _) => {
                // Payloads of untracked options are parsed but not kept.
                if let Some(payload) = self.subneg.get_mut(usize::from(code)) {
                    if payload.len() < consts::SUBNEG_CAPACITY {
                        payload.put_u8(byte);
                    } else {
                        self.truncated += 1;
                    }
                }
                NegotiatorState::InSubnegData(code)
            }
            (NegotiatorState::SawSubnegIac(code), end) => {
                let option = TelnetOption::from_u8(code);
                if end != consts::SE {
                    debug!("Subnegotiation for {option} ended by {end:#04X} instead of SE");
                }
                trace!("RCVD SB {} ({} bytes)", option, self.subnegotiation(option).len());
                NegotiatorState::Idle
            }
        };
        forward
    }

    fn record(&mut self, command: TelnetCommand) {
        trace!("RCVD {}", command);
        let table = if command.is_peer_directed() {
            &mut self.local
        } else {
            &mut self.remote
        };
        table.set(command.option(), command.stance());
    }
}

impl Decoder for TelnetNegotiator {
    type Item = BytesMut;
    type Error = CodecError;

    /// Yields each chunk of payload left after stripping framing.
    ///
    /// Consumes everything buffered in `src`; returns `Ok(None)` when the chunk held
    /// nothing but telnet commands.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, CodecError> {
        if src.is_empty() {
            return Ok(None);
        }
        let mut chunk = src.split();
        let kept = self.on_receive(&mut chunk);
        chunk.truncate(kept);
        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}

impl Encoder<TelnetCommand> for TelnetNegotiator {
    type Error = CodecError;

    /// Encodes a negotiation command and records it as the stance sent.
    fn encode(&mut self, item: TelnetCommand, dst: &mut BytesMut) -> Result<(), CodecError> {
        let table = if item.is_peer_directed() {
            &mut self.remote
        } else {
            &mut self.local
        };
        table.set(item.option(), item.stance());
        item.encode_into(dst);
        Ok(())
    }
}
