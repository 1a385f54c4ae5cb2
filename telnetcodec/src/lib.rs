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

//! # Procserv Telnet Negotiator
//!
//! This crate holds the telnet layer of the procserv party line. It does not implement a
//! full telnet option engine; it implements the minimal subset a line-oriented console
//! server needs:
//!
//! - **Framing removal**: every `IAC` command sequence is stripped from the inbound octet
//!   stream so the remaining bytes can be forwarded to a child process as plain data.
//! - **Stance tracking**: received `DO`/`DONT`/`WILL`/`WONT` verbs are recorded per option
//!   in two tables, one per direction.
//! - **Subnegotiation capture**: `IAC SB <option> ... IAC SE` payloads are kept in a
//!   bounded per-option buffer. Excess bytes are dropped and counted.
//! - **Initial announcement**: on attach the negotiator emits its configured stance
//!   (by default `DO LINEMODE` and `WILL ECHO`).
//!
//! ## Core Components
//!
//! ### [`TelnetNegotiator`]
//!
//! The per-connection state machine. [`TelnetNegotiator::on_receive`] cleans a buffer in
//! place and returns the payload length. The negotiator also implements
//! [`Decoder`](tokio_util::codec::Decoder), yielding cleaned chunks, and
//! [`Encoder<TelnetCommand>`](tokio_util::codec::Encoder) for outbound negotiation.
//!
//! ### [`TelnetCommand`] and [`TelnetOption`]
//!
//! Typed negotiation commands and option codes.
//!
//! ## Usage Example
//!
//! ```rust
//! use procserv_telnetcodec::{Stance, TelnetNegotiator, TelnetOption, consts};
//!
//! let mut negotiator = TelnetNegotiator::default();
//! let mut buf = vec![b'h', b'i', consts::IAC, consts::DONT, consts::option::ECHO];
//! let len = negotiator.on_receive(&mut buf);
//!
//! assert_eq!(&buf[..len], b"hi");
//! assert_eq!(negotiator.local_stance(TelnetOption::Echo), Stance::Dont);
//! ```
//!
//! ## Error Handling
//!
//! Malformed input is never an error: the parser returns to its idle state after every
//! complete or broken sequence. [`CodecError`] only carries I/O failures of a framed
//! transport.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

pub mod consts;
mod negotiator;
mod options;
mod result;

pub use self::negotiator::{DEFAULT_INITIAL_STANCE, NegotiatorState, TelnetNegotiator};
pub use self::options::{OptionTable, Stance, TelnetCommand, TelnetOption};
pub use self::result::{CodecError, CodecResult};
