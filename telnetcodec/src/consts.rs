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

//! Telnet protocol byte values (RFC 854) and option codes (IANA registry)

/// Interpret As Command
pub const IAC: u8 = 255;
/// Refuse to perform, or continue performing, the indicated option
pub const DONT: u8 = 254;
/// Request the other party perform the indicated option
pub const DO: u8 = 253;
/// Refuse to perform the indicated option
pub const WONT: u8 = 252;
/// Desire to begin performing the indicated option
pub const WILL: u8 = 251;
/// Start of subnegotiation
pub const SB: u8 = 250;
/// Go Ahead
pub const GA: u8 = 249;
/// Erase Line
pub const EL: u8 = 248;
/// Erase Character
pub const EC: u8 = 247;
/// Are You There
pub const AYT: u8 = 246;
/// Abort Output
pub const AO: u8 = 245;
/// Interrupt Process
pub const IP: u8 = 244;
/// Break
pub const BRK: u8 = 243;
/// Data Mark
pub const DM: u8 = 242;
/// No Operation
pub const NOP: u8 = 241;
/// End of subnegotiation
pub const SE: u8 = 240;

/// Carriage Return
pub const CR: u8 = b'\r';
/// Line Feed
pub const LF: u8 = b'\n';

/// Number of option codes tracked by the negotiator. Codes at or above this
/// value are parsed and discarded without touching any stance table.
pub const NTELOPTS: usize = 40;

/// Maximum number of subnegotiation payload bytes kept per option.
pub const SUBNEG_CAPACITY: usize = 32;

/// Option codes
pub mod option {
    /// Binary Transmission
    pub const BINARY: u8 = 0;
    /// Echo
    pub const ECHO: u8 = 1;
    /// Reconnection
    pub const RCP: u8 = 2;
    /// Suppress Go Ahead
    pub const SGA: u8 = 3;
    /// Approx Message Size Negotiation
    pub const NAMS: u8 = 4;
    /// Status
    pub const STATUS: u8 = 5;
    /// Timing Mark
    pub const TM: u8 = 6;
    /// Remote Controlled Transmission and Echo
    pub const RCTE: u8 = 7;
    /// Output Line Width
    pub const NAOL: u8 = 8;
    /// Output Page Size
    pub const NAOP: u8 = 9;
    /// Output Carriage-Return Disposition
    pub const NAOCRD: u8 = 10;
    /// Output Horizontal Tab Stops
    pub const NAOHTS: u8 = 11;
    /// Output Horizontal Tab Disposition
    pub const NAOHTD: u8 = 12;
    /// Output Formfeed Disposition
    pub const NAOFFD: u8 = 13;
    /// Output Vertical Tabstops
    pub const NAOVTS: u8 = 14;
    /// Output Vertical Tab Disposition
    pub const NAOVTD: u8 = 15;
    /// Output Linefeed Disposition
    pub const NAOLFD: u8 = 16;
    /// Extended ASCII
    pub const XASCII: u8 = 17;
    /// Logout
    pub const LOGOUT: u8 = 18;
    /// Byte Macro
    pub const BM: u8 = 19;
    /// Data Entry Terminal
    pub const DET: u8 = 20;
    /// SUPDUP
    pub const SUPDUP: u8 = 21;
    /// SUPDUP Output
    pub const SUPDUP_OUTPUT: u8 = 22;
    /// Send Location
    pub const SNDLOC: u8 = 23;
    /// Terminal Type
    pub const TTYPE: u8 = 24;
    /// End of Record
    pub const EOR: u8 = 25;
    /// TACACS User Identification
    pub const TUID: u8 = 26;
    /// Output Marking
    pub const OUTMRK: u8 = 27;
    /// Terminal Location Number
    pub const TTYLOC: u8 = 28;
    /// Telnet 3270 Regime
    pub const OPT3270REGIME: u8 = 29;
    /// X.3 PAD
    pub const X3PAD: u8 = 30;
    /// Negotiate About Window Size
    pub const NAWS: u8 = 31;
    /// Terminal Speed
    pub const TSPEED: u8 = 32;
    /// Remote Flow Control
    pub const LFLOW: u8 = 33;
    /// Linemode
    pub const LINEMODE: u8 = 34;
    /// X Display Location
    pub const XDISPLOC: u8 = 35;
    /// Environment Option
    pub const OLD_ENVIRONMENT: u8 = 36;
    /// Authentication Option
    pub const AUTHENTICATION: u8 = 37;
    /// Encryption Option
    pub const ENCRYPTION: u8 = 38;
    /// New Environment Option
    pub const NEW_ENVIRONMENT: u8 = 39;
}
