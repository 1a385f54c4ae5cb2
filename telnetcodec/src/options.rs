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

use crate::consts;
use bytes::{BufMut, BytesMut};
use std::fmt;

///
/// Telnet option codes the negotiator knows by name.
///
/// Any code outside this list is carried as [`TelnetOption::Unknown`]; only codes below
/// [`consts::NTELOPTS`] have stance table entries.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TelnetOption {
    /// [`consts::option::BINARY`] Binary Transmission (RFC 856)
    TransmitBinary,
    /// [`consts::option::ECHO`] Echo (RFC 857)
    Echo,
    /// [`consts::option::SGA`] Suppress Go Ahead (RFC 858)
    SuppressGoAhead,
    /// [`consts::option::STATUS`] Status (RFC 859)
    Status,
    /// [`consts::option::TM`] Timing Mark (RFC 860)
    TimingMark,
    /// [`consts::option::NAOCRD`] Output Carriage-Return Disposition (RFC 652)
    NAOCRD,
    /// [`consts::option::TTYPE`] Terminal Type (RFC 1091)
    TerminalType,
    /// [`consts::option::NAWS`] Negotiate About Window Size (RFC 1073)
    NAWS,
    /// [`consts::option::TSPEED`] Terminal Speed (RFC 1079)
    TerminalSpeed,
    /// [`consts::option::LFLOW`] Remote Flow Control (RFC 1372)
    RemoteFlowControl,
    /// [`consts::option::LINEMODE`] Linemode (RFC 1184)
    Linemode,
    /// [`consts::option::OLD_ENVIRONMENT`] Environment (RFC 1408)
    Environment,
    /// [`consts::option::NEW_ENVIRONMENT`] New Environment (RFC 1572)
    NewEnvironment,
    /// Any other option code
    Unknown(u8),
}

impl TelnetOption {
    /// Wire value of this option.
    pub fn to_u8(self) -> u8 {
        match self {
            TelnetOption::TransmitBinary => consts::option::BINARY,
            TelnetOption::Echo => consts::option::ECHO,
            TelnetOption::SuppressGoAhead => consts::option::SGA,
            TelnetOption::Status => consts::option::STATUS,
            TelnetOption::TimingMark => consts::option::TM,
            TelnetOption::NAOCRD => consts::option::NAOCRD,
            TelnetOption::TerminalType => consts::option::TTYPE,
            TelnetOption::NAWS => consts::option::NAWS,
            TelnetOption::TerminalSpeed => consts::option::TSPEED,
            TelnetOption::RemoteFlowControl => consts::option::LFLOW,
            TelnetOption::Linemode => consts::option::LINEMODE,
            TelnetOption::Environment => consts::option::OLD_ENVIRONMENT,
            TelnetOption::NewEnvironment => consts::option::NEW_ENVIRONMENT,
            TelnetOption::Unknown(byte) => byte,
        }
    }

    /// Maps a wire value to an option, falling back to [`TelnetOption::Unknown`].
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            consts::option::BINARY => TelnetOption::TransmitBinary,
            consts::option::ECHO => TelnetOption::Echo,
            consts::option::SGA => TelnetOption::SuppressGoAhead,
            consts::option::STATUS => TelnetOption::Status,
            consts::option::TM => TelnetOption::TimingMark,
            consts::option::NAOCRD => TelnetOption::NAOCRD,
            consts::option::TTYPE => TelnetOption::TerminalType,
            consts::option::NAWS => TelnetOption::NAWS,
            consts::option::TSPEED => TelnetOption::TerminalSpeed,
            consts::option::LFLOW => TelnetOption::RemoteFlowControl,
            consts::option::LINEMODE => TelnetOption::Linemode,
            consts::option::OLD_ENVIRONMENT => TelnetOption::Environment,
            consts::option::NEW_ENVIRONMENT => TelnetOption::NewEnvironment,
            other => TelnetOption::Unknown(other),
        }
    }

    /// True if the code has an entry in the stance tables.
    pub fn is_tracked(self) -> bool {
        usize::from(self.to_u8()) < consts::NTELOPTS
    }
}

impl fmt::Display for TelnetOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelnetOption::TransmitBinary => write!(f, "BINARY"),
            TelnetOption::Echo => write!(f, "ECHO"),
            TelnetOption::SuppressGoAhead => write!(f, "SUPPRESS GO AHEAD"),
            TelnetOption::Status => write!(f, "STATUS"),
            TelnetOption::TimingMark => write!(f, "TIMING MARK"),
            TelnetOption::NAOCRD => write!(f, "NAOCRD"),
            TelnetOption::TerminalType => write!(f, "TERMINAL TYPE"),
            TelnetOption::NAWS => write!(f, "NAWS"),
            TelnetOption::TerminalSpeed => write!(f, "TSPEED"),
            TelnetOption::RemoteFlowControl => write!(f, "LFLOW"),
            TelnetOption::Linemode => write!(f, "LINEMODE"),
            TelnetOption::Environment => write!(f, "OLD-ENVIRON"),
            TelnetOption::NewEnvironment => write!(f, "NEW-ENVIRON"),
            TelnetOption::Unknown(byte) => write!(f, "OPTION-{byte}"),
        }
    }
}

impl From<u8> for TelnetOption {
    fn from(byte: u8) -> Self {
        TelnetOption::from_u8(byte)
    }
}

impl From<TelnetOption> for u8 {
    fn from(option: TelnetOption) -> Self {
        option.to_u8()
    }
}

/// Last negotiation verb recorded for one direction of one option.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Stance {
    /// Nothing sent or received yet
    #[default]
    Unset,
    /// WILL
    Will,
    /// WONT
    Wont,
    /// DO
    Do,
    /// DONT
    Dont,
}

impl Stance {
    /// Command byte for this stance, `None` for [`Stance::Unset`].
    pub fn verb(self) -> Option<u8> {
        match self {
            Stance::Unset => None,
            Stance::Will => Some(consts::WILL),
            Stance::Wont => Some(consts::WONT),
            Stance::Do => Some(consts::DO),
            Stance::Dont => Some(consts::DONT),
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stance::Unset => write!(f, "-"),
            Stance::Will => write!(f, "WILL"),
            Stance::Wont => write!(f, "WONT"),
            Stance::Do => write!(f, "DO"),
            Stance::Dont => write!(f, "DONT"),
        }
    }
}

/// One negotiation command: `IAC <verb> <option>`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TelnetCommand {
    /// `IAC WILL <option>`
    Will(TelnetOption),
    /// `IAC WONT <option>`
    Wont(TelnetOption),
    /// `IAC DO <option>`
    Do(TelnetOption),
    /// `IAC DONT <option>`
    Dont(TelnetOption),
}

impl TelnetCommand {
    /// The option this command refers to.
    pub fn option(self) -> TelnetOption {
        match self {
            TelnetCommand::Will(option)
            | TelnetCommand::Wont(option)
            | TelnetCommand::Do(option)
            | TelnetCommand::Dont(option) => option,
        }
    }

    /// Stance recorded for this command.
    pub fn stance(self) -> Stance {
        match self {
            TelnetCommand::Will(_) => Stance::Will,
            TelnetCommand::Wont(_) => Stance::Wont,
            TelnetCommand::Do(_) => Stance::Do,
            TelnetCommand::Dont(_) => Stance::Dont,
        }
    }

    /// True for DO and DONT, the commands asking the peer to change its side.
    pub fn is_peer_directed(self) -> bool {
        matches!(self, TelnetCommand::Do(_) | TelnetCommand::Dont(_))
    }

    /// Appends the three wire bytes to `dst`.
    pub fn encode_into(self, dst: &mut BytesMut) {
        let verb = match self {
            TelnetCommand::Will(_) => consts::WILL,
            TelnetCommand::Wont(_) => consts::WONT,
            TelnetCommand::Do(_) => consts::DO,
            TelnetCommand::Dont(_) => consts::DONT,
        };
        dst.reserve(3);
        dst.put_u8(consts::IAC);
        dst.put_u8(verb);
        dst.put_u8(self.option().to_u8());
    }
}

impl fmt::Display for TelnetCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.stance(), self.option())
    }
}

/// Per-option stance table for one direction of the connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OptionTable {
    stances: [Stance; consts::NTELOPTS],
}

impl Default for OptionTable {
    fn default() -> Self {
        Self {
            stances: [Stance::Unset; consts::NTELOPTS],
        }
    }
}

impl OptionTable {
    /// Stance recorded for `option`; untracked options always read as unset.
    pub fn get(&self, option: TelnetOption) -> Stance {
        self.stances
            .get(usize::from(option.to_u8()))
            .copied()
            .unwrap_or_default()
    }

    /// Records `stance` for `option`. Returns false when the option is not tracked.
    pub fn set(&mut self, option: TelnetOption, stance: Stance) -> bool {
        match self.stances.get_mut(usize::from(option.to_u8())) {
            Some(slot) => {
                *slot = stance;
                true
            }
            None => false,
        }
    }

    /// Iterates over every option with a recorded stance, in code order.
    pub fn iter(&self) -> impl Iterator<Item = (TelnetOption, Stance)> + '_ {
        self.stances
            .iter()
            .enumerate()
            .filter(|(_, stance)| **stance != Stance::Unset)
            .filter_map(|(code, stance)| {
                u8::try_from(code)
                    .ok()
                    .map(|code| (TelnetOption::from_u8(code), *stance))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_code_mapping() {
        for code in 0..=u8::MAX {
            assert_eq!(TelnetOption::from_u8(code).to_u8(), code);
        }
        assert_eq!(TelnetOption::from_u8(1), TelnetOption::Echo);
        assert_eq!(TelnetOption::from_u8(34), TelnetOption::Linemode);
        assert_eq!(TelnetOption::from_u8(201), TelnetOption::Unknown(201));
    }

    #[test]
    fn test_tracked_options() {
        assert!(TelnetOption::Echo.is_tracked());
        assert!(TelnetOption::NewEnvironment.is_tracked());
        assert!(!TelnetOption::Unknown(40).is_tracked());
        assert!(!TelnetOption::Unknown(201).is_tracked());
    }

    #[test]
    fn test_table_ignores_untracked() {
        let mut table = OptionTable::default();
        assert!(!table.set(TelnetOption::Unknown(86), Stance::Will));
        assert_eq!(table.get(TelnetOption::Unknown(86)), Stance::Unset);
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn test_table_iter_in_code_order() {
        let mut table = OptionTable::default();
        table.set(TelnetOption::Linemode, Stance::Do);
        table.set(TelnetOption::Echo, Stance::Will);
        let entries: Vec<_> = table.iter().collect();
        assert_eq!(
            entries,
            vec![
                (TelnetOption::Echo, Stance::Will),
                (TelnetOption::Linemode, Stance::Do)
            ]
        );
    }

    #[test]
    fn test_command_encoding() {
        let mut dst = BytesMut::new();
        TelnetCommand::Will(TelnetOption::Echo).encode_into(&mut dst);
        TelnetCommand::Dont(TelnetOption::Linemode).encode_into(&mut dst);
        assert_eq!(
            &dst[..],
            &[
                consts::IAC,
                consts::WILL,
                consts::option::ECHO,
                consts::IAC,
                consts::DONT,
                consts::option::LINEMODE
            ]
        );
    }

    #[test]
    fn test_command_display() {
        assert_eq!(TelnetCommand::Do(TelnetOption::Linemode).to_string(), "DO LINEMODE");
        assert_eq!(TelnetCommand::Wont(TelnetOption::Unknown(99)).to_string(), "WONT OPTION-99");
    }
}
