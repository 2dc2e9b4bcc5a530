//! Core entity types.
//!
//! Pure data. No framing, no dispatch logic. Everything here mirrors a
//! wire structure one-to-one and is immutable once decoded.
//!
//! Types carrying an `Entity` header are the persistable objects of the
//! protocol — anything a controller exchanges that a host will want to
//! log or store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::si::Dimension;
use crate::si::Prefix;

/// A module procedure opcode.
pub type Procedure = u16;

/// A module type identifier.
pub type ModuleType = u16;

// ── Entity ─────────────────────────────────────────────────────

/// Common header of persistable protocol objects.
///
/// The low 4 bits of `flags` carry the entity schema version; the
/// remaining bits are reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entity {
    pub flags: u64,
    pub uuid: Uuid,
}

impl Entity {
    /// Entity schema version (low 4 bits of the flags word).
    pub fn version(&self) -> u8 {
        (self.flags & 0xF) as u8
    }
}

// ── Registers ──────────────────────────────────────────────────

/// A named, dimensioned fixed-point quantity in the controller's
/// static configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Register {
    /// ASCII, right-padded with NUL.
    pub name: [u8; 8],
    /// SI prefix exponent of the stored value.
    pub base: i8,
    pub dimension: Dimension,
    /// Fixed-point quantity in the scaled base.
    pub value: i64,
}

impl Register {
    /// The register name with trailing NUL padding removed.
    pub fn name_str(&self) -> &str {
        name_str(&self.name)
    }

    /// The register's base resolved against the enumerated prefix set.
    pub fn prefix(&self) -> Option<Prefix> {
        Prefix::from_exponent(self.base)
    }
}

// ── Commands ───────────────────────────────────────────────────

/// One parameterized call a module can execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Command {
    pub procedure: Procedure,
    /// Opaque argument bytes, at most 255 on the wire.
    pub args: Vec<u8>,
}

/// The commands exposed by a module type at a given API version.
///
/// A `ControllerConfig` holds at most one list per
/// `(api_version, module_type)` key; commands are addressed by their
/// index within the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandList {
    pub api_version: u8,
    pub module_type: ModuleType,
    pub commands: Vec<Command>,
}

// ── Sequences ──────────────────────────────────────────────────

/// A single step of a sequence.
///
/// Resolves to `command_lists[(api_version, module_type)]
/// .commands[command_index]`, executed on module `module_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceCommand {
    pub command_index: u16,
    pub api_version: u8,
    pub module_id: u8,
    pub module_type: ModuleType,
}

/// A named, ordered run of sequence commands.
///
/// Steps execute back-to-back with no inter-command suspension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sequence {
    /// ASCII, right-padded with NUL.
    pub name: [u8; 8],
    pub commands: Vec<SequenceCommand>,
}

impl Sequence {
    /// The sequence name with trailing NUL padding removed.
    pub fn name_str(&self) -> &str {
        name_str(&self.name)
    }
}

// ── Units ──────────────────────────────────────────────────────

/// The two-bit terminator tag of a unit's flag byte.
///
/// `0b11` is an illegal encoding and is rejected at decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminator {
    /// Non-terminal: control continues at `Unit::next`.
    Continue,
    /// Terminal: the process ends here.
    End,
    /// Terminal: the host should restart the process.
    Restart,
}

impl Terminator {
    /// Decode the low two bits of a unit flag byte. `0b11` is invalid.
    pub fn from_bits(bits: u8) -> Option<Terminator> {
        match bits & 0b11 {
            0b00 => Some(Terminator::Continue),
            0b01 => Some(Terminator::End),
            0b10 => Some(Terminator::Restart),
            _ => None,
        }
    }

    /// The wire encoding of this tag.
    pub fn to_bits(self) -> u8 {
        match self {
            Terminator::Continue => 0b00,
            Terminator::End => 0b01,
            Terminator::Restart => 0b10,
        }
    }

    /// Whether the walker stops at a unit carrying this tag.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Terminator::Continue)
    }
}

/// A node in a process's control-flow graph.
///
/// `sequence` indexes into `ControllerConfig::sequences`. `next` is the
/// index of the successor within `Process::units` and is meaningful
/// only for non-terminal units; index 0 is reserved as "none", so a
/// non-terminal unit must have `next > 0`. Forks are carried but not
/// traversed in this revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Unit {
    pub terminator: Terminator,
    pub sequence: u16,
    pub next: u16,
    pub forks: Vec<u16>,
}

// ── Process ────────────────────────────────────────────────────

/// A complete, CRC-bound execution request.
///
/// Immutable during execution. `start` is an opaque time-like value
/// the core never interprets. The first unit is the entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Process {
    pub entity: Entity,
    /// CRC32 of the process packet with the CRC field zeroed.
    pub crc: u32,
    pub flags: u64,
    pub start: u32,
    /// Must equal the CRC of the configuration loaded in the controller.
    pub config_crc: u32,
    pub units: Vec<Unit>,
}

// ── Controller configuration ───────────────────────────────────

/// The static configuration of a process controller.
///
/// Replaced wholesale by each successfully decoded SET_CONFIG packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    pub entity: Entity,
    /// CRC32 of the configuration packet with the CRC field zeroed.
    pub crc: u32,
    pub registers: Vec<Register>,
    pub command_lists: Vec<CommandList>,
    pub sequences: Vec<Sequence>,
}

// ── Helpers ────────────────────────────────────────────────────

/// Pack a string into an 8-byte NUL-padded name field, truncating.
pub fn pack_name(s: &str) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (dst, src) in out.iter_mut().zip(s.bytes()) {
        *dst = src;
    }
    out
}

fn name_str(name: &[u8; 8]) -> &str {
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    std::str::from_utf8(&name[..end]).unwrap_or("")
}
