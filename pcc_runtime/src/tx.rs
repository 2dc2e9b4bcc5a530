//! Conformant packet encoder.
//!
//! Emits complete framed packets for the two typed payloads. The CRC
//! field is always computed by the encoder (over the payload with the
//! CRC bytes zeroed) and embedded, so every emitted packet is
//! self-consistent; `config_crc`/`process_crc` expose the same value
//! for hosts that stamp identities into their in-memory objects.
//!
//! Count and width limits are enforced here so a conformant stream can
//! never be produced from an unencodable object.

use std::fmt;

use pcc_engine::domain::{Command, CommandList, ControllerConfig, Process, Register, Sequence, Unit};
use pcc_engine::graph::MAX_UNITS;
use pcc_engine::si::SiError;

use crate::crc::crc32;
use crate::frame::{FrameHeader, PacketType, ENTITY_LEN, PROTOCOL_VERSION};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// All encoder failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    /// A collection exceeds its wire count limit.
    TooMany {
        what: &'static str,
        count: usize,
        limit: usize,
    },
    /// A collection the wire requires to be non-empty is empty.
    Empty { what: &'static str },
    /// A register dimension does not fit the packed wire form.
    Dimension(SiError),
    /// The payload exceeds the advisory 16-bit length field.
    PayloadTooLarge(usize),
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::TooMany { what, count, limit } => {
                write!(f, "too many {}: {} (limit {})", what, count, limit)
            }
            TxError::Empty { what } => write!(f, "{} must not be empty", what),
            TxError::Dimension(err) => err.fmt(f),
            TxError::PayloadTooLarge(n) => {
                write!(f, "payload of {} bytes exceeds 16-bit length field", n)
            }
        }
    }
}

impl std::error::Error for TxError {}

impl From<SiError> for TxError {
    fn from(err: SiError) -> Self {
        TxError::Dimension(err)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Encode a complete SET_CONFIG packet.
pub fn encode_config(config: &ControllerConfig, packet_id: u16) -> Result<Vec<u8>, TxError> {
    let payload = config_payload(config)?;
    finish_packet(PacketType::SetConfig, packet_id, payload)
}

/// Encode a complete DO_PROCESS packet.
///
/// `process.config_crc` is written as given; `process.crc` is replaced
/// by the encoder-computed packet CRC.
pub fn encode_process(process: &Process, packet_id: u16) -> Result<Vec<u8>, TxError> {
    let payload = process_payload(process)?;
    finish_packet(PacketType::DoProcess, packet_id, payload)
}

/// The CRC a conformant SET_CONFIG packet for `config` carries.
pub fn config_crc(config: &ControllerConfig) -> Result<u32, TxError> {
    Ok(crc32(&config_payload(config)?))
}

/// The CRC a conformant DO_PROCESS packet for `process` carries.
pub fn process_crc(process: &Process) -> Result<u32, TxError> {
    Ok(crc32(&process_payload(process)?))
}

// ---------------------------------------------------------------------------
// Payload builders (CRC field left zeroed)
// ---------------------------------------------------------------------------

/// Offset of the CRC field within a typed payload: right after the
/// entity header.
const CRC_OFFSET: usize = ENTITY_LEN;

fn finish_packet(
    packet_type: PacketType,
    packet_id: u16,
    mut payload: Vec<u8>,
) -> Result<Vec<u8>, TxError> {
    if payload.len() > u16::MAX as usize {
        return Err(TxError::PayloadTooLarge(payload.len()));
    }
    let crc = crc32(&payload);
    payload[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_be_bytes());

    let header = FrameHeader {
        version: PROTOCOL_VERSION,
        packet_type,
        payload_len: payload.len() as u16,
        packet_id,
    };
    let mut packet = Vec::with_capacity(payload.len() + header.encode().len());
    packet.extend_from_slice(&header.encode());
    packet.extend_from_slice(&payload);
    Ok(packet)
}

fn config_payload(config: &ControllerConfig) -> Result<Vec<u8>, TxError> {
    check_count("registers", config.registers.len(), 127, false)?;
    check_count("sequences", config.sequences.len(), 127, true)?;
    check_count("command lists", config.command_lists.len(), 127, true)?;

    let mut out = Vec::new();
    put_entity(&mut out, config);

    // | CRC(32) | nRegisters(8) | nSequences(8) | nCommandLists(8) | RSV(8) |
    put_u32(&mut out, 0);
    out.push(config.registers.len() as u8);
    out.push(config.sequences.len() as u8);
    out.push(config.command_lists.len() as u8);
    out.push(0);

    for reg in &config.registers {
        put_register(&mut out, reg)?;
    }
    for seq in &config.sequences {
        put_sequence(&mut out, seq)?;
    }
    for list in &config.command_lists {
        put_command_list(&mut out, list)?;
    }
    Ok(out)
}

fn process_payload(process: &Process) -> Result<Vec<u8>, TxError> {
    let n_units = process.units.len();
    if n_units == 0 {
        return Err(TxError::Empty { what: "units" });
    }
    if n_units > MAX_UNITS {
        return Err(TxError::TooMany {
            what: "units",
            count: n_units,
            limit: MAX_UNITS,
        });
    }

    let mut out = Vec::new();
    put_entity_header(&mut out, process.entity.flags, process.entity.uuid.as_bytes());

    // | CRC(32) | Process Flags(64) | Start(32) | ConfigCRC(32) | nUnits(16) |
    put_u32(&mut out, 0);
    put_u64(&mut out, process.flags);
    put_u32(&mut out, process.start);
    put_u32(&mut out, process.config_crc);
    put_u16(&mut out, n_units as u16);

    for unit in &process.units {
        put_unit(&mut out, unit)?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Field writers
// ---------------------------------------------------------------------------

fn put_entity(out: &mut Vec<u8>, config: &ControllerConfig) {
    put_entity_header(out, config.entity.flags, config.entity.uuid.as_bytes());
}

fn put_entity_header(out: &mut Vec<u8>, flags: u64, uuid: &[u8; 16]) {
    put_u64(out, flags);
    out.extend_from_slice(uuid);
}

fn put_register(out: &mut Vec<u8>, reg: &Register) -> Result<(), TxError> {
    // | Name(64) | Base(8) | RSV(24) | Dimension(32) | Value(64) |
    out.extend_from_slice(&reg.name);
    out.push(reg.base as u8);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(&reg.dimension.pack()?);
    put_u64(out, reg.value as u64);
    Ok(())
}

fn put_sequence(out: &mut Vec<u8>, seq: &Sequence) -> Result<(), TxError> {
    check_count("sequence commands", seq.commands.len(), 127, true)?;
    // | Name(64) | nSteps(8) |
    out.extend_from_slice(&seq.name);
    out.push(seq.commands.len() as u8);
    for step in &seq.commands {
        // | APIVersion(8) | ModuleID(8) | ModuleType(16) | CommandIndex(16) |
        out.push(step.api_version);
        out.push(step.module_id);
        put_u16(out, step.module_type);
        put_u16(out, step.command_index);
    }
    Ok(())
}

fn put_command_list(out: &mut Vec<u8>, list: &CommandList) -> Result<(), TxError> {
    check_count("commands", list.commands.len(), 127, true)?;
    // | APIVersion(8) | RSV(8) | ModuleType(16) | nCmds(16) |
    out.push(list.api_version);
    out.push(0);
    put_u16(out, list.module_type);
    put_u16(out, list.commands.len() as u16);
    for cmd in &list.commands {
        put_command(out, cmd)?;
    }
    Ok(())
}

fn put_command(out: &mut Vec<u8>, cmd: &Command) -> Result<(), TxError> {
    if cmd.args.len() > u8::MAX as usize {
        return Err(TxError::TooMany {
            what: "command args",
            count: cmd.args.len(),
            limit: u8::MAX as usize,
        });
    }
    // | Procedure(16) | Arglen(8) | Args(Arglen) |
    put_u16(out, cmd.procedure);
    out.push(cmd.args.len() as u8);
    out.extend_from_slice(&cmd.args);
    Ok(())
}

fn put_unit(out: &mut Vec<u8>, unit: &Unit) -> Result<(), TxError> {
    if unit.forks.len() > 127 {
        return Err(TxError::TooMany {
            what: "forks",
            count: unit.forks.len(),
            limit: 127,
        });
    }
    // | Unit Flags(8) | Num Forks(8) | Sequence(16) | NextUnit(16) | Forks(16·n) |
    out.push(unit.terminator.to_bits());
    out.push(unit.forks.len() as u8);
    put_u16(out, unit.sequence);
    put_u16(out, unit.next);
    for fork in &unit.forks {
        put_u16(out, *fork);
    }
    Ok(())
}

fn check_count(
    what: &'static str,
    count: usize,
    limit: usize,
    required: bool,
) -> Result<(), TxError> {
    if required && count == 0 {
        return Err(TxError::Empty { what });
    }
    if count > limit {
        return Err(TxError::TooMany { what, count, limit });
    }
    Ok(())
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pcc_engine::domain::{pack_name, Entity, SequenceCommand, Terminator};

    fn minimal_config() -> ControllerConfig {
        let mut cfg = ControllerConfig::default();
        cfg.add_command(0, 1, Command { procedure: 0, args: Vec::new() });
        cfg.sequences.push(Sequence {
            name: pack_name("seq"),
            commands: vec![SequenceCommand {
                command_index: 0,
                api_version: 0,
                module_id: 0,
                module_type: 1,
            }],
        });
        cfg
    }

    #[test]
    fn config_packet_shape() {
        let cfg = minimal_config();
        let bytes = encode_config(&cfg, 7).unwrap();
        // Header + entity + config header + sequence (9 + 6) + list header (6)
        // + one argless command (3).
        assert_eq!(bytes.len(), 10 + 24 + 8 + 15 + 9);
        let header = FrameHeader::decode(&bytes[..10].try_into().unwrap()).unwrap();
        assert_eq!(header.packet_type, PacketType::SetConfig);
        assert_eq!(header.payload_len as usize, bytes.len() - 10);
        assert_eq!(header.packet_id, 7);
    }

    #[test]
    fn embedded_crc_matches_helper() {
        let cfg = minimal_config();
        let bytes = encode_config(&cfg, 0).unwrap();
        let embedded = u32::from_be_bytes(bytes[34..38].try_into().unwrap());
        assert_eq!(embedded, config_crc(&cfg).unwrap());
        // The CRC is over the payload with the CRC field zeroed.
        let mut payload = bytes[10..].to_vec();
        payload[24..28].fill(0);
        assert_eq!(crc32(&payload), embedded);
    }

    #[test]
    fn empty_required_collections_rejected() {
        let mut cfg = minimal_config();
        cfg.sequences.clear();
        assert_eq!(
            encode_config(&cfg, 0),
            Err(TxError::Empty { what: "sequences" })
        );

        let mut cfg = minimal_config();
        cfg.command_lists.clear();
        assert_eq!(
            encode_config(&cfg, 0),
            Err(TxError::Empty { what: "command lists" })
        );
    }

    #[test]
    fn oversize_args_rejected() {
        let mut cfg = minimal_config();
        cfg.command_lists[0].commands[0].args = vec![0; 256];
        assert_eq!(
            encode_config(&cfg, 0),
            Err(TxError::TooMany { what: "command args", count: 256, limit: 255 })
        );
    }

    #[test]
    fn unit_count_limits() {
        let unit = Unit {
            terminator: Terminator::End,
            sequence: 0,
            next: 0,
            forks: Vec::new(),
        };
        let mut process = Process {
            entity: Entity::default(),
            crc: 0,
            flags: 0,
            start: 0,
            config_crc: 0,
            units: Vec::new(),
        };
        assert_eq!(
            encode_process(&process, 0),
            Err(TxError::Empty { what: "units" })
        );
        process.units = vec![unit; 64];
        assert_eq!(
            encode_process(&process, 0),
            Err(TxError::TooMany { what: "units", count: 64, limit: 63 })
        );
    }

    #[test]
    fn wide_dimension_rejected() {
        use pcc_engine::si::Dimension;
        let mut cfg = minimal_config();
        cfg.registers.push(Register {
            name: pack_name("wide"),
            base: 0,
            dimension: Dimension::new(9, 0, 0, 0, 0, 0, 0).unwrap(),
            value: 0,
        });
        assert!(matches!(
            encode_config(&cfg, 0),
            Err(TxError::Dimension(SiError::PackedRange(9)))
        ));
    }
}
