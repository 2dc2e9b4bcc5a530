//! Streaming packet receiver.
//!
//! `Rx` owns its transport exclusively and decodes exactly one packet
//! per `receive_next` call into an internal slot — either the
//! configuration slot (SET_CONFIG) or the process slot (DO_PROCESS).
//!
//! Decode states: Idle → Header → EntityHeader → TypedBody → Idle.
//! Any failure after bytes have been consumed desyncs the stream: the
//! transport is dropped (and thereby closed) and the receiver stays
//! dead until `reset` arms it with a fresh transport.
//!
//! Bounds against a loaded configuration (sequence/command indices,
//! command-list lookups) are deliberately not checked here — they
//! surface at execution time. CRC fields are carried, not verified.

use std::io::{self, Read};

use log::{debug, warn};

use pcc_engine::domain::{
    Command, CommandList, ControllerConfig, Entity, Process, Register, Sequence, SequenceCommand,
    Terminator, Unit,
};
use pcc_engine::graph::MAX_UNITS;
use pcc_engine::si::Dimension;
use uuid::Uuid;

use crate::frame::{FrameHeader, PacketType, WireError, ENTITY_LEN, HEADER_LEN};

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Streaming decoder over an exclusive transport.
///
/// The decoder issues many small reads; wrap slow transports in
/// `std::io::BufReader`.
pub struct Rx<R> {
    transport: Option<R>,
    last_header: Option<FrameHeader>,
    config: Option<ControllerConfig>,
    process: Option<Process>,
}

impl<R: Read> Rx<R> {
    /// Arm a receiver with its transport.
    pub fn new(transport: R) -> Self {
        Self {
            transport: Some(transport),
            last_header: None,
            config: None,
            process: None,
        }
    }

    /// Release the current transport and arm a fresh one.
    pub fn reset(&mut self, transport: R) {
        self.transport = Some(transport);
        self.last_header = None;
    }

    /// Whether a decode error has killed the stream.
    pub fn is_desynced(&self) -> bool {
        self.transport.is_none()
    }

    /// Decode exactly one packet into its slot.
    ///
    /// Returns the number of bytes consumed and which packet type was
    /// decoded. A clean end of stream at a packet boundary returns
    /// `Eof` without desyncing; every other failure drops the
    /// transport.
    pub fn receive_next(&mut self) -> Result<(usize, PacketType), WireError> {
        let transport = match self.transport.as_mut() {
            Some(t) => t,
            None => return Err(WireError::Eof),
        };

        let mut n = 0usize;
        match recv(transport, &mut n) {
            Ok((header, body)) => {
                debug!(
                    "received {:?} packet id={} len={} ({} bytes)",
                    header.packet_type, header.packet_id, header.payload_len, n
                );
                self.last_header = Some(header);
                let packet_type = header.packet_type;
                match body {
                    Body::Config(config) => self.config = Some(config),
                    Body::Process(process) => self.process = Some(process),
                }
                Ok((n, packet_type))
            }
            Err(err) => {
                if n > 0 {
                    // Mid-packet failure: the stream position is lost.
                    warn!("stream desynced after {} bytes: {}", n, err);
                    self.transport = None;
                }
                Err(err)
            }
        }
    }

    /// Header of the most recently decoded packet.
    pub fn last_header(&self) -> Option<&FrameHeader> {
        self.last_header.as_ref()
    }

    /// The configuration slot.
    pub fn config(&self) -> Option<&ControllerConfig> {
        self.config.as_ref()
    }

    /// Move the decoded configuration out of its slot.
    pub fn take_config(&mut self) -> Option<ControllerConfig> {
        self.config.take()
    }

    /// The process slot.
    pub fn process(&self) -> Option<&Process> {
        self.process.as_ref()
    }

    /// Move the decoded process out of its slot.
    pub fn take_process(&mut self) -> Option<Process> {
        self.process.take()
    }
}

enum Body {
    Config(ControllerConfig),
    Process(Process),
}

// ---------------------------------------------------------------------------
// Packet decode
// ---------------------------------------------------------------------------

fn recv<R: Read>(r: &mut R, n: &mut usize) -> Result<(FrameHeader, Body), WireError> {
    let mut hdr = [0u8; HEADER_LEN];
    read_leading_byte(r, &mut hdr[0], n)?;
    fill(r, &mut hdr[1..], n)?;
    let header = FrameHeader::decode(&hdr)?;

    // Both packet types open with the common entity header; the
    // advisory length must at least hold it.
    if (header.payload_len as usize) < ENTITY_LEN {
        return Err(WireError::Malformed("packet length too short"));
    }
    let mut ent = [0u8; ENTITY_LEN];
    fill(r, &mut ent, n)?;
    let entity = decode_entity(&ent);

    let body = match header.packet_type {
        PacketType::SetConfig => Body::Config(decode_config_body(r, n, entity)?),
        PacketType::DoProcess => Body::Process(decode_process_body(r, n, entity)?),
    };
    Ok((header, body))
}

fn decode_entity(b: &[u8; ENTITY_LEN]) -> Entity {
    Entity {
        flags: u64::from_be_bytes(b[..8].try_into().expect("entity flags are 8 bytes")),
        uuid: Uuid::from_bytes(b[8..24].try_into().expect("entity uuid is 16 bytes")),
    }
}

fn decode_config_body<R: Read>(
    r: &mut R,
    n: &mut usize,
    entity: Entity,
) -> Result<ControllerConfig, WireError> {
    // | CRC(32) | nRegisters(8) | nSequences(8) | nCommandLists(8) | RSV(8) |
    let mut b = [0u8; 8];
    fill(r, &mut b, n)?;
    let crc = u32::from_be_bytes(b[..4].try_into().expect("crc is 4 bytes"));
    let n_registers = b[4];
    let n_sequences = b[5];
    let n_command_lists = b[6];
    if b[7] != 0 {
        return Err(WireError::Malformed("reserved config byte is not zero"));
    }
    // The top bit of every count is reserved for protocol expansion.
    if n_registers > 127 || n_sequences > 127 || n_command_lists > 127 {
        return Err(WireError::Malformed("config count top bit set"));
    }
    if n_sequences == 0 {
        return Err(WireError::Malformed("zero sequences in config"));
    }
    if n_command_lists == 0 {
        return Err(WireError::Malformed("zero command lists in config"));
    }

    let mut config = ControllerConfig {
        entity,
        crc,
        registers: Vec::with_capacity(n_registers as usize),
        command_lists: Vec::with_capacity(n_command_lists as usize),
        sequences: Vec::with_capacity(n_sequences as usize),
    };

    for _ in 0..n_registers {
        config.registers.push(decode_register(r, n)?);
    }
    for _ in 0..n_sequences {
        config.sequences.push(decode_sequence(r, n)?);
    }
    for _ in 0..n_command_lists {
        config.command_lists.push(decode_command_list(r, n)?);
    }
    Ok(config)
}

fn decode_register<R: Read>(r: &mut R, n: &mut usize) -> Result<Register, WireError> {
    // | Name(64) | Base(8) | RSV(24) | Dimension(32) | Value(64) |
    let mut b = [0u8; 24];
    fill(r, &mut b, n)?;
    if b[9] != 0 || b[10] != 0 || b[11] != 0 {
        return Err(WireError::Malformed("reserved register bytes are not zero"));
    }
    let dimension = Dimension::unpack(b[12..16].try_into().expect("dimension is 4 bytes"))
        .map_err(|_| WireError::Malformed("reserved dimension nibble is not zero"))?;
    Ok(Register {
        name: b[..8].try_into().expect("register name is 8 bytes"),
        base: b[8] as i8,
        dimension,
        value: i64::from_be_bytes(b[16..24].try_into().expect("register value is 8 bytes")),
    })
}

fn decode_sequence<R: Read>(r: &mut R, n: &mut usize) -> Result<Sequence, WireError> {
    // | Name(64) | nSteps(8) |
    let mut b = [0u8; 9];
    fill(r, &mut b, n)?;
    let n_steps = b[8];
    if n_steps == 0 {
        return Err(WireError::Malformed("zero steps in sequence"));
    }
    if n_steps > 127 {
        return Err(WireError::Malformed("sequence step count top bit set"));
    }

    let mut sequence = Sequence {
        name: b[..8].try_into().expect("sequence name is 8 bytes"),
        commands: Vec::with_capacity(n_steps as usize),
    };
    for _ in 0..n_steps {
        // | APIVersion(8) | ModuleID(8) | ModuleType(16) | CommandIndex(16) |
        let mut s = [0u8; 6];
        fill(r, &mut s, n)?;
        sequence.commands.push(SequenceCommand {
            api_version: s[0],
            module_id: s[1],
            module_type: u16::from_be_bytes([s[2], s[3]]),
            command_index: u16::from_be_bytes([s[4], s[5]]),
        });
    }
    Ok(sequence)
}

fn decode_command_list<R: Read>(r: &mut R, n: &mut usize) -> Result<CommandList, WireError> {
    // | APIVersion(8) | RSV(8) | ModuleType(16) | nCmds(16) |
    let mut b = [0u8; 6];
    fill(r, &mut b, n)?;
    if b[1] != 0 {
        return Err(WireError::Malformed("reserved command list byte is not zero"));
    }
    let n_cmds = u16::from_be_bytes([b[4], b[5]]);
    if n_cmds == 0 {
        return Err(WireError::Malformed("zero commands in command list"));
    }
    if n_cmds > 127 {
        return Err(WireError::Malformed("command count out of range"));
    }

    let mut list = CommandList {
        api_version: b[0],
        module_type: u16::from_be_bytes([b[2], b[3]]),
        commands: Vec::with_capacity(n_cmds as usize),
    };
    for _ in 0..n_cmds {
        // | Procedure(16) | Arglen(8) | Args(Arglen) |
        let mut c = [0u8; 3];
        fill(r, &mut c, n)?;
        let mut args = vec![0u8; c[2] as usize];
        fill(r, &mut args, n)?;
        list.commands.push(Command {
            procedure: u16::from_be_bytes([c[0], c[1]]),
            args,
        });
    }
    Ok(list)
}

fn decode_process_body<R: Read>(
    r: &mut R,
    n: &mut usize,
    entity: Entity,
) -> Result<Process, WireError> {
    // | CRC(32) | Process Flags(64) | Start(32) | ConfigCRC(32) | nUnits(16) |
    let mut b = [0u8; 22];
    fill(r, &mut b, n)?;
    let n_units = u16::from_be_bytes([b[20], b[21]]);
    if n_units == 0 {
        return Err(WireError::Malformed("zero units in process"));
    }
    if n_units as usize > MAX_UNITS {
        return Err(WireError::Malformed("too many units in process"));
    }

    let mut process = Process {
        entity,
        crc: u32::from_be_bytes(b[..4].try_into().expect("crc is 4 bytes")),
        flags: u64::from_be_bytes(b[4..12].try_into().expect("flags are 8 bytes")),
        start: u32::from_be_bytes(b[12..16].try_into().expect("start is 4 bytes")),
        config_crc: u32::from_be_bytes(b[16..20].try_into().expect("config crc is 4 bytes")),
        units: Vec::with_capacity(n_units as usize),
    };
    for _ in 0..n_units {
        process.units.push(decode_unit(r, n)?);
    }
    Ok(process)
}

fn decode_unit<R: Read>(r: &mut R, n: &mut usize) -> Result<Unit, WireError> {
    // | Unit Flags(8) | Num Forks(8) | Sequence(16) | NextUnit(16) | Forks(16·n) |
    let mut b = [0u8; 6];
    fill(r, &mut b, n)?;
    if b[0] & !0b11 != 0 {
        return Err(WireError::Malformed("reserved unit flag bits are not zero"));
    }
    let terminator = Terminator::from_bits(b[0])
        .ok_or(WireError::Malformed("illegal unit terminator flags"))?;
    let n_forks = b[1];
    if n_forks > 127 {
        return Err(WireError::Malformed("fork count top bit set"));
    }

    let mut unit = Unit {
        terminator,
        sequence: u16::from_be_bytes([b[2], b[3]]),
        next: u16::from_be_bytes([b[4], b[5]]),
        forks: Vec::with_capacity(n_forks as usize),
    };
    for _ in 0..n_forks {
        let mut fork = [0u8; 2];
        fill(r, &mut fork, n)?;
        unit.forks.push(u16::from_be_bytes(fork));
    }
    Ok(unit)
}

// ---------------------------------------------------------------------------
// Read helpers
// ---------------------------------------------------------------------------

/// Read the first byte of a packet. Zero bytes available is a clean
/// end of stream, not a truncation.
fn read_leading_byte<R: Read>(r: &mut R, byte: &mut u8, n: &mut usize) -> Result<(), WireError> {
    let mut buf = [0u8; 1];
    loop {
        match r.read(&mut buf) {
            Ok(0) => return Err(WireError::Eof),
            Ok(_) => {
                *byte = buf[0];
                *n += 1;
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read an exact run of bytes, mapping a short read to `Truncated`.
fn fill<R: Read>(r: &mut R, buf: &mut [u8], n: &mut usize) -> Result<(), WireError> {
    r.read_exact(buf)?;
    *n += buf.len();
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
