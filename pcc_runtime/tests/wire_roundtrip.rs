//! Integration tests for pcc_runtime.
//!
//! Exercise the public API end to end: encoder → byte stream → Rx →
//! controller execution, plus the round-trip law for conformant
//! packets.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use pcc_engine::controller::{Controller, ExecError};
use pcc_engine::domain::{
    pack_name, Command, ControllerConfig, Entity, Process, Register, Sequence, SequenceCommand,
    Terminator, Unit,
};
use pcc_engine::si::Dimension;

use pcc_runtime::frame::{PacketType, WireError};
use pcc_runtime::rx::Rx;
use pcc_runtime::tx;

const MODULE_PRINTER: u16 = 0xC4FE;

/// A configuration exercising every decoded field: registers with
/// dimensions and a negative value, zero-length and maximum-length
/// args, two command lists.
fn rich_config() -> ControllerConfig {
    let mut cfg = ControllerConfig {
        entity: Entity {
            flags: 0x21,
            uuid: Uuid::from_bytes([0x11; 16]),
        },
        ..ControllerConfig::default()
    };

    // m·s⁻² — an acceleration setpoint, stored in milli units.
    cfg.registers.push(Register {
        name: pack_name("accel"),
        base: -3,
        dimension: Dimension::new(1, 0, -2, 0, 0, 0, 0).expect("valid dimension"),
        value: -9810,
    });
    cfg.registers.push(Register {
        name: pack_name("count"),
        base: 0,
        dimension: Dimension::none(),
        value: i64::MAX,
    });

    cfg.add_command(0, MODULE_PRINTER, Command { procedure: 0, args: b"hello world".to_vec() });
    cfg.add_command(0, MODULE_PRINTER, Command { procedure: 1, args: b"bye world".to_vec() });
    cfg.add_command(1, 0x0002, Command { procedure: 9, args: Vec::new() });
    cfg.add_command(1, 0x0002, Command { procedure: 10, args: vec![0xAB; 255] });

    cfg.sequences.push(Sequence {
        name: pack_name("hellobye"),
        commands: vec![
            SequenceCommand {
                command_index: 0,
                api_version: 0,
                module_id: 0,
                module_type: MODULE_PRINTER,
            },
            SequenceCommand {
                command_index: 1,
                api_version: 0,
                module_id: 0,
                module_type: MODULE_PRINTER,
            },
        ],
    });
    cfg.sequences.push(Sequence {
        name: pack_name("aux"),
        commands: vec![SequenceCommand {
            command_index: 1,
            api_version: 1,
            module_id: 4,
            module_type: 0x0002,
        }],
    });

    cfg.crc = tx::config_crc(&cfg).expect("config encodes");
    cfg
}

/// A three-unit chain with forks carried on the middle unit.
fn rich_process(config_crc: u32) -> Process {
    let mut process = Process {
        entity: Entity {
            flags: 0x01,
            uuid: Uuid::from_bytes([0x22; 16]),
        },
        crc: 0,
        flags: 0x8000_0000_0000_0001,
        start: 0xDEAD_0001,
        config_crc,
        units: vec![
            Unit {
                terminator: Terminator::Continue,
                sequence: 0,
                next: 2,
                forks: Vec::new(),
            },
            Unit {
                terminator: Terminator::Restart,
                sequence: 1,
                next: 0,
                forks: vec![2, 1],
            },
            Unit {
                terminator: Terminator::Continue,
                sequence: 1,
                next: 1,
                forks: Vec::new(),
            },
        ],
    };
    process.crc = tx::process_crc(&process).expect("process encodes");
    process
}

// ─────────────────────────────────────────────────────────────
// Test 1: config_roundtrip_is_structural_identity
// ─────────────────────────────────────────────────────────────

#[test]
fn config_roundtrip_is_structural_identity() {
    let cfg = rich_config();
    let bytes = tx::encode_config(&cfg, 0x0101).unwrap();
    let mut rx = Rx::new(Cursor::new(bytes));

    let (_, ptype) = rx.receive_next().expect("config decodes");
    assert_eq!(ptype, PacketType::SetConfig);
    let decoded = rx.take_config().expect("config slot filled");
    assert_eq!(decoded, cfg, "decode(encode(config)) must be structurally equal");
}

// ─────────────────────────────────────────────────────────────
// Test 2: process_roundtrip_carries_forks
// ─────────────────────────────────────────────────────────────

#[test]
fn process_roundtrip_carries_forks() {
    let cfg = rich_config();
    let process = rich_process(cfg.crc);
    let bytes = tx::encode_process(&process, 0x0202).unwrap();
    let mut rx = Rx::new(Cursor::new(bytes));

    let (_, ptype) = rx.receive_next().expect("process decodes");
    assert_eq!(ptype, PacketType::DoProcess);
    let decoded = rx.take_process().expect("process slot filled");
    assert_eq!(decoded, process, "decode(encode(process)) must be structurally equal");
    assert_eq!(decoded.units[1].forks, vec![2, 1]);
}

// ─────────────────────────────────────────────────────────────
// Test 3: byte_stream_executes_hellobye
// ─────────────────────────────────────────────────────────────

#[test]
fn byte_stream_executes_hellobye() {
    let cfg = rich_config();
    let mut process = rich_process(cfg.crc);
    // A single terminal unit running the hellobye sequence.
    process.units = vec![Unit {
        terminator: Terminator::End,
        sequence: 0,
        next: 0,
        forks: Vec::new(),
    }];
    process.crc = tx::process_crc(&process).unwrap();

    let mut stream = tx::encode_config(&cfg, 1).unwrap();
    stream.extend(tx::encode_process(&process, 2).unwrap());

    let mut rx = Rx::new(Cursor::new(stream));
    assert_eq!(rx.receive_next().unwrap().1, PacketType::SetConfig);
    assert_eq!(rx.receive_next().unwrap().1, PacketType::DoProcess);

    let mut controller = Controller::new();
    controller.set_config(rx.take_config().unwrap());

    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    controller.set_procedures(
        0,
        MODULE_PRINTER,
        Box::new(move |procedure, _id, args| {
            sink.lock().unwrap().push((procedure, String::from_utf8_lossy(args).into_owned()));
            Ok(())
        }),
    );

    controller
        .exec(&rx.take_process().unwrap())
        .expect("execution succeeds");

    let calls = collected.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            (0u16, "hello world".to_string()),
            (1u16, "bye world".to_string()),
        ]
    );
}

// ─────────────────────────────────────────────────────────────
// Test 4: decoded_crc_binds_process_to_config
// ─────────────────────────────────────────────────────────────

#[test]
fn decoded_crc_binds_process_to_config() {
    let cfg = rich_config();
    let mut process = rich_process(cfg.crc);
    process.config_crc ^= 1;
    process.crc = tx::process_crc(&process).unwrap();

    let mut stream = tx::encode_config(&cfg, 1).unwrap();
    stream.extend(tx::encode_process(&process, 2).unwrap());
    let mut rx = Rx::new(Cursor::new(stream));
    rx.receive_next().unwrap();
    rx.receive_next().unwrap();

    let mut controller = Controller::new();
    controller.set_config(rx.take_config().unwrap());
    let err = controller.exec(&rx.take_process().unwrap()).unwrap_err();
    assert!(matches!(err, ExecError::ConfigMismatch { .. }));
}

// ─────────────────────────────────────────────────────────────
// Test 5: malformed_first_packet_kills_the_stream
// ─────────────────────────────────────────────────────────────

#[test]
fn malformed_first_packet_kills_the_stream() {
    let cfg = rich_config();
    let process = rich_process(cfg.crc);

    let mut stream = tx::encode_config(&cfg, 1).unwrap();
    stream[4] = 0xFF; // RSV2 of the first header
    let good_second = tx::encode_process(&process, 2).unwrap();
    stream.extend(good_second.clone());

    let mut rx = Rx::new(Cursor::new(stream));
    assert!(matches!(rx.receive_next(), Err(WireError::Malformed(_))));
    assert!(rx.is_desynced());
    // The intact second packet is unreachable on the dead stream.
    assert!(matches!(rx.receive_next(), Err(WireError::Eof)));

    // A fresh transport recovers.
    rx.reset(Cursor::new(good_second));
    let (_, ptype) = rx.receive_next().expect("decode after reset");
    assert_eq!(ptype, PacketType::DoProcess);
}

// ─────────────────────────────────────────────────────────────
// Test 6: truncated_tail_reports_truncation
// ─────────────────────────────────────────────────────────────

#[test]
fn truncated_tail_reports_truncation() {
    let cfg = rich_config();
    let mut bytes = tx::encode_config(&cfg, 1).unwrap();
    bytes.truncate(bytes.len() / 2);
    let mut rx = Rx::new(Cursor::new(bytes));
    assert!(matches!(rx.receive_next(), Err(WireError::Truncated)));
    assert!(rx.is_desynced());
}

// ─────────────────────────────────────────────────────────────
// Test 7: decoded_config_persists_as_json
// ─────────────────────────────────────────────────────────────

#[test]
fn decoded_config_persists_as_json() {
    let cfg = rich_config();
    let mut rx = Rx::new(Cursor::new(tx::encode_config(&cfg, 1).unwrap()));
    rx.receive_next().unwrap();
    let decoded = rx.take_config().unwrap();

    // A host can dump the decoded entity to storage and load it back.
    let json = serde_json::to_string(&decoded).expect("config serializes");
    let restored: ControllerConfig = serde_json::from_str(&json).expect("config restores");
    assert_eq!(restored, decoded);
    assert_eq!(restored.entity.version(), 1);
}
