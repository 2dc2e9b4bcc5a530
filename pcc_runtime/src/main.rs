//! Demo controller harness.
//!
//! Drives the full pipeline against a printer module: build the
//! hello/bye configuration, encode it and a one-unit process, stream
//! both packets through `Rx`, install the configuration, register the
//! printer handler, and execute.

use std::io::Cursor;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use log::info;
use uuid::Uuid;

use pcc_engine::controller::Controller;
use pcc_engine::domain::{
    pack_name, Command, ControllerConfig, Entity, Process, Sequence, SequenceCommand, Terminator,
    Unit,
};
use pcc_engine::invariants;
use pcc_runtime::rx::Rx;
use pcc_runtime::tx;

const MODULE_PRINTER: u16 = 0xC4FE;

const PROC_PRINT: u16 = 0;
const PROC_PRINT_NEWLINE: u16 = 1;

fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    match run() {
        Ok(()) => {
            println!("[OK] controller demo completed");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("[FAIL] {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    // -- Build the configuration --
    let mut config = ControllerConfig {
        entity: Entity {
            flags: 0x01,
            uuid: Uuid::from_bytes(*b"pcc-demo-config!"),
        },
        ..ControllerConfig::default()
    };
    config.add_command(
        0,
        MODULE_PRINTER,
        Command { procedure: PROC_PRINT, args: b"hello world".to_vec() },
    );
    config.add_command(
        0,
        MODULE_PRINTER,
        Command { procedure: PROC_PRINT_NEWLINE, args: b"bye world".to_vec() },
    );
    config.sequences.push(Sequence {
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
    config.crc = tx::config_crc(&config)?;

    // -- Build the process bound to that configuration --
    let mut process = Process {
        entity: Entity {
            flags: 0x01,
            uuid: Uuid::from_bytes(*b"pcc-demo-process"),
        },
        crc: 0,
        flags: 0,
        start: 0,
        config_crc: config.crc,
        units: vec![Unit {
            terminator: Terminator::End,
            sequence: 0,
            next: 0,
            forks: Vec::new(),
        }],
    };
    process.crc = tx::process_crc(&process)?;

    // -- Ship both packets over an in-memory transport --
    let mut stream = tx::encode_config(&config, 1)?;
    stream.extend(tx::encode_process(&process, 2)?);
    info!("encoded stream of {} bytes", stream.len());

    let mut rx = Rx::new(Cursor::new(stream));
    rx.receive_next()?;
    rx.receive_next()?;
    let config = rx.take_config().ok_or("config slot empty after receive")?;
    let process = rx.take_process().ok_or("process slot empty after receive")?;

    invariants::try_validate(&config, &process)?;

    // -- Wire up the controller and execute --
    let mut controller = Controller::new();
    controller.set_config(config);
    let printed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&printed);
    controller.set_procedures(
        0,
        MODULE_PRINTER,
        Box::new(move |procedure, _id, args| {
            let text = String::from_utf8_lossy(args).into_owned();
            match procedure {
                PROC_PRINT => print!("{}", text),
                PROC_PRINT_NEWLINE => println!("{}", text),
                other => return Err(format!("unsupported procedure {}", other).into()),
            }
            sink.lock().unwrap().push((procedure, text));
            Ok(())
        }),
    );

    controller.exec(&process)?;

    let calls = printed.lock().unwrap();
    if calls.len() != 2 {
        return Err(format!("expected 2 printer calls, saw {}", calls.len()).into());
    }
    Ok(())
}
