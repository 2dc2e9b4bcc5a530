//! Pre-flight invariant checks.
//!
//! All-or-nothing validation of a process against the loaded
//! configuration, for hosts that want to reject an execution request
//! before any handler runs. Execution itself re-checks lazily during
//! traversal, so a host that tolerates partial execution can skip this.
//!
//! Returns `Err(message)` on the first failure, `Ok(())` if all pass.

use crate::domain::{ControllerConfig, Process};
use crate::graph::{self, VisitError, MAX_UNITS};

/// Validate every invariant a process must satisfy before execution:
/// unit-count bounds, config CRC binding, link well-formedness, and
/// resolvability of every reachable sequence command.
pub fn try_validate(config: &ControllerConfig, process: &Process) -> Result<(), String> {
    try_check_unit_count(process)?;
    try_check_config_binding(config, process)?;
    try_check_reachable_references(config, process)?;
    Ok(())
}

fn try_check_unit_count(process: &Process) -> Result<(), String> {
    let n = process.units.len();
    if n == 0 {
        return Err("process has no units".to_string());
    }
    if n > MAX_UNITS {
        return Err(format!("process has {} units (limit {})", n, MAX_UNITS));
    }
    Ok(())
}

fn try_check_config_binding(config: &ControllerConfig, process: &Process) -> Result<(), String> {
    if process.config_crc != config.crc {
        return Err(format!(
            "process config CRC {:#010x} does not match loaded config CRC {:#010x}",
            process.config_crc, config.crc
        ));
    }
    Ok(())
}

/// Dry-run the walker from the entry unit, resolving every sequence
/// command on the way without dispatching anything.
fn try_check_reachable_references(
    config: &ControllerConfig,
    process: &Process,
) -> Result<(), String> {
    let walked = graph::visit_units(process, 0, |idx, unit| {
        if unit.sequence as usize >= config.sequences.len() {
            return Err(format!(
                "unit {}: sequence index {} out of range (limit {})",
                idx,
                unit.sequence,
                config.sequences.len()
            ));
        }
        let sequence = &config.sequences[unit.sequence as usize];
        for (step_no, step) in sequence.commands.iter().enumerate() {
            let list = config
                .get_command_list(step.api_version, step.module_type)
                .ok_or_else(|| {
                    format!(
                        "unit {} step {}: no command list for API version {} module type {:#06x}",
                        idx, step_no, step.api_version, step.module_type
                    )
                })?;
            if step.command_index as usize >= list.commands.len() {
                return Err(format!(
                    "unit {} step {}: command index {} out of range (limit {})",
                    idx,
                    step_no,
                    step.command_index,
                    list.commands.len()
                ));
            }
        }
        Ok(())
    });
    match walked {
        Ok(()) => Ok(()),
        Err(VisitError::Walk(err)) => Err(err.to_string()),
        Err(VisitError::Visitor(msg)) => Err(msg),
    }
}
