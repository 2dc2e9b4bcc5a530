//! Execution engine.
//!
//! Top-level orchestrator. Holds the active configuration and the
//! module handler registry, resolves a process's units into sequences
//! and sequence commands into concrete `(api_version, module_type,
//! procedure, module_id, args)` calls, and dispatches them in order.
//!
//! Execution is strictly single-threaded and sequential: commands
//! within a sequence run in order, units run in `next` order. A handler
//! error aborts the whole process; side effects already performed are
//! not rolled back.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};

use crate::domain::{ControllerConfig, ModuleType, Procedure, Process};
use crate::graph::{self, VisitError, WalkError};

/// Error value returned by a module handler, propagated transparently.
pub type ModuleError = Box<dyn std::error::Error + Send + Sync>;

/// A registered module handler.
///
/// Receives `(procedure, module_id, args)`. Handlers must be
/// synchronous and bounded, and must not retain `args` beyond the call
/// — the bytes are owned by the decoded configuration.
pub type ProcedureFn = Box<dyn FnMut(Procedure, u8, &[u8]) -> Result<(), ModuleError> + Send>;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A sequence or command index that fell outside its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexError {
    /// `"sequence index"` or `"command index"`.
    pub which: &'static str,
    pub index: usize,
    pub limit: usize,
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} out of range (limit: {})", self.which, self.index, self.limit)
    }
}

impl std::error::Error for IndexError {}

/// All execution failures.
#[derive(Debug)]
pub enum ExecError {
    /// No configuration has been installed.
    NoConfig,
    /// The process references a different configuration CRC than the
    /// one loaded.
    ConfigMismatch { process: u32, config: u32 },
    /// No handler registered for the key.
    NoMatchingProcedure { api_version: u8, module_type: ModuleType },
    /// The configuration has no command list for the key.
    NoCommandList { api_version: u8, module_type: ModuleType },
    /// Sequence or command index out of range.
    Index(IndexError),
    /// The unit graph is ill-formed.
    Walk(WalkError),
    /// A visited unit carries forks, which this revision does not run.
    ForksUnsupported { at: u16 },
    /// A module handler failed.
    Module(ModuleError),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::NoConfig => write!(f, "no configuration loaded"),
            ExecError::ConfigMismatch { process, config } => write!(
                f,
                "process config CRC {:#010x} does not match controller config CRC {:#010x}",
                process, config
            ),
            ExecError::NoMatchingProcedure { api_version, module_type } => write!(
                f,
                "no matching procedure found for API version {} module type {:#06x}",
                api_version, module_type
            ),
            ExecError::NoCommandList { api_version, module_type } => write!(
                f,
                "no command list found for API version {} module type {:#06x}",
                api_version, module_type
            ),
            ExecError::Index(err) => err.fmt(f),
            ExecError::Walk(err) => err.fmt(f),
            ExecError::ForksUnsupported { at } => {
                write!(f, "unit {} declares forks, which are not executed", at)
            }
            ExecError::Module(err) => write!(f, "module handler failed: {}", err),
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecError::Module(err) => Some(err.as_ref()),
            ExecError::Index(err) => Some(err),
            ExecError::Walk(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WalkError> for ExecError {
    fn from(err: WalkError) -> Self {
        ExecError::Walk(err)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// A process controller: active configuration plus handler registry.
///
/// The handler map is expected to be populated during startup and
/// treated as read-only during execution.
#[derive(Default)]
pub struct Controller {
    config: Option<ControllerConfig>,
    procedures: BTreeMap<(u8, ModuleType), ProcedureFn>,
    last_index_error: Option<IndexError>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a configuration, replacing any previous one wholesale.
    pub fn set_config(&mut self, config: ControllerConfig) {
        debug!(
            "installing config crc={:#010x} ({} registers, {} command lists, {} sequences)",
            config.crc,
            config.registers.len(),
            config.command_lists.len(),
            config.sequences.len()
        );
        self.config = Some(config);
    }

    /// The active configuration, if one has been installed.
    pub fn config(&self) -> Option<&ControllerConfig> {
        self.config.as_ref()
    }

    /// Register or replace the handler for `(api_version, module_type)`.
    pub fn set_procedures(
        &mut self,
        api_version: u8,
        module_type: ModuleType,
        handler: ProcedureFn,
    ) {
        self.procedures.insert((api_version, module_type), handler);
    }

    /// Unregister the handler for `(api_version, module_type)`.
    pub fn remove_procedures(&mut self, api_version: u8, module_type: ModuleType) {
        self.procedures.remove(&(api_version, module_type));
    }

    /// Invoke the registered handler for a single procedure call.
    pub fn call_procedure(
        &mut self,
        api_version: u8,
        module_type: ModuleType,
        procedure: Procedure,
        module_id: u8,
        args: &[u8],
    ) -> Result<(), ExecError> {
        match self.procedures.get_mut(&(api_version, module_type)) {
            Some(handler) => handler(procedure, module_id, args).map_err(ExecError::Module),
            None => Err(ExecError::NoMatchingProcedure { api_version, module_type }),
        }
    }

    /// Resolve and visit every procedure call of `process` in execution
    /// order without dispatching to handlers.
    ///
    /// The visitor observes `(api_version, module_type, procedure,
    /// module_id, args)` tuples; the observed order is the depth-first,
    /// left-to-right serialization of the unit-graph walk. Any visitor
    /// error aborts the traversal immediately.
    pub fn visit_procedures<F>(&mut self, process: &Process, mut visitor: F) -> Result<(), ExecError>
    where
        F: FnMut(u8, ModuleType, Procedure, u8, &[u8]) -> Result<(), ExecError>,
    {
        let config = self.config.as_ref().ok_or(ExecError::NoConfig)?;
        let result = resolve_and_visit(config, process, &mut visitor);
        self.record_index_error(&result);
        result
    }

    /// Execute the process: resolve every procedure call and dispatch
    /// it through the handler registry.
    pub fn exec(&mut self, process: &Process) -> Result<(), ExecError> {
        let config = self.config.as_ref().ok_or(ExecError::NoConfig)?;
        let procedures = &mut self.procedures;
        let result = resolve_and_visit(
            config,
            process,
            &mut |api_version, module_type, procedure, module_id, args| {
                match procedures.get_mut(&(api_version, module_type)) {
                    Some(handler) => {
                        handler(procedure, module_id, args).map_err(ExecError::Module)
                    }
                    None => Err(ExecError::NoMatchingProcedure { api_version, module_type }),
                }
            },
        );
        if let Err(err) = &result {
            warn!("process {} aborted: {}", process.entity.uuid, err);
        }
        self.record_index_error(&result);
        result
    }

    /// The last sequence/command bounds failure, kept for diagnostic
    /// reporting alongside the returned error.
    pub fn last_index_error(&self) -> Option<IndexError> {
        self.last_index_error
    }

    fn record_index_error(&mut self, result: &Result<(), ExecError>) {
        if let Err(ExecError::Index(err)) = result {
            self.last_index_error = Some(*err);
        }
    }
}

/// Walk `process` against `config`, yielding every resolved procedure
/// call to `visitor`.
fn resolve_and_visit(
    config: &ControllerConfig,
    process: &Process,
    visitor: &mut dyn FnMut(u8, ModuleType, Procedure, u8, &[u8]) -> Result<(), ExecError>,
) -> Result<(), ExecError> {
    if process.config_crc != config.crc {
        return Err(ExecError::ConfigMismatch {
            process: process.config_crc,
            config: config.crc,
        });
    }

    let walked = graph::visit_units(process, 0, |idx, unit| {
        if !unit.forks.is_empty() {
            return Err(ExecError::ForksUnsupported { at: idx });
        }
        let sequences = &config.sequences;
        if unit.sequence as usize >= sequences.len() {
            return Err(ExecError::Index(IndexError {
                which: "sequence index",
                index: unit.sequence as usize,
                limit: sequences.len(),
            }));
        }
        let sequence = &sequences[unit.sequence as usize];
        for step in &sequence.commands {
            let list = config
                .get_command_list(step.api_version, step.module_type)
                .ok_or(ExecError::NoCommandList {
                    api_version: step.api_version,
                    module_type: step.module_type,
                })?;
            if step.command_index as usize >= list.commands.len() {
                return Err(ExecError::Index(IndexError {
                    which: "command index",
                    index: step.command_index as usize,
                    limit: list.commands.len(),
                }));
            }
            let command = &list.commands[step.command_index as usize];
            visitor(
                step.api_version,
                step.module_type,
                command.procedure,
                step.module_id,
                &command.args,
            )?;
        }
        Ok(())
    });

    match walked {
        Ok(()) => Ok(()),
        Err(VisitError::Walk(err)) => Err(err.into()),
        Err(VisitError::Visitor(err)) => Err(err),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
