#![forbid(unsafe_code)]

//! Process controller kernel.
//!
//! Pure data model and deterministic algorithms: SI dimensions, the
//! entity types carried on the wire, the unit-graph walker, pre-flight
//! invariant validation, and the execution engine that resolves units
//! into module procedure calls.
//!
//! No I/O lives here — framing and transports belong to the runtime
//! crate.

pub mod si;
pub mod domain;
pub mod config;
pub mod graph;
pub mod invariants;
pub mod controller;
