#![forbid(unsafe_code)]

//! Process controller runtime.
//!
//! Wraps the kernel with the framed binary wire protocol: CRC32
//! content identity, the versioned packet header, a streaming `Rx`
//! decoder that owns its transport, and a conformant `Tx` encoder.
//!
//! No execution logic lives here — unit resolution and dispatch are
//! delegated to the kernel.

pub mod crc;
pub mod frame;
pub mod rx;
pub mod tx;
