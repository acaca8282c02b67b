//! The UM-32 universal machine: loader, execution engine and checkpointer.
//!
//! The machine is a register architecture with 32-bit words ("platters"),
//! eight registers, a segmented heap of variable-length platter arrays and
//! console-byte I/O. Programs are fetched from heap segment 0; opcode 12 can
//! replace segment 0 wholesale, which is how guests implement far jumps and
//! self-modification.
//!
//! # Architecture
//!
//! - **Loader** ([`vm::Machine::load_program`] / [`vm::Machine::load_from_backup`]):
//!   turns a program byte stream into segment 0, or restores a saved
//!   snapshot into a fully formed machine.
//! - **Execution engine** ([`vm`]): the decode/dispatch loop, run to
//!   completion on a dedicated thread with a one-shot completion handle.
//! - **Checkpointer** ([`checkpoint`]): wall-clock-gated snapshots written
//!   atomically to a backup folder, invoked from the Input operator just
//!   before the engine blocks.
//!
//! # Modules
//!
//! - [`isa`]: instruction word layout and the fourteen operators
//! - [`vm`]: the machine itself
//! - [`snapshot`]: machine-state serialization
//! - [`errors`]: everything that can go wrong

pub mod checkpoint;
pub mod errors;
pub mod isa;
mod program;
pub mod snapshot;
pub mod vm;
