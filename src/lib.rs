//! An interpreter for the UM-32 "Universal Machine".
//!
//! Provides the execution engine, snapshot persistence and console I/O
//! plumbing; the `um32` binary wraps it all in a command line.

pub mod machine;
pub mod types;
pub mod utils;
