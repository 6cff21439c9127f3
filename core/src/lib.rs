#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! Orchestration layer: the error aggregate, logging bootstrap, and graceful
//! shutdown primitives shared by every binary that assembles the `data` and
//! `integration` crates into a running kernel.

pub mod error;
pub mod logging;
pub mod shutdown;

pub use error::KernelError;
