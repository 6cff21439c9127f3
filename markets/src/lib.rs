#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]
//! # Markets
//!
//! Fundamental, dependency-light value types shared by every other crate in the
//! workspace: the normalized [`Symbol`] key, [`Side`] and [`Aggressor`], and the
//! decimal price/size aliases used throughout the event model.
//!
//! This crate does no I/O and takes no locks; it exists purely so the hot-path
//! `data` crate and the transport-facing `integration` crate agree on one
//! definition of "what a symbol is".

/// Normalized, validated symbol key. See [`Symbol::new`] for the validation rules.
pub mod symbol;

/// Order-book [`Side`] and trade [`Aggressor`].
pub mod side;

pub use side::{Aggressor, Side};
pub use symbol::{Symbol, SymbolError};

/// Fixed-point price/size representation used across the event model.
pub use rust_decimal::Decimal;
