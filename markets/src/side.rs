use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of an order book a [`crate::symbol::Symbol`] level sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Side {
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "Bid"),
            Side::Ask => write!(f, "Ask"),
        }
    }
}

/// The side that initiated a trade by lifting an offer or hitting a bid.
///
/// `Unknown` is the default for vendors that do not report aggressor directly; the
/// trade collector infers it from the prevailing BBO when possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize)]
pub enum Aggressor {
    Buy,
    Sell,
    #[default]
    Unknown,
}

impl fmt::Display for Aggressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggressor::Buy => write!(f, "Buy"),
            Aggressor::Sell => write!(f, "Sell"),
            Aggressor::Unknown => write!(f, "Unknown"),
        }
    }
}
