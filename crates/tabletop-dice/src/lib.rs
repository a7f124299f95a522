//! Dice formula parsing and rolling.
//!
//! A formula is a sequence of `+`/`-` separated terms, each either a dice
//! group (`2d6`, `d20`, `3W10`) or a flat integer modifier. Rolling records
//! every individual die so a stored result can be re-verified later.

pub mod formula;
pub mod roll;
pub mod source;

pub use formula::{DiceError, GroupSpec, ParsedFormula, parse};
pub use roll::{DiceGroup, DiceResults, roll};
pub use source::{RandomSource, RngSource};

/// Largest number of dice a single group may roll.
pub const MAX_DICE_COUNT: u64 = 100;

/// Largest die size accepted.
pub const MAX_SIDES: u64 = 10_000;
