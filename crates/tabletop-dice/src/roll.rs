use serde::{Deserialize, Serialize};

use crate::formula::{DiceError, ParsedFormula, parse};
use crate::source::RandomSource;

/// A rolled `NdS` term. `subtotal` is the sum of `rolls`, negated when
/// `count` is negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceGroup {
    pub count: i32,
    pub sides: u32,
    pub rolls: Vec<u32>,
    pub subtotal: i64,
}

/// The full, re-verifiable outcome of a roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceResults {
    pub formula: String,
    pub groups: Vec<DiceGroup>,
    pub modifier: i64,
    pub total: i64,
}

/// Parse `formula` and roll it.
///
/// The source is called exactly `|count|` times per group, in group order.
pub fn roll<S>(formula: &str, source: &mut S) -> Result<DiceResults, DiceError>
where
    S: RandomSource + ?Sized,
{
    let parsed = parse(formula)?;
    Ok(parsed.roll(formula, source))
}

impl ParsedFormula {
    pub fn roll<S>(&self, formula: &str, source: &mut S) -> DiceResults
    where
        S: RandomSource + ?Sized,
    {
        let groups: Vec<DiceGroup> = self
            .groups
            .iter()
            .map(|spec| {
                let rolls: Vec<u32> = (0..spec.count.unsigned_abs())
                    .map(|_| source.next_roll(spec.sides))
                    .collect();
                let sum: i64 = rolls.iter().map(|&r| i64::from(r)).sum();
                DiceGroup {
                    count: spec.count,
                    sides: spec.sides,
                    rolls,
                    subtotal: sum * i64::from(spec.count.signum()),
                }
            })
            .collect();

        let total = groups.iter().map(|g| g.subtotal).sum::<i64>() + self.modifier;

        DiceResults {
            formula: formula.to_string(),
            groups,
            modifier: self.modifier,
            total,
        }
    }
}
