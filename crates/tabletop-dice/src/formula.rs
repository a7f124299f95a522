use serde::{Deserialize, Serialize};

use crate::{MAX_DICE_COUNT, MAX_SIDES};

/// Why a formula was rejected. A rejected formula is never partially rolled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiceError {
    #[error("formula is empty")]
    Empty,

    #[error("unexpected input at position {position}")]
    Syntax { position: usize },

    #[error("formula contains no dice")]
    NoDice,

    #[error("dice count {count} is outside 1..=100")]
    CountOutOfRange { count: u64 },

    #[error("die size {sides} is outside 1..=10000")]
    SidesOutOfRange { sides: u64 },

    #[error("modifier is too large")]
    ModifierOverflow,
}

/// One `NdS` term before rolling. `count` carries the term's sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub count: i32,
    pub sides: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFormula {
    pub groups: Vec<GroupSpec>,
    pub modifier: i64,
}

enum Term {
    Dice { count: Option<u64>, sides: u64 },
    Flat(u64),
}

/// Parse a formula such as `2d6+3`, `d20`, `-1d4 + 1d8 - 2`.
///
/// A leading flat modifier is allowed (`5+d6`) but only unsigned.
/// `d` and `w` are accepted in either case. Whitespace may surround the
/// `+`/`-` separators but not split a term.
pub fn parse(formula: &str) -> Result<ParsedFormula, DiceError> {
    let trimmed = formula.trim();
    if trimmed.is_empty() {
        return Err(DiceError::Empty);
    }

    let mut cursor = Cursor::new(trimmed);
    let mut groups = Vec::new();
    let mut modifier: i64 = 0;
    let mut first = true;

    while !cursor.at_end() {
        cursor.skip_whitespace();
        let sign_at = cursor.pos;
        let (negative, signed) = match cursor.peek() {
            Some('+') => {
                cursor.bump();
                (false, true)
            }
            Some('-') => {
                cursor.bump();
                (true, true)
            }
            _ if first => (false, false),
            _ => return Err(cursor.syntax_error()),
        };
        cursor.skip_whitespace();

        match cursor.term()? {
            Term::Dice { count, sides } => {
                let count = count.unwrap_or(1);
                if !(1..=MAX_DICE_COUNT).contains(&count) {
                    return Err(DiceError::CountOutOfRange { count });
                }
                if !(1..=MAX_SIDES).contains(&sides) {
                    return Err(DiceError::SidesOutOfRange { sides });
                }
                // Both bounds were checked above, so the narrowing cannot fail.
                let count = count as i32;
                groups.push(GroupSpec {
                    count: if negative { -count } else { count },
                    sides: sides as u32,
                });
            }
            // Only a dice term may carry a sign at the very start
            Term::Flat(_) if first && signed => {
                return Err(DiceError::Syntax { position: sign_at });
            }
            Term::Flat(value) => {
                let value = i64::try_from(value).map_err(|_| DiceError::ModifierOverflow)?;
                let term = if negative { -value } else { value };
                modifier = modifier
                    .checked_add(term)
                    .ok_or(DiceError::ModifierOverflow)?;
            }
        }

        first = false;
    }

    if groups.is_empty() {
        return Err(DiceError::NoDice);
    }

    Ok(ParsedFormula { groups, modifier })
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn syntax_error(&self) -> DiceError {
        DiceError::Syntax { position: self.pos }
    }

    /// Consume a run of ASCII digits. Values too large for `u64` saturate so
    /// the caller reports them as out of range rather than as bad syntax.
    fn digits(&mut self) -> Option<u64> {
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(c) = self.peek() {
            let Some(d) = c.to_digit(10) else { break };
            value = value.saturating_mul(10).saturating_add(u64::from(d));
            self.bump();
        }
        (self.pos > start).then_some(value)
    }

    fn term(&mut self) -> Result<Term, DiceError> {
        let count = self.digits();
        match self.peek() {
            Some('d' | 'D' | 'w' | 'W') => {
                self.bump();
                let sides = self.digits().ok_or_else(|| self.syntax_error())?;
                Ok(Term::Dice { count, sides })
            }
            _ => count.map(Term::Flat).ok_or_else(|| self.syntax_error()),
        }
    }
}
