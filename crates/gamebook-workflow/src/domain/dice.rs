//! Dice resolution.
//!
//! Rolling is pure with respect to the injected `DeterministicRng`: the same
//! sequence of RNG values always yields the same outcomes.

use std::fmt;
use std::str::FromStr;

use gamebook_core::error::DomainError;
use gamebook_core::rng::DeterministicRng;
use serde::{Deserialize, Serialize};

/// Number of faces on every die the engine rolls.
pub const DIE_FACES: u32 = 6;

/// The kinds of roll a section may call for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiceKind {
    /// A luck test: one six-sided die.
    Chance,
    /// A combat round: two six-sided dice.
    Combat,
}

impl DiceKind {
    /// How many dice this kind rolls.
    #[must_use]
    pub fn dice_count(self) -> usize {
        match self {
            Self::Chance => 1,
            Self::Combat => 2,
        }
    }

    /// Stable name used on the wire and in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chance => "chance",
            Self::Combat => "combat",
        }
    }
}

impl fmt::Display for DiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chance" | "1d6" => Ok(Self::Chance),
            "combat" | "2d6" => Ok(Self::Combat),
            other => Err(DomainError::InvalidDiceKind(other.to_owned())),
        }
    }
}

/// The result of one roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceOutcome {
    /// The kind that was rolled.
    pub kind: DiceKind,
    /// Individual die faces, in roll order. Empty when only a total was
    /// reported by the caller.
    #[serde(default)]
    pub rolls: Vec<u32>,
    /// Sum of all faces.
    pub total: u32,
}

impl DiceOutcome {
    /// An outcome reported by the caller as a bare total.
    #[must_use]
    pub fn from_total(kind: DiceKind, total: u32) -> Self {
        Self {
            kind,
            rolls: Vec::new(),
            total,
        }
    }

    /// Checks that a caller-reported outcome could have been rolled.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when the total lies outside what the
    /// kind can produce, or the individual faces disagree with it.
    pub fn validate(&self) -> Result<(), DomainError> {
        let count = u32::try_from(self.kind.dice_count()).unwrap_or(u32::MAX);
        let range = count..=count.saturating_mul(DIE_FACES);
        if !range.contains(&self.total) {
            return Err(DomainError::Validation(format!(
                "{} total {} outside {}..={}",
                self.kind,
                self.total,
                range.start(),
                range.end()
            )));
        }
        if self.rolls.is_empty() {
            return Ok(());
        }
        let faces_ok = self.rolls.len() == self.kind.dice_count()
            && self.rolls.iter().all(|face| (1..=DIE_FACES).contains(face));
        if !faces_ok || self.rolls.iter().sum::<u32>() != self.total {
            return Err(DomainError::Validation(format!(
                "{} rolls {:?} do not add up to {}",
                self.kind, self.rolls, self.total
            )));
        }
        Ok(())
    }
}

/// Rolls `kind` using `rng`.
pub fn roll(kind: DiceKind, rng: &mut dyn DeterministicRng) -> DiceOutcome {
    let rolls: Vec<u32> = (0..kind.dice_count())
        .map(|_| rng.next_u32_range(1, DIE_FACES))
        .collect();
    let total = rolls.iter().sum();
    DiceOutcome { kind, rolls, total }
}
