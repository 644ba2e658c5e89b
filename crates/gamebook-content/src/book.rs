//! The YAML book model and its validation.

use std::collections::BTreeMap;

use gamebook_workflow::domain::dice::DiceKind;
use gamebook_workflow::domain::state::{
    Character, Choice, ChoiceKind, DiceThresholds, NextAction, Rules,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ContentError;
use crate::markdown::to_plain_text;

/// Character changes applied when a section is entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Effects {
    /// Items picked up.
    #[serde(default)]
    pub add_items: Vec<String>,
    /// Items lost.
    #[serde(default)]
    pub remove_items: Vec<String>,
    /// Resource deltas.
    #[serde(default)]
    pub resources: BTreeMap<String, i32>,
    /// Attribute deltas.
    #[serde(default)]
    pub attributes: BTreeMap<String, i32>,
}

impl Effects {
    /// Whether entering the section changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// `character` after these effects.
    #[must_use]
    pub fn apply(&self, character: &Character) -> Character {
        let mut next = character.clone();
        for item in &self.add_items {
            if !next.has_item(item) {
                next.inventory.push(item.clone());
            }
        }
        next.inventory
            .retain(|held| !self.remove_items.iter().any(|gone| gone.eq_ignore_ascii_case(held)));
        for (name, delta) in &self.resources {
            *next.resources.entry(name.clone()).or_insert(0) += delta;
        }
        for (name, delta) in &self.attributes {
            *next.attributes.entry(name.clone()).or_insert(0) += delta;
        }
        next
    }
}

/// One way out of a section as written in the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceSpec {
    /// Text shown to the player.
    pub text: String,
    /// Section the choice leads to.
    pub target: u32,
    /// Direct or conditional.
    #[serde(default)]
    pub kind: ChoiceKind,
    /// Conditions gating a conditional choice.
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Die kind the choice is tied to.
    #[serde(default)]
    pub dice: Option<DiceKind>,
    /// Dice totals selecting the choice.
    #[serde(default)]
    pub range: Option<DiceThresholds>,
}

/// One numbered section as written in the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SectionSpec {
    /// Markdown text.
    #[serde(default)]
    pub text: String,
    /// Short description of the section's mechanics.
    #[serde(default)]
    pub summary: String,
    /// Die kind to roll before leaving.
    #[serde(default)]
    pub dice: Option<DiceKind>,
    /// Overrides whether a player response is required.
    #[serde(default)]
    pub needs_player_input: Option<bool>,
    /// Section-level conditions.
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Choices, in declaration order.
    #[serde(default)]
    pub choices: Vec<ChoiceSpec>,
    /// Effects applied on entry.
    #[serde(default)]
    pub on_enter: Effects,
}

impl SectionSpec {
    /// Whether a player response is required. Unless the book says
    /// otherwise, that is the case for sections offering several choices
    /// without a roll.
    #[must_use]
    pub fn needs_player_input(&self) -> bool {
        self.needs_player_input
            .unwrap_or(self.dice.is_none() && self.choices.len() > 1)
    }

    /// The engine rules for this section.
    #[must_use]
    pub fn to_rules(&self, section_number: u32) -> Rules {
        let needs_dice = self.dice.is_some();
        let needs_player_input = self.needs_player_input();
        let next_action = if needs_dice {
            NextAction::RollDice
        } else if needs_player_input {
            NextAction::Choose
        } else {
            NextAction::Continue
        };

        let choices = self
            .choices
            .iter()
            .map(|c| Choice {
                text: c.text.clone(),
                kind: c.kind,
                target_section: c.target,
                conditions: c.conditions.clone(),
                dice_kind: c.dice.or(c.range.and(self.dice)),
                dice_thresholds: c.range,
            })
            .collect();

        Rules {
            section_number,
            dice_kind: self.dice,
            needs_dice,
            needs_player_input,
            next_action,
            conditions: self.conditions.clone(),
            choices,
            summary: self.summary.clone(),
            error: None,
        }
    }

    /// The section text as plain text.
    #[must_use]
    pub fn plain_text(&self) -> String {
        to_plain_text(&self.text)
    }
}

/// A whole gamebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Identifier sessions refer to.
    pub game_id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Character every session starts with.
    #[serde(default)]
    pub character: Character,
    /// Sections by number.
    pub sections: BTreeMap<u32, SectionSpec>,
}

impl Book {
    /// Parses and validates a YAML book.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Yaml` for malformed YAML and
    /// `ContentError::Invalid` when the book breaks a structural rule.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ContentError> {
        let book: Self = serde_yaml::from_str(yaml)?;
        book.validate()?;
        Ok(book)
    }

    /// Checks the structural rules: a game id, a section 1, choice targets
    /// that exist, and ordered dice ranges.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Invalid` describing the first broken rule.
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.game_id.trim().is_empty() {
            return Err(ContentError::Invalid("game_id must not be empty".into()));
        }
        if !self.sections.contains_key(&1) {
            return Err(ContentError::Invalid("section 1 is missing".into()));
        }

        for (number, section) in &self.sections {
            for choice in &section.choices {
                if !self.sections.contains_key(&choice.target) {
                    return Err(ContentError::Invalid(format!(
                        "section {number}: choice \"{}\" targets missing section {}",
                        choice.text, choice.target
                    )));
                }
                if let Some(DiceThresholds {
                    min: Some(min),
                    max: Some(max),
                }) = choice.range
                {
                    if min > max {
                        return Err(ContentError::Invalid(format!(
                            "section {number}: choice \"{}\" has range {min}..={max}",
                            choice.text
                        )));
                    }
                }
                if choice.range.is_some() && choice.dice.is_none() && section.dice.is_none() {
                    return Err(ContentError::Invalid(format!(
                        "section {number}: choice \"{}\" has a range but no dice",
                        choice.text
                    )));
                }
            }
        }
        Ok(())
    }

    /// The section numbered `number`.
    #[must_use]
    pub fn section(&self, number: u32) -> Option<&SectionSpec> {
        self.sections.get(&number)
    }

    /// SHA-256 of every section, hex encoded.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Hash` if a section cannot be serialized.
    pub fn section_hashes(&self) -> Result<BTreeMap<u32, String>, ContentError> {
        self.sections
            .iter()
            .map(|(number, section)| -> Result<(u32, String), ContentError> {
                let mut hasher = Sha256::new();
                hasher.update(serde_json::to_vec(section)?);
                Ok((*number, format!("{:x}", hasher.finalize())))
            })
            .collect()
    }
}
