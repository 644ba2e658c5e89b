//! Choice matching: which of a section's choices applies to the player's
//! input, dice result and character.

use super::dice::DiceOutcome;
use super::state::{Character, Choice, ChoiceKind, Rules};

const COMPARISONS: [&str; 6] = [">=", "<=", "!=", "==", ">", "<"];

/// Lowercases and reduces `text` to single-space separated words.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Evaluates one condition against the character.
///
/// Grammar: `item` (carried), `!item` (not carried), or `name OP value` with
/// `OP` one of `>= <= != == > <`, compared against an attribute or resource
/// (missing names count as `0`).
#[must_use]
pub fn condition_holds(condition: &str, character: &Character) -> bool {
    let condition = condition.trim();
    if condition.is_empty() {
        return true;
    }
    if let Some(item) = condition.strip_prefix('!') {
        return !character.has_item(item);
    }

    for op in COMPARISONS {
        if let Some((name, value)) = condition.split_once(op) {
            let Ok(expected) = value.trim().parse::<i32>() else {
                return false;
            };
            let actual = character.value_of(name).unwrap_or(0);
            return match op {
                ">=" => actual >= expected,
                "<=" => actual <= expected,
                "!=" => actual != expected,
                "==" => actual == expected,
                ">" => actual > expected,
                _ => actual < expected,
            };
        }
    }

    character.has_item(condition)
}

/// Whether the player's input designates `choice`: either the target section
/// number, or text that contains (or is contained in) the choice text on word
/// boundaries.
#[must_use]
pub fn matches_input(choice: &Choice, input: &str) -> bool {
    let input = normalize(input);
    if input.is_empty() {
        return false;
    }
    if input.parse::<u32>().is_ok_and(|n| n == choice.target_section) {
        return true;
    }

    let text = normalize(&choice.text);
    if text.is_empty() {
        return false;
    }
    let padded_text = format!(" {text} ");
    let padded_input = format!(" {input} ");
    padded_text.contains(&padded_input) || padded_input.contains(&padded_text)
}

/// Everything a choice is matched against.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// Rules of the current section.
    pub rules: &'a Rules,
    /// Current character.
    pub character: &'a Character,
    /// Player input, consulted only when the rules ask for it.
    pub player_input: Option<&'a str>,
    /// Dice result, consulted only when the rules ask for it.
    pub dice: Option<&'a DiceOutcome>,
}

/// Whether `choice` applies in `ctx`.
#[must_use]
pub fn choice_applies(choice: &Choice, ctx: &MatchContext<'_>) -> bool {
    let available = match choice.kind {
        ChoiceKind::Direct => true,
        ChoiceKind::Conditional => choice
            .conditions
            .iter()
            .all(|c| condition_holds(c, ctx.character)),
    };
    if !available {
        return false;
    }

    if ctx.rules.needs_player_input {
        match ctx.player_input {
            Some(input) if matches_input(choice, input) => {}
            _ => return false,
        }
    }

    if ctx.rules.needs_dice {
        if let Some(thresholds) = choice.dice_thresholds {
            match ctx.dice {
                Some(dice) if thresholds.contains(dice.total) => {}
                _ => return false,
            }
        }
    }

    true
}

/// The first applicable choice in declaration order, with its index.
#[must_use]
pub fn first_matching_choice<'a>(ctx: &MatchContext<'a>) -> Option<(usize, &'a Choice)> {
    ctx.rules
        .choices
        .iter()
        .enumerate()
        .find(|(_, choice)| choice_applies(choice, ctx))
}
