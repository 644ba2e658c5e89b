//! Section transition state machine.
//!
//! `AwaitingRules -> AwaitingDiceOrInput -> Resolving -> Advanced`, with
//! `Error` reachable whenever the rules for the current section failed, or
//! the step could resolve but its narrative failed.

use gamebook_core::error::DomainError;
use serde::{Deserialize, Serialize};

use super::choice::{MatchContext, first_matching_choice};
use super::dice::DiceKind;
use super::state::{Decision, NextAction, Rules, SessionState};

/// Where a step stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    /// No usable rules for the current section yet.
    AwaitingRules,
    /// Rules ask for dice and/or player input that has not arrived.
    AwaitingDiceOrInput,
    /// Everything required is present; a decision can be taken.
    Resolving,
    /// The section changed; terminal for the step.
    Advanced,
    /// The rules or narrative stage failed for the current section.
    Error,
}

impl StepPhase {
    /// Whether the caller must invoke `advance` again.
    #[must_use]
    pub fn is_pending(self) -> bool {
        self != Self::Advanced
    }
}

/// Whether `state` holds every input `rules` require. When both flags are
/// set, both inputs are required.
#[must_use]
pub fn inputs_satisfied(rules: &Rules, state: &SessionState) -> bool {
    let dice_ok = !rules.needs_dice || state.dice_result.is_some();
    let input_ok = !rules.needs_player_input || state.player_input.is_some();
    dice_ok && input_ok
}

/// Phase of the current step, derived from the merged state.
#[must_use]
pub fn evaluate(state: &SessionState) -> StepPhase {
    let rules_failed = state
        .rules
        .as_ref()
        .is_some_and(|r| r.section_number == state.section_number && r.error.is_some());
    if rules_failed {
        return StepPhase::Error;
    }

    let narrative_failed = state
        .narrative
        .as_ref()
        .is_some_and(|n| n.section_number == state.section_number && n.error.is_some());

    match state.fresh_rules() {
        None => StepPhase::AwaitingRules,
        Some(rules) if !inputs_satisfied(rules, state) => StepPhase::AwaitingDiceOrInput,
        Some(_) if narrative_failed => StepPhase::Error,
        Some(_) => StepPhase::Resolving,
    }
}

/// Checks newly supplied input against the section's rules.
///
/// # Errors
///
/// Returns `DomainError::UnexpectedInput` when a dice result arrives for a
/// section that does not call for dice (or calls for another kind), or a
/// player response arrives for a section that needs neither dice nor input.
pub fn validate_inputs(
    rules: &Rules,
    player_input: Option<&str>,
    dice_kind: Option<DiceKind>,
) -> Result<(), DomainError> {
    if let Some(kind) = dice_kind {
        if !rules.needs_dice {
            return Err(DomainError::UnexpectedInput(format!(
                "section {} does not call for dice",
                rules.section_number
            )));
        }
        if let Some(expected) = rules.dice_kind {
            if expected != kind {
                return Err(DomainError::UnexpectedInput(format!(
                    "section {} calls for {expected} dice, got {kind}",
                    rules.section_number
                )));
            }
        }
    }

    if player_input.is_some() && !rules.needs_dice && !rules.needs_player_input {
        return Err(DomainError::UnexpectedInput(format!(
            "section {} does not accept player input",
            rules.section_number
        )));
    }

    Ok(())
}

/// Maps the state's input, dice and character onto `rules.choices`. The first
/// matching choice in declaration order wins.
///
/// # Errors
///
/// Returns `DomainError::NoApplicableChoice` when no choice matches.
pub fn resolve_decision(state: &SessionState, rules: &Rules) -> Result<Decision, DomainError> {
    let ctx = MatchContext {
        rules,
        character: &state.character,
        player_input: state.player_input.as_deref(),
        dice: state.dice_result.as_ref(),
    };

    let (_, choice) =
        first_matching_choice(&ctx).ok_or(DomainError::NoApplicableChoice {
            section: state.section_number,
        })?;

    let summary = if choice.text.trim().is_empty() {
        format!("section {} leads to {}", state.section_number, choice.target_section)
    } else {
        choice.text.clone()
    };

    Ok(Decision {
        section_number: state.section_number,
        step: state.step,
        next_section: Some(choice.target_section),
        awaiting_action: None,
        conditions: choice.conditions.clone(),
        summary,
    })
}

/// The decision recorded while a step waits for dice or player input.
#[must_use]
pub fn pending_decision(state: &SessionState, rules: &Rules) -> Decision {
    let awaiting = if rules.needs_dice && state.dice_result.is_none() {
        NextAction::RollDice
    } else {
        NextAction::Choose
    };

    Decision {
        section_number: state.section_number,
        step: state.step,
        next_section: None,
        awaiting_action: Some(awaiting),
        conditions: rules.conditions.clone(),
        summary: rules.summary.clone(),
    }
}

/// Moves the state to the section picked by its resolved decision, consuming
/// the input and dice. Returns the new section, or `None` (state untouched)
/// when no decision resolves the current step.
pub fn apply_advance(state: &mut SessionState) -> Option<u32> {
    let next = state.resolved_decision()?.next_section?;
    state.section_number = next;
    state.player_input = None;
    state.dice_result = None;
    state.step += 1;
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dice::DiceOutcome;
    use crate::domain::state::{Character, Choice, ChoiceKind, DiceThresholds, Narrative};
    use chrono::Utc;

    fn choice(text: &str, target: u32) -> Choice {
        Choice {
            text: text.to_owned(),
            kind: ChoiceKind::Direct,
            target_section: target,
            conditions: vec![],
            dice_kind: None,
            dice_thresholds: None,
        }
    }

    fn input_rules(section: u32) -> Rules {
        Rules {
            section_number: section,
            needs_player_input: true,
            next_action: NextAction::Choose,
            choices: vec![
                choice("Entrer dans la forêt", 48),
                choice("Continuer ma route", 398),
            ],
            ..Rules::default()
        }
    }

    fn combat_rules(section: u32) -> Rules {
        let win = Choice {
            dice_kind: Some(DiceKind::Combat),
            dice_thresholds: Some(DiceThresholds {
                min: Some(7),
                max: None,
            }),
            ..choice("Victoire", 200)
        };
        let lose = Choice {
            dice_kind: Some(DiceKind::Combat),
            dice_thresholds: Some(DiceThresholds {
                min: None,
                max: Some(6),
            }),
            ..choice("Défaite", 13)
        };
        Rules {
            section_number: section,
            dice_kind: Some(DiceKind::Combat),
            needs_dice: true,
            next_action: NextAction::RollDice,
            choices: vec![win, lose],
            ..Rules::default()
        }
    }

    fn state_at(section: u32) -> SessionState {
        let mut state = SessionState::new("s-1".into(), "forest".into(), Character::default());
        state.section_number = section;
        state
    }

    #[test]
    fn test_phase_without_rules_is_awaiting_rules() {
        assert_eq!(evaluate(&state_at(1)), StepPhase::AwaitingRules);
    }

    #[test]
    fn test_rules_for_previous_section_do_not_count() {
        let mut state = state_at(398);
        state.rules = Some(input_rules(1));

        assert_eq!(evaluate(&state), StepPhase::AwaitingRules);
    }

    #[test]
    fn test_failed_rules_put_the_step_in_error() {
        let mut state = state_at(1);
        state.rules = Some(Rules::unavailable(1, "index offline".into()));

        assert_eq!(evaluate(&state), StepPhase::Error);
        assert!(StepPhase::Error.is_pending());
    }

    #[test]
    fn test_failed_narrative_blocks_an_otherwise_resolvable_step() {
        let mut state = state_at(1);
        state.rules = Some(input_rules(1));
        state.player_input = Some("continuer".into());
        state.narrative = Some(Narrative::unavailable(1, "stage narrative timed out".into(), Utc::now()));

        assert_eq!(evaluate(&state), StepPhase::Error);

        state.narrative.as_mut().unwrap().section_number = 48;
        assert_eq!(evaluate(&state), StepPhase::Resolving);
    }

    #[test]
    fn test_missing_input_keeps_step_waiting() {
        let mut state = state_at(1);
        state.rules = Some(input_rules(1));

        assert_eq!(evaluate(&state), StepPhase::AwaitingDiceOrInput);

        state.player_input = Some("continuer".into());
        assert_eq!(evaluate(&state), StepPhase::Resolving);
    }

    #[test]
    fn test_both_flags_require_both_inputs() {
        let mut rules = combat_rules(5);
        rules.needs_player_input = true;
        let mut state = state_at(5);
        state.rules = Some(rules);
        state.dice_result = Some(DiceOutcome::from_total(DiceKind::Combat, 8));

        assert_eq!(evaluate(&state), StepPhase::AwaitingDiceOrInput);

        state.player_input = Some("victoire".into());
        assert_eq!(evaluate(&state), StepPhase::Resolving);
    }

    #[test]
    fn test_auto_resolving_section_goes_straight_to_resolving() {
        let mut state = state_at(7);
        state.rules = Some(Rules {
            section_number: 7,
            choices: vec![choice("Tournez la page", 8)],
            ..Rules::default()
        });

        assert_eq!(evaluate(&state), StepPhase::Resolving);
    }

    #[test]
    fn test_dice_for_a_section_without_dice_is_unexpected() {
        let result = validate_inputs(&input_rules(1), None, Some(DiceKind::Chance));

        assert!(matches!(result, Err(DomainError::UnexpectedInput(_))));
    }

    #[test]
    fn test_dice_of_the_wrong_kind_is_unexpected() {
        let result = validate_inputs(&combat_rules(5), None, Some(DiceKind::Chance));

        assert!(matches!(result, Err(DomainError::UnexpectedInput(_))));
    }

    #[test]
    fn test_input_for_a_section_needing_nothing_is_unexpected() {
        let rules = Rules {
            section_number: 7,
            choices: vec![choice("Tournez la page", 8)],
            ..Rules::default()
        };

        let result = validate_inputs(&rules, Some("hello"), None);

        assert!(matches!(result, Err(DomainError::UnexpectedInput(_))));
    }

    #[test]
    fn test_expected_inputs_pass_validation() {
        assert!(validate_inputs(&input_rules(1), Some("continuer"), None).is_ok());
        assert!(validate_inputs(&combat_rules(5), None, Some(DiceKind::Combat)).is_ok());
    }

    #[test]
    fn test_player_input_selects_the_matching_choice() {
        let rules = input_rules(1);
        let mut state = state_at(1);
        state.player_input = Some("continuer ma route".into());

        let decision = resolve_decision(&state, &rules).unwrap();

        assert_eq!(decision.next_section, Some(398));
        assert_eq!(decision.section_number, 1);
        assert_eq!(decision.step, 0);
        assert!(decision.awaiting_action.is_none());
    }

    #[test]
    fn test_tie_break_picks_first_declared_choice() {
        // Arrange
        let rules = Rules {
            section_number: 3,
            needs_player_input: true,
            choices: vec![choice("ouvrir la porte", 10), choice("ouvrir la porte", 20)],
            ..Rules::default()
        };
        let mut state = state_at(3);
        state.player_input = Some("ouvrir la porte".into());

        // Act
        let decision = resolve_decision(&state, &rules).unwrap();

        // Assert
        assert_eq!(decision.next_section, Some(10));
    }

    #[test]
    fn test_dice_total_selects_the_threshold_choice() {
        let rules = combat_rules(5);
        let mut state = state_at(5);
        state.dice_result = Some(DiceOutcome::from_total(DiceKind::Combat, 7));

        let decision = resolve_decision(&state, &rules).unwrap();

        assert_eq!(decision.next_section, Some(200));
    }

    #[test]
    fn test_no_match_is_no_applicable_choice() {
        let rules = input_rules(1);
        let mut state = state_at(1);
        state.player_input = Some("voler".into());

        let result = resolve_decision(&state, &rules);

        assert!(matches!(
            result,
            Err(DomainError::NoApplicableChoice { section: 1 })
        ));
    }

    #[test]
    fn test_pending_decision_reports_what_is_awaited() {
        let state = state_at(5);

        let decision = pending_decision(&state, &combat_rules(5));

        assert_eq!(decision.awaiting_action, Some(NextAction::RollDice));
        assert!(decision.next_section.is_none());

        let decision = pending_decision(&state_at(1), &input_rules(1));
        assert_eq!(decision.awaiting_action, Some(NextAction::Choose));
    }

    #[test]
    fn test_apply_advance_moves_section_and_consumes_inputs() {
        let mut state = state_at(1);
        state.player_input = Some("continuer ma route".into());
        state.dice_result = Some(DiceOutcome::from_total(DiceKind::Chance, 3));
        state.decision = Some(resolve_decision(&state, &input_rules(1)).unwrap());

        let next = apply_advance(&mut state);

        assert_eq!(next, Some(398));
        assert_eq!(state.section_number, 398);
        assert_eq!(state.step, 1);
        assert!(state.player_input.is_none());
        assert!(state.dice_result.is_none());
    }

    #[test]
    fn test_apply_advance_without_decision_is_a_no_op() {
        let mut state = state_at(1);
        let before = state.clone();

        assert_eq!(apply_advance(&mut state), None);
        assert_eq!(state, before);
    }

    #[test]
    fn test_sections_may_jump_backwards() {
        let mut state = state_at(300);
        state.player_input = Some("retour".into());
        let rules = Rules {
            section_number: 300,
            needs_player_input: true,
            choices: vec![choice("Retour", 12)],
            ..Rules::default()
        };
        state.decision = Some(resolve_decision(&state, &rules).unwrap());

        assert_eq!(apply_advance(&mut state), Some(12));
    }
}
