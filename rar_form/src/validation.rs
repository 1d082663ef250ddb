use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::config::*;
use crate::FormState;

/// A field that did not pass its rule, with the reason shown next to it.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FieldFailure {
    pub field: Field,
    pub reason: String,
}

fn uk_phone() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?:\+44\s?|0)\d{2,4}\s?\d{3,4}\s?\d{3,4})$").expect("valid phone pattern")
    })
}

fn email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

enum Violation {
    Invalid,
    TooLong(usize),
}

fn check(rule: Rule, value: Option<&FieldValue>) -> Result<(), Violation> {
    match rule {
        Rule::Hidden | Rule::Optional => Ok(()),
        Rule::Text { min, max } => match value {
            Some(FieldValue::Text(s)) => {
                let len = s.trim().chars().count();
                if len < min {
                    Err(Violation::Invalid)
                } else if len > max {
                    Err(Violation::TooLong(max))
                } else {
                    Ok(())
                }
            }
            _ => Err(Violation::Invalid),
        },
        Rule::Email { max } => match value {
            Some(FieldValue::Text(s)) if s.chars().count() > max => Err(Violation::TooLong(max)),
            Some(FieldValue::Text(s)) if email().is_match(s.trim()) => Ok(()),
            _ => Err(Violation::Invalid),
        },
        Rule::Integer { min } => {
            let n = match value {
                Some(FieldValue::Integer(n)) => Some(*n),
                // Numbers typed in a text box are coerced.
                Some(FieldValue::Text(s)) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            match n {
                Some(n) if n >= min => Ok(()),
                _ => Err(Violation::Invalid),
            }
        }
        Rule::UkPhone => match value {
            Some(FieldValue::Text(s)) if uk_phone().is_match(s.trim()) => Ok(()),
            _ => Err(Violation::Invalid),
        },
        Rule::OneOf(choices) => match value {
            Some(FieldValue::Choice(s)) | Some(FieldValue::Text(s))
                if choices.contains(&s.as_str()) =>
            {
                Ok(())
            }
            _ => Err(Violation::Invalid),
        },
        Rule::MustBeTrue => match value {
            Some(FieldValue::Flag(true)) => Ok(()),
            _ => Err(Violation::Invalid),
        },
    }
}

/// Checks one field against its rule.
pub fn validate_field(state: &FormState, field: Field) -> Option<FieldFailure> {
    let spec = field.spec();
    match check(spec.rule, state.value(field)) {
        Ok(()) => None,
        Err(Violation::Invalid) => Some(FieldFailure {
            field,
            reason: spec.message.to_string(),
        }),
        Err(Violation::TooLong(max)) => Some(FieldFailure {
            field,
            reason: format!("Must be at most {} characters.", max),
        }),
    }
}

/// The required fields of a step, minus the ones excluded for the current state.
pub fn effective_fields(state: &FormState, step: &StepDefinition) -> Vec<Field> {
    step.required_fields
        .iter()
        .filter(|f| {
            !step
                .conditional_exclusions
                .iter()
                .any(|(excluded, pred)| *excluded == **f && pred(state))
        })
        .cloned()
        .collect()
}

/// All the failing fields of a step, in the order of the step.
pub fn validate_step(state: &FormState, step: &StepDefinition) -> Vec<FieldFailure> {
    let failures: Vec<FieldFailure> = effective_fields(state, step)
        .into_iter()
        .filter_map(|f| validate_field(state, f))
        .collect();
    debug!(
        "validate_step: step {} failures: {:?}",
        step.index, failures
    );
    failures
}

/// Business rules that stop a step even when all its fields are valid.
pub fn step_block(state: &FormState, step: &StepDefinition) -> Option<&'static str> {
    if step.required_fields.contains(&Field::DeviceCount) {
        if let Some(n) = state.device_count() {
            if n > 1 {
                return Some(DEVICE_COUNT_MESSAGE);
            }
        }
    }
    if step.requires_verification && state.recaptcha_token().is_none() {
        return Some(VERIFICATION_MESSAGE);
    }
    None
}
