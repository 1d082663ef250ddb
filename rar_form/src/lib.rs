mod config;

pub mod backfill;
pub mod builder;
pub mod headers;
pub mod manual;
pub mod record;
pub mod session;
pub mod validation;

use log::{debug, info, warn};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use crate::config::*;
use crate::validation::{step_block, validate_step, FieldFailure};

// **** Form state ****

/// How a submission attempt ended.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum SubmissionOutcome {
    /// The submission was recorded (or silently discarded) under this identifier.
    Accepted { submission_id: String },
    /// The submission did not go through. The message is shown to the applicant as is.
    Rejected { message: String },
}

/// The state of one application form.
///
/// It only changes through [apply].
#[derive(PartialEq, Debug, Clone)]
pub struct FormState {
    current_step: usize,
    fields: BTreeMap<Field, FieldValue>,
    recaptcha_token: Option<String>,
    honeypot: String,
    in_flight: bool,
    outcome: Option<SubmissionOutcome>,
    failures: Vec<FieldFailure>,
    blocked: Option<String>,
}

impl Default for FormState {
    fn default() -> Self {
        FormState::new()
    }
}

impl FormState {
    /// A fresh form, as shown when the page is opened.
    pub fn new() -> FormState {
        let mut fields = BTreeMap::new();
        fields.insert(Field::DeviceCount, FieldValue::Integer(1));
        for f in Field::ALL.iter() {
            if f.spec().rule == Rule::MustBeTrue {
                fields.insert(*f, FieldValue::Flag(false));
            }
        }
        FormState {
            current_step: 1,
            fields,
            recaptcha_token: None,
            honeypot: String::new(),
            in_flight: false,
            outcome: None,
            failures: Vec::new(),
            blocked: None,
        }
    }

    /// 1-indexed. Equal to `TOTAL_STEPS + 1` once the application went through.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_completed(&self) -> bool {
        self.current_step > TOTAL_STEPS
    }

    pub fn value(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn values(&self) -> &BTreeMap<Field, FieldValue> {
        &self.fields
    }

    pub fn choice(&self, field: Field) -> Option<&str> {
        match self.fields.get(&field) {
            Some(FieldValue::Choice(s)) | Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn device_count(&self) -> Option<i64> {
        match self.fields.get(&Field::DeviceCount) {
            Some(FieldValue::Integer(n)) => Some(*n),
            Some(FieldValue::Text(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn recaptcha_token(&self) -> Option<&str> {
        self.recaptcha_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn honeypot(&self) -> &str {
        &self.honeypot
    }

    /// A submission is waiting for its outcome. Submitting again is disabled.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn outcome(&self) -> Option<&SubmissionOutcome> {
        self.outcome.as_ref()
    }

    /// The failures reported by the last attempt to leave the current step.
    pub fn failures(&self) -> &[FieldFailure] {
        &self.failures
    }

    /// The business rule that stopped the last attempt to leave the current step.
    pub fn blocked(&self) -> Option<&str> {
        self.blocked.as_deref()
    }

    /// The part of the form that may survive a reload.
    ///
    /// Consent checkboxes, the verification token and the honeypot are never kept.
    pub fn draft(&self) -> Draft {
        let fields = self
            .fields
            .iter()
            .filter(|(f, _)| f.spec().rule != Rule::MustBeTrue)
            .map(|(f, v)| (f.name().to_string(), v.clone()))
            .collect();
        Draft {
            current_step: self.current_step.min(TOTAL_STEPS),
            fields,
        }
    }

    /// Rebuilds a form from a saved draft. Unknown names and consent fields are dropped.
    pub fn from_draft(draft: &Draft) -> FormState {
        let mut state = FormState::new();
        for (name, value) in draft.fields.iter() {
            match Field::from_name(name) {
                Some(f) if f.spec().rule != Rule::MustBeTrue => {
                    state.fields.insert(f, value.clone());
                }
                Some(_) => {}
                None => {
                    warn!("from_draft: dropping unknown field {:?}", name);
                }
            }
        }
        state.current_step = draft.current_step.clamp(1, TOTAL_STEPS);
        state
    }

    fn completed(submission_id: String) -> FormState {
        FormState {
            current_step: TOTAL_STEPS + 1,
            outcome: Some(SubmissionOutcome::Accepted { submission_id }),
            ..FormState::new()
        }
    }

    /// The answers handed over at submission time, with the exclusions of every step applied.
    fn payload(&self) -> Payload {
        let mut values = self.fields.clone();
        for s in STEPS.iter() {
            for (field, excluded) in s.conditional_exclusions.iter() {
                if excluded(self) {
                    values.insert(*field, FieldValue::Choice(NOT_APPLICABLE.to_string()));
                }
            }
        }
        Payload {
            values,
            recaptcha_token: self.recaptcha_token.clone(),
        }
    }
}

/// A saved, in-progress form.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    #[serde(rename = "currentStep")]
    pub current_step: usize,
    pub fields: BTreeMap<String, FieldValue>,
}

/// The answers of a form that passed every step.
#[derive(PartialEq, Debug, Clone)]
pub struct Payload {
    pub values: BTreeMap<Field, FieldValue>,
    pub recaptcha_token: Option<String>,
}

// **** Transitions ****

#[derive(PartialEq, Debug, Clone)]
pub enum FormEvent {
    Set(Field, FieldValue),
    SetToken(Option<String>),
    SetHoneypot(String),
    Next,
    Back,
    /// The submission started by the last step has ended.
    Settled(SubmissionOutcome),
    Clear,
}

/// Work the caller has to perform after a transition.
#[derive(PartialEq, Debug, Clone)]
pub enum Effect {
    /// Verify the applicant, then persist the answers.
    Submit(Payload),
    /// The honeypot was filled: report success without verifying or persisting anything.
    Discard,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Transition {
    pub state: FormState,
    pub effect: Option<Effect>,
}

impl Transition {
    fn stay(state: FormState) -> Transition {
        Transition {
            state,
            effect: None,
        }
    }
}

/// Applies one event to the form.
///
/// This never fails: problems with the answers are recorded in the returned state.
pub fn apply(state: FormState, event: FormEvent) -> Transition {
    let mut state = state;
    match event {
        FormEvent::Set(field, value) => {
            state.failures.retain(|f| f.field != field);
            state.fields.insert(field, value);
            if field == Field::DeviceCount && state.device_count().map_or(true, |n| n <= 1) {
                state.blocked = None;
            }
            Transition::stay(state)
        }
        FormEvent::SetToken(token) => {
            state.recaptcha_token = token;
            Transition::stay(state)
        }
        FormEvent::SetHoneypot(s) => {
            state.honeypot = s;
            Transition::stay(state)
        }
        FormEvent::Back => {
            if state.current_step > 1 && !state.is_completed() {
                state.current_step -= 1;
                state.failures.clear();
                state.blocked = None;
            }
            Transition::stay(state)
        }
        FormEvent::Next => next(state),
        FormEvent::Settled(outcome) => {
            state.in_flight = false;
            match outcome {
                SubmissionOutcome::Accepted { submission_id } => {
                    info!("apply: submission {} accepted", submission_id);
                    Transition::stay(FormState::completed(submission_id))
                }
                rejected => {
                    warn!("apply: submission rejected: {:?}", rejected);
                    state.outcome = Some(rejected);
                    Transition::stay(state)
                }
            }
        }
        FormEvent::Clear => Transition::stay(FormState::new()),
    }
}

fn next(mut state: FormState) -> Transition {
    if state.in_flight {
        debug!("next: a submission is already in flight, ignoring");
        return Transition::stay(state);
    }
    let current = match step(state.current_step) {
        Some(s) => s,
        None => return Transition::stay(state),
    };
    state.failures = validate_step(&state, current);
    state.blocked = step_block(&state, current).map(|s| s.to_string());
    if !state.failures.is_empty() || state.blocked.is_some() {
        debug!(
            "next: step {} blocked: failures: {:?} rule: {:?}",
            current.index, state.failures, state.blocked
        );
        return Transition::stay(state);
    }
    if current.index < TOTAL_STEPS {
        state.current_step += 1;
        return Transition::stay(state);
    }
    state.in_flight = true;
    state.outcome = None;
    if !state.honeypot.is_empty() {
        info!("next: hidden field filled in, discarding the submission");
        return Transition {
            state,
            effect: Some(Effect::Discard),
        };
    }
    let payload = state.payload();
    Transition {
        state,
        effect: Some(Effect::Submit(payload)),
    }
}
