//! Drives a form through its steps and performs the submission with the external services.

use log::{info, warn};
use time::OffsetDateTime;

use crate::record::{submission_id, SubmissionRecord};
use crate::{apply, Effect, FormEvent, FormState, Payload, SubmissionOutcome};

/// The answer of the human verification service.
#[derive(PartialEq, Debug, Clone)]
pub struct Verdict {
    pub passed: bool,
    pub reason: Option<String>,
    pub score: Option<f64>,
}

/// Checks that a submission comes from a human.
pub trait HumanVerifier {
    /// Returns an error when the service could not be reached.
    fn verify(&mut self, token: &str, remote_ip: Option<&str>) -> Result<Verdict, String>;
}

/// Stores a submission and notifies the people concerned.
pub trait SubmissionSink {
    /// Returns the identifier under which the record was stored, or a message to show.
    fn submit(&mut self, record: &SubmissionRecord) -> Result<String, String>;
}

impl<T: HumanVerifier + ?Sized> HumanVerifier for Box<T> {
    fn verify(&mut self, token: &str, remote_ip: Option<&str>) -> Result<Verdict, String> {
        (**self).verify(token, remote_ip)
    }
}

impl<T: SubmissionSink + ?Sized> SubmissionSink for Box<T> {
    fn submit(&mut self, record: &SubmissionRecord) -> Result<String, String> {
        (**self).submit(record)
    }
}

pub const VERIFICATION_FAILED: &str = "reCAPTCHA verification failed. Please try again.";

/// One applicant filling in one form.
///
/// Events are handled one at a time; a submission is carried out to completion before
/// the next event is looked at.
pub struct Session<V: HumanVerifier, S: SubmissionSink> {
    state: FormState,
    verifier: V,
    sink: S,
    clock: fn() -> OffsetDateTime,
}

impl<V: HumanVerifier, S: SubmissionSink> Session<V, S> {
    pub fn new(state: FormState, verifier: V, sink: S) -> Session<V, S> {
        Session {
            state,
            verifier,
            sink,
            clock: OffsetDateTime::now_utc,
        }
    }

    pub fn with_clock(self, clock: fn() -> OffsetDateTime) -> Session<V, S> {
        Session { clock, ..self }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn into_parts(self) -> (FormState, V, S) {
        (self.state, self.verifier, self.sink)
    }

    /// Applies an event and, if it starts a submission, runs it.
    pub fn dispatch(&mut self, event: FormEvent) -> &FormState {
        let t = apply(std::mem::take(&mut self.state), event);
        self.state = t.state;
        if let Some(effect) = t.effect {
            let outcome = self.perform(effect);
            let settled = apply(std::mem::take(&mut self.state), FormEvent::Settled(outcome));
            self.state = settled.state;
        }
        &self.state
    }

    fn perform(&mut self, effect: Effect) -> SubmissionOutcome {
        let now = (self.clock)();
        match effect {
            Effect::Discard => SubmissionOutcome::Accepted {
                submission_id: submission_id(now, &mut rand::thread_rng()),
            },
            Effect::Submit(payload) => self.submit(&payload, now),
        }
    }

    fn submit(&mut self, payload: &Payload, now: OffsetDateTime) -> SubmissionOutcome {
        let token = match payload.recaptcha_token.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => {
                return SubmissionOutcome::Rejected {
                    message: "reCAPTCHA token not found. Please check the box.".to_string(),
                }
            }
        };
        let ip = payload
            .values
            .get(&crate::Field::IpAddress)
            .map(|v| v.cell());
        match self.verifier.verify(token, ip.as_deref()) {
            Ok(v) if v.passed => {
                info!("submit: verification passed (score: {:?})", v.score);
            }
            Ok(v) => {
                warn!(
                    "submit: verification refused: reason: {:?} score: {:?}",
                    v.reason, v.score
                );
                return SubmissionOutcome::Rejected {
                    message: VERIFICATION_FAILED.to_string(),
                };
            }
            Err(e) => {
                warn!("submit: verification unavailable: {}", e);
                return SubmissionOutcome::Rejected {
                    message: VERIFICATION_FAILED.to_string(),
                };
            }
        }
        let id = submission_id(now, &mut rand::thread_rng());
        let record = match SubmissionRecord::assemble(payload, now, &id) {
            Ok(r) => r,
            Err(e) => {
                return SubmissionOutcome::Rejected {
                    message: format!("Could not prepare the submission: {}", e),
                }
            }
        };
        match self.sink.submit(&record) {
            Ok(submission_id) => SubmissionOutcome::Accepted { submission_id },
            Err(message) => {
                warn!("submit: persistence failed: {}", message);
                SubmissionOutcome::Rejected { message }
            }
        }
    }
}
