pub use crate::config::*;
use crate::{apply, FormEvent, FormState};

/// A builder for filling in a form.
///
/// Raw answers are coerced according to the rule of each field.
///
/// ```
/// use rar_form::builder::FormBuilder;
/// use rar_form::{Field, FieldValue};
/// # use rar_form::FormError;
///
/// let state = FormBuilder::new()
///     .answer("Full_Name", "Ada Lovelace")?
///     .answer("Device_Count", "1")?
///     .answer("Acknowledge_Security_Risks", "on")?
///     .build();
///
/// assert_eq!(state.value(Field::DeviceCount), Some(&FieldValue::Integer(1)));
/// assert_eq!(state.value(Field::AcknowledgeSecurityRisks), Some(&FieldValue::Flag(true)));
///
/// # Ok::<(), FormError>(())
/// ```
pub struct FormBuilder {
    state: FormState,
}

impl Default for FormBuilder {
    fn default() -> Self {
        FormBuilder::new()
    }
}

impl FormBuilder {
    pub fn new() -> FormBuilder {
        FormBuilder {
            state: FormState::new(),
        }
    }

    /// Starts from an existing form, for example one restored from a draft.
    pub fn from_state(state: FormState) -> FormBuilder {
        FormBuilder { state }
    }

    /// A form where every step passes, for a desktop computer.
    pub fn complete() -> FormBuilder {
        let text = |s: &str| FieldValue::Text(s.to_string());
        let choice = |s: &str| FieldValue::Choice(s.to_string());
        let mut b = FormBuilder::new()
            .value(Field::IpAddress, text("203.0.113.7"))
            .value(Field::FullName, text("Ada Lovelace"))
            .value(Field::CaEmail, text("ada@ca.example.org"))
            .value(Field::ContactEmail, text("ada@example.org"))
            .value(Field::ContactNumber, text("07700 900123"))
            .value(Field::PreferredContactMethod, choice("CA_Email"))
            .value(Field::ReasonForByod, text("Working from the branch office"))
            .value(Field::DeviceType, choice(DEVICE_TYPE_COMPUTER))
            .value(Field::DeviceCount, FieldValue::Integer(1))
            .value(Field::DeviceModelName, text("Dell XPS 15"))
            .value(Field::OsAndVersion, text("Windows 11 23H2"))
            .value(Field::WebBrowserAndVersion, text("Firefox/125.0"))
            .value(Field::MalwareProtectionSoftware, text("Defender"))
            .value(Field::EmailClientUsed, text("Outlook"))
            .value(Field::OfficeAppsUsed, text("Microsoft 365"))
            .value(Field::CommentsFeedback, text(""))
            .token("test-token");
        for s in STEPS.iter() {
            for f in s.required_fields.iter() {
                match f.spec().rule {
                    Rule::OneOf(_) if b.state.value(*f).is_none() => {
                        b = b.value(*f, choice("Yes"));
                    }
                    Rule::MustBeTrue => {
                        b = b.value(*f, FieldValue::Flag(true));
                    }
                    _ => {}
                }
            }
        }
        b
    }

    /// Sets the answer to a question, given its column name and the raw text entered.
    ///
    /// The hidden trap field and the verification token are recognized by name.
    pub fn answer(self, name: &str, raw: &str) -> Result<FormBuilder, FormError> {
        if name == HONEYPOT_NAME {
            return Ok(self.honeypot(raw));
        }
        if name == TOKEN_NAME {
            return Ok(self.token(raw));
        }
        let field = Field::from_name(name).ok_or_else(|| FormError::UnknownField(name.to_string()))?;
        Ok(self.value(field, coerce(field, raw)))
    }

    pub fn value(self, field: Field, value: FieldValue) -> FormBuilder {
        self.event(FormEvent::Set(field, value))
    }

    pub fn token(self, token: &str) -> FormBuilder {
        let t = if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        };
        self.event(FormEvent::SetToken(t))
    }

    pub fn honeypot(self, content: &str) -> FormBuilder {
        self.event(FormEvent::SetHoneypot(content.to_string()))
    }

    pub fn build(self) -> FormState {
        self.state
    }

    fn event(self, e: FormEvent) -> FormBuilder {
        FormBuilder {
            state: apply(self.state, e).state,
        }
    }
}

/// Interprets raw text for a given field.
pub fn coerce(field: Field, raw: &str) -> FieldValue {
    match field.spec().rule {
        Rule::Integer { .. } => match raw.trim().parse::<i64>() {
            Ok(n) => FieldValue::Integer(n),
            // Kept as text so that validation reports it.
            Err(_) => FieldValue::Text(raw.to_string()),
        },
        Rule::MustBeTrue => FieldValue::Flag(matches!(
            raw.trim().to_lowercase().as_str(),
            "true" | "yes" | "on" | "1"
        )),
        Rule::OneOf(_) => FieldValue::Choice(raw.to_string()),
        _ => FieldValue::Text(raw.to_string()),
    }
}
