// ********* Submission records ***********

use log::debug;
use rand::Rng;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::config::*;
use crate::Payload;

/// One row of the response sheet, in the order of `HEADERS`.
///
/// Records are created once, at submission time, and never modified.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SubmissionRecord {
    cells: Vec<(String, String)>,
}

impl SubmissionRecord {
    /// Flattens the answers of a form, stamping it with the given time and identifier.
    pub fn assemble(
        payload: &Payload,
        now: OffsetDateTime,
        submission_id: &str,
    ) -> Result<SubmissionRecord, time::error::Format> {
        let submitted = iso_timestamp(now)?;
        let due = iso_timestamp(now + RESPONSE_WINDOW)?;
        let cells = HEADERS
            .iter()
            .map(|header| {
                let cell = match *header {
                    SUBMISSION_ID_HEADER => submission_id.to_string(),
                    SUBMISSION_TIMESTAMP_HEADER => submitted.clone(),
                    RESPONSE_DUE_HEADER => due.clone(),
                    name => match Field::from_name(name) {
                        Some(field) => match payload.values.get(&field) {
                            Some(v) => v.cell(),
                            None => field.spec().default.unwrap_or(NOT_APPLICABLE).to_string(),
                        },
                        None => NOT_APPLICABLE.to_string(),
                    },
                };
                (header.to_string(), cell)
            })
            .collect();
        Ok(SubmissionRecord { cells })
    }

    /// Builds a record from named values, as received over the wire.
    ///
    /// Names outside of `HEADERS` are ignored; missing columns are filled with `N/A`.
    pub fn from_pairs<I>(pairs: I) -> SubmissionRecord
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut received: Vec<(String, String)> = pairs.into_iter().collect();
        let cells = HEADERS
            .iter()
            .map(|header| {
                let cell = match received.iter().position(|(k, _)| k == header) {
                    Some(idx) => received.swap_remove(idx).1,
                    None => NOT_APPLICABLE.to_string(),
                };
                (header.to_string(), cell)
            })
            .collect();
        if !received.is_empty() {
            debug!(
                "from_pairs: ignoring unknown names: {:?}",
                received.iter().map(|p| &p.0).collect::<Vec<_>>()
            );
        }
        SubmissionRecord { cells }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(k, _)| k == header)
            .map(|(_, v)| v.as_str())
    }

    /// The identifier of this record, if one was assigned.
    pub fn submission_id(&self) -> Option<&str> {
        self.get(SUBMISSION_ID_HEADER)
            .filter(|s| !s.is_empty() && *s != NOT_APPLICABLE)
    }

    /// A copy of this record carrying the given identifier.
    pub fn with_submission_id(&self, submission_id: &str) -> SubmissionRecord {
        let cells = self
            .cells
            .iter()
            .map(|(k, v)| {
                if k == SUBMISSION_ID_HEADER {
                    (k.clone(), submission_id.to_string())
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect();
        SubmissionRecord { cells }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.cells
    }

    /// The cells, positionally, for appending to the sheet.
    pub fn row(&self) -> Vec<String> {
        self.cells.iter().map(|(_, v)| v.clone()).collect()
    }
}

/// Formats a time the way browsers do (`2024-03-05T10:15:30.000Z`).
pub fn iso_timestamp(t: OffsetDateTime) -> Result<String, time::error::Format> {
    t.to_offset(UtcOffset::UTC).format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ))
}

/// Reads a timestamp from a sheet cell.
///
/// Accepts RFC 3339 and `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(t) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(t);
    }
    PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
    })
    .ok()
    .map(|t| t.assume_utc())
}

/// Derives an identifier `YYYYMMDD-HHMMSS-NNN` from a time, using UTC components.
///
/// The suffix is random: deriving twice from the same time does not give the same identifier.
pub fn submission_id<R: Rng>(t: OffsetDateTime, rng: &mut R) -> String {
    let t = t.to_offset(UtcOffset::UTC);
    format!(
        "{:04}{:02}{:02}-{:02}{:02}{:02}-{:03}",
        t.year(),
        u8::from(t.month()),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
        rng.gen_range(0..1000)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FormBuilder;
    use crate::{apply, Effect, FormEvent};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use regex::Regex;
    use time::macros::datetime;

    fn payload_of(b: FormBuilder) -> Payload {
        let mut state = b.build();
        let mut effect = None;
        for _ in 0..TOTAL_STEPS {
            let t = apply(state, FormEvent::Next);
            state = t.state;
            effect = t.effect.or(effect);
        }
        match effect {
            Some(Effect::Submit(p)) => p,
            x => panic!("expected a submission, got {:?}", x),
        }
    }

    #[test]
    fn ids_use_utc_components() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = submission_id(datetime!(2024-03-05 11:15:30 +01:00), &mut rng);
        let re = Regex::new(r"^20240305-101530-\d{3}$").expect("pattern");
        assert!(re.is_match(&id), "{}", id);
    }

    #[test]
    fn timestamps() {
        assert_eq!(
            iso_timestamp(datetime!(2024-03-05 10:15:30.25 UTC)).expect("format"),
            "2024-03-05T10:15:30.250Z"
        );
        assert_eq!(
            parse_timestamp("2024-03-05T10:15:30Z"),
            Some(datetime!(2024-03-05 10:15:30 UTC))
        );
        assert_eq!(
            parse_timestamp("2024-03-05T10:15:30.123+00:00").map(|t| t.second()),
            Some(30)
        );
        assert_eq!(
            parse_timestamp("2024-03-05 10:15:30"),
            Some(datetime!(2024-03-05 10:15:30 UTC))
        );
        assert_eq!(parse_timestamp("N/A"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn assembled_in_header_order() {
        let payload = payload_of(FormBuilder::complete());
        let now = datetime!(2024-03-05 10:15:30 UTC);
        let record = SubmissionRecord::assemble(&payload, now, "20240305-101530-001").expect("record");
        let names: Vec<&str> = record.pairs().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, HEADERS.to_vec());
        assert_eq!(record.submission_id(), Some("20240305-101530-001"));
        assert_eq!(
            record.get(SUBMISSION_TIMESTAMP_HEADER),
            Some("2024-03-05T10:15:30.000Z")
        );
        assert_eq!(
            record.get(RESPONSE_DUE_HEADER),
            Some("2024-03-12T10:15:30.000Z")
        );
        assert_eq!(record.get("Device_Count"), Some("1"));
        assert_eq!(record.get("Acknowledge_Security_Risks"), Some("true"));
        assert_eq!(record.row().len(), HEADERS.len());
    }

    #[test]
    fn mobile_devices_do_not_answer_the_account_question() {
        let payload = payload_of(FormBuilder::complete().value(
            Field::DeviceType,
            FieldValue::Choice(DEVICE_TYPE_MOBILE.to_string()),
        ));
        let record = SubmissionRecord::assemble(&payload, OffsetDateTime::UNIX_EPOCH, "x")
            .expect("record");
        assert_eq!(
            record.get("Separate_User_Account_Assurance"),
            Some(NOT_APPLICABLE)
        );
    }

    #[test]
    fn pairs_fill_missing_columns() {
        let record = SubmissionRecord::from_pairs(vec![
            ("Full_Name".to_string(), "Ada".to_string()),
            ("Unrelated".to_string(), "x".to_string()),
        ]);
        assert_eq!(record.get("Full_Name"), Some("Ada"));
        assert_eq!(record.get("CA_Email"), Some(NOT_APPLICABLE));
        assert_eq!(record.get("Unrelated"), None);
        assert_eq!(record.submission_id(), None);
        let with_id = record.with_submission_id("20240101-000000-000");
        assert_eq!(with_id.submission_id(), Some("20240101-000000-000"));
        assert_eq!(with_id.get("Full_Name"), Some("Ada"));
    }
}
