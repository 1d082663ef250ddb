use rand::thread_rng;
use time::OffsetDateTime;

use rar_form::record::{parse_timestamp, submission_id, SubmissionRecord};
use rar_form::session::SubmissionSink;

use crate::rar::io_csv::CsvSheet;
use crate::rar::lock::AppendLock;
use crate::rar::notify::{applicant_email, manager_email, Mailer, OutboxMailer};
use crate::rar::*;

/// Stores submissions in the local response sheet and notifies the applicant and the
/// IT manager.
pub struct SheetBackend<M: Mailer> {
    sheet: CsvSheet,
    mailer: M,
    lock_timeout: Duration,
    sheet_name: String,
    it_manager_email: String,
    organisation: String,
}

impl SheetBackend<OutboxMailer> {
    pub fn from_config(config: &RarConfig) -> SheetBackend<OutboxMailer> {
        SheetBackend::new(
            CsvSheet::new(&config.sheet_path),
            OutboxMailer::new(&config.outbox_directory),
            config,
        )
    }
}

impl<M: Mailer> SheetBackend<M> {
    pub fn new(sheet: CsvSheet, mailer: M, config: &RarConfig) -> SheetBackend<M> {
        SheetBackend {
            sheet,
            mailer,
            lock_timeout: config.lock_timeout(),
            sheet_name: config.sheet_name.clone(),
            it_manager_email: config.it_manager_email.clone(),
            organisation: config.organisation.clone(),
        }
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    /// Appends one record and sends the emails, under the append lock.
    ///
    /// Returns the identifier of the stored row: the one carried by the record, or a new
    /// one derived from its timestamp.
    pub fn append(&mut self, record: &SubmissionRecord) -> RarResult<String> {
        let _lock = AppendLock::for_sheet(&self.sheet, self.lock_timeout)?;
        self.ensure_headers()?;

        let record = match record.submission_id() {
            Some(_) => record.clone(),
            None => {
                let ts = record
                    .get(SUBMISSION_TIMESTAMP_HEADER)
                    .and_then(parse_timestamp)
                    .unwrap_or_else(OffsetDateTime::now_utc);
                record.with_submission_id(&submission_id(ts, &mut thread_rng()))
            }
        };
        let id = record.submission_id().unwrap_or_default().to_string();
        self.sheet.append_row(&record.row())?;
        info!("append: stored submission {}", id);

        match applicant_email(&record, &self.organisation) {
            Some(email) => self.mailer.send(&email)?,
            None => warn!(
                "append: no applicant email found for {} (neither CA_Email nor Contact_Email)",
                id
            ),
        }
        self.mailer
            .send(&manager_email(&record, &self.it_manager_email, &self.sheet_name))?;
        Ok(id)
    }

    fn ensure_headers(&self) -> RarResult<()> {
        let expected = expected_headers();
        let actual = if self.sheet.exists() {
            self.sheet.header_row()?
        } else {
            Vec::new()
        };
        if actual.is_empty() {
            info!("ensure_headers: creating {:?}", self.sheet.path());
            return self.sheet.write_all(&[expected]);
        }
        let mismatches = reconcile(&expected, &actual);
        if !mismatches.is_empty() {
            warn!(
                "ensure_headers: {} header mismatch(es) in {:?}, appending by position",
                mismatches.len(),
                self.sheet.path()
            );
        }
        Ok(())
    }
}

impl<M: Mailer> SubmissionSink for SheetBackend<M> {
    fn submit(&mut self, record: &SubmissionRecord) -> Result<String, String> {
        self.append(record).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rar::notify::Email;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Vec<Email>,
    }

    impl Mailer for RecordingMailer {
        fn send(&mut self, email: &Email) -> RarResult<()> {
            self.sent.push(email.clone());
            Ok(())
        }
    }

    fn backend(dir: &TempDir) -> SheetBackend<RecordingMailer> {
        let config = RarConfig {
            lock_timeout_seconds: 1,
            it_manager_email: "it@example.org".to_string(),
            ..RarConfig::default()
        };
        SheetBackend::new(
            CsvSheet::new(dir.path().join("responses.csv")),
            RecordingMailer::default(),
            &config,
        )
    }

    fn record(pairs: &[(&str, &str)]) -> SubmissionRecord {
        SubmissionRecord::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn first_append_creates_the_sheet() {
        let dir = TempDir::new().expect("tempdir");
        let mut b = backend(&dir);
        let id = b
            .append(&record(&[
                ("Submission_ID", "20240305-101530-007"),
                ("Full_Name", "Ada"),
                ("CA_Email", "ada@ca.example.org"),
            ]))
            .expect("stored");
        assert_eq!(id, "20240305-101530-007");
        let rows = CsvSheet::new(dir.path().join("responses.csv"))
            .read_all()
            .expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], expected_headers());
        assert_eq!(rows[1][0], "20240305-101530-007");
        assert_eq!(rows[1][4], "Ada");
        assert_eq!(rows[1][6], NOT_APPLICABLE);
        assert_eq!(b.mailer().sent.len(), 2);
        assert_eq!(b.mailer().sent[1].to, "it@example.org");
        assert!(AppendLock::acquire(
            &dir.path().join("responses.csv.lock"),
            Duration::from_millis(10)
        )
        .is_ok());
    }

    #[test]
    fn missing_id_is_derived_from_the_timestamp() {
        let dir = TempDir::new().expect("tempdir");
        let mut b = backend(&dir);
        let id = b
            .append(&record(&[
                ("Submission_Timestamp_ISO", "2024-03-05T10:15:30.000Z"),
                ("Full_Name", "Bob"),
            ]))
            .expect("stored");
        assert!(id.starts_with("20240305-101530-"), "{}", id);
        // No applicant address: only the manager is notified.
        assert_eq!(b.mailer().sent.len(), 1);
    }

    #[test]
    fn held_lock_rejects_the_submission() {
        let dir = TempDir::new().expect("tempdir");
        let mut b = backend(&dir);
        let _held = AppendLock::for_sheet(
            &CsvSheet::new(dir.path().join("responses.csv")),
            Duration::from_secs(1),
        )
        .expect("free lock");
        let res = b.submit(&record(&[("Full_Name", "Ada")]));
        assert_eq!(
            res,
            Err("Lock timeout after 1s: another submission is being saved".to_string())
        );
        assert!(!dir.path().join("responses.csv").exists());
        assert!(b.mailer().sent.is_empty());
    }

    #[test]
    fn leftover_lock_file_from_a_dead_process_is_ignored() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("responses.csv.lock"), "999999").expect("stale lock file");
        let mut b = backend(&dir);
        for name in ["Ada", "Bob", "Cy"] {
            assert!(b.submit(&record(&[("Full_Name", name)])).is_ok(), "{}", name);
        }
        let rows = CsvSheet::new(dir.path().join("responses.csv"))
            .read_all()
            .expect("rows");
        assert_eq!(rows.len(), 4);
    }
}
