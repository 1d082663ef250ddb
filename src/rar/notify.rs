//! The emails sent once a submission has been stored.

use time::macros::format_description;

use rar_form::record::{parse_timestamp, SubmissionRecord};

use crate::rar::*;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Recipient {
    Applicant,
    Manager,
}

impl Recipient {
    fn label(self) -> &'static str {
        match self {
            Recipient::Applicant => "applicant",
            Recipient::Manager => "manager",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Email {
    /// The submission this email is about.
    pub reference: String,
    pub recipient: Recipient,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

pub trait Mailer {
    fn send(&mut self, email: &Email) -> RarResult<()>;
}

/// Drops every email as a file in a directory, for an external relay to pick up.
pub struct OutboxMailer {
    directory: PathBuf,
}

impl OutboxMailer {
    pub fn new<P: AsRef<Path>>(directory: P) -> OutboxMailer {
        OutboxMailer {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    fn file_name(email: &Email) -> String {
        let to: String = email
            .to
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}-{}-{}.eml", email.reference, email.recipient.label(), to)
    }
}

fn check_header(header: &str, value: &str) -> RarResult<()> {
    ensure!(
        !value.contains(|c| c == '\r' || c == '\n'),
        UnsafeHeaderSnafu { header }
    );
    Ok(())
}

/// A single line, fit for an email header: control characters become spaces.
pub fn header_text(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

impl Mailer for OutboxMailer {
    fn send(&mut self, email: &Email) -> RarResult<()> {
        check_header("To", &email.to)?;
        check_header("Subject", &email.subject)?;
        let path = self.directory.join(OutboxMailer::file_name(email));
        let display = path.display().to_string();
        fs::create_dir_all(&self.directory).context(OutboxSnafu {
            path: self.directory.display().to_string(),
        })?;
        let contents = format!(
            "To: {}\r\nSubject: {}\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{}\r\n",
            email.to, email.subject, email.html_body
        );
        fs::write(&path, contents).context(OutboxSnafu { path: display })?;
        info!("send: {:?} to {}", email.subject, email.to);
        Ok(())
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// The submitted answers as an HTML table, in column order.
fn details_table(record: &SubmissionRecord) -> String {
    let mut html = String::from(
        "<table border=\"1\" cellpadding=\"5\" style=\"border-collapse: collapse; width: 100%;\">\n",
    );
    for (key, value) in record.pairs() {
        html.push_str(&format!(
            "<tr><td style=\"width: 40%; font-weight: bold;\">{}</td><td>{}</td></tr>\n",
            escape_html(&key.replace('_', " ")),
            escape_html(value)
        ));
    }
    html.push_str("</table>");
    html
}

fn submitted_on(record: &SubmissionRecord) -> String {
    let raw = record.get(SUBMISSION_TIMESTAMP_HEADER).unwrap_or_default();
    parse_timestamp(raw)
        .and_then(|t| {
            t.format(format_description!(
                "[day] [month repr:long] [year], [hour]:[minute]:[second] UTC"
            ))
            .ok()
        })
        .unwrap_or_else(|| raw.to_string())
}

fn answered(record: &SubmissionRecord, header: &str) -> Option<String> {
    record
        .get(header)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != NOT_APPLICABLE)
        .map(|s| s.to_string())
}

/// The confirmation for the applicant, sent to the CA address or else the contact address.
pub fn applicant_email(record: &SubmissionRecord, organisation: &str) -> Option<Email> {
    let to = answered(record, "CA_Email").or_else(|| answered(record, "Contact_Email"))?;
    let name = answered(record, "Full_Name").unwrap_or_else(|| "Applicant".to_string());
    let html_body = format!(
        "<p>Dear {name},</p>\n\
         <p>Thank you for completing the \"Read, Apply, Review\" (RAR) process application. \
         We have successfully received your submission made on {when}.</p>\n\
         <p>Your dedication to helping {org} with its Cyber Essentials (CE) certification is \
         vital for ensuring collective security, which ultimately benefits our clients.</p>\n\
         <h3>What to Expect Next</h3>\n\
         <ul>\n\
         <li><strong>Initial Review:</strong> The IT Manager will review your application to \
         determine your device's compliance status and identify any support needs.</li>\n\
         <li><strong>One-to-One Appointment:</strong> If you requested assistance, you will \
         receive information on how to schedule a meeting.</li>\n\
         </ul>\n\
         <h3>Your Submitted Information:</h3>\n\
         {table}\n\
         <p>You may be contacted for further information if required.</p>\
         <p>Kind regards,<br>{org} IT</p>",
        name = escape_html(&name),
        when = escape_html(&submitted_on(record)),
        org = escape_html(organisation),
        table = details_table(record),
    );
    Some(Email {
        reference: record.submission_id().unwrap_or("unassigned").to_string(),
        recipient: Recipient::Applicant,
        to: header_text(&to),
        subject: "Your BYOD RAR Application Has Been Submitted".to_string(),
        html_body,
    })
}

/// The notification for the IT manager.
pub fn manager_email(record: &SubmissionRecord, manager: &str, sheet_name: &str) -> Email {
    let name = answered(record, "Full_Name").unwrap_or_else(|| "an applicant".to_string());
    let html_body = format!(
        "<p>A new BYOD RAR application has been submitted by <strong>{name}</strong>.</p>\n\
         <p>The details have been added to the \"{sheet}\" sheet.</p>\n\
         <h3>Submission Details:</h3>\n\
         {table}\n\
         <p>Please review the submission in the sheet at your earliest convenience.</p>",
        name = escape_html(&name),
        sheet = escape_html(sheet_name),
        table = details_table(record),
    );
    Email {
        reference: record.submission_id().unwrap_or("unassigned").to_string(),
        recipient: Recipient::Manager,
        to: header_text(manager),
        subject: format!("New BYOD RAR Submission from {}", header_text(&name)),
        html_body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(pairs: &[(&str, &str)]) -> SubmissionRecord {
        SubmissionRecord::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    #[test]
    fn applicant_address_falls_back_to_contact() {
        let r = record(&[("Contact_Email", "me@example.org"), ("Full_Name", "Ada")]);
        let email = applicant_email(&r, "LCA Teignbridge").expect("an address");
        assert_eq!(email.to, "me@example.org");
        assert!(email.html_body.starts_with("<p>Dear Ada,</p>"));

        let r = record(&[("CA_Email", "ada@ca.example.org"), ("Contact_Email", "me@example.org")]);
        assert_eq!(
            applicant_email(&r, "LCA").map(|e| e.to),
            Some("ada@ca.example.org".to_string())
        );

        assert_eq!(applicant_email(&record(&[("Full_Name", "Ada")]), "LCA"), None);
    }

    #[test]
    fn table_lists_columns_in_order() {
        let r = record(&[
            ("Submission_ID", "20240305-101530-001"),
            ("Submission_Timestamp_ISO", "2024-03-05T10:15:30.000Z"),
            ("Full_Name", "<b>Ada</b>"),
        ]);
        let email = manager_email(&r, "it@example.org", "RARresponses");
        assert_eq!(email.subject, "New BYOD RAR Submission from <b>Ada</b>");
        assert!(email.html_body.contains("&lt;b&gt;Ada&lt;/b&gt;"));
        let id_pos = email.html_body.find(">Submission ID<").expect("id row");
        let name_pos = email.html_body.find(">Full Name<").expect("name row");
        assert!(id_pos < name_pos);
        assert_eq!(submitted_on(&r), "05 March 2024, 10:15:30 UTC");
    }

    #[test]
    fn outbox_writes_one_file_per_email() {
        let dir = TempDir::new().expect("tempdir");
        let mut mailer = OutboxMailer::new(dir.path().join("outbox"));
        let r = record(&[("Submission_ID", "20240305-101530-001"), ("Full_Name", "Ada")]);
        mailer
            .send(&manager_email(&r, "it@example.org", "RARresponses"))
            .expect("sent");
        let path = dir
            .path()
            .join("outbox")
            .join("20240305-101530-001-manager-it_example_org.eml");
        let contents = fs::read_to_string(path).expect("written");
        assert!(contents.starts_with("To: it@example.org\r\n"));
    }

    #[test]
    fn same_address_for_applicant_and_manager_keeps_both_files() {
        let dir = TempDir::new().expect("tempdir");
        let mut mailer = OutboxMailer::new(dir.path());
        let r = record(&[
            ("Submission_ID", "20240305-101530-001"),
            ("CA_Email", "it@example.org"),
        ]);
        mailer
            .send(&applicant_email(&r, "LCA").expect("an address"))
            .expect("sent");
        mailer
            .send(&manager_email(&r, "it@example.org", "RARresponses"))
            .expect("sent");
        let count = fs::read_dir(dir.path()).expect("outbox").count();
        assert_eq!(count, 2);
    }

    #[test]
    fn line_breaks_never_reach_the_headers() {
        let dir = TempDir::new().expect("tempdir");
        let mut mailer = OutboxMailer::new(dir.path());
        let r = record(&[
            ("Submission_ID", "20240305-101530-001"),
            ("Full_Name", "Ada\r\nBcc: attacker@evil.example"),
            ("CA_Email", "ada@ca.example.org\r\nBcc: attacker@evil.example"),
        ]);
        let applicant = applicant_email(&r, "LCA").expect("an address");
        let manager = manager_email(&r, "it@example.org", "RARresponses");
        assert_eq!(
            manager.subject,
            "New BYOD RAR Submission from Ada  Bcc: attacker@evil.example"
        );
        mailer.send(&applicant).expect("sent");
        mailer.send(&manager).expect("sent");
        for entry in fs::read_dir(dir.path()).expect("outbox") {
            let contents = fs::read_to_string(entry.expect("entry").path()).expect("written");
            let (head, _) = contents.split_once("\r\n\r\n").expect("headers");
            assert_eq!(head.lines().count(), 3, "{}", head);
            assert!(!head.lines().any(|l| l.starts_with("Bcc:")));
        }

        let forged = Email {
            to: "it@example.org\nBcc: attacker@evil.example".to_string(),
            ..manager
        };
        assert!(matches!(
            mailer.send(&forged),
            Err(RarError::UnsafeHeader { .. })
        ));
    }
}
