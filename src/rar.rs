use log::{debug, info, warn};

use rar_form::backfill::backfill_ids;
use rar_form::builder::FormBuilder;
use rar_form::headers::{reconcile, setup_missing, summarize};
use rar_form::record::SubmissionRecord;
use rar_form::session::{HumanVerifier, Session, SubmissionSink};
use rar_form::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

pub mod backend;
pub mod config_reader;
pub mod draft;
pub mod io_csv;
pub mod io_excel;
pub mod lock;
pub mod notify;
pub mod remote;

use crate::rar::backend::SheetBackend;
use crate::rar::config_reader::*;
use crate::rar::draft::DraftStore;
use crate::rar::io_csv::CsvSheet;
use crate::rar::lock::AppendLock;
use crate::rar::remote::{build_agent, lookup_ip, RecaptchaVerifier, RelaySink};

#[derive(Debug, Snafu)]
pub enum RarError {
    #[snafu(display("Error reading sheet {path}"))]
    OpeningSheet { source: csv::Error, path: String },
    #[snafu(display("Error writing sheet {path}"))]
    WritingSheet { source: csv::Error, path: String },
    #[snafu(display("Error accessing sheet {path}"))]
    AccessingSheet {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet named {worksheet} in {path}"))]
    EmptyExcel { path: String, worksheet: String },
    #[snafu(display("Error reading {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Lock timeout after {seconds}s: another submission is being saved"))]
    LockTimeout { seconds: u64 },
    #[snafu(display("Error taking the lock {path}"))]
    LockIo {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing to the outbox {path}"))]
    Outbox {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Refusing an email with a line break in its {header} header"))]
    UnsafeHeader { header: String },
    #[snafu(display("Error accessing the draft {path}"))]
    DraftIo {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error calling {url}"))]
    Remote {
        #[snafu(source(from(ureq::Error, Box::new)))]
        source: Box<ureq::Error>,
        url: String,
    },
    #[snafu(display("Error formatting a timestamp"))]
    Timestamp { source: time::error::Format },
    #[snafu(display("Invalid answers"))]
    UnknownField { source: FormError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type RarResult<T> = Result<T, RarError>;

fn read_input(path: Option<&str>) -> RarResult<String> {
    match path {
        Some(p) if p != "-" => fs::read_to_string(p).context(OpeningJsonSnafu { path: p }),
        _ => {
            let mut s = String::new();
            std::io::stdin()
                .read_to_string(&mut s)
                .context(OpeningJsonSnafu { path: "<stdin>" })?;
            Ok(s)
        }
    }
}

/// The named values of a JSON object, as text. Null values are left out.
fn json_pairs(contents: &str) -> RarResult<Vec<(String, String)>> {
    let js: JSValue = serde_json::from_str(contents).context(ParsingJsonSnafu {})?;
    let obj: JSMap<String, JSValue> = match js {
        JSValue::Object(obj) => obj,
        x => whatever!("Expected a JSON object, found {}", x),
    };
    let pairs = obj
        .into_iter()
        .filter_map(|(k, v)| match v {
            JSValue::Null => None,
            JSValue::String(s) => Some((k, s)),
            x => Some((k, x.to_string())),
        })
        .collect();
    Ok(pairs)
}

fn sheet_header(sheet: &CsvSheet) -> RarResult<Vec<String>> {
    if sheet.exists() {
        sheet.header_row()
    } else {
        Ok(Vec::new())
    }
}

// **** Sheet administration ****

/// Writes the expected column names into the empty cells of the header row,
/// creating the sheet if needed.
pub fn run_setup_headers(config: &RarConfig) -> RarResult<usize> {
    let sheet = CsvSheet::new(&config.sheet_path);
    let _lock = AppendLock::for_sheet(&sheet, config.lock_timeout())?;
    let created = !sheet.exists();
    let mut rows = if created {
        Vec::new()
    } else {
        sheet.read_all()?
    };
    let actual = rows.first().cloned().unwrap_or_default();
    let setup = setup_missing(&expected_headers(), &actual);
    if created {
        println!("Sheet \"{}\" was created.", config.sheet_name);
    }
    if setup.written.is_empty() {
        println!("{}", setup_summary(&config.sheet_name, 0));
        return Ok(0);
    }
    if rows.is_empty() {
        rows.push(setup.row);
    } else {
        rows[0] = setup.row;
    }
    sheet.write_all(&rows)?;
    println!("{}", setup_summary(&config.sheet_name, setup.written.len()));
    Ok(setup.written.len())
}

fn setup_summary(sheet_name: &str, written: usize) -> String {
    if written == 0 {
        format!(
            "No empty header cells to fill in \"{}\". Run verify-headers to check the names.",
            sheet_name
        )
    } else {
        format!(
            "Headers have been set in \"{}\": {} column(s) written.",
            sheet_name, written
        )
    }
}

/// Compares the header row of a sheet (CSV or Excel export) with the expected columns.
pub fn run_verify_headers(
    config: &RarConfig,
    worksheet: Option<String>,
    show_diff: bool,
) -> RarResult<()> {
    let path = config.sheet_path.as_str();
    let actual: Vec<String> = if io_excel::is_excel(path) {
        let worksheet = worksheet.unwrap_or_else(|| config.sheet_name.clone());
        io_excel::header_row(path, &worksheet)?
    } else {
        sheet_header(&CsvSheet::new(path))?
    };
    debug!("run_verify_headers: actual: {:?}", actual);
    let expected = expected_headers();
    let mismatches = reconcile(&expected, &actual);
    println!("{}", summarize(&config.sheet_name, &mismatches));
    if mismatches.is_empty() {
        return Ok(());
    }
    if show_diff {
        print_diff(expected.join("\n").as_str(), actual.join("\n").as_str(), "\n");
    }
    whatever!(
        "{} header mismatch(es) found in {}",
        mismatches.len(),
        path
    )
}

/// Gives a submission identifier to every row that has none.
pub fn run_backfill_ids(config: &RarConfig) -> RarResult<usize> {
    let sheet = CsvSheet::new(&config.sheet_path);
    if !sheet.exists() {
        whatever!("Sheet {} not found: run setup-headers first", config.sheet_path)
    }
    let _lock = AppendLock::for_sheet(&sheet, config.lock_timeout())?;
    let mut rows = sheet.read_all()?;
    let header = rows.first().cloned().unwrap_or_default();
    let column = |name: &str| header.iter().position(|h| h == name);
    let (id_col, ts_col) = match (
        column(SUBMISSION_ID_HEADER),
        column(SUBMISSION_TIMESTAMP_HEADER),
    ) {
        (Some(i), Some(t)) => (i, t),
        _ => whatever!(
            "Columns {} and {} are required in the header row of {}",
            SUBMISSION_ID_HEADER,
            SUBMISSION_TIMESTAMP_HEADER,
            config.sheet_path
        ),
    };
    let report = backfill_ids(&mut rows, id_col, ts_col, &mut rand::thread_rng());
    info!("run_backfill_ids: {:?}", report);
    if report.updated > 0 {
        sheet.write_all(&rows)?;
    }
    if report.skipped > 0 {
        warn!(
            "run_backfill_ids: {} row(s) without a readable timestamp were left alone",
            report.skipped
        );
    }
    println!(
        "Backfilled {} submission id(s) in \"{}\".",
        report.updated, config.sheet_name
    );
    Ok(report.updated)
}

// **** Persistence endpoint ****

fn append_reply(res: &RarResult<String>) -> JSValue {
    match res {
        Ok(id) => json!({
            "status": "success",
            "message": "Data saved and emails sent.",
            "submissionId": id,
        }),
        Err(e) => json!({"status": "error", "message": e.to_string()}),
    }
}

/// Stores one submission received as a JSON object and prints the reply.
///
/// Failures are part of the reply, not of the result.
pub fn run_append(config: &RarConfig, input: Option<&str>) -> RarResult<()> {
    let contents = read_input(input)?;
    let record = SubmissionRecord::from_pairs(json_pairs(&contents)?);
    let mut backend = SheetBackend::from_config(config);
    let res = backend.append(&record);
    if let Err(e) = &res {
        warn!("run_append: {}", e);
    }
    println!("{}", append_reply(&res));
    Ok(())
}

// **** Applicant side ****

fn render(state: &FormState) -> String {
    match state.outcome() {
        Some(SubmissionOutcome::Accepted { submission_id }) => {
            return format!(
                "Thank you! Your application has been submitted.\nReference: {}",
                submission_id
            )
        }
        Some(SubmissionOutcome::Rejected { message }) => {
            return format!("Submission failed: {}", message)
        }
        None => {}
    }
    let title = step(state.current_step()).map_or("", |s| s.title);
    let mut lines = vec![format!(
        "Step {} of {}: {}",
        state.current_step(),
        TOTAL_STEPS,
        title
    )];
    for f in state.failures() {
        lines.push(format!("  {}: {}", f.field.name(), f.reason));
    }
    if let Some(b) = state.blocked() {
        lines.push(format!("  {}", b));
    }
    lines.join("\n")
}

fn walk<V: HumanVerifier, S: SubmissionSink>(session: &mut Session<V, S>) {
    while session.state().current_step() > 1 {
        session.dispatch(FormEvent::Back);
    }
    loop {
        let before = session.state().current_step();
        let state = session.dispatch(FormEvent::Next);
        if state.is_completed() || state.outcome().is_some() || state.current_step() == before {
            break;
        }
    }
}

/// Fills in the form from a JSON file of answers and submits it.
///
/// The answers are merged over the saved draft. Whatever stops the form is printed and
/// the draft is kept for the next attempt.
pub fn run_submit(
    config: &RarConfig,
    answers: Option<&str>,
    token: Option<String>,
    fresh: bool,
) -> RarResult<()> {
    let drafts = DraftStore::new(&config.state_directory);
    let state = if fresh {
        drafts.clear()?;
        FormState::new()
    } else {
        drafts
            .load()?
            .map(|d| FormState::from_draft(&d))
            .unwrap_or_default()
    };
    let mut builder = FormBuilder::from_state(state);
    for (name, raw) in json_pairs(&read_input(answers)?)? {
        builder = builder.answer(&name, &raw).context(UnknownFieldSnafu {})?;
    }
    if let Some(t) = token {
        builder = builder.token(&t);
    }
    let agent = build_agent(config.http_timeout());
    let mut state = builder.build();
    if state.value(Field::IpAddress).is_none() {
        let ip = lookup_ip(&agent, config.ip_lookup_url.as_deref());
        state = apply(state, FormEvent::Set(Field::IpAddress, FieldValue::Text(ip))).state;
    }

    let verifier = RecaptchaVerifier::new(agent.clone(), &config.recaptcha);
    let sink: Box<dyn SubmissionSink> = match &config.relay_url {
        Some(url) => Box::new(RelaySink::new(agent, url)),
        None => Box::new(SheetBackend::from_config(config)),
    };
    let mut session = Session::new(state, verifier, sink);
    walk(&mut session);
    let (state, _, _) = session.into_parts();

    println!("{}", render(&state));
    if state.is_completed() {
        drafts.clear()?;
        return Ok(());
    }
    drafts.save(&state.draft())?;
    whatever!(
        "The application was not submitted; the answers were saved in {}",
        drafts.path().display()
    )
}

pub fn run_clear_draft(config: &RarConfig) -> RarResult<()> {
    let drafts = DraftStore::new(&config.state_directory);
    drafts.clear()?;
    println!("Draft cleared.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> RarConfig {
        RarConfig {
            sheet_path: dir.path().join("responses.csv").display().to_string(),
            outbox_directory: dir.path().join("outbox").display().to_string(),
            state_directory: dir.path().join("state").display().to_string(),
            lock_timeout_seconds: 1,
            ..RarConfig::default()
        }
    }

    #[test]
    fn json_answers_become_text() {
        let pairs = json_pairs(r#"{"Full_Name": "Ada", "Device_Count": 1, "Website": null, "Acknowledge_Security_Risks": true}"#)
            .expect("object");
        assert!(pairs.contains(&("Full_Name".to_string(), "Ada".to_string())));
        assert!(pairs.contains(&("Device_Count".to_string(), "1".to_string())));
        assert!(pairs.contains(&("Acknowledge_Security_Risks".to_string(), "true".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "Website"));
        assert!(json_pairs("[1, 2]").is_err());
    }

    #[test]
    fn setup_then_verify() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_in(&dir);
        assert!(run_verify_headers(&config, None, false).is_err());
        assert_eq!(run_setup_headers(&config).expect("setup"), HEADERS.len());
        assert_eq!(run_setup_headers(&config).expect("setup again"), 0);
        assert!(run_verify_headers(&config, None, false).is_ok());
    }

    #[test]
    fn setup_keeps_existing_names() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_in(&dir);
        fs::write(&config.sheet_path, "Submission_ID,Custom\nx,y\n").expect("write");
        assert_eq!(
            run_setup_headers(&config).expect("setup"),
            HEADERS.len() - 2
        );
        let rows = CsvSheet::new(&config.sheet_path).read_all().expect("rows");
        assert_eq!(rows[0][1], "Custom");
        assert_eq!(rows[0][2], HEADERS[2]);
        assert_eq!(rows[1], vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn full_but_wrong_header_row_is_not_reported_correct() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_in(&dir);
        let mut names: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        names[1] = "Custom".to_string();
        fs::write(&config.sheet_path, format!("{}\n", names.join(","))).expect("write");
        assert_eq!(run_setup_headers(&config).expect("setup"), 0);
        assert!(run_verify_headers(&config, None, false).is_err());

        let summary = setup_summary(&config.sheet_name, 0);
        assert!(summary.starts_with("No empty header cells to fill"));
        assert!(summary.contains("verify-headers"));
        assert!(!summary.contains("correct"));
    }

    #[test]
    fn backfill_over_the_sheet() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_in(&dir);
        fs::write(
            &config.sheet_path,
            "Submission_ID,Submission_Timestamp_ISO,Full_Name\n,2024-03-05T10:15:30Z,Ada\n20230101-000000-001,2023-01-01T00:00:00Z,Bob\n",
        )
        .expect("write");
        assert_eq!(run_backfill_ids(&config).expect("backfill"), 1);
        assert_eq!(run_backfill_ids(&config).expect("backfill again"), 0);
        let rows = CsvSheet::new(&config.sheet_path).read_all().expect("rows");
        assert!(rows[1][0].starts_with("20240305-101530-"));
        assert_eq!(rows[2][0], "20230101-000000-001");
    }

    #[test]
    fn backfill_needs_the_columns() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_in(&dir);
        fs::write(&config.sheet_path, "Name\nAda\n").expect("write");
        assert!(run_backfill_ids(&config).is_err());
    }

    #[test]
    fn append_replies() {
        let ok = append_reply(&Ok("20240305-101530-001".to_string()));
        assert_eq!(ok["status"], "success");
        assert_eq!(ok["submissionId"], "20240305-101530-001");
        let err = append_reply(&Err(RarError::LockTimeout { seconds: 30 }));
        assert_eq!(err["status"], "error");
        assert_eq!(
            err["message"],
            "Lock timeout after 30s: another submission is being saved"
        );
    }

    #[test]
    fn rendered_failures_name_the_fields() {
        let state = apply(FormState::new(), FormEvent::Next).state;
        let text = render(&state);
        assert!(text.starts_with("Step 1 of 6: Your Details"));
        assert!(text.contains("Full_Name: Full name must be at least 2 characters."));
    }
}
