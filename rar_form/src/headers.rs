//! Comparison of the expected columns of the response sheet with the header row
//! actually found in it.

use std::fmt::Display;

use log::{debug, info};

/// One side of a header comparison.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Slot {
    Name(String),
    /// The list on this side has no more columns.
    End,
}

impl Slot {
    fn of(s: Option<&String>) -> Slot {
        match s {
            Some(s) => Slot::Name(s.clone()),
            None => Slot::End,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum MismatchKind {
    /// The expected column is not where it should be, and the found column comes later in
    /// the expected list: the expected column is missing from the sheet.
    Missing,
    /// The found column is not expected here, and the expected column comes later in the
    /// sheet: the sheet has an extra column.
    Unexpected,
    /// Neither name can be realigned (renamed, moved or extra column).
    Differs,
}

/// A position of the header row where the sheet diverges from the expected columns.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct HeaderMismatch {
    /// 0-based position in the actual header row.
    pub position: usize,
    pub expected: Slot,
    pub found: Slot,
    pub kind: MismatchKind,
}

impl Display for HeaderMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let expected = match &self.expected {
            Slot::Name(s) => format!("'{}'", s),
            Slot::End => "<end of expected>".to_string(),
        };
        let found = match &self.found {
            Slot::Name(s) => format!("'{}'", s),
            Slot::End => "<end of actual>".to_string(),
        };
        let note = match self.kind {
            MismatchKind::Missing => " (missing column)",
            MismatchKind::Unexpected => " (extra column)",
            MismatchKind::Differs => "",
        };
        write!(
            f,
            "column {} ({}): expected {}, found {}{}",
            column_letter(self.position),
            self.position + 1,
            expected,
            found,
            note
        )
    }
}

/// The spreadsheet name of a 0-based column (A, B, ..., Z, AA, AB, ...).
pub fn column_letter(position: usize) -> String {
    let mut n = position + 1;
    let mut letters: Vec<char> = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Walks both header lists side by side and reports every divergence.
///
/// This is a best-effort diagnostic: when several realignments are possible the first
/// one found is taken, and the result is not guaranteed to be a minimal diff.
/// It always terminates: every step advances at least one of the two positions.
pub fn reconcile(expected: &[String], actual: &[String]) -> Vec<HeaderMismatch> {
    let mut mismatches: Vec<HeaderMismatch> = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < expected.len() || j < actual.len() {
        let e = expected.get(i);
        let a = actual.get(j);
        if let (Some(e), Some(a)) = (e, a) {
            if e == a {
                i += 1;
                j += 1;
                continue;
            }
        }
        let found_later_in_expected = match a {
            Some(a) => expected.iter().skip(i + 1).any(|x| x == a),
            None => true,
        };
        let expected_later_in_actual = match e {
            Some(e) => actual.iter().skip(j + 1).any(|x| x == e),
            None => true,
        };
        let kind = if found_later_in_expected && e.is_some() {
            MismatchKind::Missing
        } else if expected_later_in_actual && a.is_some() {
            MismatchKind::Unexpected
        } else {
            MismatchKind::Differs
        };
        debug!(
            "reconcile: i: {} j: {} expected: {:?} found: {:?} kind: {:?}",
            i, j, e, a, kind
        );
        mismatches.push(HeaderMismatch {
            position: j,
            expected: Slot::of(e),
            found: Slot::of(a),
            kind,
        });
        match kind {
            MismatchKind::Missing => i += 1,
            MismatchKind::Unexpected => j += 1,
            MismatchKind::Differs => {
                i += 1;
                j += 1;
            }
        }
    }
    mismatches
}

/// The result of populating a header row.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct HeaderSetup {
    pub row: Vec<String>,
    /// 0-based positions that were written.
    pub written: Vec<usize>,
}

/// Writes the expected name into every empty header cell.
///
/// Non-empty cells are never changed, moved or removed, so running it twice is harmless.
pub fn setup_missing(expected: &[String], actual: &[String]) -> HeaderSetup {
    let mut row: Vec<String> = actual.to_vec();
    if row.len() < expected.len() {
        row.resize(expected.len(), String::new());
    }
    let mut written = Vec::new();
    for (idx, name) in expected.iter().enumerate() {
        if row[idx].trim().is_empty() {
            row[idx] = name.clone();
            written.push(idx);
        }
    }
    info!("setup_missing: populated {} header cells", written.len());
    HeaderSetup { row, written }
}

/// A summary of a header comparison, for the sheet operator.
pub fn summarize(sheet_name: &str, mismatches: &[HeaderMismatch]) -> String {
    if mismatches.is_empty() {
        return format!("Headers in \"{}\" are correct.", sheet_name);
    }
    let mut lines = vec![format!(
        "Found {} header mismatch(es) in \"{}\":",
        mismatches.len(),
        sheet_name
    )];
    for m in mismatches {
        lines.push(format!("  - {}", m));
    }
    lines.push(
        "Rows are appended by position: fix the header row before accepting new submissions."
            .to_string(),
    );
    lines.join("\n")
}
