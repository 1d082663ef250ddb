use log::debug;
use rand::Rng;

use crate::record::{parse_timestamp, submission_id};

/// What happened to the rows of a sheet during a backfill.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct BackfillReport {
    pub updated: usize,
    pub already_set: usize,
    /// Rows without an identifier whose timestamp could not be read.
    pub skipped: usize,
}

/// Gives an identifier to every data row that lacks one, derived from its timestamp.
///
/// The first row is the header row and is left alone, as are rows that already have an
/// identifier and rows without a readable timestamp.
pub fn backfill_ids<R: Rng>(
    rows: &mut [Vec<String>],
    id_col: usize,
    timestamp_col: usize,
    rng: &mut R,
) -> BackfillReport {
    let mut report = BackfillReport::default();
    for (idx, row) in rows.iter_mut().enumerate().skip(1) {
        let has_id = row.get(id_col).map_or(false, |s| !s.trim().is_empty());
        if has_id {
            report.already_set += 1;
            continue;
        }
        let ts = match row.get(timestamp_col).and_then(|s| parse_timestamp(s)) {
            Some(ts) => ts,
            None => {
                debug!("backfill_ids: row {}: no readable timestamp", idx + 1);
                report.skipped += 1;
                continue;
            }
        };
        if row.len() <= id_col {
            row.resize(id_col + 1, String::new());
        }
        let id = submission_id(ts, rng);
        debug!("backfill_ids: row {}: {}", idx + 1, id);
        row[id_col] = id;
        report.updated += 1;
    }
    report
}
