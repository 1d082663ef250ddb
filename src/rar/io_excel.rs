// Reads Excel exports of the response sheet. Read only.

use calamine::{open_workbook, DataType, Range, Reader, Xlsx};

use crate::rar::*;

pub fn is_excel(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("xlsx"))
}

fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Empty => String::new(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

/// The rows of a range as text, positioned from cell A1.
///
/// Worksheet ranges start at the first used cell: leading empty rows and columns are
/// put back so that positions match the spreadsheet columns.
fn anchored_rows(wrange: &Range<DataType>) -> Vec<Vec<String>> {
    let (top, left) = match wrange.start() {
        Some(start) => start,
        None => return Vec::new(),
    };
    let mut rows: Vec<Vec<String>> = vec![Vec::new(); top as usize];
    rows.extend(wrange.rows().map(|row| {
        let mut cells = vec![String::new(); left as usize];
        cells.extend(row.iter().map(cell_text));
        cells
    }));
    rows
}

/// All the rows of a worksheet, as text.
pub fn read_rows(path: &str, worksheet: &str) -> RarResult<Vec<Vec<String>>> {
    debug!("read_rows: path: {:?} worksheet: {:?}", path, worksheet);
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let wrange = workbook
        .worksheet_range(worksheet)
        .context(EmptyExcelSnafu { path, worksheet })?
        .context(OpeningExcelSnafu { path })?;
    let rows = anchored_rows(&wrange);
    debug!("read_rows: {} rows", rows.len());
    Ok(rows)
}

/// The first row of a worksheet. Empty when row 1 has no value.
pub fn header_row(path: &str, worksheet: &str) -> RarResult<Vec<String>> {
    Ok(read_rows(path, worksheet)?
        .into_iter()
        .next()
        .unwrap_or_default())
}
