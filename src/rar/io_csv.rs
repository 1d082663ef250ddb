// Primitives for reading and writing the response sheet as a CSV file.

use std::fs::OpenOptions;

use crate::rar::*;

/// The response sheet, stored as a CSV file without a distinguished header.
///
/// Rows may have different lengths: the first row is the header row.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CsvSheet {
    path: PathBuf,
}

impl CsvSheet {
    pub fn new<P: AsRef<Path>>(path: P) -> CsvSheet {
        CsvSheet {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn read_all(&self) -> RarResult<Vec<Vec<String>>> {
        let rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .context(OpeningSheetSnafu {
                path: self.display(),
            })?;
        let mut rows: Vec<Vec<String>> = Vec::new();
        for (idx, rec) in rdr.into_records().enumerate() {
            let rec = rec.context(OpeningSheetSnafu {
                path: self.display(),
            })?;
            debug!("read_all: line {}: {} cells", idx + 1, rec.len());
            rows.push(rec.iter().map(|s| s.to_string()).collect());
        }
        Ok(rows)
    }

    /// The first row, or nothing for an empty sheet.
    pub fn header_row(&self) -> RarResult<Vec<String>> {
        let rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .context(OpeningSheetSnafu {
                path: self.display(),
            })?;
        match rdr.into_records().next() {
            Some(rec) => {
                let rec = rec.context(OpeningSheetSnafu {
                    path: self.display(),
                })?;
                Ok(rec.iter().map(|s| s.to_string()).collect())
            }
            None => Ok(Vec::new()),
        }
    }

    /// Replaces the whole content of the sheet.
    ///
    /// The rows are written next to the sheet first, then moved over it.
    pub fn write_all(&self, rows: &[Vec<String>]) -> RarResult<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let tmp_display = tmp.display().to_string();
        {
            let mut wtr = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&tmp)
                .context(WritingSheetSnafu {
                    path: tmp_display.clone(),
                })?;
            for row in rows {
                wtr.write_record(row).context(WritingSheetSnafu {
                    path: tmp_display.clone(),
                })?;
            }
            wtr.flush().context(AccessingSheetSnafu {
                path: tmp_display.clone(),
            })?;
        }
        fs::rename(&tmp, &self.path).context(AccessingSheetSnafu {
            path: self.display(),
        })?;
        info!("write_all: wrote {} rows to {}", rows.len(), self.display());
        Ok(())
    }

    /// Adds one row at the end of the sheet, creating the file if needed.
    pub fn append_row(&self, row: &[String]) -> RarResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(AccessingSheetSnafu {
                path: self.display(),
            })?;
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(file);
        wtr.write_record(row).context(WritingSheetSnafu {
            path: self.display(),
        })?;
        wtr.flush().context(AccessingSheetSnafu {
            path: self.display(),
        })?;
        debug!("append_row: {} cells to {}", row.len(), self.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn write_append_read() {
        let dir = TempDir::new().expect("tempdir");
        let sheet = CsvSheet::new(dir.path().join("s.csv"));
        assert!(!sheet.exists());
        sheet
            .write_all(&[row(&["A", "B", "C"])])
            .expect("write");
        sheet
            .append_row(&row(&["1", "with, comma", "line\nbreak"]))
            .expect("append");
        sheet.append_row(&row(&["short"])).expect("append");
        let rows = sheet.read_all().expect("read");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][1], "with, comma");
        assert_eq!(rows[1][2], "line\nbreak");
        assert_eq!(rows[2], row(&["short"]));
        assert_eq!(sheet.header_row().expect("header"), row(&["A", "B", "C"]));
    }

    #[test]
    fn empty_sheet_has_no_header() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").expect("write");
        let sheet = CsvSheet::new(&path);
        assert!(sheet.header_row().expect("header").is_empty());
        assert!(sheet.read_all().expect("read").is_empty());
    }

    #[test]
    fn missing_sheet_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let sheet = CsvSheet::new(dir.path().join("nope.csv"));
        assert!(matches!(
            sheet.read_all(),
            Err(RarError::OpeningSheet { .. })
        ));
    }
}
