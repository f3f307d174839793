use crate::models::SignalRow;
use log::{error, info, warn};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Append-biased keyed store over per-name CSV files: one ledger file per
/// security code plus the shared results file. A header mismatch on append
/// triggers a destructive rewrite; this is the documented migration path,
/// not an accident. Single-writer-per-file is assumed and must be enforced
/// by the caller.
#[derive(Debug, Clone)]
pub struct SignalLedger {
    data_dir: PathBuf,
}

impl SignalLedger {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn file_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", file_name))
    }

    fn read_existing_header(path: &Path) -> Option<Vec<String>> {
        let metadata = fs::metadata(path).ok()?;
        if metadata.len() == 0 {
            return None;
        }
        let file = File::open(path).ok()?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(file);
        let mut records = reader.records();
        let header = records.next()?.ok()?;
        Some(header.iter().map(|cell| cell.to_string()).collect())
    }

    /// Appends `rows` under the given schema. If the file is missing or its
    /// stored header differs from `fieldnames`, the file is rewritten with
    /// the new header and only the given rows (prior rows are discarded).
    /// Never raises: I/O failures are logged and reported as `false`.
    pub fn append(&self, file_name: &str, rows: &[Vec<String>], fieldnames: &[&str]) -> bool {
        let path = self.file_path(file_name);
        match self.append_inner(&path, rows, fieldnames) {
            Ok(rewritten) => {
                let action = if rewritten { "rewrote" } else { "appended to" };
                info!("Successfully {} {} with {} record(s)", action, path.display(), rows.len());
                true
            }
            Err(err) => {
                error!("Error writing CSV file {}: {}", path.display(), err);
                false
            }
        }
    }

    fn append_inner(
        &self,
        path: &Path,
        rows: &[Vec<String>],
        fieldnames: &[&str],
    ) -> std::io::Result<bool> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let existing_header = Self::read_existing_header(path);
        let schema_matches = existing_header
            .as_deref()
            .map(|header| header.iter().map(String::as_str).eq(fieldnames.iter().copied()))
            .unwrap_or(false);

        let mut writer = if schema_matches {
            let file = OpenOptions::new().append(true).open(path)?;
            csv::WriterBuilder::new().has_headers(false).from_writer(file)
        } else {
            if let Some(old_header) = existing_header {
                warn!(
                    "Header mismatch in {}. Old: {:?} -> New: {:?}. Rewriting file.",
                    path.display(),
                    old_header,
                    fieldnames
                );
            }
            let file = File::create(path)?;
            let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
            writer.write_record(fieldnames)?;
            writer
        };

        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(!schema_matches)
    }

    /// Reads every row of a ledger file as a header-keyed mapping, in
    /// storage order. Missing files and read failures yield an empty list.
    pub fn read_all(&self, file_name: &str) -> Vec<HashMap<String, String>> {
        let path = self.file_path(file_name);
        if !path.exists() {
            warn!("File {} does not exist", path.display());
            return Vec::new();
        }

        let mut reader = match csv::Reader::from_path(&path) {
            Ok(reader) => reader,
            Err(err) => {
                error!("Error reading CSV file {}: {}", path.display(), err);
                return Vec::new();
            }
        };

        let headers = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(err) => {
                error!("Error reading CSV header {}: {}", path.display(), err);
                return Vec::new();
            }
        };

        let mut mappings = Vec::new();
        for record in reader.records() {
            match record {
                Ok(record) => {
                    let mapping: HashMap<String, String> = headers
                        .iter()
                        .zip(record.iter())
                        .map(|(key, value)| (key.to_string(), value.to_string()))
                        .collect();
                    mappings.push(mapping);
                }
                Err(err) => {
                    warn!("Skipping unreadable record in {}: {}", path.display(), err);
                }
            }
        }

        info!(
            "Successfully read {} record(s) from {}",
            mappings.len(),
            path.display()
        );
        mappings
    }

    /// Parses every readable row of a ledger file into a `SignalRow`,
    /// skipping malformed rows individually with a warning.
    pub fn read_signal_rows(&self, file_name: &str) -> Vec<SignalRow> {
        self.read_all(file_name)
            .iter()
            .filter_map(|mapping| match SignalRow::from_mapping(mapping) {
                Ok(row) => Some(row),
                Err(err) => {
                    warn!("Skipping malformed ledger row in {}: {}", file_name, err);
                    None
                }
            })
            .collect()
    }

    /// The row with the maximum parsable tradeday among rows whose `code`
    /// matches. Rows with unparsable tradedays are excluded, not errors.
    pub fn latest(&self, code: &str) -> Option<SignalRow> {
        self.read_signal_rows(code)
            .into_iter()
            .filter(|row| row.code == code)
            .max_by_key(|row| row.tradeday)
    }

    /// Truncates a ledger file. Returns `false` when the file is missing
    /// or the truncate fails.
    pub fn clear(&self, file_name: &str) -> bool {
        let path = self.file_path(file_name);
        if !path.exists() {
            warn!("File {} does not exist", path.display());
            return false;
        }
        match File::create(&path) {
            Ok(_) => {
                info!("Successfully cleared content of {}", path.display());
                true
            }
            Err(err) => {
                error!("Error clearing file {}: {}", path.display(), err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SIGNAL_FIELD_NAMES;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row_record(code: &str, tradeday: &str) -> Vec<String> {
        let mut record = SignalRow::seed(code, date(2019, 1, 2)).to_record();
        record[1] = tradeday.to_string();
        record
    }

    #[test]
    fn append_with_same_schema_preserves_prior_rows() {
        let dir = TempDir::new().unwrap();
        let ledger = SignalLedger::new(dir.path());

        assert!(ledger.append("0838", &[row_record("0838", "2019-01-02")], &SIGNAL_FIELD_NAMES));
        assert!(ledger.append("0838", &[row_record("0838", "2019-01-03")], &SIGNAL_FIELD_NAMES));

        let rows = ledger.read_all("0838");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["tradeday"], "2019-01-02");
        assert_eq!(rows[1]["tradeday"], "2019-01-03");
    }

    #[test]
    fn schema_change_rewrites_file_with_new_rows_only() {
        let dir = TempDir::new().unwrap();
        let ledger = SignalLedger::new(dir.path());

        assert!(ledger.append("0838", &[row_record("0838", "2019-01-02")], &SIGNAL_FIELD_NAMES));

        let new_fields = ["code", "tradeday"];
        let new_rows = vec![vec!["0838".to_string(), "2019-02-01".to_string()]];
        assert!(ledger.append("0838", &new_rows, &new_fields));

        let rows = ledger.read_all("0838");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[0]["tradeday"], "2019-02-01");
    }

    #[test]
    fn latest_picks_max_tradeday_and_skips_unparsable() {
        let dir = TempDir::new().unwrap();
        let ledger = SignalLedger::new(dir.path());

        let rows = vec![
            row_record("0838", "2019-01-03"),
            row_record("0838", "garbage"),
            row_record("0838", "2019-01-02"),
            row_record("0999", "2019-12-31"),
        ];
        assert!(ledger.append("0838", &rows, &SIGNAL_FIELD_NAMES));

        let latest = ledger.latest("0838").unwrap();
        assert_eq!(latest.tradeday, date(2019, 1, 3));
    }

    #[test]
    fn read_all_of_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = SignalLedger::new(dir.path());
        assert!(ledger.read_all("0404").is_empty());
        assert!(ledger.latest("0404").is_none());
    }

    #[test]
    fn clear_truncates_existing_file() {
        let dir = TempDir::new().unwrap();
        let ledger = SignalLedger::new(dir.path());
        assert!(!ledger.clear("0838"));

        assert!(ledger.append("0838", &[row_record("0838", "2019-01-02")], &SIGNAL_FIELD_NAMES));
        assert!(ledger.clear("0838"));
        assert!(ledger.read_all("0838").is_empty());
    }
}
