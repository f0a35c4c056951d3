//! External collaborator contract for CSV discovery (spec §1, §4.2).
//!
//! The core only needs `read_csv`/`list_available`; how files are located
//! on disk (or over a network, or faked in tests) is out of scope for the
//! pipeline itself. Declaring this as a trait rather than a concrete type
//! is the statically-typed analogue of the source's structural-typing
//! `DataSource` protocol.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A CSV file resolved to raw bytes plus whatever decoding happened on the
/// way in (for quality metrics / diagnostics).
pub struct RawCsv {
    pub bytes: Vec<u8>,
    pub encoding_used: &'static str,
}

pub trait DataSource: Send + Sync {
    /// Resolves `logical_name` (e.g. "labor", "sales") to file bytes.
    /// Exact match first, then the date-suffixed variant
    /// `NAME_YYYY_MM_DD.csv`.
    fn read_csv(&self, logical_name: &str, date: NaiveDate) -> Result<Option<RawCsv>>;

    /// Logical names that currently resolve to a file for `date`.
    fn list_available(&self, date: NaiveDate) -> Result<Vec<String>>;
}

/// Filesystem-backed `DataSource`: one directory per `(restaurant, date)`.
pub struct FsDataSource {
    root: PathBuf,
}

impl FsDataSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn candidate_paths(&self, logical_name: &str, date: NaiveDate) -> Vec<PathBuf> {
        vec![
            self.root.join(format!("{logical_name}.csv")),
            self.root
                .join(format!("{logical_name}_{}.csv", date.format("%Y_%m_%d"))),
        ]
    }
}

impl DataSource for FsDataSource {
    fn read_csv(&self, logical_name: &str, date: NaiveDate) -> Result<Option<RawCsv>> {
        for path in self.candidate_paths(logical_name, date) {
            if path.exists() {
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let (decoded, encoding_used) = decode_with_fallback(&bytes)?;
                return Ok(Some(RawCsv { bytes: decoded, encoding_used }));
            }
        }
        Ok(None)
    }

    fn list_available(&self, date: NaiveDate) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if !self.root.exists() {
            return Ok(names);
        }
        let suffix = format!("_{}.csv", date.format("%Y_%m_%d"));
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(stem) = file_name.strip_suffix(".csv") {
                if let Some(logical) = file_name.strip_suffix(&suffix) {
                    names.push(logical.to_string());
                } else {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Tries UTF-8 first (the common case), then the single-byte legacy
/// encodings POS exports are sometimes produced in. The first decode that
/// produces no replacement characters wins.
pub fn decode_with_fallback(bytes: &[u8]) -> Result<(Vec<u8>, &'static str)> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Ok((s.as_bytes().to_vec(), "utf-8"));
    }

    // encoding_rs has no distinct ISO-8859-1 decoder: per the WHATWG
    // encoding standard the "latin1"/"iso-8859-1" labels are aliases of
    // windows-1252, which is a proper superset. One decode attempt covers
    // all three names in the fallback chain.
    let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if !had_errors {
        return Ok((decoded.into_owned().into_bytes(), "cp1252"));
    }

    // Nothing decoded cleanly; fall back to lossy UTF-8 rather than fail
    // the whole file over a handful of bad bytes.
    let lossy = String::from_utf8_lossy(bytes).into_owned();
    Ok((lossy.into_bytes(), "utf-8-lossy"))
}

/// In-memory `DataSource` for tests: maps logical name -> CSV text.
pub struct FakeDataSource {
    files: HashMap<String, String>,
}

impl FakeDataSource {
    pub fn new() -> Self {
        Self { files: HashMap::new() }
    }

    pub fn with_file(mut self, logical_name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(logical_name.into(), contents.into());
        self
    }
}

impl Default for FakeDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for FakeDataSource {
    fn read_csv(&self, logical_name: &str, _date: NaiveDate) -> Result<Option<RawCsv>> {
        Ok(self.files.get(logical_name).map(|s| RawCsv {
            bytes: s.as_bytes().to_vec(),
            encoding_used: "utf-8",
        }))
    }

    fn list_available(&self, _date: NaiveDate) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

pub fn csv_path_for(root: &Path, logical_name: &str) -> PathBuf {
    root.join(format!("{logical_name}.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_data_source_resolves_registered_files() {
        let ds = FakeDataSource::new().with_file("labor", "Employee,Job Title\n");
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let raw = ds.read_csv("labor", date).unwrap().unwrap();
        assert_eq!(raw.bytes, b"Employee,Job Title\n".to_vec());
        assert!(ds.read_csv("missing", date).unwrap().is_none());
    }

    #[test]
    fn decode_prefers_utf8() {
        let (decoded, used) = decode_with_fallback("hello".as_bytes()).unwrap();
        assert_eq!(used, "utf-8");
        assert_eq!(decoded, b"hello".to_vec());
    }
}
