//! Streaming record parsers for published name archives
//!
//! Both archives are zip files of small comma-separated text entries:
//!
//! - national: `yobYYYY.txt`, rows `name,sex,count`
//! - state: `XX.TXT`, rows `state,sex,year,name,count`
//!
//! [`ArchiveRecords`] walks the entries one at a time and hands each line to a
//! [`RecordFormat`]. Only the current entry is held in memory. Malformed lines
//! are logged, counted in [`ParseStats`] and skipped; archive-level failures
//! (unreadable zip, CRC mismatch) are yielded once as an `Err` and end the
//! sequence.

pub mod national;
pub mod state;

use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::Result;
use crate::models::{Sex, YearRange, MAX_NAME_LEN};

pub use national::{NationalFormat, NationalRow};
pub use state::{StateFormat, StateRow};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// What to do with one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPlan<E> {
    /// Entry holds data; `E` is the per-entry context (e.g. its year)
    Read(E),
    /// Entry name does not follow the format's naming convention
    Unmatched,
    /// Entry is a data entry but lies outside the requested window
    OutOfWindow,
}

/// One archive layout
pub trait RecordFormat {
    type Entry;
    type Row;

    /// Decide from the entry's base name whether to read it.
    fn plan_entry(&self, file_name: &str, window: &YearRange) -> EntryPlan<Self::Entry>;

    /// Parse one non-blank line. `Err` carries the reason it was rejected.
    fn parse_line(&self, entry: &Self::Entry, line: &str) -> std::result::Result<Self::Row, String>;

    /// Row-level window check for formats whose year is not in the entry name.
    fn row_in_window(&self, _row: &Self::Row, _window: &YearRange) -> bool {
        true
    }
}

/// Counters collected while walking an archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub entries_read: usize,
    pub entries_unmatched: usize,
    pub entries_out_of_window: usize,
    pub rows: u64,
    pub rows_out_of_window: u64,
    pub malformed_lines: u64,
}

struct OpenEntry<E> {
    name: String,
    context: E,
    data: Vec<u8>,
    pos: usize,
    line_no: usize,
}

/// Lazy, single-pass sequence of typed rows from a zip archive
pub struct ArchiveRecords<R: Read + Seek, F: RecordFormat> {
    archive: ZipArchive<R>,
    format: F,
    window: YearRange,
    next_index: usize,
    current: Option<OpenEntry<F::Entry>>,
    stats: ParseStats,
    finished: bool,
}

impl<F: RecordFormat> ArchiveRecords<BufReader<File>, F> {
    /// Open a zip file from disk
    pub fn open(path: impl AsRef<Path>, format: F, window: YearRange) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file), format, window)
    }
}

impl<R: Read + Seek, F: RecordFormat> ArchiveRecords<R, F> {
    pub fn new(reader: R, format: F, window: YearRange) -> Result<Self> {
        let archive = ZipArchive::new(reader)?;
        Ok(Self {
            archive,
            format,
            window,
            next_index: 0,
            current: None,
            stats: ParseStats::default(),
            finished: false,
        })
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Load the next data entry into memory. `Ok(false)` when none remain.
    fn advance_entry(&mut self) -> Result<bool> {
        while self.next_index < self.archive.len() {
            let index = self.next_index;
            self.next_index += 1;

            let mut file = self.archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }

            let full_name = file.name().to_string();
            let base_name = full_name.rsplit('/').next().unwrap_or(&full_name);

            match self.format.plan_entry(base_name, &self.window) {
                EntryPlan::Unmatched => {
                    debug!(entry = %full_name, "Skipping non-data archive entry");
                    self.stats.entries_unmatched += 1;
                },
                EntryPlan::OutOfWindow => {
                    debug!(
                        entry = %full_name,
                        window = %self.window,
                        "Skipping entry outside year window"
                    );
                    self.stats.entries_out_of_window += 1;
                },
                EntryPlan::Read(context) => {
                    let mut data = Vec::with_capacity(file.size().min(64 * 1024 * 1024) as usize);
                    file.read_to_end(&mut data)?;
                    debug!(entry = %full_name, bytes = data.len(), "Reading archive entry");

                    self.stats.entries_read += 1;
                    self.current = Some(OpenEntry {
                        name: full_name,
                        context,
                        data,
                        pos: 0,
                        line_no: 0,
                    });
                    return Ok(true);
                },
            }
        }
        Ok(false)
    }

    /// Next row of the current entry, or `None` once it is exhausted.
    fn next_row_in_entry(&mut self) -> Option<F::Row> {
        let entry = self.current.as_mut()?;

        while entry.pos < entry.data.len() {
            let rest = &entry.data[entry.pos..];
            let end = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
            let mut raw = &rest[..end];
            entry.pos += end + 1;
            entry.line_no += 1;

            if let Some(stripped) = raw.strip_suffix(b"\r") {
                raw = stripped;
            }
            if entry.line_no == 1 {
                if let Some(stripped) = raw.strip_prefix(UTF8_BOM) {
                    raw = stripped;
                }
            }

            let line = match std::str::from_utf8(raw) {
                Ok(line) => line,
                Err(_) => {
                    warn!(
                        entry = %entry.name,
                        line = entry.line_no,
                        "Skipping line with invalid UTF-8"
                    );
                    self.stats.malformed_lines += 1;
                    continue;
                },
            };

            if line.trim().is_empty() {
                continue;
            }

            match self.format.parse_line(&entry.context, line) {
                Ok(row) => {
                    if !self.format.row_in_window(&row, &self.window) {
                        self.stats.rows_out_of_window += 1;
                        continue;
                    }
                    self.stats.rows += 1;
                    return Some(row);
                },
                Err(reason) => {
                    warn!(
                        entry = %entry.name,
                        line = entry.line_no,
                        reason = %reason,
                        "Skipping malformed line"
                    );
                    self.stats.malformed_lines += 1;
                },
            }
        }

        self.current = None;
        None
    }
}

impl<R: Read + Seek, F: RecordFormat> Iterator for ArchiveRecords<R, F> {
    type Item = Result<F::Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if let Some(row) = self.next_row_in_entry() {
                return Some(Ok(row));
            }

            match self.advance_entry() {
                Ok(true) => continue,
                Ok(false) => {
                    self.finished = true;
                    return None;
                },
                Err(e) => {
                    self.finished = true;
                    self.current = None;
                    return Some(Err(e));
                },
            }
        }
    }
}

/// Split a line into exactly `N` trimmed comma-separated fields.
pub(crate) fn split_fields<const N: usize>(line: &str) -> std::result::Result<[&str; N], String> {
    let mut fields = [""; N];
    let mut parts = line.split(',');
    for slot in fields.iter_mut() {
        *slot = parts
            .next()
            .ok_or_else(|| format!("expected {} fields", N))?
            .trim();
    }
    if parts.next().is_some() {
        return Err(format!("expected {} fields", N));
    }
    Ok(fields)
}

pub(crate) fn parse_name(raw: &str) -> std::result::Result<String, String> {
    let len = raw.chars().count();
    if len == 0 {
        return Err("empty name".to_string());
    }
    if len > MAX_NAME_LEN {
        return Err(format!("name longer than {} characters", MAX_NAME_LEN));
    }
    Ok(raw.to_string())
}

pub(crate) fn parse_sex(raw: &str) -> std::result::Result<Sex, String> {
    raw.parse::<Sex>().map_err(|e| e.to_string())
}

pub(crate) fn parse_count(raw: &str) -> std::result::Result<i32, String> {
    match raw.parse::<i32>() {
        Ok(count) if count >= 1 => Ok(count),
        Ok(count) => Err(format!("non-positive count {}", count)),
        Err(_) => Err(format!("non-numeric count '{}'", raw)),
    }
}

pub(crate) fn parse_year(raw: &str) -> std::result::Result<i32, String> {
    match raw.parse::<i32>() {
        Ok(year) if year >= 1 => Ok(year),
        _ => Err(format!("invalid year '{}'", raw)),
    }
}
