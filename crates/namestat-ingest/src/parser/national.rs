//! National archive format: one `yobYYYY.txt` entry per year

use regex::Regex;
use serde::Serialize;

use super::{parse_count, parse_name, parse_sex, split_fields, EntryPlan, RecordFormat};
use crate::error::Result;
use crate::models::{Sex, YearRange};

/// One `name,sex,count` row, with the year taken from its entry name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NationalRow {
    pub name: String,
    pub sex: Sex,
    pub year: i32,
    pub count: i32,
}

pub struct NationalFormat {
    entry_pattern: Regex,
}

impl NationalFormat {
    pub fn new() -> Result<Self> {
        Ok(Self {
            entry_pattern: Regex::new(r"^yob(\d{4})\.txt$")?,
        })
    }
}

impl RecordFormat for NationalFormat {
    type Entry = i32;
    type Row = NationalRow;

    fn plan_entry(&self, file_name: &str, window: &YearRange) -> EntryPlan<i32> {
        let year = self
            .entry_pattern
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i32>().ok());

        match year {
            None => EntryPlan::Unmatched,
            Some(year) if !window.contains(year) => EntryPlan::OutOfWindow,
            Some(year) => EntryPlan::Read(year),
        }
    }

    fn parse_line(&self, year: &i32, line: &str) -> std::result::Result<NationalRow, String> {
        let [name, sex, count] = split_fields::<3>(line)?;
        Ok(NationalRow {
            name: parse_name(name)?,
            sex: parse_sex(sex)?,
            year: *year,
            count: parse_count(count)?,
        })
    }
}
