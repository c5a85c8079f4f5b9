//! State archive format: one `XX.TXT` entry per state

use regex::Regex;
use serde::Serialize;

use super::{
    parse_count, parse_name, parse_sex, parse_year, split_fields, EntryPlan, RecordFormat,
};
use crate::error::Result;
use crate::models::{Sex, YearRange};

/// One `state,sex,year,name,count` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateRow {
    pub state: String,
    pub sex: Sex,
    pub year: i32,
    pub name: String,
    pub count: i32,
}

pub struct StateFormat {
    entry_pattern: Regex,
}

impl StateFormat {
    pub fn new() -> Result<Self> {
        Ok(Self {
            entry_pattern: Regex::new(r"^([A-Z]{2})\.(?:TXT|txt)$")?,
        })
    }
}

/// Two ASCII letters, normalized to upper case.
pub fn normalize_state_code(raw: &str) -> Option<String> {
    let code = raw.trim();
    (code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| code.to_ascii_uppercase())
}

impl RecordFormat for StateFormat {
    /// State code from the entry name
    type Entry = String;
    type Row = StateRow;

    fn plan_entry(&self, file_name: &str, _window: &YearRange) -> EntryPlan<String> {
        match self.entry_pattern.captures(file_name).and_then(|caps| caps.get(1)) {
            Some(code) => EntryPlan::Read(code.as_str().to_string()),
            None => EntryPlan::Unmatched,
        }
    }

    fn parse_line(&self, _entry: &String, line: &str) -> std::result::Result<StateRow, String> {
        let [state, sex, year, name, count] = split_fields::<5>(line)?;
        Ok(StateRow {
            state: normalize_state_code(state)
                .ok_or_else(|| format!("invalid state code '{}'", state))?,
            sex: parse_sex(sex)?,
            year: parse_year(year)?,
            name: parse_name(name)?,
            count: parse_count(count)?,
        })
    }

    fn row_in_window(&self, row: &StateRow, window: &YearRange) -> bool {
        window.contains(row.year)
    }
}
