//! CSV roster loading.
//!
//! Header names vary between state data exports, so each column is matched
//! against a list of aliases, ignoring case and treating spaces and
//! underscores alike.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use cep_core::School;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Error reading roster: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Required column '{column}' not found. Available columns: {available}")]
    MissingColumn { column: &'static str, available: String },
    #[error("Line {line}: invalid {column} value '{value}'")]
    InvalidCell {
        line: usize,
        column: &'static str,
        value: String,
    },
    #[error("Roster contains no schools")]
    Empty,
    #[error("District '{name}' not found. Available districts: {}", available.join(", "))]
    UnknownLea { name: String, available: Vec<String> },
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Isp,
    Enrollment,
    Lea,
    School,
    State,
}

impl Column {
    fn label(self) -> &'static str {
        match self {
            Column::Isp => "ISP",
            Column::Enrollment => "ENROLLMENT",
            Column::Lea => "LEA_NAME",
            Column::School => "SCHOOL",
            Column::State => "STATE",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Isp => &["ISP", "ISP %", "ISP%", "Identified Student Percentage"],
            Column::Enrollment => &["ENROLLMENT", "Student Enrollment", "Total Enrollment"],
            Column::Lea => &["LEA_NAME", "LEA Name", "District", "District Name", "School District"],
            Column::School => &["SCHOOL", "School Name"],
            Column::State => &["STATE"],
        }
    }
}

fn normalize(header: &str) -> String {
    header.trim().to_uppercase().replace(' ', "_")
}

fn find_column(headers: &csv::StringRecord, column: Column) -> Option<usize> {
    let aliases: Vec<String> = column.aliases().iter().map(|a| normalize(a)).collect();
    headers
        .iter()
        .position(|header| aliases.contains(&normalize(header)))
}

fn require_column(headers: &csv::StringRecord, column: Column) -> Result<usize, RosterError> {
    find_column(headers, column).ok_or_else(|| RosterError::MissingColumn {
        column: column.label(),
        available: headers.iter().collect::<Vec<_>>().join(", "),
    })
}

/// A raw ISP cell before the column's unit is known
#[derive(Debug, Clone, Copy)]
enum IspCell {
    /// Written with a `%` sign
    Percent(f64),
    Bare(f64),
}

fn parse_isp(value: &str, line: usize) -> Result<IspCell, RosterError> {
    let invalid = || RosterError::InvalidCell {
        line,
        column: Column::Isp.label(),
        value: value.to_string(),
    };
    let (digits, percent) = match value.strip_suffix('%') {
        Some(digits) => (digits.trim(), true),
        None => (value, false),
    };
    let number: f64 = digits.parse().map_err(|_| invalid())?;
    if !number.is_finite() {
        return Err(invalid());
    }
    Ok(if percent {
        IspCell::Percent(number)
    } else {
        IspCell::Bare(number)
    })
}

fn parse_enrollment(value: &str, line: usize) -> Result<u64, RosterError> {
    let invalid = || RosterError::InvalidCell {
        line,
        column: Column::Enrollment.label(),
        value: value.to_string(),
    };
    let cleaned = value.replace(',', "");
    if let Ok(count) = cleaned.parse::<u64>() {
        return Ok(count);
    }
    // Spreadsheet exports sometimes write counts as "120.0"
    let number: f64 = cleaned.parse().map_err(|_| invalid())?;
    if number.is_finite() && number >= 0.0 && number.fract() == 0.0 {
        Ok(number as u64)
    } else {
        Err(invalid())
    }
}

/// Schools in file order
#[derive(Debug, Clone)]
pub struct Roster {
    schools: Vec<School>,
}

impl Roster {
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RosterError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let isp_col = require_column(&headers, Column::Isp)?;
        let enrollment_col = require_column(&headers, Column::Enrollment)?;
        let lea_col = find_column(&headers, Column::Lea);
        let school_col = find_column(&headers, Column::School);
        let state_col = find_column(&headers, Column::State);

        let mut rows = Vec::new();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record?;
            // Header is line 1
            let line = index + 2;
            let cell = |col: Option<usize>| col.and_then(|c| record.get(c)).unwrap_or("").to_string();

            let isp = parse_isp(record.get(isp_col).unwrap_or(""), line)?;
            let enrollment = parse_enrollment(record.get(enrollment_col).unwrap_or(""), line)?;
            let name = match cell(school_col) {
                name if name.is_empty() => format!("School {}", index + 1),
                name => name,
            };
            let school = School::new(name, enrollment, 0.0)
                .with_district(cell(lea_col))
                .with_state(cell(state_col));
            rows.push((school, isp));
        }

        if rows.is_empty() {
            return Err(RosterError::Empty);
        }

        // One bare value above 1 means the whole column is in percent
        let bare_percent = rows
            .iter()
            .any(|(_, isp)| matches!(isp, IspCell::Bare(v) if *v > 1.0));
        let schools = rows
            .into_iter()
            .map(|(mut school, isp)| {
                school.isp = match isp {
                    IspCell::Percent(v) => v / 100.0,
                    IspCell::Bare(v) if bare_percent => v / 100.0,
                    IspCell::Bare(v) => v,
                };
                school
            })
            .collect::<Vec<_>>();

        tracing::debug!(schools = schools.len(), bare_percent, "loaded roster");
        Ok(Self { schools })
    }

    pub fn schools(&self) -> &[School] {
        &self.schools
    }

    pub fn into_schools(self) -> Vec<School> {
        self.schools
    }

    /// Distinct district names, sorted
    pub fn leas(&self) -> Vec<String> {
        self.schools
            .iter()
            .filter(|s| !s.district.is_empty())
            .map(|s| s.district.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Schools of one district, in file order
    pub fn for_lea(&self, name: &str) -> Result<Vec<School>, RosterError> {
        let schools: Vec<School> = self
            .schools
            .iter()
            .filter(|s| s.district == name)
            .cloned()
            .collect();
        if schools.is_empty() {
            return Err(RosterError::UnknownLea {
                name: name.to_string(),
                available: self.leas(),
            });
        }
        Ok(schools)
    }
}
