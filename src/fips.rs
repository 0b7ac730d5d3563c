//! State and county name to FIPS code resolution.
//!
//! State codes are a fixed table. County codes vary by vintage, so they are
//! loaded from a `state,county,fips` CSV shipped alongside the boundary data.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Full state names with their two-digit FIPS codes, plus DC and Puerto
/// Rico. Order matches Census Bureau numbering.
pub const STATE_FIPS: &[(&str, &str)] = &[
    ("Alabama", "01"),
    ("Alaska", "02"),
    ("Arizona", "04"),
    ("Arkansas", "05"),
    ("California", "06"),
    ("Colorado", "08"),
    ("Connecticut", "09"),
    ("Delaware", "10"),
    ("District of Columbia", "11"),
    ("Florida", "12"),
    ("Georgia", "13"),
    ("Hawaii", "15"),
    ("Idaho", "16"),
    ("Illinois", "17"),
    ("Indiana", "18"),
    ("Iowa", "19"),
    ("Kansas", "20"),
    ("Kentucky", "21"),
    ("Louisiana", "22"),
    ("Maine", "23"),
    ("Maryland", "24"),
    ("Massachusetts", "25"),
    ("Michigan", "26"),
    ("Minnesota", "27"),
    ("Mississippi", "28"),
    ("Missouri", "29"),
    ("Montana", "30"),
    ("Nebraska", "31"),
    ("Nevada", "32"),
    ("New Hampshire", "33"),
    ("New Jersey", "34"),
    ("New Mexico", "35"),
    ("New York", "36"),
    ("North Carolina", "37"),
    ("North Dakota", "38"),
    ("Ohio", "39"),
    ("Oklahoma", "40"),
    ("Oregon", "41"),
    ("Pennsylvania", "42"),
    ("Rhode Island", "44"),
    ("South Carolina", "45"),
    ("South Dakota", "46"),
    ("Tennessee", "47"),
    ("Texas", "48"),
    ("Utah", "49"),
    ("Vermont", "50"),
    ("Virginia", "51"),
    ("Washington", "53"),
    ("West Virginia", "54"),
    ("Wisconsin", "55"),
    ("Wyoming", "56"),
    ("Puerto Rico", "72"),
];

/// Resolve a full state name (e.g. "California") to its two-digit FIPS code.
pub fn state_fips(state: &str) -> Result<&'static str> {
    let wanted = state.trim();
    STATE_FIPS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        .map(|(_, code)| *code)
        .ok_or_else(|| PipelineError::UnknownState(state.to_string()))
}

/// County name to five-digit county FIPS lookup, loaded from a CSV with a
/// `state,county,fips` header. Lookups are case-insensitive and ignore a
/// trailing " County" on the county name.
#[derive(Debug, Clone)]
pub struct CountyLookup {
    codes: HashMap<(String, String), String>,
}

pub(crate) fn normalize_county(county: &str) -> String {
    let trimmed = county.trim();
    let trimmed = trimmed
        .strip_suffix(" County")
        .or_else(|| trimmed.strip_suffix(" county"))
        .unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

impl CountyLookup {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| PipelineError::BoundaryIo {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::Reader::from_reader(file);
        let mut codes = HashMap::new();
        for result in reader.records() {
            let record = result.map_err(|e| PipelineError::BoundaryFormat {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let (state, county, fips) = match (record.get(0), record.get(1), record.get(2)) {
                (Some(s), Some(c), Some(f)) => (s, c, f),
                _ => continue,
            };
            codes.insert(
                (state.trim().to_ascii_lowercase(), normalize_county(county)),
                fips.trim().to_string(),
            );
        }
        Ok(CountyLookup { codes })
    }

    /// Resolve a county within a state to its five-digit FIPS code.
    pub fn county_fips(&self, county: &str, state: &str) -> Result<&str> {
        let key = (state.trim().to_ascii_lowercase(), normalize_county(county));
        self.codes
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::UnknownCounty {
                county: county.to_string(),
                state: state.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn state_lookup_is_case_insensitive() {
        assert_eq!(state_fips("California").unwrap(), "06");
        assert_eq!(state_fips("maryland").unwrap(), "24");
        assert_eq!(state_fips(" Wyoming ").unwrap(), "56");
    }

    #[test]
    fn unknown_state_is_an_error() {
        assert!(matches!(
            state_fips("Cascadia"),
            Err(PipelineError::UnknownState(_))
        ));
    }

    #[test]
    fn county_lookup_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "state,county,fips").unwrap();
        writeln!(file, "California,Alameda,06001").unwrap();
        writeln!(file, "Maryland,Montgomery,24031").unwrap();
        let lookup = CountyLookup::from_path(file.path()).unwrap();

        assert_eq!(lookup.county_fips("Alameda", "California").unwrap(), "06001");
        assert_eq!(
            lookup.county_fips("Montgomery County", "maryland").unwrap(),
            "24031"
        );
        assert!(matches!(
            lookup.county_fips("Montgomery", "Alabama"),
            Err(PipelineError::UnknownCounty { .. })
        ));
    }
}
