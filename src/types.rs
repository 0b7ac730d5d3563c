use std::collections::BTreeMap;

use geo::{Geometry, MultiPolygon};

use crate::error::{PipelineError, Result};

/// Geographic resolution of a PLACES query. The two levels come from two
/// distinct Socrata datasets and join differently against boundary data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Census-tract rows, joined onto per-state tract boundary files.
    Tract,
    /// County rows, joined onto the single national county boundary file.
    County,
}

/// One row of the PLACES extract after reshaping.
///
/// `fips` holds the tract FIPS or county FIPS depending on [`Resolution`].
/// Indicator values stay as strings until the orchestrator coerces a column
/// to `f64` for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacesRecord {
    pub state: Option<String>,
    pub county: Option<String>,
    pub fips: Option<String>,
    pub total_population: Option<String>,
    pub values: BTreeMap<String, String>,
    pub geometry: Option<Geometry<f64>>,
}

/// One polygon of the merged spatial table. `geometry` is `None` only in
/// county mode, for fetched rows with no boundary match.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRow {
    pub geoid: String,
    pub geometry: Option<MultiPolygon<f64>>,
    pub values: BTreeMap<String, Option<String>>,
}

/// Boundary polygons joined with fetched indicator values, one row per
/// polygon (tract mode) or per fetched record (county mode).
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedTable {
    pub columns: Vec<String>,
    pub rows: Vec<CombinedRow>,
}

impl CombinedTable {
    /// Coerce one indicator column to floating point. Unmatched join keys
    /// stay `None`; a value that fails to parse is a typed error.
    pub fn column_as_f64(&self, column: &str) -> Result<Vec<Option<f64>>> {
        if !self.columns.iter().any(|c| c == column) {
            return Err(PipelineError::MissingColumn(column.to_string()));
        }
        self.rows
            .iter()
            .map(|row| match row.values.get(column) {
                Some(Some(raw)) => raw
                    .trim()
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| PipelineError::NonNumericColumn {
                        column: column.to_string(),
                        value: raw.clone(),
                    }),
                _ => Ok(None),
            })
            .collect()
    }

    /// Reproject every geometry with the given coordinate mapping. Used once
    /// per pipeline run to move from lon/lat into Web Mercator.
    pub fn map_coords<F>(&self, f: F) -> CombinedTable
    where
        F: Fn(geo::Coord<f64>) -> geo::Coord<f64> + Copy,
    {
        use geo::MapCoords;
        CombinedTable {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|row| CombinedRow {
                    geoid: row.geoid.clone(),
                    geometry: row.geometry.as_ref().map(|g| g.map_coords(f)),
                    values: row.values.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(values: Vec<Option<&str>>) -> CombinedTable {
        CombinedTable {
            columns: vec!["BPHIGH_CrudePrev".to_string()],
            rows: values
                .into_iter()
                .enumerate()
                .map(|(i, v)| CombinedRow {
                    geoid: format!("0600000000{i}"),
                    geometry: None,
                    values: [("BPHIGH_CrudePrev".to_string(), v.map(str::to_string))]
                        .into_iter()
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn column_coercion_keeps_nulls() {
        let table = table_with(vec![Some("31.4"), None, Some(" 28 ")]);
        let col = table.column_as_f64("BPHIGH_CrudePrev").unwrap();
        assert_eq!(col, vec![Some(31.4), None, Some(28.0)]);
    }

    #[test]
    fn column_coercion_rejects_non_numeric() {
        let table = table_with(vec![Some("lots")]);
        let err = table.column_as_f64("BPHIGH_CrudePrev").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NonNumericColumn { ref value, .. } if value == "lots"
        ));
    }

    #[test]
    fn unknown_column_is_an_error() {
        let table = table_with(vec![Some("1.0")]);
        assert!(matches!(
            table.column_as_f64("OBESITY_CrudePrev"),
            Err(PipelineError::MissingColumn(_))
        ));
    }
}
