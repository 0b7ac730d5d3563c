//! Join fetched PLACES records onto local census boundary polygons.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geo::MultiPolygon;
use geojson::GeoJson;
use tracing::debug;

use crate::config::DataConfig;
use crate::error::{PipelineError, Result};
use crate::fips::{normalize_county, state_fips, CountyLookup};
use crate::types::{CombinedRow, CombinedTable, PlacesRecord, Resolution};

/// One boundary polygon with the identifying attributes used for joining.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub geoid: Option<String>,
    pub statefp: Option<String>,
    pub countyfp: Option<String>,
    pub geometry: MultiPolygon<f64>,
}

/// Load a boundary layer from GeoJSON or a polygon shapefile, selected by
/// file extension. Non-polygon features are skipped.
pub fn load_boundaries(path: &Path) -> Result<Vec<Boundary>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| PipelineError::BoundaryFormat {
            path: path.to_path_buf(),
            message: "boundary file has no extension".to_string(),
        })?;

    match extension.as_str() {
        "shp" => load_shapefile(path),
        "json" | "geojson" => load_geojson(path),
        other => Err(PipelineError::BoundaryFormat {
            path: path.to_path_buf(),
            message: format!("unsupported boundary format: {other}"),
        }),
    }
}

fn load_geojson(path: &Path) -> Result<Vec<Boundary>> {
    let file = File::open(path).map_err(|source| PipelineError::BoundaryIo {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let geojson =
        GeoJson::from_reader(reader).map_err(|e| PipelineError::BoundaryFormat {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => {
            return Err(PipelineError::BoundaryFormat {
                path: path.to_path_buf(),
                message: "boundary GeoJSON must be a FeatureCollection".to_string(),
            })
        }
    };

    let mut boundaries = Vec::new();
    for feature in collection.features {
        let prop = |key: &str| -> Option<String> {
            match feature.properties.as_ref()?.get(key)? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };
        let geoid = prop("GEOID");
        let statefp = prop("STATEFP");
        let countyfp = prop("COUNTYFP");

        let geometry = match feature.geometry {
            Some(g) => {
                let converted: geo::Geometry<f64> =
                    g.value
                        .try_into()
                        .map_err(|e: geojson::Error| PipelineError::BoundaryFormat {
                            path: path.to_path_buf(),
                            message: e.to_string(),
                        })?;
                match converted {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            }
            None => continue,
        };

        boundaries.push(Boundary {
            geoid,
            statefp,
            countyfp,
            geometry,
        });
    }
    Ok(boundaries)
}

fn load_shapefile(path: &Path) -> Result<Vec<Boundary>> {
    let mut reader =
        shapefile::Reader::from_path(path).map_err(|e| PipelineError::BoundaryFormat {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut boundaries = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| PipelineError::BoundaryFormat {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let field = |name: &str| -> Option<String> {
            match record.get(name) {
                Some(shapefile::dbase::FieldValue::Character(Some(s))) => Some(s.clone()),
                Some(shapefile::dbase::FieldValue::Numeric(Some(n))) => Some(n.to_string()),
                _ => None,
            }
        };
        let geoid = field("GEOID");
        let statefp = field("STATEFP");
        let countyfp = field("COUNTYFP");

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => {
                polygon
                    .try_into()
                    .map_err(|e| PipelineError::BoundaryFormat {
                        path: path.to_path_buf(),
                        message: format!("failed to convert polygon: {e:?}"),
                    })?
            }
            shapefile::Shape::PolygonM(polygon) => {
                polygon
                    .try_into()
                    .map_err(|e| PipelineError::BoundaryFormat {
                        path: path.to_path_buf(),
                        message: format!("failed to convert polygonM: {e:?}"),
                    })?
            }
            shapefile::Shape::PolygonZ(polygon) => {
                polygon
                    .try_into()
                    .map_err(|e| PipelineError::BoundaryFormat {
                        path: path.to_path_buf(),
                        message: format!("failed to convert polygonZ: {e:?}"),
                    })?
            }
            _ => continue,
        };

        boundaries.push(Boundary {
            geoid,
            statefp,
            countyfp,
            geometry,
        });
    }
    Ok(boundaries)
}

/// Derive a county's five-digit FIPS from the fetched rows themselves:
/// county-level rows carry it directly, tract rows as the first five digits
/// of the tract FIPS.
fn county_fips_from_records(records: &[PlacesRecord], county: &str) -> Option<String> {
    let wanted = normalize_county(county);
    records.iter().find_map(|record| {
        let name = record.county.as_deref()?;
        if normalize_county(name) != wanted {
            return None;
        }
        let fips = record.fips.as_deref()?;
        fips.get(..5).map(str::to_string)
    })
}

fn column_names(records: &[PlacesRecord]) -> Vec<String> {
    let names: BTreeSet<&String> = records.iter().flat_map(|r| r.values.keys()).collect();
    names.into_iter().cloned().collect()
}

fn joined_values(
    columns: &[String],
    record: Option<&&PlacesRecord>,
) -> BTreeMap<String, Option<String>> {
    columns
        .iter()
        .map(|col| {
            let value = record.and_then(|r| r.values.get(col).cloned());
            (col.clone(), value)
        })
        .collect()
}

/// Join fetched records onto boundary polygons.
///
/// Tract mode LEFT-joins the state's tract boundaries against the records,
/// one row per polygon; a named county first restricts the boundaries via
/// its `COUNTYFP`. County mode RIGHT-joins the national county layer against
/// the records, one row per fetched record, keeping rows whose FIPS has no
/// boundary match with a null geometry. Unmatched join keys always surface
/// as null values, never as dropped rows.
pub fn merge_data(
    records: &[PlacesRecord],
    state: &str,
    county: Option<&str>,
    resolution: Resolution,
    data: &DataConfig,
) -> Result<CombinedTable> {
    let columns = column_names(records);

    match resolution {
        Resolution::Tract => {
            let fips = state_fips(state)?;
            let path = data.boundary_dir.join(format!("{fips}.geojson"));
            let mut boundaries = load_boundaries(&path)?;

            if let Some(county) = county {
                let looked_up = CountyLookup::from_path(&data.county_lookup)
                    .and_then(|lookup| lookup.county_fips(county, state).map(str::to_string));
                let county_fips = match looked_up {
                    Ok(code) => code,
                    // The lookup table may be incomplete; the fetched rows
                    // name their county and carry the code themselves.
                    Err(err) => match county_fips_from_records(records, county) {
                        Some(code) => code,
                        None => return Err(err),
                    },
                };
                // County FIPS are five digits; COUNTYFP is the last three.
                let county_fp = county_fips
                    .get(2..)
                    .unwrap_or(county_fips.as_str())
                    .to_string();
                boundaries.retain(|b| b.countyfp.as_deref() == Some(county_fp.as_str()));
            }
            debug!(
                state,
                boundaries = boundaries.len(),
                records = records.len(),
                "joining tract boundaries"
            );

            let by_fips: HashMap<&str, &PlacesRecord> = records
                .iter()
                .filter_map(|r| r.fips.as_deref().map(|f| (f, r)))
                .collect();

            let rows = boundaries
                .into_iter()
                .map(|boundary| {
                    let geoid = boundary.geoid.unwrap_or_default();
                    let record = by_fips.get(geoid.as_str());
                    CombinedRow {
                        values: joined_values(&columns, record),
                        geometry: Some(boundary.geometry),
                        geoid,
                    }
                })
                .collect();
            Ok(CombinedTable { columns, rows })
        }
        Resolution::County => {
            let boundaries = load_boundaries(&data.county_boundaries)?;
            let by_fips: HashMap<String, &MultiPolygon<f64>> = boundaries
                .iter()
                .filter_map(|b| {
                    let state_fp = b.statefp.as_deref()?;
                    let county_fp = b.countyfp.as_deref()?;
                    Some((format!("{state_fp}{county_fp}"), &b.geometry))
                })
                .collect();
            debug!(
                state,
                boundaries = by_fips.len(),
                records = records.len(),
                "joining county boundaries"
            );

            let rows = records
                .iter()
                .map(|record| {
                    let geoid = record.fips.clone().unwrap_or_default();
                    let geometry = by_fips.get(&geoid).map(|mp| (*mp).clone());
                    CombinedRow {
                        values: joined_values(&columns, Some(&record)),
                        geometry,
                        geoid,
                    }
                })
                .collect();
            Ok(CombinedTable { columns, rows })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn geojson_boundaries_expose_join_attributes() {
        let mut file = tempfile::Builder::new().suffix(".geojson").tempfile().unwrap();
        write!(
            file,
            r#"{{"type":"FeatureCollection","features":[
                {{"type":"Feature",
                  "geometry":{{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
                  "properties":{{"GEOID":"06001400100","STATEFP":"06","COUNTYFP":"001"}}}},
                {{"type":"Feature",
                  "geometry":{{"type":"Point","coordinates":[0.5,0.5]}},
                  "properties":{{"GEOID":"skipped"}}}}]}}"#
        )
        .unwrap();

        let boundaries = load_boundaries(file.path()).unwrap();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].geoid.as_deref(), Some("06001400100"));
        assert_eq!(boundaries[0].countyfp.as_deref(), Some("001"));
    }

    #[test]
    fn county_fips_derived_from_tract_records() {
        let record = PlacesRecord {
            state: Some("Maryland".to_string()),
            county: Some("Montgomery".to_string()),
            fips: Some("24031700101".to_string()),
            total_population: None,
            values: Default::default(),
            geometry: None,
        };
        assert_eq!(
            county_fips_from_records(&[record.clone()], "Montgomery County"),
            Some("24031".to_string())
        );
        assert_eq!(county_fips_from_records(&[record], "Frederick"), None);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_boundaries(Path::new("data/boundaries.gpkg")).unwrap_err();
        assert!(matches!(err, PipelineError::BoundaryFormat { .. }));
    }
}
