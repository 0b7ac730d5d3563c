//! Reshape a raw PLACES feature collection into typed records.

use std::collections::BTreeMap;

use geojson::{Feature, FeatureCollection};

use crate::error::Result;
use crate::types::{PlacesRecord, Resolution};

fn prop_string(feature: &Feature, key: &str) -> Option<String> {
    match feature.properties.as_ref()?.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Pure reshape of a feature collection into one record per feature.
///
/// The geographic identifier is read from `tractfips` or `countyfips` per
/// resolution; requested indicator columns keep their string representation.
/// Running the conversion twice over the same input yields identical output.
pub fn convert_data(
    collection: &FeatureCollection,
    columns: &[String],
    resolution: Resolution,
) -> Result<Vec<PlacesRecord>> {
    let fips_key = match resolution {
        Resolution::Tract => "tractfips",
        Resolution::County => "countyfips",
    };
    let mut records = Vec::with_capacity(collection.features.len());
    for feature in &collection.features {
        let mut values = BTreeMap::new();
        for column in columns {
            if let Some(value) = prop_string(feature, column) {
                values.insert(column.clone(), value);
            }
        }
        let geometry = match &feature.geometry {
            Some(g) => Some(geo::Geometry::<f64>::try_from(g.value.clone())?),
            None => None,
        };
        records.push(PlacesRecord {
            state: prop_string(feature, "statedesc"),
            county: prop_string(feature, "countyname"),
            fips: prop_string(feature, fips_key),
            total_population: prop_string(feature, "totalpopulation"),
            values,
            geometry,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::parse_feature_collection;

    const BODY: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature",
         "geometry":{"type":"Point","coordinates":[-122.28,37.78]},
         "properties":{"statedesc":"California","countyname":"Alameda",
                       "tractfips":"06001400100","totalpopulation":"2937",
                       "BPHIGH_CrudePrev":"27.4"}},
        {"type":"Feature","geometry":null,
         "properties":{"statedesc":"California","countyname":"Alameda",
                       "tractfips":"06001400200"}}]}"#;

    fn columns() -> Vec<String> {
        vec!["BPHIGH_CrudePrev".to_string()]
    }

    #[test]
    fn reshapes_features_into_records() {
        let fc = parse_feature_collection(BODY).unwrap();
        let records = convert_data(&fc, &columns(), Resolution::Tract).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fips.as_deref(), Some("06001400100"));
        assert_eq!(
            records[0].values.get("BPHIGH_CrudePrev").map(String::as_str),
            Some("27.4")
        );
        assert!(records[0].geometry.is_some());
        assert!(records[1].geometry.is_none());
        assert!(records[1].values.is_empty());
    }

    #[test]
    fn conversion_is_idempotent() {
        let fc = parse_feature_collection(BODY).unwrap();
        let first = convert_data(&fc, &columns(), Resolution::Tract).unwrap();
        let second = convert_data(&fc, &columns(), Resolution::Tract).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn county_mode_reads_county_fips() {
        let body = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":null,
             "properties":{"statedesc":"Maryland","countyname":"Montgomery",
                           "countyfips":"24031"}}]}"#;
        let fc = parse_feature_collection(body).unwrap();
        let records = convert_data(&fc, &[], Resolution::County).unwrap();
        assert_eq!(records[0].fips.as_deref(), Some("24031"));
    }
}
