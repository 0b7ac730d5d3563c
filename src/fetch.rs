//! Socrata client for the CDC PLACES datasets.
//!
//! Issues a filtered-select request against the tract-level or county-level
//! dataset and returns the GeoJSON feature collection as-is. No retry,
//! backoff or pagination; anything the server rejects propagates untouched.

use std::time::Duration;

use geojson::{FeatureCollection, GeoJson};
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{PipelineError, Result};
use crate::types::Resolution;

/// Row cap for queries restricted to a single county.
const COUNTY_LIMIT: u32 = 3000;
/// Row cap for state-wide queries.
const STATE_LIMIT: u32 = 10000;

/// Identifying columns always selected ahead of the requested indicators.
pub fn select_clause(columns: &[String], resolution: Resolution) -> String {
    let fixed = match resolution {
        Resolution::Tract => "statedesc, countyname, geolocation, tractfips, totalpopulation",
        Resolution::County => "statedesc, countyname, geolocation, totalpopulation, countyfips",
    };
    if columns.is_empty() {
        fixed.to_string()
    } else {
        format!("{}, {}", fixed, columns.join(", "))
    }
}

/// SoQL filter on state and, when given, county. Single quotes in names are
/// doubled per SoQL string literal rules.
pub fn where_clause(state: &str, county: Option<&str>) -> String {
    let escape = |s: &str| s.replace('\'', "''");
    match county {
        Some(county) => format!(
            "statedesc = '{}' and countyname = '{}'",
            escape(state),
            escape(county)
        ),
        None => format!("statedesc = '{}'", escape(state)),
    }
}

/// Fetch PLACES rows for one state (optionally one county) as GeoJSON.
///
/// County-level data is only published state-wide, so in county mode any
/// county filter is ignored and applied later during the merge.
pub fn fetch_places(
    api: &ApiConfig,
    columns: &[String],
    state: &str,
    county: Option<&str>,
    resolution: Resolution,
) -> Result<FeatureCollection> {
    let (dataset, county) = match resolution {
        Resolution::Tract => (api.tract_dataset.as_str(), county),
        Resolution::County => (api.county_dataset.as_str(), None),
    };
    let limit = if county.is_some() {
        COUNTY_LIMIT
    } else {
        STATE_LIMIT
    };
    let url = format!("https://{}/resource/{}.geojson", api.domain, dataset);
    debug!(%url, state, ?county, "querying PLACES dataset");

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(api.timeout_secs))
        .build()?;
    let mut request = client.get(&url).query(&[
        ("$select", select_clause(columns, resolution)),
        ("$where", where_clause(state, county)),
        ("$limit", limit.to_string()),
    ]);
    if let Some(token) = &api.token {
        request = request.header("X-App-Token", token);
    }
    let body = request.send()?.error_for_status()?.text()?;
    parse_feature_collection(&body)
}

/// Parse a response body into a feature collection, rejecting bare features
/// and geometries.
pub fn parse_feature_collection(body: &str) -> Result<FeatureCollection> {
    match body.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        GeoJson::Feature(_) => Err(PipelineError::NotFeatureCollection("Feature")),
        GeoJson::Geometry(_) => Err(PipelineError::NotFeatureCollection("Geometry")),
    }
}
