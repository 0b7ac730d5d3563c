//! End-to-end orchestration: fetch, convert, merge, render, save.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use geojson::FeatureCollection;
use tracing::{error, info};

use crate::colormap::Colormap;
use crate::config::{AppConfig, IndicatorConfig};
use crate::convert::convert_data;
use crate::error::{PipelineError, Result};
use crate::fetch::fetch_places;
use crate::merge::merge_data;
use crate::render::{heat_map, web_mercator};
use crate::types::{CombinedTable, Resolution};

/// State label used for nationwide maps.
pub const NATIONAL_LABEL: &str = "the United States";

/// One indicator to render: PLACES column, display name, colormap.
#[derive(Debug, Clone)]
pub struct Indicator {
    pub column: String,
    pub name: String,
    pub cmap: Colormap,
}

impl Indicator {
    /// Build from config, falling back to the default colormap when the
    /// configured name is unknown or absent.
    pub fn from_config(config: &IndicatorConfig) -> Indicator {
        Indicator {
            column: config.column.clone(),
            name: config.name.clone(),
            cmap: config
                .cmap
                .as_deref()
                .and_then(Colormap::from_name)
                .unwrap_or_default(),
        }
    }
}

/// A single region request: one state, optionally one county.
#[derive(Debug, Clone)]
pub struct HeatMapRequest {
    pub state: String,
    pub county: Option<String>,
    pub resolution: Resolution,
    pub indicators: Vec<Indicator>,
}

/// Outcome of one run. Run-level failures (fetch, convert, merge of a
/// single-region request) surface as `Err`; per-indicator and per-state
/// failures land here so batch callers can isolate them.
#[derive(Debug, Default)]
pub struct RunReport {
    pub images: Vec<PathBuf>,
    pub failures: Vec<(String, PipelineError)>,
}

/// Output path for one rendered indicator:
/// `{image_dir}/{state}_{county|all}_{name}.png`. Existing files are
/// overwritten.
pub fn image_path(image_dir: &Path, state: &str, county: Option<&str>, name: &str) -> PathBuf {
    image_dir.join(format!("{}_{}_{}.png", state, county.unwrap_or("all"), name))
}

/// Output path for one nationwide indicator map:
/// `{image_dir}/{name}_National.png`.
pub fn national_image_path(image_dir: &Path, name: &str) -> PathBuf {
    image_dir.join(format!("{name}_National.png"))
}

fn columns_of(indicators: &[Indicator]) -> Vec<String> {
    indicators.iter().map(|i| i.column.clone()).collect()
}

/// Render every indicator of an already merged and projected table, saving
/// one image each and isolating per-indicator failures in the report.
fn render_indicators(
    config: &AppConfig,
    table: &CombinedTable,
    indicators: &[Indicator],
    county: Option<&str>,
    state_label: &str,
    path_for: impl Fn(&Indicator) -> PathBuf,
    report: &mut RunReport,
) -> Result<()> {
    fs::create_dir_all(&config.output.image_dir)?;

    for indicator in indicators {
        let result = table.column_as_f64(&indicator.column).and_then(|values| {
            let figure = heat_map(
                table,
                &values,
                indicator.cmap,
                &indicator.name,
                county,
                state_label,
                config.output.width,
                config.output.height,
            )?;
            let path = path_for(indicator);
            figure.save(&path)?;
            Ok(path)
        });
        match result {
            Ok(path) => {
                info!(column = %indicator.column, path = %path.display(), "wrote heat map");
                report.images.push(path);
            }
            Err(e) => {
                error!(column = %indicator.column, error = %e, "indicator failed");
                report.failures.push((indicator.column.clone(), e));
            }
        }
    }
    Ok(())
}

/// Fetch, merge and render every indicator of one region request.
pub fn full_process(config: &AppConfig, request: &HeatMapRequest) -> Result<RunReport> {
    let collection = fetch_places(
        &config.api,
        &columns_of(&request.indicators),
        &request.state,
        request.county.as_deref(),
        request.resolution,
    )?;
    process_collection(config, request, &collection)
}

/// The pipeline tail behind [`full_process`], starting from an already
/// fetched feature collection.
pub fn process_collection(
    config: &AppConfig,
    request: &HeatMapRequest,
    collection: &FeatureCollection,
) -> Result<RunReport> {
    let county = request.county.as_deref();

    let records = convert_data(collection, &columns_of(&request.indicators), request.resolution)?;
    let table = merge_data(&records, &request.state, county, request.resolution, &config.data)?;
    let table = table.map_coords(web_mercator);

    let mut report = RunReport::default();
    render_indicators(
        config,
        &table,
        &request.indicators,
        county,
        &request.state,
        |i| image_path(&config.output.image_dir, &request.state, county, &i.name),
        &mut report,
    )?;
    Ok(report)
}

/// Fetch county-level data for every state and render one nationwide
/// choropleth per indicator, saved as `{name}_National.png`. A state that
/// fails to fetch is recorded in the report and skipped.
pub fn national_process(
    config: &AppConfig,
    indicators: &[Indicator],
    states: &[String],
) -> Result<RunReport> {
    let columns = columns_of(indicators);
    let mut collections = Vec::new();
    let mut fetch_failures = Vec::new();
    for state in states {
        match fetch_places(&config.api, &columns, state, None, Resolution::County) {
            Ok(collection) => collections.push((state.clone(), collection)),
            Err(e) => {
                error!(%state, error = %e, "state fetch failed, continuing");
                fetch_failures.push((state.clone(), e));
            }
        }
    }
    let mut report = process_national_collections(config, indicators, &collections)?;
    report.failures.extend(fetch_failures);
    Ok(report)
}

/// The nationwide pipeline tail behind [`national_process`]: merge each
/// state's collection, concatenate the merged rows into one table, then
/// render per indicator with the national title.
pub fn process_national_collections(
    config: &AppConfig,
    indicators: &[Indicator],
    collections: &[(String, FeatureCollection)],
) -> Result<RunReport> {
    let columns = columns_of(indicators);
    let mut report = RunReport::default();

    let mut all_columns = BTreeSet::new();
    let mut rows = Vec::new();
    for (state, collection) in collections {
        let merged = convert_data(collection, &columns, Resolution::County)
            .and_then(|records| merge_data(&records, state, None, Resolution::County, &config.data));
        match merged {
            Ok(table) => {
                all_columns.extend(table.columns.iter().cloned());
                rows.extend(table.rows);
            }
            Err(e) => {
                error!(%state, error = %e, "state merge failed, continuing");
                report.failures.push((state.clone(), e));
            }
        }
    }
    let table = CombinedTable {
        columns: all_columns.into_iter().collect(),
        rows,
    };
    let table = table.map_coords(web_mercator);

    render_indicators(
        config,
        &table,
        indicators,
        None,
        NATIONAL_LABEL,
        |i| national_image_path(&config.output.image_dir, &i.name),
        &mut report,
    )?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_path_follows_naming_convention() {
        let path = image_path(
            Path::new("images"),
            "Maryland",
            Some("Montgomery"),
            "Hypertension",
        );
        assert_eq!(
            path,
            PathBuf::from("images/Maryland_Montgomery_Hypertension.png")
        );
        assert_eq!(
            image_path(Path::new("images"), "Maryland", None, "Obesity"),
            PathBuf::from("images/Maryland_all_Obesity.png")
        );
    }

    #[test]
    fn national_image_path_follows_naming_convention() {
        assert_eq!(
            national_image_path(Path::new("images"), "Hypertension"),
            PathBuf::from("images/Hypertension_National.png")
        );
    }

    #[test]
    fn indicator_falls_back_to_default_colormap() {
        let indicator = Indicator::from_config(&IndicatorConfig {
            column: "BPHIGH_CrudePrev".to_string(),
            name: "Hypertension".to_string(),
            cmap: Some("NotAColormap".to_string()),
        });
        assert_eq!(indicator.cmap, Colormap::YlOrBr);
    }
}
