use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub data: DataConfig,
    pub output: OutputConfig,
    pub indicators: Vec<IndicatorConfig>,
    pub batch: BatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub domain: String,
    pub tract_dataset: String,
    pub county_dataset: String,
    /// Socrata app token. Optional; unauthenticated requests are throttled.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            domain: "chronicdata.cdc.gov".to_string(),
            tract_dataset: "yjkw-uj5s".to_string(),
            county_dataset: "i46a-9kgh".to_string(),
            token: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding per-state tract boundary files named `{fips}.geojson`.
    pub boundary_dir: PathBuf,
    /// National county boundary layer, shapefile or GeoJSON.
    pub county_boundaries: PathBuf,
    /// CSV mapping `state,county` to five-digit county FIPS codes.
    pub county_lookup: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            boundary_dir: PathBuf::from("data"),
            county_boundaries: PathBuf::from("data/cb_2018_us_county_20m.shp"),
            county_lookup: PathBuf::from("data/county_fips.csv"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub image_dir: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            image_dir: PathBuf::from("images"),
            width: 1500,
            height: 1500,
        }
    }
}

/// One indicator column to fetch and render.
#[derive(Debug, Deserialize, Clone)]
pub struct IndicatorConfig {
    /// PLACES column name, e.g. `BPHIGH_CrudePrev`.
    pub column: String,
    /// Display name used in titles and output file names.
    pub name: String,
    /// Colormap name; defaults to YlOrBr when omitted.
    pub cmap: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BatchConfig {
    /// States to iterate in batch mode. Empty means every state in the
    /// built-in FIPS table.
    pub states: Vec<String>,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.api.domain, "chronicdata.cdc.gov");
        assert_eq!(config.api.tract_dataset, "yjkw-uj5s");
        assert_eq!(config.output.image_dir, PathBuf::from("images"));
        assert!(config.indicators.is_empty());
    }

    #[test]
    fn loads_indicators_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[api]
token = "abc123"

[[indicators]]
column = "BPHIGH_CrudePrev"
name = "Hypertension"
cmap = "Purples"

[[indicators]]
column = "OBESITY_CrudePrev"
name = "Obesity"
"#
        )
        .unwrap();
        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.api.token.as_deref(), Some("abc123"));
        assert_eq!(config.indicators.len(), 2);
        assert_eq!(config.indicators[0].cmap.as_deref(), Some("Purples"));
        assert!(config.indicators[1].cmap.is_none());
    }
}
