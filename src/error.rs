use std::path::PathBuf;
use thiserror::Error;

/// Failures from the fetch / convert / merge / render pipeline.
///
/// Fetch, decode, lookup and boundary errors abort the whole region; column
/// and image errors are scoped to a single indicator and are collected per
/// indicator by the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("PLACES request failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("response is not valid GeoJSON: {0}")]
    Decode(#[from] geojson::Error),
    #[error("expected a FeatureCollection, got a {0}")]
    NotFeatureCollection(&'static str),
    #[error("unknown state name: {0}")]
    UnknownState(String),
    #[error("unknown county name: {county}, {state}")]
    UnknownCounty { county: String, state: String },
    #[error("failed to read local data file {}", .path.display())]
    BoundaryIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse local data file {}: {message}", .path.display())]
    BoundaryFormat { path: PathBuf, message: String },
    #[error("column {0} is not present in the merged table")]
    MissingColumn(String),
    #[error("column {column} has non-numeric value {value:?}")]
    NonNumericColumn { column: String, value: String },
    #[error("merged table has no drawable geometry")]
    EmptyGeometry,
    #[error("failed to write image {}", .path.display())]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
