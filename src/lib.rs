//! Choropleth maps from CDC PLACES data.
//!
//! The pipeline runs in four stages: fetch a filtered GeoJSON extract from
//! the PLACES Socrata API, reshape it into typed records, join those records
//! onto local census boundary polygons, and render one heat map image per
//! indicator column. See [`pipeline::full_process`] for the whole flow.

pub mod colormap;
pub mod config;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod fips;
pub mod merge;
pub mod pipeline;
pub mod render;
pub mod text;
pub mod types;

pub use error::{PipelineError, Result};
pub use types::Resolution;
