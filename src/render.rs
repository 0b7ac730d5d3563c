//! Choropleth rendering onto an RGBA canvas.
//!
//! The merged table arrives already projected to Web Mercator; this module
//! fits it to the canvas, fills each polygon from the colormap, outlines the
//! edges, and draws the title and legend. No axis decoration is ever drawn.

use std::f64::consts::PI;
use std::path::Path;

use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point};
use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::colormap::{Colormap, EDGE_COLOR, MISSING_COLOR};
use crate::error::{PipelineError, Result};
use crate::text;
use crate::types::CombinedTable;

const EARTH_RADIUS_M: f64 = 6378137.0;
const MAX_LAT: f64 = 85.05112878;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TEXT_COLOR: Rgba<u8> = Rgba([32, 32, 32, 255]);
// Band reserved at the top for the title and on the right for the legend.
const TITLE_BAND: u32 = 80;
const LEGEND_BAND: u32 = 150;
const MARGIN: u32 = 20;
const FILL_ALPHA: f64 = 0.8;

/// Spherical Web Mercator (EPSG:3857) projection of a lon/lat coordinate.
pub fn web_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MAX_LAT, MAX_LAT);
    Coord {
        x: EARTH_RADIUS_M * c.x.to_radians(),
        y: EARTH_RADIUS_M * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln(),
    }
}

/// A rendered heat map. The pixel buffer carries no axis decoration; the
/// title is kept alongside it for inspection and drawn onto the canvas.
pub struct Figure {
    pub image: RgbaImage,
    pub title: String,
}

impl Figure {
    /// Write the figure as PNG (format chosen from the extension).
    pub fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save(path)
            .map_err(|source| PipelineError::ImageWrite {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Figure title for a region, matching the output naming convention.
pub fn title_for(name: &str, county: Option<&str>, state: &str) -> String {
    match county {
        Some(county) => format!("{name} in {county} County, {state}"),
        None => format!("{name} in {state}"),
    }
}

fn blend_over_white(color: Rgba<u8>) -> Rgba<u8> {
    let blend = |c: u8| (FILL_ALPHA * c as f64 + (1.0 - FILL_ALPHA) * 255.0).round() as u8;
    Rgba([blend(color.0[0]), blend(color.0[1]), blend(color.0[2]), 255])
}

struct Canvas {
    min_x: f64,
    max_y: f64,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Canvas {
    fn to_pixel(&self, c: Coord<f64>) -> (f64, f64) {
        (
            self.offset_x + (c.x - self.min_x) * self.scale,
            self.offset_y + (self.max_y - c.y) * self.scale,
        )
    }

    fn to_world(&self, px: f64, py: f64) -> Coord<f64> {
        Coord {
            x: self.min_x + (px - self.offset_x) / self.scale,
            y: self.max_y - (py - self.offset_y) / self.scale,
        }
    }
}

fn fit_canvas(table: &CombinedTable, width: u32, height: u32) -> Result<Canvas> {
    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    for row in &table.rows {
        let rect = match row.geometry.as_ref().and_then(|g| g.bounding_rect()) {
            Some(rect) => rect,
            None => continue,
        };
        bounds = Some(match bounds {
            None => (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
            Some((min_x, min_y, max_x, max_y)) => (
                min_x.min(rect.min().x),
                min_y.min(rect.min().y),
                max_x.max(rect.max().x),
                max_y.max(rect.max().y),
            ),
        });
    }
    let (min_x, min_y, max_x, max_y) = bounds.ok_or(PipelineError::EmptyGeometry)?;

    let avail_w = width.saturating_sub(LEGEND_BAND + 2 * MARGIN) as f64;
    let avail_h = height.saturating_sub(TITLE_BAND + MARGIN) as f64;
    let span_x = (max_x - min_x).max(f64::EPSILON);
    let span_y = (max_y - min_y).max(f64::EPSILON);
    let scale = (avail_w / span_x).min(avail_h / span_y);

    Ok(Canvas {
        min_x,
        max_y,
        scale,
        offset_x: MARGIN as f64 + (avail_w - span_x * scale) / 2.0,
        offset_y: TITLE_BAND as f64 + (avail_h - span_y * scale) / 2.0,
    })
}

fn fill_polygon(img: &mut RgbaImage, canvas: &Canvas, polygon: &MultiPolygon<f64>, color: Rgba<u8>) {
    let rect = match polygon.bounding_rect() {
        Some(rect) => rect,
        None => return,
    };
    let (px0, py1) = canvas.to_pixel(Coord {
        x: rect.min().x,
        y: rect.min().y,
    });
    let (px1, py0) = canvas.to_pixel(Coord {
        x: rect.max().x,
        y: rect.max().y,
    });
    let x0 = px0.floor().max(0.0) as u32;
    let y0 = py0.floor().max(0.0) as u32;
    let x1 = (px1.ceil() as i64).clamp(0, img.width() as i64) as u32;
    let y1 = (py1.ceil() as i64).clamp(0, img.height() as i64) as u32;

    for py in y0..y1 {
        for px in x0..x1 {
            let world = canvas.to_world(px as f64 + 0.5, py as f64 + 0.5);
            if polygon.contains(&Point::from(world)) {
                img.put_pixel(px, py, color);
            }
        }
    }
}

fn draw_line(img: &mut RgbaImage, (x0, y0): (f64, f64), (x1, y1): (f64, f64), color: Rgba<u8>) {
    let steps = ((x1 - x0).abs().max((y1 - y0).abs()).ceil() as u32).max(1);
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = x0 + (x1 - x0) * t;
        let y = y0 + (y1 - y0) * t;
        if x >= 0.0 && y >= 0.0 && (x as u32) < img.width() && (y as u32) < img.height() {
            img.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn outline_polygon(img: &mut RgbaImage, canvas: &Canvas, polygon: &MultiPolygon<f64>) {
    for poly in &polygon.0 {
        let rings = std::iter::once(poly.exterior()).chain(poly.interiors().iter());
        for ring in rings {
            for segment in ring.0.windows(2) {
                draw_line(
                    img,
                    canvas.to_pixel(segment[0]),
                    canvas.to_pixel(segment[1]),
                    EDGE_COLOR,
                );
            }
        }
    }
}

fn draw_legend(
    img: &mut RgbaImage,
    cmap: Colormap,
    vmin: f64,
    vmax: f64,
    width: u32,
    height: u32,
) {
    let bar_x = width.saturating_sub(LEGEND_BAND) + 10;
    let bar_w = 24u32;
    let bar_top = TITLE_BAND + 50;
    let bar_bottom = height.saturating_sub(160);
    if bar_bottom <= bar_top {
        return;
    }

    text::draw_text(img, bar_x as i32, (TITLE_BAND + 14) as i32, 14.0, "Percent of 18+", TEXT_COLOR);
    text::draw_text(img, bar_x as i32, (TITLE_BAND + 30) as i32, 14.0, "Population", TEXT_COLOR);

    for y in bar_top..bar_bottom {
        // Top of the bar is the maximum, matching a matplotlib colorbar.
        let t = 1.0 - (y - bar_top) as f64 / (bar_bottom - bar_top - 1).max(1) as f64;
        let color = cmap.sample(t);
        for x in bar_x..bar_x + bar_w {
            if x < img.width() {
                img.put_pixel(x, y, color);
            }
        }
    }

    let ticks = 5u32;
    for i in 0..ticks {
        let frac = i as f64 / (ticks - 1) as f64;
        let value = vmax - frac * (vmax - vmin);
        let y = bar_top as f64 + frac * (bar_bottom - bar_top - 1) as f64;
        let label = format!("{value:.0}%");
        text::draw_text(
            img,
            (bar_x + bar_w + 6) as i32,
            y as i32 - 7,
            14.0,
            &label,
            TEXT_COLOR,
        );
    }

    // Missing-value swatch under the bar.
    let swatch_y = bar_bottom + 20;
    for y in swatch_y..(swatch_y + 14).min(img.height()) {
        for x in bar_x..(bar_x + 14).min(img.width()) {
            img.put_pixel(x, y, blend_over_white(MISSING_COLOR));
        }
    }
    text::draw_text(
        img,
        (bar_x + 20) as i32,
        swatch_y as i32,
        14.0,
        "Missing values",
        TEXT_COLOR,
    );
}

/// Render one indicator column of the merged table as a choropleth.
///
/// `values` is the column coerced to `f64`, one entry per table row. Values
/// are normalized over their min..max range; rows with `None` values fill
/// grey, rows without geometry are skipped.
pub fn heat_map(
    table: &CombinedTable,
    values: &[Option<f64>],
    cmap: Colormap,
    name: &str,
    county: Option<&str>,
    state: &str,
    width: u32,
    height: u32,
) -> Result<Figure> {
    let canvas = fit_canvas(table, width, height)?;
    let mut img = RgbaImage::from_pixel(width, height, BACKGROUND);

    let finite: Vec<f64> = values
        .iter()
        .filter_map(|v| *v)
        .filter(|v| v.is_finite())
        .collect();
    let (mut vmin, mut vmax) = finite.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), v| (lo.min(*v), hi.max(*v)),
    );
    if finite.is_empty() {
        (vmin, vmax) = (0.0, 1.0);
    } else if vmin == vmax {
        vmin -= 0.5;
        vmax += 0.5;
    }
    debug!(rows = table.rows.len(), vmin, vmax, "rendering choropleth");

    for (row, value) in table.rows.iter().zip(values) {
        let polygon = match &row.geometry {
            Some(polygon) => polygon,
            None => continue,
        };
        let fill = match value {
            Some(v) if v.is_finite() => {
                blend_over_white(cmap.sample((v - vmin) / (vmax - vmin)))
            }
            _ => blend_over_white(MISSING_COLOR),
        };
        fill_polygon(&mut img, &canvas, polygon, fill);
    }
    for row in &table.rows {
        if let Some(polygon) = &row.geometry {
            outline_polygon(&mut img, &canvas, polygon);
        }
    }

    draw_legend(&mut img, cmap, vmin, vmax, width, height);

    let title = title_for(name, county, state);
    // Shrink the title to fit narrow canvases.
    let mut size: f32 = 36.0;
    let title_w = text::text_width(&title, size);
    let avail = width.saturating_sub(2 * MARGIN);
    if title_w > avail && title_w > 0 {
        size = (size * avail as f32 / title_w as f32).max(10.0);
    }
    let title_x = width.saturating_sub(text::text_width(&title, size)) / 2;
    text::draw_text(&mut img, title_x as i32, 22, size, &title, TEXT_COLOR);

    Ok(Figure { image: img, title })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CombinedRow, CombinedTable};
    use geo::polygon;

    fn square(offset: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: offset, y: 0.0),
            (x: offset + 1.0, y: 0.0),
            (x: offset + 1.0, y: 1.0),
            (x: offset, y: 1.0),
            (x: offset, y: 0.0),
        ]])
    }

    fn two_square_table() -> CombinedTable {
        CombinedTable {
            columns: vec!["BPHIGH_CrudePrev".to_string()],
            rows: vec![
                CombinedRow {
                    geoid: "a".to_string(),
                    geometry: Some(square(0.0)),
                    values: Default::default(),
                },
                CombinedRow {
                    geoid: "b".to_string(),
                    geometry: Some(square(2.0)),
                    values: Default::default(),
                },
            ],
        }
    }

    #[test]
    fn mercator_projection_is_monotonic() {
        let a = web_mercator(Coord { x: -122.0, y: 37.0 });
        let b = web_mercator(Coord { x: -121.0, y: 38.0 });
        assert!(b.x > a.x);
        assert!(b.y > a.y);
        assert_eq!(web_mercator(Coord { x: 0.0, y: 0.0 }), Coord { x: 0.0, y: 0.0 });
    }

    #[test]
    fn titles_region_with_and_without_county() {
        assert_eq!(
            title_for("Hypertension", None, "Maryland"),
            "Hypertension in Maryland"
        );
        assert_eq!(
            title_for("Hypertension", Some("Montgomery"), "Maryland"),
            "Hypertension in Montgomery County, Maryland"
        );
    }

    #[test]
    fn renders_values_and_missing_fills() {
        let table = two_square_table();
        let figure = heat_map(
            &table,
            &[Some(30.0), None],
            Colormap::YlOrBr,
            "Hypertension",
            Some("Alameda"),
            "California",
            400,
            300,
        )
        .unwrap();

        assert!(figure.title.contains("California"));
        assert_eq!(figure.image.width(), 400);
        assert_eq!(figure.image.height(), 300);

        // Both squares are filled: neither center pixel stays background.
        let canvas = fit_canvas(&table, 400, 300).unwrap();
        let (cx, cy) = canvas.to_pixel(Coord { x: 0.5, y: 0.5 });
        assert_ne!(*figure.image.get_pixel(cx as u32, cy as u32), BACKGROUND);
        let (mx, my) = canvas.to_pixel(Coord { x: 2.5, y: 0.5 });
        assert_eq!(
            *figure.image.get_pixel(mx as u32, my as u32),
            blend_over_white(MISSING_COLOR)
        );
    }

    #[test]
    fn empty_geometry_is_an_error() {
        let table = CombinedTable {
            columns: vec![],
            rows: vec![CombinedRow {
                geoid: "x".to_string(),
                geometry: None,
                values: Default::default(),
            }],
        };
        assert!(matches!(
            heat_map(&table, &[None], Colormap::Blues, "n", None, "s", 100, 100),
            Err(PipelineError::EmptyGeometry)
        ));
    }

    #[test]
    fn save_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let table = two_square_table();
        let figure = heat_map(
            &table,
            &[Some(10.0), Some(20.0)],
            Colormap::Blues,
            "Obesity",
            None,
            "Maryland",
            200,
            200,
        )
        .unwrap();
        let path = dir.path().join("Maryland_all_Obesity.png");
        figure.save(&path).unwrap();
        assert!(path.exists());
    }
}
