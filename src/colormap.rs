//! Matplotlib-style sequential colormaps for choropleth fills.
//!
//! Each map is a piecewise-linear gradient over a handful of anchor colors,
//! sampled on a normalized 0..1 scale.

use image::Rgba;

/// Fill color for polygons with no joined value.
pub const MISSING_COLOR: Rgba<u8> = Rgba([128, 128, 128, 255]);

/// Outline color for polygon edges.
pub const EDGE_COLOR: Rgba<u8> = Rgba([128, 128, 128, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    YlOrBr,
    Purples,
    Blues,
    Greens,
    Reds,
    Oranges,
    Greys,
    Viridis,
}

impl Default for Colormap {
    fn default() -> Self {
        Colormap::YlOrBr
    }
}

impl Colormap {
    /// Parse a matplotlib-style colormap name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "YlOrBr" => Some(Colormap::YlOrBr),
            "Purples" => Some(Colormap::Purples),
            "Blues" => Some(Colormap::Blues),
            "Greens" => Some(Colormap::Greens),
            "Reds" => Some(Colormap::Reds),
            "Oranges" => Some(Colormap::Oranges),
            "Greys" => Some(Colormap::Greys),
            "viridis" | "Viridis" => Some(Colormap::Viridis),
            _ => None,
        }
    }

    fn anchors(self) -> &'static [[u8; 3]] {
        match self {
            Colormap::YlOrBr => &[
                [255, 255, 229],
                [254, 227, 145],
                [254, 153, 41],
                [204, 76, 2],
                [102, 37, 6],
            ],
            Colormap::Purples => &[
                [252, 251, 253],
                [218, 218, 235],
                [158, 154, 200],
                [106, 81, 163],
                [63, 0, 125],
            ],
            Colormap::Blues => &[
                [247, 251, 255],
                [198, 219, 239],
                [107, 174, 214],
                [33, 113, 181],
                [8, 48, 107],
            ],
            Colormap::Greens => &[
                [247, 252, 245],
                [199, 233, 192],
                [116, 196, 118],
                [35, 139, 69],
                [0, 68, 27],
            ],
            Colormap::Reds => &[
                [255, 245, 240],
                [252, 187, 161],
                [251, 106, 74],
                [203, 24, 29],
                [103, 0, 13],
            ],
            Colormap::Oranges => &[
                [255, 245, 235],
                [253, 208, 162],
                [253, 141, 60],
                [217, 72, 1],
                [127, 39, 4],
            ],
            Colormap::Greys => &[
                [255, 255, 255],
                [217, 217, 217],
                [150, 150, 150],
                [82, 82, 82],
                [0, 0, 0],
            ],
            Colormap::Viridis => &[
                [68, 1, 84],
                [59, 82, 139],
                [33, 145, 140],
                [94, 201, 98],
                [253, 231, 37],
            ],
        }
    }

    /// Sample the gradient at `t`, clamped to 0..1.
    pub fn sample(self, t: f64) -> Rgba<u8> {
        let anchors = self.anchors();
        let t = t.clamp(0.0, 1.0);
        let scaled = t * (anchors.len() - 1) as f64;
        let lo = scaled.floor() as usize;
        let hi = (lo + 1).min(anchors.len() - 1);
        let frac = scaled - lo as f64;
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
        Rgba([
            lerp(anchors[lo][0], anchors[hi][0]),
            lerp(anchors[lo][1], anchors[hi][1]),
            lerp(anchors[lo][2], anchors[hi][2]),
            255,
        ])
    }
}
