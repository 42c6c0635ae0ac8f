//! Minimal SVG canvas and shared chart helpers.

use crate::error::Result;
use crate::report::html_escape;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Categorical palette (matplotlib `tab20`).
pub const PALETTE: [&str; 20] = [
    "#1f77b4", "#aec7e8", "#ff7f0e", "#ffbb78", "#2ca02c", "#98df8a", "#d62728", "#ff9896",
    "#9467bd", "#c5b0d5", "#8c564b", "#c49c94", "#e377c2", "#f7b6d2", "#7f7f7f", "#c7c7c7",
    "#bcbd22", "#dbdb8d", "#17becf", "#9edae5",
];

/// Palette colour for series `i`, cycling.
pub fn palette_color(i: usize) -> &'static str {
    PALETTE[i % PALETTE.len()]
}

/// Blue-white-red colour for `value` in [-1, 1]; values outside are clamped.
pub fn diverging_color(value: f64) -> String {
    let v = if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) };
    let (blue, red) = ((59.0, 76.0, 192.0), (180.0, 4.0, 38.0));
    let (target, t) = if v < 0.0 { (blue, -v) } else { (red, v) };
    let mix = |end: f64| (255.0 + (end - 255.0) * t).round() as u8;
    format!("#{:02x}{:02x}{:02x}", mix(target.0), mix(target.1), mix(target.2))
}

/// Write an SVG document to `path`.
pub fn write_svg<P: AsRef<Path>>(path: P, svg: &str) -> Result<()> {
    fs::write(path.as_ref(), svg)?;
    debug!("Wrote {}", path.as_ref().display());
    Ok(())
}

/// Linear map from a data interval onto a pixel interval.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scale {
    d0: f64,
    d1: f64,
    r0: f64,
    r1: f64,
}

impl Scale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        let (d0, d1) = if (domain.1 - domain.0).abs() < f64::EPSILON {
            (domain.0 - 1.0, domain.1 + 1.0)
        } else {
            domain
        };
        Self {
            d0,
            d1,
            r0: range.0,
            r1: range.1,
        }
    }

    pub fn map(&self, v: f64) -> f64 {
        self.r0 + (v - self.d0) / (self.d1 - self.d0) * (self.r1 - self.r0)
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.d0, self.d1)
    }
}

/// Roughly `count` round tick values covering `[lo, hi]`.
pub(crate) fn ticks(lo: f64, hi: f64, count: usize) -> Vec<f64> {
    if !(lo.is_finite() && hi.is_finite()) || hi <= lo || count == 0 {
        return vec![lo];
    }
    let raw = (hi - lo) / count as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0_f64, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * magnitude);
    let start = (lo / step).ceil() as i64;
    let end = (hi / step).floor() as i64;
    (start..=end).map(|k| k as f64 * step).collect()
}

/// Tick label without float noise.
pub(crate) fn tick_label(v: f64) -> String {
    let rounded = (v * 1e6).round() / 1e6;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        rounded.to_string()
    }
}

/// Min and max over the finite values, if any.
pub(crate) fn finite_range<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<(f64, f64)> {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Accumulates SVG elements.
pub(crate) struct Canvas {
    width: f64,
    height: f64,
    body: String,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            body: String::new(),
        }
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str, stroke: Option<&str>) {
        let _ = write!(
            self.body,
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}""#,
            x, y, w, h, fill
        );
        if let Some(stroke) = stroke {
            let _ = write!(self.body, r#" stroke="{}""#, stroke);
        }
        self.body.push_str("/>\n");
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str, width: f64) {
        let _ = writeln!(
            self.body,
            r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{}" stroke-width="{}"/>"#,
            x1, y1, x2, y2, stroke, width
        );
    }

    pub fn circle(&mut self, cx: f64, cy: f64, r: f64, fill: &str, stroke: Option<&str>) {
        let _ = write!(
            self.body,
            r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}""#,
            cx, cy, r, fill
        );
        if let Some(stroke) = stroke {
            let _ = write!(self.body, r#" stroke="{}""#, stroke);
        }
        self.body.push_str("/>\n");
    }

    /// Text anchored at (x, y); `anchor` is `start`, `middle` or `end`.
    pub fn text(&mut self, x: f64, y: f64, s: &str, size: f64, anchor: &str) {
        let _ = writeln!(
            self.body,
            r#"<text x="{:.2}" y="{:.2}" font-size="{}" text-anchor="{}">{}</text>"#,
            x,
            y,
            size,
            anchor,
            html_escape(s)
        );
    }

    /// Text rotated by `angle` degrees around its anchor.
    pub fn text_rotated(&mut self, x: f64, y: f64, s: &str, size: f64, angle: f64, anchor: &str) {
        let _ = writeln!(
            self.body,
            r#"<text x="{:.2}" y="{:.2}" font-size="{}" text-anchor="{}" transform="rotate({} {:.2} {:.2})">{}</text>"#,
            x,
            y,
            size,
            anchor,
            angle,
            x,
            y,
            html_escape(s)
        );
    }

    /// Left y axis with ticks, grid-free.
    pub fn y_axis(&mut self, x: f64, scale: &Scale, label: &str) {
        let (lo, hi) = scale.domain();
        let (top, bottom) = (scale.map(hi), scale.map(lo));
        self.line(x, top, x, bottom, "black", 1.0);
        for tick in ticks(lo, hi, 5) {
            let y = scale.map(tick);
            self.line(x - 5.0, y, x, y, "black", 1.0);
            self.text(x - 8.0, y + 4.0, &tick_label(tick), 11.0, "end");
        }
        let mid = (top + bottom) / 2.0;
        self.text_rotated(x - 50.0, mid, label, 13.0, -90.0, "middle");
    }

    pub fn title(&mut self, title: &str) {
        let x = self.width / 2.0;
        self.text(x, 28.0, title, 16.0, "middle");
    }

    pub fn finish(self) -> String {
        format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" font-family=\"sans-serif\">\n<rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n{body}</svg>\n",
            w = self.width,
            h = self.height,
            body = self.body
        )
    }
}
