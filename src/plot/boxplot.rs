//! Box plot of per-treatment scores.

use super::svg::{finite_range, Canvas, Scale};
use serde::{Deserialize, Serialize};

/// Five-number summary plus outliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Most extreme values within 1.5 IQR of the box.
    pub whisker_low: f64,
    pub whisker_high: f64,
    pub outliers: Vec<f64>,
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl BoxStats {
    /// Summary of the finite values; `None` when there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let (fence_low, fence_high) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

        let inside: Vec<f64> = sorted
            .iter()
            .copied()
            .filter(|v| *v >= fence_low && *v <= fence_high)
            .collect();
        let outliers = sorted
            .iter()
            .copied()
            .filter(|v| *v < fence_low || *v > fence_high)
            .collect();

        Some(Self {
            q1,
            median,
            q3,
            whisker_low: inside.first().copied().unwrap_or(q1),
            whisker_high: inside.last().copied().unwrap_or(q3),
            outliers,
        })
    }
}

const LEFT: f64 = 80.0;
const TOP: f64 = 50.0;
const BOTTOM: f64 = 160.0;
const PLOT_HEIGHT: f64 = 340.0;
const SLOT: f64 = 70.0;

/// One box per group; x labels rotated 90°. Empty groups get a label only.
pub fn boxplot(title: &str, y_label: &str, groups: &[(String, Vec<f64>)]) -> String {
    let width = LEFT + SLOT * groups.len().max(1) as f64 + 30.0;
    let mut canvas = Canvas::new(width, TOP + PLOT_HEIGHT + BOTTOM);
    canvas.title(title);

    let range = finite_range(groups.iter().flat_map(|(_, v)| v.iter())).unwrap_or((0.0, 1.0));
    let pad = (range.1 - range.0) * 0.05;
    let scale = Scale::new(
        (range.0 - pad, range.1 + pad),
        (TOP + PLOT_HEIGHT, TOP),
    );
    canvas.y_axis(LEFT, &scale, y_label);
    let baseline = TOP + PLOT_HEIGHT;
    canvas.line(LEFT, baseline, width - 30.0, baseline, "black", 1.0);

    for (i, (name, values)) in groups.iter().enumerate() {
        let cx = LEFT + SLOT * (i as f64 + 0.5);
        canvas.text_rotated(cx + 4.0, baseline + 10.0, name, 12.0, 90.0, "start");

        let Some(stats) = BoxStats::from_values(values) else {
            continue;
        };
        let half = SLOT * 0.3;
        let (y_q1, y_q3) = (scale.map(stats.q1), scale.map(stats.q3));
        canvas.line(cx, scale.map(stats.whisker_low), cx, y_q1, "black", 1.0);
        canvas.line(cx, y_q3, cx, scale.map(stats.whisker_high), "black", 1.0);
        for whisker in [stats.whisker_low, stats.whisker_high] {
            let y = scale.map(whisker);
            canvas.line(cx - half / 2.0, y, cx + half / 2.0, y, "black", 1.0);
        }
        canvas.rect(cx - half, y_q3, 2.0 * half, (y_q1 - y_q3).max(0.5), "#ffffff", Some("black"));
        let y_med = scale.map(stats.median);
        canvas.line(cx - half, y_med, cx + half, y_med, "#ff7f0e", 2.0);
        for outlier in &stats.outliers {
            canvas.circle(cx, scale.map(*outlier), 3.0, "none", Some("black"));
        }
    }

    canvas.finish()
}
