//! Bubble grid of correlation coefficients.

use super::svg::{diverging_color, tick_label, Canvas};
use nalgebra::DMatrix;

const CELL: f64 = 40.0;
const TOP: f64 = 60.0;
const LABEL_WIDTH: f64 = 260.0;
const BOTTOM: f64 = 160.0;
const LEGEND_WIDTH: f64 = 90.0;

/// Grid of circles, one per `values[(row, col)]`.
///
/// Radius is proportional to |value| and colour follows a blue-white-red map
/// on [-1, 1]. NaN cells are left blank. X labels are rotated 45°.
pub fn bubble_grid(
    title: &str,
    row_labels: &[String],
    col_labels: &[String],
    values: &DMatrix<f64>,
) -> String {
    let grid_w = CELL * col_labels.len().max(1) as f64;
    let grid_h = CELL * row_labels.len().max(1) as f64;
    let width = LABEL_WIDTH + grid_w + 40.0 + LEGEND_WIDTH;
    let height = TOP + grid_h.max(220.0) + BOTTOM;
    let mut canvas = Canvas::new(width, height);
    canvas.title(title);

    for r in 0..=row_labels.len() {
        let y = TOP + CELL * r as f64;
        canvas.line(LABEL_WIDTH, y, LABEL_WIDTH + grid_w, y, "#dddddd", 1.0);
    }
    for c in 0..=col_labels.len() {
        let x = LABEL_WIDTH + CELL * c as f64;
        canvas.line(x, TOP, x, TOP + grid_h, "#dddddd", 1.0);
    }

    for (r, label) in row_labels.iter().enumerate() {
        let cy = TOP + CELL * (r as f64 + 0.5);
        canvas.text(LABEL_WIDTH - 8.0, cy + 4.0, label, 11.0, "end");
        for c in 0..col_labels.len() {
            let Some(&value) = values.get((r, c)) else {
                continue;
            };
            if value.is_nan() {
                continue;
            }
            let cx = LABEL_WIDTH + CELL * (c as f64 + 0.5);
            let radius = value.abs().min(1.0) * CELL * 0.45;
            canvas.circle(cx, cy, radius, &diverging_color(value), Some("#555555"));
        }
    }

    let baseline = TOP + grid_h;
    for (c, label) in col_labels.iter().enumerate() {
        let cx = LABEL_WIDTH + CELL * (c as f64 + 0.5);
        canvas.text_rotated(cx, baseline + 12.0, label, 11.0, 45.0, "start");
    }

    // colour legend from +1 (top) to -1 (bottom)
    let legend_x = LABEL_WIDTH + grid_w + 40.0;
    let steps = 20;
    let step_h = 200.0 / steps as f64;
    for i in 0..steps {
        let value = 1.0 - 2.0 * (i as f64 + 0.5) / steps as f64;
        canvas.rect(
            legend_x,
            TOP + step_h * i as f64,
            16.0,
            step_h + 0.5,
            &diverging_color(value),
            None,
        );
    }
    for tick in [1.0, 0.5, 0.0, -0.5, -1.0] {
        let y = TOP + (1.0 - tick) / 2.0 * 200.0;
        canvas.line(legend_x + 16.0, y, legend_x + 20.0, y, "black", 1.0);
        canvas.text(legend_x + 24.0, y + 4.0, &tick_label(tick), 10.0, "start");
    }

    canvas.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_cells_blank() {
        let values = DMatrix::from_row_slice(2, 2, &[1.0, -0.5, f64::NAN, 0.0]);
        let svg = bubble_grid(
            "Spearman",
            &["g__A".to_string(), "g__B".to_string()],
            &["pH".to_string(), "moisture".to_string()],
            &values,
        );
        assert_eq!(svg.matches("<circle").count(), 3);
        assert!(svg.contains(r##"fill="#b40426""##));
        assert!(svg.contains(">moisture</text>"));
    }
}
