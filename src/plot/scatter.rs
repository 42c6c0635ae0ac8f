//! Scatter plot of ordination axes coloured by treatment.

use super::svg::{finite_range, palette_color, tick_label, ticks, Canvas, Scale};

const LEFT: f64 = 90.0;
const TOP: f64 = 50.0;
const PLOT: f64 = 420.0;
const LEGEND_WIDTH: f64 = 200.0;

/// Plot `(group, x, y)` points; groups are coloured in first-seen order.
pub fn scatter(title: &str, x_label: &str, y_label: &str, points: &[(String, f64, f64)]) -> String {
    let width = LEFT + PLOT + 30.0 + LEGEND_WIDTH;
    let height = TOP + PLOT + 70.0;
    let mut canvas = Canvas::new(width, height);
    canvas.title(title);

    let mut groups: Vec<&str> = Vec::new();
    for (group, _, _) in points {
        if !groups.contains(&group.as_str()) {
            groups.push(group);
        }
    }

    let padded = |range: Option<(f64, f64)>| {
        let (lo, hi) = range.unwrap_or((-1.0, 1.0));
        let pad = (hi - lo).abs() * 0.08;
        (lo - pad, hi + pad)
    };
    let x_range = padded(finite_range(points.iter().map(|p| &p.1)));
    let y_range = padded(finite_range(points.iter().map(|p| &p.2)));
    let x_scale = Scale::new(x_range, (LEFT, LEFT + PLOT));
    let y_scale = Scale::new(y_range, (TOP + PLOT, TOP));

    canvas.y_axis(LEFT, &y_scale, y_label);
    let baseline = TOP + PLOT;
    canvas.line(LEFT, baseline, LEFT + PLOT, baseline, "black", 1.0);
    let (x_lo, x_hi) = x_scale.domain();
    for tick in ticks(x_lo, x_hi, 5) {
        let x = x_scale.map(tick);
        canvas.line(x, baseline, x, baseline + 5.0, "black", 1.0);
        canvas.text(x, baseline + 18.0, &tick_label(tick), 11.0, "middle");
    }
    canvas.text(LEFT + PLOT / 2.0, baseline + 45.0, x_label, 13.0, "middle");

    for (group, x, y) in points {
        if !(x.is_finite() && y.is_finite()) {
            continue;
        }
        let color_idx = groups.iter().position(|g| g == group).unwrap_or(0);
        canvas.circle(
            x_scale.map(*x),
            y_scale.map(*y),
            5.0,
            palette_color(color_idx * 2),
            Some("black"),
        );
    }

    let legend_x = LEFT + PLOT + 30.0;
    for (i, group) in groups.iter().enumerate() {
        let y = TOP + 20.0 * i as f64;
        canvas.circle(legend_x + 6.0, y + 6.0, 5.0, palette_color(i * 2), Some("black"));
        canvas.text(legend_x + 18.0, y + 10.0, group, 11.0, "start");
    }

    canvas.finish()
}
